use crate::domain::chain::{ChainId, TokenSymbol};
use crate::domain::ports::{ProofUploader, RateFeed, TransactionBackend};
use crate::domain::transaction::{
    BackendReceipt, Direction, HistoryEntry, TransactionId, TransactionRecord, TransactionStatus,
};
use crate::error::{Field, RampError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

fn client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| RampError::Config(format!("cannot build HTTP client: {err}")))
}

fn transport(err: reqwest::Error) -> RampError {
    RampError::Network(err.to_string())
}

/// Message of a non-success response: the body's `error` or `message`
/// field, otherwise a generic one naming the status code.
fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["error", "message"]
                .iter()
                .find_map(|key| value.get(key)?.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| format!("Transaction failed with status {status}"))
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.map_err(transport)?;
    if !status.is_success() {
        return Err(RampError::Backend {
            status: status.as_u16(),
            message: error_message(status.as_u16(), &body),
        });
    }
    serde_json::from_str(&body)
        .map_err(|err| RampError::Network(format!("malformed response: {err}")))
}

#[derive(Serialize)]
pub struct OffRampPayload<'a> {
    tx_hash: Option<&'a str>,
    amount: Decimal,
    token: TokenSymbol,
    fiat_amount: Decimal,
    fiat_currency: &'a str,
    payout_method: &'a str,
    mobile_number: &'a str,
    sender_address: Option<&'a str>,
    recipient_address: &'a str,
    chain_id: ChainId,
    sender_email: &'a str,
}

#[derive(Serialize)]
pub struct OnRampPayload<'a> {
    amount: Decimal,
    fiat_amount: Decimal,
    fiat_currency: &'a str,
    payout_network: TokenSymbol,
    payout_method: &'a str,
    sender_mobile: &'a str,
    sender_email: &'a str,
    recipient_address: &'a str,
    chain_id: ChainId,
    image_url: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum RequestBody<'a> {
    OffRamp(OffRampPayload<'a>),
    OnRamp(OnRampPayload<'a>),
}

/// Body the transaction service expects for `record`.
pub fn request_body(record: &TransactionRecord) -> RequestBody<'_> {
    match record.direction {
        Direction::OffRamp => RequestBody::OffRamp(OffRampPayload {
            tx_hash: record.tx_hash.as_deref(),
            amount: record.token_amount,
            token: record.token,
            fiat_amount: record.fiat_amount,
            fiat_currency: &record.fiat_currency,
            payout_method: &record.payout_method,
            mobile_number: &record.mobile_number,
            sender_address: record.sender_address.as_deref(),
            recipient_address: &record.recipient_address,
            chain_id: record.chain_id,
            sender_email: &record.email,
        }),
        Direction::OnRamp => RequestBody::OnRamp(OnRampPayload {
            amount: record.token_amount,
            fiat_amount: record.fiat_amount,
            fiat_currency: &record.fiat_currency,
            payout_network: record.token,
            payout_method: &record.payout_method,
            sender_mobile: &record.mobile_number,
            sender_email: &record.email,
            recipient_address: &record.recipient_address,
            chain_id: record.chain_id,
            image_url: record.image_url.as_deref(),
        }),
    }
}

#[derive(Deserialize)]
struct ReceiptBody {
    id: TransactionId,
    #[serde(default)]
    status: Option<TransactionStatus>,
    #[serde(default)]
    tx_hash: Option<String>,
}

/// Reads `{id, status?, tx_hash?}`, also when wrapped in a `data` or
/// `transaction` object. A missing status means the record was accepted.
pub fn parse_receipt(value: Value) -> Result<BackendReceipt> {
    let value = match value {
        Value::Object(mut object) if !object.contains_key("id") => ["data", "transaction"]
            .iter()
            .find_map(|key| object.remove(*key))
            .unwrap_or(Value::Object(object)),
        other => other,
    };
    let body: ReceiptBody = serde_json::from_value(value)
        .map_err(|err| RampError::Network(format!("unexpected receipt: {err}")))?;
    Ok(BackendReceipt {
        id: body.id,
        status: body.status.unwrap_or(TransactionStatus::Pending),
        tx_hash: body.tx_hash,
    })
}

/// Accepts a flat list of rows or a list whose elements are lists.
pub fn parse_history(value: Value) -> Result<Vec<HistoryEntry>> {
    let Value::Array(items) = value else {
        return Err(RampError::Network("history is not a list".to_string()));
    };
    let mut rows = Vec::new();
    for item in items {
        match item {
            Value::Array(nested) => rows.extend(nested),
            row => rows.push(row),
        }
    }
    rows
        .into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|err| RampError::Network(format!("unexpected history row: {err}")))
        })
        .collect()
}

/// REST client of the transaction service (`/api/onramp`, `/api/offramp`).
pub struct HttpTransactionBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransactionBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, direction: Direction, tail: Option<&str>) -> String {
        match tail {
            Some(tail) => format!("{}/api/{}/{tail}", self.base_url, direction.resource()),
            None => format!("{}/api/{}", self.base_url, direction.resource()),
        }
    }
}

#[async_trait]
impl TransactionBackend for HttpTransactionBackend {
    async fn create(&self, record: &TransactionRecord) -> Result<BackendReceipt> {
        let url = self.url(record.direction, None);
        debug!(%url, "Posting transaction");
        let response = self
            .client
            .post(&url)
            .json(&request_body(record))
            .send()
            .await
            .map_err(transport)?;
        parse_receipt(read_json(response).await?)
    }

    async fn fetch_status(
        &self,
        direction: Direction,
        id: &TransactionId,
    ) -> Result<BackendReceipt> {
        let response = self
            .client
            .get(self.url(direction, Some(id.as_str())))
            .send()
            .await
            .map_err(transport)?;
        parse_receipt(read_json(response).await?)
    }

    async fn history(&self, direction: Direction, address: &str) -> Result<Vec<HistoryEntry>> {
        let response = self
            .client
            .get(self.url(direction, Some(address)))
            .send()
            .await
            .map_err(transport)?;
        parse_history(read_json(response).await?)
    }
}

#[derive(Deserialize)]
struct FiatRates {
    rates: HashMap<String, Decimal>,
}

#[derive(Deserialize)]
struct UsdPrice {
    usd: Decimal,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<Value>,
}

/// Parses a `0x`-prefixed hex quantity as returned by JSON-RPC.
pub fn parse_hex_quantity(quantity: &str) -> Option<u128> {
    let digits = quantity.strip_prefix("0x")?;
    if digits.is_empty() {
        return None;
    }
    u128::from_str_radix(digits, 16).ok()
}

/// Public exchange-rate, spot-price and JSON-RPC endpoints.
pub struct HttpRateFeed {
    client: reqwest::Client,
    fiat_rate_url: String,
    crypto_price_url: String,
    rpc_urls: HashMap<ChainId, String>,
}

impl HttpRateFeed {
    pub fn new(
        fiat_rate_url: &str,
        crypto_price_url: &str,
        rpc_urls: HashMap<ChainId, String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: client(timeout)?,
            fiat_rate_url: fiat_rate_url.to_string(),
            crypto_price_url: crypto_price_url.to_string(),
            rpc_urls,
        })
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RampError::Network(format!("feed answered {status}")));
        }
        response.json().await.map_err(transport)
    }
}

#[async_trait]
impl RateFeed for HttpRateFeed {
    async fn fiat_per_usd(&self, api_code: &str) -> Result<Decimal> {
        let body: FiatRates = self.fetch_json(self.client.get(&self.fiat_rate_url)).await?;
        body.rates
            .get(api_code)
            .copied()
            .ok_or_else(|| RampError::Network(format!("no rate for {api_code} in feed")))
    }

    async fn usd_price(&self, asset_id: &str) -> Result<Decimal> {
        let request = self
            .client
            .get(&self.crypto_price_url)
            .query(&[("ids", asset_id), ("vs_currencies", "usd")]);
        let body: HashMap<String, UsdPrice> = self.fetch_json(request).await?;
        body.get(asset_id)
            .map(|price| price.usd)
            .ok_or_else(|| RampError::Network(format!("no price for {asset_id} in feed")))
    }

    async fn gas_price_wei(&self, chain_id: ChainId) -> Result<u128> {
        let url = self
            .rpc_urls
            .get(&chain_id)
            .ok_or_else(|| RampError::Config(format!("no RPC endpoint for chain {chain_id}")))?;
        let request = self.client.post(url).json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_gasPrice",
            "params": [],
        }));
        let body: RpcResponse = self.fetch_json(request).await?;
        if let Some(error) = body.error {
            return Err(RampError::Network(format!("eth_gasPrice failed: {error}")));
        }
        body.result
            .as_deref()
            .and_then(parse_hex_quantity)
            .ok_or_else(|| RampError::Network("eth_gasPrice returned no quantity".to_string()))
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Unsigned image upload with an upload preset.
pub struct HttpProofUploader {
    client: reqwest::Client,
    url: String,
    upload_preset: String,
    max_image_bytes: usize,
}

impl HttpProofUploader {
    pub fn new(
        url: &str,
        upload_preset: &str,
        max_image_bytes: usize,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: client(timeout)?,
            url: url.to_string(),
            upload_preset: upload_preset.to_string(),
            max_image_bytes,
        })
    }
}

#[async_trait]
impl ProofUploader for HttpProofUploader {
    async fn upload(&self, image: Vec<u8>, file_name: &str) -> Result<String> {
        if image.is_empty() || image.len() > self.max_image_bytes {
            return Err(RampError::Validation(Field::ProofOfPayment));
        }
        let part = reqwest::multipart::Part::bytes(image).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone());

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        let body: UploadResponse = serde_json::from_value(read_json(response).await?)
            .map_err(|err| RampError::Network(format!("unexpected upload response: {err}")))?;
        Ok(body.secure_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::BASE;
    use crate::domain::transaction::TransactionDraft;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_message_prefers_body_fields() {
        assert_eq!(error_message(400, r#"{"error": "Invalid mobile"}"#), "Invalid mobile");
        assert_eq!(error_message(400, r#"{"message": "Bad amount"}"#), "Bad amount");
        assert_eq!(
            error_message(502, "<html>Bad gateway</html>"),
            "Transaction failed with status 502"
        );
    }

    #[test]
    fn test_receipt_shapes() {
        let flat = parse_receipt(json!({"id": 12, "status": "processing"})).unwrap();
        assert_eq!(flat.id.as_str(), "12");
        assert_eq!(flat.status, TransactionStatus::Pending);

        let wrapped = parse_receipt(json!({"data": {"id": "a1", "status": "completed"}})).unwrap();
        assert_eq!(wrapped.id.as_str(), "a1");
        assert_eq!(wrapped.status, TransactionStatus::Confirmed);

        let bare = parse_receipt(json!({"id": 3})).unwrap();
        assert_eq!(bare.status, TransactionStatus::Pending);

        assert!(parse_receipt(json!({"ok": true})).is_err());
    }

    #[test]
    fn test_history_flat_and_nested() {
        let flat = parse_history(json!([{"id": 1}, {"id": 2}])).unwrap();
        assert_eq!(flat.len(), 2);

        let nested =
            parse_history(json!([[{"id": 1, "payout_network": "ETH"}, {"id": 2}]])).unwrap();
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].token.as_deref(), Some("ETH"));

        assert!(parse_history(json!({"id": 1})).is_err());
    }

    #[test]
    fn test_hex_quantity() {
        assert_eq!(parse_hex_quantity("0x3b9aca00"), Some(1_000_000_000));
        assert_eq!(parse_hex_quantity("0x0"), Some(0));
        assert_eq!(parse_hex_quantity("0x"), None);
        assert_eq!(parse_hex_quantity("1234"), None);
    }

    #[test]
    fn test_request_bodies_use_backend_field_names() {
        let draft = TransactionDraft {
            direction: Direction::OnRamp,
            chain_id: BASE,
            token: TokenSymbol::Usdc,
            token_amount: dec!(9.75),
            fiat_amount: dec!(38500),
            corridor: "UGX".into(),
            payout_method: "mtn".into(),
            mobile_number: "0772123456".into(),
            email: "amina@example.com".into(),
            sender_address: None,
            recipient_address: Some("0xabc".into()),
            image_url: Some("https://img.example/p.png".into()),
        };
        let on_ramp_record = TransactionRecord::from_draft(draft.clone(), "0xabc".into());
        let on_ramp = serde_json::to_value(request_body(&on_ramp_record)).unwrap();
        assert_eq!(on_ramp["payout_network"], "USDC");
        assert_eq!(on_ramp["sender_mobile"], "0772123456");
        assert_eq!(on_ramp["chain_id"], 8453);
        assert_eq!(on_ramp["image_url"], "https://img.example/p.png");

        let mut record = TransactionRecord::from_draft(
            TransactionDraft {
                direction: Direction::OffRamp,
                sender_address: Some("0xsender".into()),
                ..draft
            },
            "0xtreasury".into(),
        );
        record.tx_hash = Some("0xfeed".into());
        let off_ramp = serde_json::to_value(request_body(&record)).unwrap();
        assert_eq!(off_ramp["tx_hash"], "0xfeed");
        assert_eq!(off_ramp["token"], "USDC");
        assert_eq!(off_ramp["sender_email"], "amina@example.com");
        assert_eq!(off_ramp["recipient_address"], "0xtreasury");
    }
}
