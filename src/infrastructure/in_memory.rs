use crate::domain::chain::ChainId;
use crate::domain::ports::{RateFeed, RateFeedRef, TransactionBackend, WalletProvider};
use crate::domain::transaction::{
    BackendReceipt, Direction, HistoryEntry, TransactionId, TransactionRecord, TransactionStatus,
};
use crate::error::{RampError, Result, WalletError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A thread-safe in-memory transaction service.
///
/// Assigns sequential ids, keeps every record in a shared map and lets the
/// caller drive status changes with [`InMemoryBackend::set_status`]. Failures
/// can be queued to exercise error paths.
#[derive(Default, Clone)]
pub struct InMemoryBackend {
    records: Arc<RwLock<HashMap<TransactionId, TransactionRecord>>>,
    next_id: Arc<Mutex<u64>>,
    create_failures: Arc<Mutex<VecDeque<RampError>>>,
    status_failures: Arc<Mutex<VecDeque<RampError>>>,
    status_requests: Arc<Mutex<u64>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `create` call fail with `err`.
    pub fn fail_next_create(&self, err: RampError) {
        lock(&self.create_failures).push_back(err);
    }

    /// Makes the next `fetch_status` call fail with `err`.
    pub fn fail_next_status(&self, err: RampError) {
        lock(&self.status_failures).push_back(err);
    }

    pub async fn set_status(&self, id: &TransactionId, status: TransactionStatus) {
        if let Some(record) = self.records.write().await.get_mut(id) {
            record.status = status;
        }
    }

    pub async fn get(&self, id: &TransactionId) -> Option<TransactionRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub fn status_requests(&self) -> u64 {
        *lock(&self.status_requests)
    }
}

#[async_trait]
impl TransactionBackend for InMemoryBackend {
    async fn create(&self, record: &TransactionRecord) -> Result<BackendReceipt> {
        if let Some(err) = lock(&self.create_failures).pop_front() {
            return Err(err);
        }

        let id = {
            let mut next = lock(&self.next_id);
            *next += 1;
            TransactionId::new(next.to_string())
        };
        let mut stored = record.clone();
        stored.id = Some(id.clone());
        stored.status = TransactionStatus::Pending;
        self.records.write().await.insert(id.clone(), stored);

        Ok(BackendReceipt {
            id,
            status: TransactionStatus::Pending,
            tx_hash: record.tx_hash.clone(),
        })
    }

    async fn fetch_status(
        &self,
        direction: Direction,
        id: &TransactionId,
    ) -> Result<BackendReceipt> {
        *lock(&self.status_requests) += 1;
        if let Some(err) = lock(&self.status_failures).pop_front() {
            return Err(err);
        }

        let records = self.records.read().await;
        match records.get(id) {
            Some(record) if record.direction == direction => Ok(BackendReceipt {
                id: id.clone(),
                status: record.status,
                tx_hash: record.tx_hash.clone(),
            }),
            _ => Err(RampError::Backend {
                status: 404,
                message: format!("Transaction {id} not found"),
            }),
        }
    }

    async fn history(&self, direction: Direction, address: &str) -> Result<Vec<HistoryEntry>> {
        let records = self.records.read().await;
        let mut entries: Vec<HistoryEntry> = records
            .values()
            .filter(|record| record.direction == direction)
            .filter(|record| {
                record.sender_address.as_deref() == Some(address)
                    || record.recipient_address == address
            })
            .filter_map(|record| {
                Some(HistoryEntry {
                    id: record.id.clone()?,
                    amount: Some(record.token_amount),
                    token: Some(record.token.to_string()),
                    fiat_amount: Some(record.fiat_amount),
                    fiat_currency: Some(record.fiat_currency.clone()),
                    status: Some(record.status.to_string()),
                    tx_hash: record.tx_hash.clone(),
                    created_at: Some(record.created_at.to_rfc3339()),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }
}

/// Rate feed answering from fixed tables, optionally after a per-code delay.
///
/// Values missing from the tables are asked from the fallback feed if one is
/// set, which lets the CLI override single values of a live feed.
#[derive(Default, Clone)]
pub struct StaticRateFeed {
    fallback: Option<RateFeedRef>,
    rates: Arc<Mutex<HashMap<String, Decimal>>>,
    usd_prices: Arc<Mutex<HashMap<String, Decimal>>>,
    gas_prices: Arc<Mutex<HashMap<ChainId, u128>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    fiat_requests: Arc<Mutex<Vec<String>>>,
    price_requests: Arc<Mutex<Vec<String>>>,
}

impl StaticRateFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: RateFeedRef) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_rate(self, api_code: &str, rate: Decimal) -> Self {
        lock(&self.rates).insert(api_code.to_string(), rate);
        self
    }

    pub fn with_usd_price(self, asset_id: &str, price: Decimal) -> Self {
        lock(&self.usd_prices).insert(asset_id.to_string(), price);
        self
    }

    pub fn with_gas_price(self, chain_id: ChainId, wei: u128) -> Self {
        lock(&self.gas_prices).insert(chain_id, wei);
        self
    }

    /// Delays answers for `api_code` by `delay`.
    pub fn with_delay(self, api_code: &str, delay: Duration) -> Self {
        lock(&self.delays).insert(api_code.to_string(), delay);
        self
    }

    pub fn remove_rate(&self, api_code: &str) {
        lock(&self.rates).remove(api_code);
    }

    pub fn fiat_requests(&self) -> Vec<String> {
        lock(&self.fiat_requests).clone()
    }

    pub fn price_requests(&self) -> Vec<String> {
        lock(&self.price_requests).clone()
    }
}

#[async_trait]
impl RateFeed for StaticRateFeed {
    async fn fiat_per_usd(&self, api_code: &str) -> Result<Decimal> {
        lock(&self.fiat_requests).push(api_code.to_string());
        let delay = lock(&self.delays).get(api_code).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let rate = lock(&self.rates).get(api_code).copied();
        match (rate, &self.fallback) {
            (Some(rate), _) => Ok(rate),
            (None, Some(fallback)) => fallback.fiat_per_usd(api_code).await,
            (None, None) => Err(RampError::Network(format!("no rate for {api_code}"))),
        }
    }

    async fn usd_price(&self, asset_id: &str) -> Result<Decimal> {
        lock(&self.price_requests).push(asset_id.to_string());
        let price = lock(&self.usd_prices).get(asset_id).copied();
        match (price, &self.fallback) {
            (Some(price), _) => Ok(price),
            (None, Some(fallback)) => fallback.usd_price(asset_id).await,
            (None, None) => Err(RampError::Network(format!("no price for {asset_id}"))),
        }
    }

    async fn gas_price_wei(&self, chain_id: ChainId) -> Result<u128> {
        let wei = lock(&self.gas_prices).get(&chain_id).copied();
        match (wei, &self.fallback) {
            (Some(wei), _) => Ok(wei),
            (None, Some(fallback)) => fallback.gas_price_wei(chain_id).await,
            (None, None) => Err(RampError::Network(format!(
                "no gas price for chain {chain_id}"
            ))),
        }
    }
}

/// A transfer the scripted wallet was asked to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferRequest {
    Native { to: String, amount_wei: u128 },
    Token { token_address: String, to: String, amount: u128 },
}

/// Wallet that answers every request with a preset outcome.
#[derive(Clone)]
pub struct ScriptedWallet {
    outcome: Arc<Mutex<std::result::Result<String, WalletError>>>,
    requests: Arc<Mutex<Vec<TransferRequest>>>,
}

impl ScriptedWallet {
    /// Signs everything, returning `tx_hash`.
    pub fn approving(tx_hash: &str) -> Self {
        Self::with_outcome(Ok(tx_hash.to_string()))
    }

    pub fn failing(err: WalletError) -> Self {
        Self::with_outcome(Err(err))
    }

    fn with_outcome(outcome: std::result::Result<String, WalletError>) -> Self {
        Self {
            outcome: Arc::new(Mutex::new(outcome)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<TransferRequest> {
        lock(&self.requests).clone()
    }

    fn answer(&self, request: TransferRequest) -> std::result::Result<String, WalletError> {
        lock(&self.requests).push(request);
        lock(&self.outcome).clone()
    }
}

#[async_trait]
impl WalletProvider for ScriptedWallet {
    async fn send_native_transfer(
        &self,
        to: &str,
        amount_wei: u128,
    ) -> std::result::Result<String, WalletError> {
        self.answer(TransferRequest::Native {
            to: to.to_string(),
            amount_wei,
        })
    }

    async fn send_token_transfer(
        &self,
        token_address: &str,
        to: &str,
        amount: u128,
    ) -> std::result::Result<String, WalletError> {
        self.answer(TransferRequest::Token {
            token_address: token_address.to_string(),
            to: to.to_string(),
            amount,
        })
    }
}
