use crate::domain::chain::{ChainId, TokenSymbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Fiat in, token out.
    OnRamp,
    /// Token in, fiat out.
    OffRamp,
}

impl Direction {
    /// Path segment of the backend resource for this direction.
    pub fn resource(&self) -> &'static str {
        match self {
            Direction::OnRamp => "onramp",
            Direction::OffRamp => "offramp",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}

/// Server-assigned transaction id. The backend emits either JSON strings or
/// numbers; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct TransactionId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl From<RawId> for TransactionId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => Self(text),
            RawId::Number(number) => Self(number.to_string()),
        }
    }
}

impl From<TransactionId> for String {
    fn from(id: TransactionId) -> Self {
        id.0
    }
}

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a persisted transaction.
///
/// Moves forward only: `Created -> Pending -> Confirmed | Failed`.
/// `Confirmed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum TransactionStatus {
    Created,
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    fn rank(&self) -> u8 {
        match self {
            TransactionStatus::Created => 0,
            TransactionStatus::Pending => 1,
            TransactionStatus::Confirmed | TransactionStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Confirmed | TransactionStatus::Failed)
    }

    pub fn can_advance_to(&self, next: TransactionStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// Moves to `next` if that is a forward transition. Returns whether the
    /// status changed.
    pub fn advance(&mut self, next: TransactionStatus) -> bool {
        if self.can_advance_to(next) {
            *self = next;
            true
        } else {
            false
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Created => "created",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "new" => Ok(TransactionStatus::Created),
            "pending" | "processing" => Ok(TransactionStatus::Pending),
            "confirmed" | "completed" | "success" => Ok(TransactionStatus::Confirmed),
            "failed" | "rejected" | "cancelled" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Everything the user filled in for one ramp, before it is submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDraft {
    pub direction: Direction,
    pub chain_id: ChainId,
    pub token: TokenSymbol,
    pub token_amount: Decimal,
    pub fiat_amount: Decimal,
    pub corridor: String,
    pub payout_method: String,
    pub mobile_number: String,
    pub email: String,
    /// Connected wallet; the payer of an off-ramp.
    pub sender_address: Option<String>,
    /// Wallet that receives tokens of an on-ramp. Off-ramps pay the
    /// configured treasury instead.
    pub recipient_address: Option<String>,
    /// Proof-of-payment image, required for on-ramps.
    pub image_url: Option<String>,
}

/// In-memory counterpart of a backend transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    /// `None` until the backend accepts the record.
    pub id: Option<TransactionId>,
    pub direction: Direction,
    pub token: TokenSymbol,
    pub token_amount: Decimal,
    pub fiat_amount: Decimal,
    pub fiat_currency: String,
    pub chain_id: ChainId,
    pub payout_method: String,
    pub mobile_number: String,
    pub email: String,
    pub sender_address: Option<String>,
    pub recipient_address: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub tx_hash: Option<String>,
    pub image_url: Option<String>,
}

impl TransactionRecord {
    pub fn from_draft(draft: TransactionDraft, recipient_address: String) -> Self {
        Self {
            id: None,
            direction: draft.direction,
            token: draft.token,
            token_amount: draft.token_amount,
            fiat_amount: draft.fiat_amount,
            fiat_currency: draft.corridor,
            chain_id: draft.chain_id,
            payout_method: draft.payout_method,
            mobile_number: draft.mobile_number,
            email: draft.email,
            sender_address: draft.sender_address,
            recipient_address,
            status: TransactionStatus::Created,
            created_at: Utc::now(),
            tx_hash: None,
            image_url: draft.image_url,
        }
    }

    /// Applies a status reported by the backend, ignoring regressions.
    pub fn apply_status(&mut self, status: TransactionStatus) -> bool {
        self.status.advance(status)
    }
}

/// Backend acknowledgement of a create or status request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendReceipt {
    pub id: TransactionId,
    pub status: TransactionStatus,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

/// Row of a wallet's transaction history as listed by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryEntry {
    pub id: TransactionId,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default, alias = "payout_network")]
    pub token: Option<String>,
    #[serde(default)]
    pub fiat_amount: Option<Decimal>,
    #[serde(default)]
    pub fiat_currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}
