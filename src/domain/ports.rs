use super::chain::ChainId;
use super::transaction::{BackendReceipt, Direction, HistoryEntry, TransactionId, TransactionRecord};
use crate::error::{Result, WalletError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Backend transaction service; the system of record for submitted ramps.
#[async_trait]
pub trait TransactionBackend: Send + Sync {
    async fn create(&self, record: &TransactionRecord) -> Result<BackendReceipt>;
    async fn fetch_status(
        &self,
        direction: Direction,
        id: &TransactionId,
    ) -> Result<BackendReceipt>;
    async fn history(&self, direction: Direction, address: &str) -> Result<Vec<HistoryEntry>>;
}

/// External price sources. Each call is a single request without retry.
#[async_trait]
pub trait RateFeed: Send + Sync {
    /// Units of `api_code` per US dollar.
    async fn fiat_per_usd(&self, api_code: &str) -> Result<Decimal>;
    /// US dollar spot price of a price-feed asset id such as `ethereum`.
    async fn usd_price(&self, asset_id: &str) -> Result<Decimal>;
    async fn gas_price_wei(&self, chain_id: ChainId) -> Result<u128>;
}

/// Signs and broadcasts transfers on behalf of the connected wallet.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn send_native_transfer(
        &self,
        to: &str,
        amount_wei: u128,
    ) -> std::result::Result<String, WalletError>;

    async fn send_token_transfer(
        &self,
        token_address: &str,
        to: &str,
        amount: u128,
    ) -> std::result::Result<String, WalletError>;
}

/// Image host for on-ramp proof-of-payment screenshots.
#[async_trait]
pub trait ProofUploader: Send + Sync {
    /// Uploads the image and returns its public URL.
    async fn upload(&self, image: Vec<u8>, file_name: &str) -> Result<String>;
}

pub type TransactionBackendRef = Arc<dyn TransactionBackend>;
pub type RateFeedRef = Arc<dyn RateFeed>;
pub type WalletProviderRef = Arc<dyn WalletProvider>;
pub type ProofUploaderRef = Arc<dyn ProofUploader>;
