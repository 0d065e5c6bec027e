use crate::domain::ports::WalletProvider;
use crate::error::WalletError;
use async_trait::async_trait;
use tracing::info;

/// Wallet for transfers signed outside this process, e.g. from a hardware
/// wallet. Every request is answered with the hash of that transfer.
pub struct PresignedTransferWallet {
    tx_hash: String,
}

impl PresignedTransferWallet {
    pub fn new(tx_hash: &str) -> Result<Self, WalletError> {
        let valid = tx_hash
            .strip_prefix("0x")
            .is_some_and(|hex| hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()));
        if !valid {
            return Err(WalletError::Other(format!("not a transaction hash: {tx_hash}")));
        }
        Ok(Self {
            tx_hash: tx_hash.to_string(),
        })
    }
}

#[async_trait]
impl WalletProvider for PresignedTransferWallet {
    async fn send_native_transfer(
        &self,
        to: &str,
        amount_wei: u128,
    ) -> Result<String, WalletError> {
        info!(to, amount_wei, tx_hash = %self.tx_hash, "Using pre-signed native transfer");
        Ok(self.tx_hash.clone())
    }

    async fn send_token_transfer(
        &self,
        token_address: &str,
        to: &str,
        amount: u128,
    ) -> Result<String, WalletError> {
        info!(
            token_address,
            to,
            amount,
            tx_hash = %self.tx_hash,
            "Using pre-signed token transfer"
        );
        Ok(self.tx_hash.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";

    #[tokio::test]
    async fn test_presigned_hash_is_returned() {
        let wallet = PresignedTransferWallet::new(HASH).unwrap();
        assert_eq!(wallet.send_token_transfer("0xtoken", "0xto", 5).await.unwrap(), HASH);
        assert_eq!(wallet.send_native_transfer("0xto", 1).await.unwrap(), HASH);
    }

    #[test]
    fn test_rejects_malformed_hash() {
        assert!(PresignedTransferWallet::new("0x1234").is_err());
        assert!(PresignedTransferWallet::new(&HASH[2..]).is_err());
    }
}
