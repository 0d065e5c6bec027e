use crate::domain::chain::ChainTokenRegistry;
use crate::domain::corridor::{PayoutCorridorRegistry, normalize_number};
use crate::domain::money::{Amount, is_valid_email, to_minor_units};
use crate::domain::ports::{TransactionBackendRef, WalletProviderRef};
use crate::domain::transaction::{Direction, TransactionDraft, TransactionRecord, TransactionStatus};
use crate::error::{Field, RampError, Result};
use std::sync::Arc;
use tracing::{info, warn};

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Validates drafts, performs the off-ramp transfer and persists the record
/// with the backend.
pub struct TransactionSubmitter {
    backend: TransactionBackendRef,
    wallet: Option<WalletProviderRef>,
    tokens: Arc<ChainTokenRegistry>,
    corridors: Arc<PayoutCorridorRegistry>,
    treasury_address: String,
}

impl TransactionSubmitter {
    /// # Arguments
    ///
    /// * `backend` - The transaction service records are posted to.
    /// * `treasury_address` - Where off-ramp transfers are sent.
    pub fn new(
        backend: TransactionBackendRef,
        tokens: Arc<ChainTokenRegistry>,
        corridors: Arc<PayoutCorridorRegistry>,
        treasury_address: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            wallet: None,
            tokens,
            corridors,
            treasury_address: treasury_address.into(),
        }
    }

    pub fn with_wallet(mut self, wallet: WalletProviderRef) -> Self {
        self.wallet = Some(wallet);
        self
    }

    /// Local checks; never touches the network.
    pub fn validate(&self, draft: &TransactionDraft) -> Result<()> {
        let token_amount = Amount::new(draft.token_amount)?;
        Amount::new(draft.fiat_amount)?;

        let token = self
            .tokens
            .descriptor(draft.chain_id, draft.token)
            .ok_or(RampError::UnsupportedTokenOnChain {
                token: draft.token,
                chain_id: draft.chain_id,
            })?;

        let corridor = self
            .corridors
            .get(&draft.corridor)
            .ok_or(RampError::Validation(Field::Corridor))?;
        if corridor.method(&draft.payout_method).is_none() {
            return Err(RampError::Validation(Field::PayoutMethod));
        }
        if !self
            .corridors
            .validate_number(&draft.corridor, &draft.mobile_number)
        {
            return Err(RampError::Validation(Field::MobileNumber));
        }
        if !is_valid_email(&draft.email) {
            return Err(RampError::Validation(Field::Email));
        }

        match draft.direction {
            Direction::OffRamp => {
                if !present(&draft.sender_address) {
                    return Err(RampError::Validation(Field::SenderAddress));
                }
                if self.treasury_address.trim().is_empty() {
                    return Err(RampError::Validation(Field::RecipientAddress));
                }
                to_minor_units(token_amount, token.decimals)?;
            }
            Direction::OnRamp => {
                if !present(&draft.recipient_address) {
                    return Err(RampError::Validation(Field::RecipientAddress));
                }
                if !present(&draft.image_url) {
                    return Err(RampError::Validation(Field::ProofOfPayment));
                }
            }
        }
        Ok(())
    }

    /// Submits a draft and returns the record with its backend id.
    ///
    /// Off-ramps first transfer the tokens to the treasury and attach the
    /// transfer hash; on-ramps only post the record, the backend pays out
    /// once it reconciles the mobile-money deposit.
    pub async fn submit(&self, draft: TransactionDraft) -> Result<TransactionRecord> {
        self.validate(&draft)?;

        let recipient = match draft.direction {
            Direction::OffRamp => self.treasury_address.clone(),
            Direction::OnRamp => draft.recipient_address.clone().unwrap_or_default(),
        };
        let mut record = TransactionRecord::from_draft(draft, recipient);
        record.mobile_number = normalize_number(&record.mobile_number);
        record.email = record.email.trim().to_string();

        if record.direction == Direction::OffRamp {
            let tx_hash = self.transfer(&record).await?;
            record.tx_hash = Some(tx_hash);
        }

        let receipt = self.backend.create(&record).await.map_err(|err| {
            warn!(direction = %record.direction, error = %err, "Backend rejected transaction");
            err
        })?;

        record.id = Some(receipt.id.clone());
        record.apply_status(TransactionStatus::Pending);
        record.apply_status(receipt.status);
        if record.tx_hash.is_none() {
            record.tx_hash = receipt.tx_hash;
        }

        info!(
            id = %receipt.id,
            direction = %record.direction,
            token = %record.token,
            amount = %record.token_amount,
            "Transaction accepted"
        );
        Ok(record)
    }

    async fn transfer(&self, record: &TransactionRecord) -> Result<String> {
        let wallet = self
            .wallet
            .as_ref()
            .ok_or_else(|| RampError::Wallet("no wallet connected".to_string()))?;
        let amount = to_minor_units(
            Amount::new(record.token_amount)?,
            self.tokens.decimals_for(record.token),
        )?;

        let result = if record.token.is_native() {
            wallet
                .send_native_transfer(&record.recipient_address, amount)
                .await
        } else {
            let token_address = self
                .tokens
                .token_address(record.chain_id, record.token)
                .ok_or(RampError::UnsupportedTokenOnChain {
                    token: record.token,
                    chain_id: record.chain_id,
                })?;
            wallet
                .send_token_transfer(token_address, &record.recipient_address, amount)
                .await
        };

        match result {
            Ok(tx_hash) => {
                info!(%tx_hash, token = %record.token, "Transfer signed");
                Ok(tx_hash)
            }
            Err(err) => {
                warn!(error = %err, token = %record.token, "Transfer not completed");
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::{BASE, FLARE, TokenSymbol};
    use crate::error::WalletError;
    use crate::infrastructure::in_memory::{InMemoryBackend, ScriptedWallet, TransferRequest};
    use rust_decimal_macros::dec;

    const TREASURY: &str = "0xDD463C81cb2fA0e95b55c5d7696d8a9755cb1Af2";

    fn off_ramp_draft() -> TransactionDraft {
        TransactionDraft {
            direction: Direction::OffRamp,
            chain_id: BASE,
            token: TokenSymbol::Usdc,
            token_amount: dec!(5),
            fiat_amount: dec!(18487.70),
            corridor: "UGX".into(),
            payout_method: "mtn".into(),
            mobile_number: "0772 123 456".into(),
            email: "amina@example.com".into(),
            sender_address: Some("0xsender".into()),
            recipient_address: None,
            image_url: None,
        }
    }

    fn on_ramp_draft() -> TransactionDraft {
        TransactionDraft {
            direction: Direction::OnRamp,
            recipient_address: Some("0xsender".into()),
            sender_address: None,
            image_url: Some("https://img.example/proof.png".into()),
            ..off_ramp_draft()
        }
    }

    fn submitter(
        backend: &InMemoryBackend,
        wallet: Option<ScriptedWallet>,
    ) -> TransactionSubmitter {
        let submitter = TransactionSubmitter::new(
            Arc::new(backend.clone()),
            Arc::new(ChainTokenRegistry::builtin()),
            Arc::new(PayoutCorridorRegistry::builtin()),
            TREASURY,
        );
        match wallet {
            Some(wallet) => submitter.with_wallet(Arc::new(wallet)),
            None => submitter,
        }
    }

    #[tokio::test]
    async fn test_off_ramp_token_transfer_then_post() {
        let backend = InMemoryBackend::new();
        let wallet = ScriptedWallet::approving("0xfeed");
        let submitter = submitter(&backend, Some(wallet.clone()));

        let record = submitter.submit(off_ramp_draft()).await.unwrap();

        assert_eq!(record.id.as_ref().unwrap().as_str(), "1");
        assert_eq!(record.status, TransactionStatus::Pending);
        assert_eq!(record.tx_hash.as_deref(), Some("0xfeed"));
        assert_eq!(record.mobile_number, "0772123456");
        assert_eq!(record.recipient_address, TREASURY);
        assert_eq!(
            wallet.requests(),
            [TransferRequest::Token {
                token_address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".into(),
                to: TREASURY.into(),
                amount: 5_000_000,
            }]
        );
        let stored = backend.get(record.id.as_ref().unwrap()).await.unwrap();
        assert_eq!(stored.tx_hash.as_deref(), Some("0xfeed"));
    }

    #[tokio::test]
    async fn test_off_ramp_native_transfer_in_wei() {
        let backend = InMemoryBackend::new();
        let wallet = ScriptedWallet::approving("0xnative");
        let submitter = submitter(&backend, Some(wallet.clone()));

        let draft = TransactionDraft {
            chain_id: FLARE,
            token: TokenSymbol::Flr,
            token_amount: dec!(1.5),
            ..off_ramp_draft()
        };
        submitter.submit(draft).await.unwrap();

        assert_eq!(
            wallet.requests(),
            [TransferRequest::Native {
                to: TREASURY.into(),
                amount_wei: 1_500_000_000_000_000_000,
            }]
        );
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_call() {
        let backend = InMemoryBackend::new();
        let wallet = ScriptedWallet::approving("0xfeed");
        let submitter = submitter(&backend, Some(wallet.clone()));

        let cases = [
            (TransactionDraft { token_amount: dec!(0), ..off_ramp_draft() }, "amount"),
            (TransactionDraft { mobile_number: "0612345678".into(), ..off_ramp_draft() }, "number"),
            (TransactionDraft { email: "amina".into(), ..off_ramp_draft() }, "email"),
            (TransactionDraft { payout_method: "mpesa".into(), ..off_ramp_draft() }, "method"),
            (TransactionDraft { sender_address: None, ..off_ramp_draft() }, "sender"),
            (TransactionDraft { token: TokenSymbol::Oft, ..off_ramp_draft() }, "token"),
        ];
        for (draft, label) in cases {
            let err = submitter.submit(draft).await.unwrap_err();
            assert!(err.is_validation(), "{label}: {err}");
        }

        assert!(wallet.requests().is_empty());
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_on_ramp_requires_proof_and_skips_wallet() {
        let backend = InMemoryBackend::new();
        let submitter = submitter(&backend, None);

        let missing = TransactionDraft {
            image_url: None,
            ..on_ramp_draft()
        };
        assert!(matches!(
            submitter.submit(missing).await,
            Err(RampError::Validation(Field::ProofOfPayment))
        ));

        let record = submitter.submit(on_ramp_draft()).await.unwrap();
        assert!(record.tx_hash.is_none());
        assert_eq!(record.recipient_address, "0xsender");
        assert_eq!(record.image_url.as_deref(), Some("https://img.example/proof.png"));
    }

    #[tokio::test]
    async fn test_wallet_rejection_never_reaches_backend() {
        let backend = InMemoryBackend::new();
        let rejecting = submitter(&backend, Some(ScriptedWallet::failing(WalletError::Rejected)));

        let err = rejecting.submit(off_ramp_draft()).await.unwrap_err();
        assert!(matches!(err, RampError::WalletRejection));
        assert!(backend.is_empty().await);

        let broke = submitter(
            &backend,
            Some(ScriptedWallet::failing(WalletError::InsufficientFunds)),
        );
        assert!(matches!(
            broke.submit(off_ramp_draft()).await,
            Err(RampError::InsufficientFunds)
        ));
    }

    #[tokio::test]
    async fn test_backend_errors_are_surfaced() {
        let backend = InMemoryBackend::new();
        backend.fail_next_create(RampError::Backend {
            status: 422,
            message: "Invalid mobile network".into(),
        });
        let submitter = submitter(&backend, None);

        let err = submitter.submit(on_ramp_draft()).await.unwrap_err();
        assert!(matches!(err, RampError::Backend { status: 422, .. }));
        assert_eq!(err.user_message(), "Invalid mobile network");
    }
}
