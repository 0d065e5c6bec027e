use crate::domain::chain::{ChainId, TokenSymbol};
use crate::domain::transaction::TransactionId;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RampError>;

/// User input checked locally before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Token,
    Amount,
    MobileNumber,
    Email,
    PayoutMethod,
    Corridor,
    ProofOfPayment,
    SenderAddress,
    RecipientAddress,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Token => "token",
            Field::Amount => "amount",
            Field::MobileNumber => "mobile number",
            Field::Email => "email",
            Field::PayoutMethod => "payout method",
            Field::Corridor => "fiat currency",
            Field::ProofOfPayment => "proof of payment",
            Field::SenderAddress => "sender address",
            Field::RecipientAddress => "recipient address",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum RampError {
    #[error("Invalid {0}")]
    Validation(Field),
    #[error("Token {token} is not supported on chain {chain_id}")]
    UnsupportedTokenOnChain { token: TokenSymbol, chain_id: ChainId },
    #[error("Transfer rejected in wallet")]
    WalletRejection,
    #[error("Insufficient funds")]
    InsufficientFunds,
    #[error("Wallet error: {0}")]
    Wallet(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },
    #[error("Exchange rate for {0} not available")]
    RateUnavailable(String),
    #[error("A transaction is already in progress")]
    FlowBusy,
    #[error("Transaction {0} is already being polled")]
    AlreadyPolling(TransactionId),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RampError {
    /// Errors that are resolved client-side and never reach the network.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RampError::Validation(_) | RampError::UnsupportedTokenOnChain { .. }
        )
    }

    /// Short message suitable for showing to the person using the flow.
    pub fn user_message(&self) -> String {
        match self {
            RampError::WalletRejection => "You canceled the transaction.".to_string(),
            RampError::InsufficientFunds => {
                "Insufficient funds. Please top up your wallet.".to_string()
            }
            RampError::Validation(field) => format!("Please enter a valid {field}."),
            RampError::UnsupportedTokenOnChain { token, .. } => {
                format!("{token} is not available on this network.")
            }
            RampError::RateUnavailable(corridor) => {
                format!("Exchange rate for {corridor} is not available right now.")
            }
            RampError::Backend { message, .. } => message.clone(),
            RampError::FlowBusy => "A transaction is already in progress.".to_string(),
            _ => "Transaction failed. Please try again.".to_string(),
        }
    }
}

/// Failure reported by a wallet provider when asked to sign a transfer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("user rejected the request")]
    Rejected,
    #[error("insufficient funds for transfer")]
    InsufficientFunds,
    #[error("{0}")]
    Other(String),
}

impl WalletError {
    /// Classifies a raw provider message.
    pub fn from_message(message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("user rejected") || lowered.contains("user denied") {
            WalletError::Rejected
        } else if lowered.contains("insufficient funds") {
            WalletError::InsufficientFunds
        } else {
            WalletError::Other(message.to_string())
        }
    }
}

impl From<WalletError> for RampError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Rejected => RampError::WalletRejection,
            WalletError::InsufficientFunds => RampError::InsufficientFunds,
            WalletError::Other(message) => RampError::Wallet(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_message_classification() {
        assert_eq!(
            WalletError::from_message("MetaMask Tx Signature: User rejected the request."),
            WalletError::Rejected
        );
        assert_eq!(
            WalletError::from_message("insufficient funds for gas * price + value"),
            WalletError::InsufficientFunds
        );
        assert!(matches!(
            WalletError::from_message("nonce too low"),
            WalletError::Other(_)
        ));
    }

    #[test]
    fn test_user_messages_distinguish_cancel_and_funds() {
        let cancelled = RampError::from(WalletError::Rejected).user_message();
        let broke = RampError::from(WalletError::InsufficientFunds).user_message();
        let generic = RampError::Network("timeout".into()).user_message();

        assert_eq!(cancelled, "You canceled the transaction.");
        assert_eq!(broke, "Insufficient funds. Please top up your wallet.");
        assert_eq!(generic, "Transaction failed. Please try again.");
    }

    #[test]
    fn test_validation_grouping() {
        assert!(RampError::Validation(Field::Email).is_validation());
        assert!(
            RampError::UnsupportedTokenOnChain {
                token: TokenSymbol::Oft,
                chain_id: ChainId(1),
            }
            .is_validation()
        );
        assert!(!RampError::WalletRejection.is_validation());
    }
}
