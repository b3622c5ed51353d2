use std::fmt;

use alloy_primitives::U256;

use crate::amount::{STRK_DECIMALS, format_strk};
use crate::network::ChainId;

/// Failure of a counter operation, surfaced to the caller as a value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxError {
    #[error("Contract `{0}` is not deployed on the target network")]
    NotDeployed(String),

    #[error("Wallet is not connected")]
    WalletDisconnected,

    #[error("Wallet is still connecting")]
    WalletConnecting,

    #[error("Wrong network. Expected: {expected}, Current: {actual}")]
    WrongNetwork { expected: ChainId, actual: ChainId },

    #[error("Invalid arguments for `{entrypoint}`: {reason}")]
    InvalidArguments { entrypoint: String, reason: String },

    #[error("Transaction was rejected by the user")]
    UserRejected,

    #[error("Insufficient balance")]
    InsufficientBalance {
        /// Set when the refusal comes from a client-side balance check
        required: Option<U256>,
    },

    #[error("Transaction reverted: {reason}")]
    ContractRejected {
        /// The known revert phrase that matched
        reason: String,
        /// Underlying message as reported by the wallet or node
        raw: String,
    },

    #[error("Counter cannot be decreased below 0")]
    CounterAtZero,

    #[error("Only the contract owner can set the counter")]
    NotOwner,

    #[error("{0}")]
    Unclassified(String),
}

/// Fieldless discriminant of [`TxError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotDeployed,
    WalletDisconnected,
    WalletConnecting,
    WrongNetwork,
    InvalidArguments,
    UserRejected,
    InsufficientBalance,
    ContractRejected,
    CounterAtZero,
    NotOwner,
    Unclassified,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotDeployed => "not_deployed",
            Self::WalletDisconnected => "wallet_disconnected",
            Self::WalletConnecting => "wallet_connecting",
            Self::WrongNetwork => "wrong_network",
            Self::InvalidArguments => "invalid_arguments",
            Self::UserRejected => "user_rejected",
            Self::InsufficientBalance => "insufficient_balance",
            Self::ContractRejected => "contract_rejected",
            Self::CounterAtZero => "counter_at_zero",
            Self::NotOwner => "not_owner",
            Self::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotDeployed(_) => ErrorKind::NotDeployed,
            Self::WalletDisconnected => ErrorKind::WalletDisconnected,
            Self::WalletConnecting => ErrorKind::WalletConnecting,
            Self::WrongNetwork { .. } => ErrorKind::WrongNetwork,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            Self::UserRejected => ErrorKind::UserRejected,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::ContractRejected { .. } => ErrorKind::ContractRejected,
            Self::CounterAtZero => ErrorKind::CounterAtZero,
            Self::NotOwner => ErrorKind::NotOwner,
            Self::Unclassified(_) => ErrorKind::Unclassified,
        }
    }

    /// Transient failures the caller may retry once the wallet settles
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WalletConnecting)
    }

    pub(crate) fn invalid_arguments(entrypoint: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            entrypoint: entrypoint.to_string(),
            reason: reason.into(),
        }
    }

    /// Human-readable message for a failed `action` (e.g. "decrease counter")
    ///
    /// Only [`TxError::Unclassified`] carries the underlying message.
    pub fn user_message(&self, action: &str) -> String {
        match self {
            Self::NotDeployed(_) => {
                "Contract not deployed. Please deploy the contract first.".to_string()
            }
            Self::WalletDisconnected => {
                "Wallet connection issue. Please connect your wallet first.".to_string()
            }
            Self::WalletConnecting => "Wallet is still connecting, please wait...".to_string(),
            Self::WrongNetwork { expected, actual } => {
                format!("You are on the wrong network. Expected: {expected}, Current: {actual}")
            }
            Self::InvalidArguments { .. } => format!("Failed to {action}: invalid input."),
            Self::UserRejected => "Transaction was rejected by user.".to_string(),
            Self::InsufficientBalance {
                required: Some(required),
            } => format!(
                "Insufficient STRK balance. You need at least {} STRK.",
                format_strk(*required, required_decimals(*required))
            ),
            Self::InsufficientBalance { required: None } => {
                "Insufficient balance to pay for transaction fees.".to_string()
            }
            Self::ContractRejected { reason, .. } => format!("Transaction reverted: {reason}"),
            Self::CounterAtZero => "Counter cannot be decreased below 0".to_string(),
            Self::NotOwner => "Only the contract owner can set the counter".to_string(),
            Self::Unclassified(raw) => format!("Failed to {action}: {raw}"),
        }
    }
}

/// Fewest decimals that show `amount` without loss
fn required_decimals(amount: U256) -> usize {
    let mut decimals = STRK_DECIMALS as usize;
    let mut scale = U256::from(1u8);
    while decimals > 0 && (amount / scale) % U256::from(10u8) == U256::ZERO {
        decimals -= 1;
        scale *= U256::from(10u8);
    }
    decimals
}
