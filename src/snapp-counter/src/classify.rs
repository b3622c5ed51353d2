//! Classification of wallet and node failures by message content
//!
//! Wallets and nodes report failures as free text, so the classifier walks an
//! ordered list of `(substring, kind)` rules and returns the first match.

use crate::error::{ErrorKind, TxError};

/// Maps a message substring to an error kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    pub needle: String,
    pub kind: ErrorKind,
}

impl ClassificationRule {
    pub fn new(needle: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            needle: needle.into(),
            kind,
        }
    }

    fn matches(&self, message_lowercase: &str) -> bool {
        message_lowercase.contains(&self.needle.to_lowercase())
    }
}

/// Ordered rule list; the first matching rule wins
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<ClassificationRule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            rules: vec![
                ClassificationRule::new("User rejected", ErrorKind::UserRejected),
                ClassificationRule::new("USER_REFUSED_OP", ErrorKind::UserRejected),
                ClassificationRule::new("Cannot access account", ErrorKind::WalletDisconnected),
                ClassificationRule::new("Contract not found", ErrorKind::NotDeployed),
                ClassificationRule::new("NOT_FOUND", ErrorKind::NotDeployed),
                ClassificationRule::new("insufficient balance", ErrorKind::InsufficientBalance),
                ClassificationRule::new("exceeds balance", ErrorKind::InsufficientBalance),
                ClassificationRule::new(
                    "Counter cannot be less than 0",
                    ErrorKind::ContractRejected,
                ),
            ],
        }
    }
}

impl ErrorClassifier {
    /// A classifier with no rules; everything is unclassified
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Appends a rule after the existing ones
    pub fn with_rule(mut self, needle: impl Into<String>, kind: ErrorKind) -> Self {
        self.rules.push(ClassificationRule::new(needle, kind));
        self
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Classifies `message`; `contract` names the contract for `NotDeployed`
    pub fn classify(&self, message: &str, contract: &str) -> TxError {
        let lowercase = message.to_lowercase();
        let Some(rule) = self.rules.iter().find(|rule| rule.matches(&lowercase)) else {
            return TxError::Unclassified(message.to_string());
        };

        match rule.kind {
            ErrorKind::NotDeployed => TxError::NotDeployed(contract.to_string()),
            ErrorKind::WalletDisconnected => TxError::WalletDisconnected,
            ErrorKind::WalletConnecting => TxError::WalletConnecting,
            ErrorKind::UserRejected => TxError::UserRejected,
            ErrorKind::InsufficientBalance => TxError::InsufficientBalance { required: None },
            ErrorKind::ContractRejected => TxError::ContractRejected {
                reason: rule.needle.clone(),
                raw: message.to_string(),
            },
            ErrorKind::CounterAtZero => TxError::CounterAtZero,
            ErrorKind::NotOwner => TxError::NotOwner,
            // These kinds carry data a message cannot supply.
            ErrorKind::WrongNetwork | ErrorKind::InvalidArguments | ErrorKind::Unclassified => {
                TxError::Unclassified(message.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_rejected() {
        let classifier = ErrorClassifier::default();
        assert_eq!(
            classifier.classify("User rejected request", "CounterContract"),
            TxError::UserRejected
        );
        assert_eq!(
            classifier.classify("Execute failed: USER_REFUSED_OP", "CounterContract"),
            TxError::UserRejected
        );
    }

    #[test]
    fn test_case_insensitive_match() {
        let classifier = ErrorClassifier::default();
        assert_eq!(
            classifier.classify("Account has Insufficient Balance for fee", "Strk"),
            TxError::InsufficientBalance { required: None }
        );
    }

    #[test]
    fn test_contract_rejected_passes_reason() {
        let classifier = ErrorClassifier::default();
        let raw = "Transaction execution has failed: 0x436f756e746572 ('Counter cannot be less than 0')";
        let err = classifier.classify(raw, "CounterContract");
        assert_eq!(
            err,
            TxError::ContractRejected {
                reason: "Counter cannot be less than 0".to_string(),
                raw: raw.to_string(),
            }
        );
        assert_eq!(
            err.user_message("decrease counter"),
            "Transaction reverted: Counter cannot be less than 0"
        );
    }

    #[test]
    fn test_not_found_maps_to_not_deployed() {
        let classifier = ErrorClassifier::default();
        assert_eq!(
            classifier.classify("RPC error: CONTRACT_NOT_FOUND", "CounterContract"),
            TxError::NotDeployed("CounterContract".to_string())
        );
    }

    #[test]
    fn test_first_rule_wins() {
        let classifier = ErrorClassifier::default();
        assert_eq!(
            classifier.classify("User rejected: insufficient balance", "Strk"),
            TxError::UserRejected
        );
    }

    #[test]
    fn test_unclassified_keeps_raw_message() {
        let classifier = ErrorClassifier::default();
        assert_eq!(
            classifier.classify("socket hang up", "CounterContract"),
            TxError::Unclassified("socket hang up".to_string())
        );
    }

    #[test]
    fn test_custom_rule_appended() {
        let classifier = ErrorClassifier::empty().with_rule("nonce too old", ErrorKind::UserRejected);
        assert_eq!(classifier.rules().len(), 1);
        assert_eq!(
            classifier.classify("Nonce too old", "CounterContract"),
            TxError::UserRejected
        );
    }
}
