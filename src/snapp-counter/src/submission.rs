use std::sync::Arc;

use tracing::{error, info};

use crate::bundle::TransactionBundle;
use crate::classify::ErrorClassifier;
use crate::context::SessionContext;
use crate::error::TxError;
use crate::network::TransactionId;
use crate::provider::{WalletConnector, WalletError};

/// Transaction hash on success, a classified failure otherwise
pub type TransactionResult = Result<TransactionId, TxError>;

/// Submits bundles through the connected wallet
///
/// Exactly one broadcast per [`submit`](Self::submit) call, never retried.
/// Concurrent submissions are not serialized against each other.
#[derive(Clone)]
pub struct TransactionSubmitter {
    context: Arc<SessionContext>,
    wallet: Arc<dyn WalletConnector>,
    classifier: Arc<ErrorClassifier>,
}

impl TransactionSubmitter {
    pub fn new(context: Arc<SessionContext>, wallet: Arc<dyn WalletConnector>) -> Self {
        Self::with_classifier(context, wallet, ErrorClassifier::default())
    }

    pub fn with_classifier(
        context: Arc<SessionContext>,
        wallet: Arc<dyn WalletConnector>,
        classifier: ErrorClassifier,
    ) -> Self {
        Self {
            context,
            wallet,
            classifier: Arc::new(classifier),
        }
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Re-runs the guard for every call, then broadcasts the bundle once
    pub async fn submit(&self, bundle: &TransactionBundle) -> TransactionResult {
        let wallet_state = self.wallet.state();
        for call in bundle.calls() {
            self.context.guard(&call.contract, &wallet_state)?;
        }

        // the last call carries the intent; earlier ones (approvals) serve it
        let contract = bundle
            .calls()
            .last()
            .map(|call| call.contract.as_str())
            .unwrap_or_default();
        let entrypoints: Vec<&str> = bundle.calls().iter().map(|c| c.entrypoint.as_str()).collect();
        info!(
            chain_id = %self.context.target().chain_id,
            calls = ?entrypoints,
            "broadcasting transaction"
        );

        match self.wallet.sign_and_broadcast(bundle).await {
            Ok(hash) => {
                info!(transaction_hash = %hash.to_hex_string(), "transaction submitted");
                Ok(hash)
            }
            Err(WalletError::NotConnected) => Err(TxError::WalletDisconnected),
            Err(WalletError::Failed(message)) => {
                let err = self.classifier.classify(&message, contract);
                error!(contract, kind = %err.kind(), error = %message, "error calling contract");
                Err(err)
            }
        }
    }
}
