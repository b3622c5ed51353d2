//! Pre-submission checks: deployment, then wallet connection, then network
//!
//! Pure and synchronous. Callers run it before building anything and the
//! submitter runs it again right before broadcasting.

use tracing::debug;

use crate::error::TxError;
use crate::network::ChainId;
use crate::provider::{WalletState, WalletStatus};
use crate::registry::DeployedContractInfo;

/// `Ok` when an operation may proceed
pub type GuardResult = Result<(), TxError>;

/// Checks that `contract` is deployed and the wallet is connected to `target`
///
/// A wallet reporting `Connected` without a chain id is treated as
/// disconnected.
pub fn check(
    contract: &str,
    deployment: Option<&DeployedContractInfo>,
    wallet: &WalletState,
    target: ChainId,
) -> GuardResult {
    let refusal = evaluate(contract, deployment, wallet, target);
    if let Err(err) = &refusal {
        debug!(contract, kind = %err.kind(), "guard refused operation");
    }
    refusal
}

fn evaluate(
    contract: &str,
    deployment: Option<&DeployedContractInfo>,
    wallet: &WalletState,
    target: ChainId,
) -> GuardResult {
    if deployment.is_none() {
        return Err(TxError::NotDeployed(contract.to_string()));
    }

    let actual = match (wallet.status, wallet.chain_id) {
        (WalletStatus::Connecting, _) => return Err(TxError::WalletConnecting),
        (WalletStatus::Disconnected, _) | (WalletStatus::Connected, None) => {
            return Err(TxError::WalletDisconnected);
        }
        (WalletStatus::Connected, Some(chain_id)) => chain_id,
    };

    if actual != target {
        return Err(TxError::WrongNetwork {
            expected: target,
            actual,
        });
    }
    Ok(())
}
