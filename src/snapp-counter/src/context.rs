use std::fmt;
use std::sync::Arc;

use crate::bundle::{CallRequest, TransactionBundle, bundle_calls};
use crate::builder::{CallDescriptor, build_call};
use crate::calldata::ScalarOrAddress;
use crate::error::TxError;
use crate::guard::{self, GuardResult};
use crate::network::TargetNetwork;
use crate::provider::WalletState;
use crate::registry::{ContractRegistry, DeployedContractInfo};

/// Target network and contract registry for one session
///
/// Built once and passed explicitly to every operation that needs to know
/// where contracts live.
#[derive(Clone)]
pub struct SessionContext {
    registry: Arc<dyn ContractRegistry>,
    target: TargetNetwork,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("target", &self.target)
            .field("contracts", &self.registry.contract_names())
            .finish()
    }
}

impl SessionContext {
    pub fn new(registry: Arc<dyn ContractRegistry>, target: TargetNetwork) -> Self {
        Self { registry, target }
    }

    pub fn target(&self) -> &TargetNetwork {
        &self.target
    }

    pub fn registry(&self) -> &dyn ContractRegistry {
        self.registry.as_ref()
    }

    pub fn resolve(&self, contract: &str) -> Option<DeployedContractInfo> {
        self.registry.resolve(contract)
    }

    /// Runs the guard for `contract` against the current wallet state
    pub fn guard(&self, contract: &str, wallet: &WalletState) -> GuardResult {
        let deployment = self.resolve(contract);
        guard::check(contract, deployment.as_ref(), wallet, self.target.chain_id)
    }

    pub fn build_call(
        &self,
        contract: &str,
        entrypoint: &str,
        args: Vec<ScalarOrAddress>,
    ) -> Result<CallDescriptor, TxError> {
        let deployment = self.resolve(contract);
        build_call(contract, deployment.as_ref(), entrypoint, args)
    }

    pub fn bundle(&self, requests: &[CallRequest]) -> Result<TransactionBundle, TxError> {
        bundle_calls(self.registry.as_ref(), requests)
    }
}
