//! Multi-call bundling
//!
//! Calls are named by logical contract and resolved right before bundling.
//! One unresolved contract fails the whole bundle; nothing partial is ever
//! produced. Atomicity of the submitted bundle is the chain's multicall
//! semantics.

use starknet_core::types::Call;

use crate::builder::{CallDescriptor, build_call};
use crate::calldata::ScalarOrAddress;
use crate::error::TxError;
use crate::registry::ContractRegistry;

/// An unresolved call: logical contract, entrypoint, arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub contract: String,
    pub entrypoint: String,
    pub args: Vec<ScalarOrAddress>,
}

impl CallRequest {
    pub fn new(
        contract: impl Into<String>,
        entrypoint: impl Into<String>,
        args: Vec<ScalarOrAddress>,
    ) -> Self {
        Self {
            contract: contract.into(),
            entrypoint: entrypoint.into(),
            args,
        }
    }
}

/// Ordered, non-empty list of calls submitted as one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionBundle {
    calls: Vec<CallDescriptor>,
}

impl TransactionBundle {
    /// Fails with [`TxError::InvalidArguments`] when `calls` is empty
    pub fn new(calls: Vec<CallDescriptor>) -> Result<Self, TxError> {
        if calls.is_empty() {
            return Err(TxError::invalid_arguments(
                "multicall",
                "a transaction needs at least one call",
            ));
        }
        Ok(Self { calls })
    }

    pub fn single(call: CallDescriptor) -> Self {
        Self { calls: vec![call] }
    }

    pub fn calls(&self) -> &[CallDescriptor] {
        &self.calls
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Never true for a constructed bundle
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// The calls in the form an account's `execute` takes
    pub fn to_starknet_calls(&self) -> Vec<Call> {
        self.calls.iter().map(Call::from).collect()
    }
}

/// Resolves every request against `registry` and bundles them in order
pub fn bundle_calls(
    registry: &dyn ContractRegistry,
    requests: &[CallRequest],
) -> Result<TransactionBundle, TxError> {
    let calls = requests
        .iter()
        .map(|request| {
            let deployment = registry.resolve(&request.contract);
            build_call(
                &request.contract,
                deployment.as_ref(),
                &request.entrypoint,
                request.args.clone(),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;
    TransactionBundle::new(calls)
}
