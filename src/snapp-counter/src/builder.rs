//! Single-call construction: one entrypoint invocation, encoded but not sent

use starknet_core::{
    types::{Call, Felt, FunctionCall},
    utils::get_selector_from_name,
};
use tracing::debug;

use crate::calldata::{ScalarOrAddress, encode_calldata};
use crate::error::TxError;
use crate::network::ChainAddress;
use crate::registry::DeployedContractInfo;

/// One on-chain invocation with its arguments already encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor {
    /// Logical contract name the call was built for
    pub contract: String,
    pub target: ChainAddress,
    pub entrypoint: String,
    pub selector: Felt,
    pub args: Vec<ScalarOrAddress>,
    pub calldata: Vec<Felt>,
}

impl From<&CallDescriptor> for Call {
    fn from(call: &CallDescriptor) -> Self {
        Call {
            to: call.target,
            selector: call.selector,
            calldata: call.calldata.clone(),
        }
    }
}

impl From<&CallDescriptor> for FunctionCall {
    fn from(call: &CallDescriptor) -> Self {
        FunctionCall {
            contract_address: call.target,
            entry_point_selector: call.selector,
            calldata: call.calldata.clone(),
        }
    }
}

impl DeployedContractInfo {
    /// Encodes a call to `entrypoint` against this contract's ABI
    pub fn populate(
        &self,
        entrypoint: &str,
        args: Vec<ScalarOrAddress>,
    ) -> Result<CallDescriptor, TxError> {
        let function = self
            .abi
            .function(entrypoint)
            .map_err(|e| TxError::invalid_arguments(entrypoint, e.to_string()))?;
        let calldata = encode_calldata(function, &args)
            .map_err(|e| TxError::invalid_arguments(entrypoint, e.to_string()))?;
        let selector = get_selector_from_name(entrypoint)
            .map_err(|e| TxError::invalid_arguments(entrypoint, e.to_string()))?;

        Ok(CallDescriptor {
            contract: self.name.clone(),
            target: self.address,
            entrypoint: entrypoint.to_string(),
            selector,
            args,
            calldata,
        })
    }
}

/// Builds one call to `entrypoint` on `contract`
///
/// An absent deployment fails with [`TxError::NotDeployed`]; arguments that do
/// not fit the entrypoint's declared inputs fail with
/// [`TxError::InvalidArguments`].
pub fn build_call(
    contract: &str,
    deployment: Option<&DeployedContractInfo>,
    entrypoint: &str,
    args: Vec<ScalarOrAddress>,
) -> Result<CallDescriptor, TxError> {
    let deployment = deployment.ok_or_else(|| TxError::NotDeployed(contract.to_string()))?;
    let call = deployment.populate(entrypoint, args)?;

    debug!(
        contract,
        entrypoint,
        address = %call.target.to_fixed_hex_string(),
        args = ?call.args,
        "prepared contract call"
    );
    Ok(call)
}
