use std::collections::HashMap;
use std::sync::Arc;

use crate::abi::{Abi, AbiError};
use crate::network::ChainAddress;

/// A contract deployed on the target network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContractInfo {
    /// Logical name, e.g. `CounterContract`
    pub name: String,
    pub address: ChainAddress,
    pub abi: Arc<Abi>,
}

/// Resolves logical contract names to deployments
///
/// `None` means the contract is not deployed on the target network.
pub trait ContractRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<DeployedContractInfo>;

    fn contract_names(&self) -> Vec<String>;
}

/// Registry backed by a fixed table, built once per session
#[derive(Debug, Clone, Default)]
pub struct StaticContractRegistry {
    contracts: HashMap<String, DeployedContractInfo>,
}

impl StaticContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a deployment under `name`
    pub fn register(&mut self, name: impl Into<String>, address: ChainAddress, abi: Arc<Abi>) {
        let name = name.into();
        self.contracts.insert(
            name.clone(),
            DeployedContractInfo {
                name,
                address,
                abi,
            },
        );
    }

    /// Parses `abi_json` and registers the deployment
    pub fn register_json(
        &mut self,
        name: impl Into<String>,
        address: ChainAddress,
        abi_json: &str,
    ) -> Result<(), AbiError> {
        let abi = Abi::from_json(abi_json)?;
        self.register(name, address, Arc::new(abi));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

impl ContractRegistry for StaticContractRegistry {
    fn resolve(&self, name: &str) -> Option<DeployedContractInfo> {
        self.contracts.get(name).cloned()
    }

    fn contract_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contracts.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedded_abis::{COUNTER_CONTRACT, COUNTER_CONTRACT_ABI, STRK, STRK_ABI};
    use starknet_core::types::Felt;

    #[test]
    fn test_resolve_registered_contract() {
        let mut registry = StaticContractRegistry::new();
        registry
            .register_json(COUNTER_CONTRACT, Felt::from(0x42u8), COUNTER_CONTRACT_ABI)
            .unwrap();

        let info = registry.resolve(COUNTER_CONTRACT).unwrap();
        assert_eq!(info.name, COUNTER_CONTRACT);
        assert_eq!(info.address, Felt::from(0x42u8));
        assert!(info.abi.function("increase_counter").is_ok());
    }

    #[test]
    fn test_unknown_contract_is_not_deployed() {
        let registry = StaticContractRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.resolve(COUNTER_CONTRACT).is_none());
    }

    #[test]
    fn test_register_replaces_and_lists_sorted() {
        let mut registry = StaticContractRegistry::new();
        registry.register_json(STRK, Felt::ONE, STRK_ABI).unwrap();
        registry
            .register_json(COUNTER_CONTRACT, Felt::ONE, COUNTER_CONTRACT_ABI)
            .unwrap();
        registry
            .register_json(COUNTER_CONTRACT, Felt::from(2u8), COUNTER_CONTRACT_ABI)
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.contract_names(), vec![COUNTER_CONTRACT, STRK]);
        assert_eq!(registry.resolve(COUNTER_CONTRACT).unwrap().address, Felt::from(2u8));
    }

    #[test]
    fn test_register_invalid_abi() {
        let mut registry = StaticContractRegistry::new();
        assert!(registry.register_json(STRK, Felt::ONE, "[{").is_err());
        assert!(registry.is_empty());
    }
}
