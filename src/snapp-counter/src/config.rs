use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::abi::Abi;
use crate::amount::STRK_TOKEN_ADDRESS;
use crate::context::SessionContext;
use crate::embedded_abis::{STRK, load_embedded_abi};
use crate::network::{TargetNetwork, parse_felt};
use crate::registry::StaticContractRegistry;

/// Session file: target network plus deployed contracts by logical name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub network: TargetNetwork,
    #[serde(default)]
    pub contracts: BTreeMap<String, ContractConfig>,
}

/// One deployed contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Hex or decimal felt
    pub address: String,
    /// ABI JSON file, relative to the config file; embedded ABI when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<PathBuf>,
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    /// Local devnet with the STRK token; the counter still has to be added
    pub fn devnet() -> Self {
        let mut contracts = BTreeMap::new();
        contracts.insert(
            STRK.to_string(),
            ContractConfig {
                address: STRK_TOKEN_ADDRESS.to_string(),
                abi: None,
            },
        );
        Self {
            network: TargetNetwork::devnet(),
            contracts,
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Adds or replaces a contract entry
    pub fn with_contract(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.contracts.insert(
            name.into(),
            ContractConfig {
                address: address.into(),
                abi: None,
            },
        );
        self
    }

    /// Builds the registry, reading ABI paths relative to `base_dir`
    pub fn build_registry(&self, base_dir: &Path) -> Result<StaticContractRegistry> {
        let mut registry = StaticContractRegistry::new();
        for (name, contract) in &self.contracts {
            let address = parse_felt(&contract.address)
                .map_err(|e| anyhow!(e))
                .with_context(|| format!("Invalid address for contract `{name}`"))?;
            let abi = load_abi(name, contract.abi.as_deref(), base_dir)?;
            debug!(contract = %name, address = %address.to_fixed_hex_string(), "registered contract");
            registry.register(name.clone(), address, Arc::new(abi));
        }
        Ok(registry)
    }

    /// Builds the session context, reading ABI paths relative to `base_dir`
    pub fn build_context(&self, base_dir: &Path) -> Result<SessionContext> {
        let registry = self.build_registry(base_dir)?;
        Ok(SessionContext::new(Arc::new(registry), self.network.clone()))
    }
}

/// Loads a config file and builds its session context in one step
pub fn load_session(path: impl AsRef<Path>) -> Result<SessionContext> {
    let path = path.as_ref();
    let config = SessionConfig::from_file(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    config.build_context(base_dir)
}

fn load_abi(name: &str, abi_path: Option<&Path>, base_dir: &Path) -> Result<Abi> {
    let Some(abi_path) = abi_path else {
        return load_embedded_abi(name)
            .ok_or_else(|| anyhow!("Contract `{name}` has no ABI file and no embedded ABI"))?
            .with_context(|| format!("Embedded ABI for `{name}` is invalid"));
    };

    let full_path = base_dir.join(abi_path);
    let json = std::fs::read_to_string(&full_path)
        .with_context(|| format!("Failed to read ABI file: {}", full_path.display()))?;
    Abi::from_json(&json).with_context(|| format!("Failed to parse ABI file: {}", full_path.display()))
}
