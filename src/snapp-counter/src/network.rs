use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use starknet_core::{
    types::Felt,
    utils::{cairo_short_string_to_felt, parse_cairo_short_string},
};

/// Address of an account or contract on Starknet
pub type ChainAddress = Felt;

/// Hash identifying a submitted transaction
pub type TransactionId = Felt;

/// Starknet chain id, e.g. `SN_SEPOLIA` encoded as a felt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(Felt);

impl ChainId {
    pub const fn from_felt(felt: Felt) -> Self {
        Self(felt)
    }

    /// `SN_MAIN`
    pub fn mainnet() -> Self {
        Self(Felt::from_hex_unchecked("0x534e5f4d41494e"))
    }

    /// `SN_SEPOLIA`, also reported by starknet-devnet
    pub fn sepolia() -> Self {
        Self(Felt::from_hex_unchecked("0x534e5f5345504f4c4941"))
    }
}

impl FromStr for ChainId {
    type Err = String;

    /// Accepts a 0x-prefixed felt or a Cairo short string
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x") {
            return Felt::from_hex(hex)
                .map(Self)
                .map_err(|e| format!("Invalid chain id `{s}`: {e}"));
        }
        cairo_short_string_to_felt(s)
            .map(Self)
            .map_err(|e| format!("Invalid chain id `{s}`: {e}"))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match parse_cairo_short_string(&self.0) {
            Ok(name) if !name.is_empty() && name.chars().all(|c| c.is_ascii_graphic()) => {
                write!(f, "{name}")
            }
            _ => write!(f, "{}", self.0.to_hex_string()),
        }
    }
}

impl Serialize for ChainId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The single network the session targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetNetwork {
    pub name: String,
    pub chain_id: ChainId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

impl TargetNetwork {
    /// Local starknet-devnet
    pub fn devnet() -> Self {
        Self {
            name: "devnet".to_string(),
            chain_id: ChainId::sepolia(),
            rpc_url: Some("http://127.0.0.1:5050".to_string()),
        }
    }
}

/// Parses a 0x-prefixed hex felt or a decimal felt
pub fn parse_felt(input: &str) -> Result<Felt, String> {
    let input = input.trim();
    let parsed = if let Some(hex) = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Felt::from_hex(hex)
    } else {
        Felt::from_dec_str(input)
    };
    parsed.map_err(|e| format!("Invalid felt `{input}`: {e}"))
}

/// Shortens an address for display, e.g. `0x0471...938d`
pub fn short_address(address: &ChainAddress) -> String {
    let full = address.to_fixed_hex_string();
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_from_short_string() {
        let id: ChainId = "SN_SEPOLIA".parse().unwrap();
        assert_eq!(id, ChainId::sepolia());
        assert_eq!(id.to_string(), "SN_SEPOLIA");
    }

    #[test]
    fn test_chain_id_from_hex() {
        let id: ChainId = "0x534e5f4d41494e".parse().unwrap();
        assert_eq!(id, ChainId::mainnet());
        assert_eq!(id.to_string(), "SN_MAIN");
    }

    #[test]
    fn test_chain_id_display_falls_back_to_hex() {
        let id = ChainId::from_felt(Felt::from(1u8));
        assert_eq!(id.to_string(), "0x1");
    }

    #[test]
    fn test_parse_felt() {
        assert_eq!(parse_felt("0x10").unwrap(), Felt::from(16u8));
        assert_eq!(parse_felt("42").unwrap(), Felt::from(42u8));
        assert!(parse_felt("zz").is_err());
    }

    #[test]
    fn test_short_address() {
        let address = parse_felt(crate::amount::STRK_TOKEN_ADDRESS).unwrap();
        assert_eq!(short_address(&address), "0x0471...938d");
    }
}
