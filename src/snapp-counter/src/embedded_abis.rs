//! ABIs embedded at compile time for the contracts the counter app knows
//!
//! A session config may point a contract at an ABI file on disk; the two known
//! logical names fall back to these when it does not.

use crate::abi::{Abi, AbiError};

/// Logical name of the counter contract
pub const COUNTER_CONTRACT: &str = "CounterContract";

/// Logical name of the STRK fee token
pub const STRK: &str = "Strk";

pub const COUNTER_CONTRACT_ABI: &str = include_str!("../abis/counter_contract.json");

pub const STRK_ABI: &str = include_str!("../abis/strk.json");

/// Embedded ABI JSON for a logical contract name
pub fn embedded_abi_json(name: &str) -> Option<&'static str> {
    match name {
        COUNTER_CONTRACT => Some(COUNTER_CONTRACT_ABI),
        STRK => Some(STRK_ABI),
        _ => None,
    }
}

/// Parses the embedded ABI for `name`, `None` when nothing is embedded for it
pub fn load_embedded_abi(name: &str) -> Option<Result<Abi, AbiError>> {
    embedded_abi_json(name).map(Abi::from_json)
}
