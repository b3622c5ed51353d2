//! Serde model of the Cairo 1 JSON ABI
//!
//! Only the parts needed to encode call arguments and decode outputs and
//! events are modeled. Entries of unknown type are kept as [`AbiEntry::Other`]
//! so a newer compiler's ABI still loads.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    #[error("Invalid ABI JSON: {0}")]
    InvalidJson(String),

    #[error("Function `{0}` not found in ABI")]
    FunctionNotFound(String),

    #[error("Event `{0}` not found in ABI")]
    EventNotFound(String),
}

/// A contract ABI: the ordered list of its entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Abi(pub Vec<AbiEntry>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbiEntry {
    Function(AbiFunction),
    L1Handler(AbiFunction),
    Constructor(AbiConstructor),
    Interface(AbiInterface),
    Impl(AbiImpl),
    Struct(AbiStruct),
    Enum(AbiEnum),
    Event(AbiEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiFunction {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_mutability: Option<StateMutability>,
}

impl AbiFunction {
    pub fn is_view(&self) -> bool {
        self.state_mutability == Some(StateMutability::View)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateMutability {
    View,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiConstructor {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiInterface {
    pub name: String,
    #[serde(default)]
    pub items: Vec<AbiEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiImpl {
    pub name: String,
    pub interface_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiStruct {
    pub name: String,
    #[serde(default)]
    pub members: Vec<AbiParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiEnum {
    pub name: String,
    #[serde(default)]
    pub variants: Vec<AbiParam>,
}

/// A named, typed slot: function input or output, struct member, enum variant
///
/// Function outputs are unnamed in the JSON and get an empty name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiEvent {
    pub name: String,
    pub kind: EventKind,
    #[serde(default)]
    pub members: Vec<EventMember>,
    #[serde(default)]
    pub variants: Vec<EventMember>,
}

impl AbiEvent {
    /// The last path segment, e.g. `CounterChanged`
    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Struct,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMember {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub kind: EventFieldKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFieldKind {
    Key,
    Data,
    Nested,
    Flat,
}

/// Last `::` separated segment of a Cairo path
pub fn simple_name(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

impl Abi {
    pub fn from_json(json: &str) -> Result<Self, AbiError> {
        serde_json::from_str(json).map_err(|e| AbiError::InvalidJson(e.to_string()))
    }

    pub fn entries(&self) -> &[AbiEntry] {
        &self.0
    }

    /// Every callable function, including those declared inside interfaces
    pub fn functions(&self) -> impl Iterator<Item = &AbiFunction> {
        self.0.iter().flat_map(|entry| {
            let items: Box<dyn Iterator<Item = &AbiEntry>> = match entry {
                AbiEntry::Interface(interface) => Box::new(interface.items.iter()),
                other => Box::new(std::iter::once(other)),
            };
            items.filter_map(|item| match item {
                AbiEntry::Function(function) | AbiEntry::L1Handler(function) => Some(function),
                _ => None,
            })
        })
    }

    pub fn function(&self, name: &str) -> Result<&AbiFunction, AbiError> {
        self.functions()
            .find(|function| function.name == name)
            .ok_or_else(|| AbiError::FunctionNotFound(name.to_string()))
    }

    pub fn struct_def(&self, ty: &str) -> Option<&AbiStruct> {
        self.0.iter().find_map(|entry| match entry {
            AbiEntry::Struct(def) if def.name == ty => Some(def),
            _ => None,
        })
    }

    pub fn enum_def(&self, ty: &str) -> Option<&AbiEnum> {
        self.0.iter().find_map(|entry| match entry {
            AbiEntry::Enum(def) if def.name == ty => Some(def),
            _ => None,
        })
    }

    /// Looks up a struct-kind event by full path or by simple name
    pub fn event(&self, name: &str) -> Result<&AbiEvent, AbiError> {
        self.0
            .iter()
            .find_map(|entry| match entry {
                AbiEntry::Event(event)
                    if event.kind == EventKind::Struct
                        && (event.name == name || event.simple_name() == name) =>
                {
                    Some(event)
                }
                _ => None,
            })
            .ok_or_else(|| AbiError::EventNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedded_abis::{COUNTER_CONTRACT_ABI, STRK_ABI};

    #[test]
    fn test_parse_counter_abi() {
        let abi = Abi::from_json(COUNTER_CONTRACT_ABI).unwrap();

        let get_counter = abi.function("get_counter").unwrap();
        assert!(get_counter.is_view());
        assert_eq!(get_counter.outputs[0].ty, "core::integer::u32");

        let set_counter = abi.function("set_counter").unwrap();
        assert_eq!(set_counter.inputs.len(), 1);
        assert_eq!(set_counter.inputs[0].name, "new_value");
        assert!(!set_counter.is_view());
    }

    #[test]
    fn test_event_lookup_by_simple_name() {
        let abi = Abi::from_json(COUNTER_CONTRACT_ABI).unwrap();
        let event = abi.event("CounterChanged").unwrap();
        assert_eq!(event.simple_name(), "CounterChanged");
        assert_eq!(event.members.len(), 4);
        assert_eq!(event.members[0].kind, EventFieldKind::Key);

        // the contract's `Event` enum is not a struct event
        assert!(matches!(abi.event("Event"), Err(AbiError::EventNotFound(_))));
    }

    #[test]
    fn test_erc20_abi() {
        let abi = Abi::from_json(STRK_ABI).unwrap();
        let approve = abi.function("approve").unwrap();
        assert_eq!(approve.inputs[1].ty, "core::integer::u256");
        assert!(abi.struct_def("core::integer::u256").is_some());
        assert!(matches!(
            abi.function("mint"),
            Err(AbiError::FunctionNotFound(_))
        ));
    }

    #[test]
    fn test_unknown_entries_are_kept() {
        let json = r#"[
            {"type": "function", "name": "ping", "inputs": [], "outputs": [], "state_mutability": "view"},
            {"type": "something_new", "name": "x"}
        ]"#;
        let abi = Abi::from_json(json).unwrap();
        assert_eq!(abi.entries().len(), 2);
        assert_eq!(abi.entries()[1], AbiEntry::Other);
        assert!(abi.function("ping").is_ok());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            Abi::from_json("{not json"),
            Err(AbiError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_simple_name() {
        assert_eq!(simple_name("contracts::counter::CounterChanged"), "CounterChanged");
        assert_eq!(simple_name("Plain"), "Plain");
    }
}
