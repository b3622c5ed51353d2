//! Felt encoding of call arguments and decoding of outputs and events
//!
//! Encoding covers the scalar types a counter call can take. Decoding also
//! walks structs, enums and arrays declared in the ABI and produces JSON;
//! enums come out in the nested variant shape
//! `{"variant": {"Active": <payload>, "Other": null}}`.

use std::fmt;

use alloy_primitives::U256;
use serde_json::{Map, Value, json};
use starknet_core::{types::Felt, utils::get_selector_from_name};

use crate::abi::{Abi, AbiFunction, AbiParam, EventFieldKind};
use crate::network::ChainAddress;

/// Starknet field prime, `2^251 + 17 * 2^192 + 1`
const FIELD_PRIME: U256 = U256::from_limbs([1, 0, 0, 0x0800_0000_0000_0011]);

/// One call argument before encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarOrAddress {
    Felt(Felt),
    Address(ChainAddress),
    Uint(U256),
    Bool(bool),
}

impl From<Felt> for ScalarOrAddress {
    fn from(value: Felt) -> Self {
        Self::Felt(value)
    }
}

impl From<U256> for ScalarOrAddress {
    fn from(value: U256) -> Self {
        Self::Uint(value)
    }
}

impl From<u64> for ScalarOrAddress {
    fn from(value: u64) -> Self {
        Self::Uint(U256::from(value))
    }
}

impl From<u128> for ScalarOrAddress {
    fn from(value: u128) -> Self {
        Self::Uint(U256::from(value))
    }
}

impl From<bool> for ScalarOrAddress {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Display for ScalarOrAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Felt(felt) => write!(f, "{}", felt.to_hex_string()),
            Self::Address(address) => write!(f, "{}", address.to_fixed_hex_string()),
            Self::Uint(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalldataError {
    #[error("Expected {expected} arguments, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    #[error("Argument `{name}` of type `{ty}` cannot take {value}")]
    TypeMismatch {
        name: String,
        ty: String,
        value: String,
    },

    #[error("Value {value} is out of range for `{ty}`")]
    OutOfRange { ty: String, value: String },

    #[error("Unsupported type `{0}`")]
    UnsupportedType(String),

    #[error("Ran out of felts while decoding `{0}`")]
    UnexpectedEnd(String),

    #[error("Invalid encoding for `{ty}`: {value}")]
    InvalidValue { ty: String, value: String },

    #[error("{0} unread felts after decoding")]
    TrailingData(usize),

    #[error("Event `{0}` not found in ABI")]
    EventNotFound(String),

    #[error("Event selector mismatch: expected {expected}, got {actual}")]
    SelectorMismatch { expected: String, actual: String },

    #[error("Invalid entrypoint or event name `{0}`")]
    InvalidName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    Felt,
    Address,
    Uint(usize),
    U256,
    Bool,
}

fn scalar_type(ty: &str) -> Option<ScalarType> {
    let scalar = match ty {
        "core::felt252" | "felt252" => ScalarType::Felt,
        "core::starknet::contract_address::ContractAddress"
        | "core::starknet::class_hash::ClassHash"
        | "core::starknet::eth_address::EthAddress" => ScalarType::Address,
        "core::integer::u8" => ScalarType::Uint(8),
        "core::integer::u16" => ScalarType::Uint(16),
        "core::integer::u32" => ScalarType::Uint(32),
        "core::integer::u64" => ScalarType::Uint(64),
        "core::integer::u128" => ScalarType::Uint(128),
        "core::integer::u256" => ScalarType::U256,
        "core::bool" => ScalarType::Bool,
        _ => return None,
    };
    Some(scalar)
}

pub fn felt_to_u256(felt: &Felt) -> U256 {
    U256::from_be_bytes(felt.to_bytes_be())
}

/// Converts a value below the field prime into a felt
pub fn u256_to_felt(value: U256) -> Option<Felt> {
    (value < FIELD_PRIME).then(|| Felt::from_bytes_be(&value.to_be_bytes::<32>()))
}

/// Splits a u256 into its `(low, high)` 128-bit halves
pub fn split_u256(value: U256) -> (Felt, Felt) {
    let limbs = value.as_limbs();
    let low = (limbs[1] as u128) << 64 | limbs[0] as u128;
    let high = (limbs[3] as u128) << 64 | limbs[2] as u128;
    (Felt::from(low), Felt::from(high))
}

/// Encodes `args` against the declared inputs of `function`
pub fn encode_calldata(
    function: &AbiFunction,
    args: &[ScalarOrAddress],
) -> Result<Vec<Felt>, CalldataError> {
    if function.inputs.len() != args.len() {
        return Err(CalldataError::ArgumentCount {
            expected: function.inputs.len(),
            actual: args.len(),
        });
    }

    let mut calldata = Vec::with_capacity(args.len());
    for (param, arg) in function.inputs.iter().zip(args) {
        encode_arg(param, *arg, &mut calldata)?;
    }
    Ok(calldata)
}

fn encode_arg(
    param: &AbiParam,
    arg: ScalarOrAddress,
    out: &mut Vec<Felt>,
) -> Result<(), CalldataError> {
    let ty = param.ty.as_str();
    let scalar = scalar_type(ty).ok_or_else(|| CalldataError::UnsupportedType(ty.to_string()))?;
    let mismatch = || CalldataError::TypeMismatch {
        name: param.name.clone(),
        ty: ty.to_string(),
        value: arg.to_string(),
    };
    let out_of_range = |value: U256| CalldataError::OutOfRange {
        ty: ty.to_string(),
        value: value.to_string(),
    };

    match (scalar, arg) {
        (ScalarType::Felt | ScalarType::Address, ScalarOrAddress::Felt(felt))
        | (ScalarType::Felt | ScalarType::Address, ScalarOrAddress::Address(felt)) => {
            out.push(felt);
        }
        (ScalarType::Felt | ScalarType::Address, ScalarOrAddress::Uint(value)) => {
            out.push(u256_to_felt(value).ok_or_else(|| out_of_range(value))?);
        }
        (ScalarType::Felt | ScalarType::Address | ScalarType::Bool, ScalarOrAddress::Bool(value)) => {
            out.push(Felt::from(u8::from(value)));
        }
        (ScalarType::Uint(bits), ScalarOrAddress::Uint(value)) => {
            if value.bit_len() > bits {
                return Err(out_of_range(value));
            }
            out.push(u256_to_felt(value).ok_or_else(|| out_of_range(value))?);
        }
        (ScalarType::Uint(bits), ScalarOrAddress::Felt(felt)) => {
            let value = felt_to_u256(&felt);
            if value.bit_len() > bits {
                return Err(out_of_range(value));
            }
            out.push(felt);
        }
        (ScalarType::U256, ScalarOrAddress::Uint(value)) => {
            let (low, high) = split_u256(value);
            out.extend([low, high]);
        }
        (ScalarType::U256, ScalarOrAddress::Felt(felt)) => {
            let (low, high) = split_u256(felt_to_u256(&felt));
            out.extend([low, high]);
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

/// Sequential reader over a felt slice
struct FeltReader<'a> {
    felts: &'a [Felt],
    position: usize,
}

impl<'a> FeltReader<'a> {
    fn new(felts: &'a [Felt]) -> Self {
        Self { felts, position: 0 }
    }

    fn next(&mut self, ty: &str) -> Result<&'a Felt, CalldataError> {
        let felt = self
            .felts
            .get(self.position)
            .ok_or_else(|| CalldataError::UnexpectedEnd(ty.to_string()))?;
        self.position += 1;
        Ok(felt)
    }

    fn remaining(&self) -> usize {
        self.felts.len() - self.position
    }

    fn finish(&self) -> Result<(), CalldataError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CalldataError::TrailingData(n)),
        }
    }
}

fn array_element_type(ty: &str) -> Option<&str> {
    ["core::array::Array::<", "core::array::Span::<"]
        .into_iter()
        .find_map(|prefix| ty.strip_prefix(prefix))
        .and_then(|rest| rest.strip_suffix('>'))
}

fn decode_uint(felt: &Felt, ty: &str, bits: usize) -> Result<U256, CalldataError> {
    let value = felt_to_u256(felt);
    if value.bit_len() > bits {
        return Err(CalldataError::OutOfRange {
            ty: ty.to_string(),
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn decode_value(abi: &Abi, ty: &str, reader: &mut FeltReader<'_>) -> Result<Value, CalldataError> {
    if ty == "()" {
        return Ok(json!({}));
    }

    if let Some(scalar) = scalar_type(ty) {
        return match scalar {
            ScalarType::Felt => Ok(json!(reader.next(ty)?.to_hex_string())),
            ScalarType::Address => Ok(json!(reader.next(ty)?.to_fixed_hex_string())),
            ScalarType::Uint(bits) if bits <= 64 => {
                let value = decode_uint(reader.next(ty)?, ty, bits)?;
                Ok(json!(value.as_limbs()[0]))
            }
            ScalarType::Uint(bits) => Ok(json!(decode_uint(reader.next(ty)?, ty, bits)?.to_string())),
            ScalarType::U256 => {
                let low = decode_uint(reader.next(ty)?, ty, 128)?;
                let high = decode_uint(reader.next(ty)?, ty, 128)?;
                Ok(json!(((high << 128usize) | low).to_string()))
            }
            ScalarType::Bool => {
                let felt = reader.next(ty)?;
                if *felt == Felt::ZERO {
                    Ok(json!(false))
                } else if *felt == Felt::ONE {
                    Ok(json!(true))
                } else {
                    Err(CalldataError::InvalidValue {
                        ty: ty.to_string(),
                        value: felt.to_hex_string(),
                    })
                }
            }
        };
    }

    if let Some(element) = array_element_type(ty) {
        let length = decode_uint(reader.next(ty)?, ty, 32)?.as_limbs()[0] as usize;
        // every element takes at least one felt
        if length > reader.remaining() {
            return Err(CalldataError::UnexpectedEnd(ty.to_string()));
        }
        let items = (0..length)
            .map(|_| decode_value(abi, element, reader))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Value::Array(items));
    }

    if let Some(def) = abi.struct_def(ty) {
        let mut object = Map::new();
        for member in &def.members {
            object.insert(member.name.clone(), decode_value(abi, &member.ty, reader)?);
        }
        return Ok(Value::Object(object));
    }

    if let Some(def) = abi.enum_def(ty) {
        let felt = reader.next(ty)?;
        let index = felt_to_u256(felt);
        if index >= U256::from(def.variants.len()) {
            return Err(CalldataError::InvalidValue {
                ty: ty.to_string(),
                value: felt.to_hex_string(),
            });
        }
        let active = index.as_limbs()[0] as usize;

        let mut variants = Map::new();
        for (i, variant) in def.variants.iter().enumerate() {
            let payload = if i == active {
                decode_value(abi, &variant.ty, reader)?
            } else {
                Value::Null
            };
            variants.insert(variant.name.clone(), payload);
        }
        return Ok(json!({ "variant": variants }));
    }

    Err(CalldataError::UnsupportedType(ty.to_string()))
}

/// Decodes the return values of a call to `function`
pub fn decode_outputs(
    abi: &Abi,
    function: &AbiFunction,
    felts: &[Felt],
) -> Result<Vec<Value>, CalldataError> {
    let mut reader = FeltReader::new(felts);
    let values = function
        .outputs
        .iter()
        .map(|output| decode_value(abi, &output.ty, &mut reader))
        .collect::<Result<Vec<_>, _>>()?;
    reader.finish()?;
    Ok(values)
}

/// Decodes a single value of type `ty` that must consume all of `felts`
pub fn decode_single(abi: &Abi, ty: &str, felts: &[Felt]) -> Result<Value, CalldataError> {
    let mut reader = FeltReader::new(felts);
    let value = decode_value(abi, ty, &mut reader)?;
    reader.finish()?;
    Ok(value)
}

/// Decodes a struct event emitted by a contract with this ABI
///
/// `keys[0]` is the event selector, `#[key]` members follow it in `keys`, the
/// remaining members are read from `data`.
pub fn decode_event(
    abi: &Abi,
    name: &str,
    keys: &[Felt],
    data: &[Felt],
) -> Result<Value, CalldataError> {
    let event = abi
        .event(name)
        .map_err(|_| CalldataError::EventNotFound(name.to_string()))?;
    let expected = get_selector_from_name(event.simple_name())
        .map_err(|_| CalldataError::InvalidName(event.simple_name().to_string()))?;

    let (selector, key_members) = keys
        .split_first()
        .ok_or_else(|| CalldataError::UnexpectedEnd(event.name.clone()))?;
    if *selector != expected {
        return Err(CalldataError::SelectorMismatch {
            expected: expected.to_hex_string(),
            actual: selector.to_hex_string(),
        });
    }

    let mut keys = FeltReader::new(key_members);
    let mut data = FeltReader::new(data);
    let mut object = Map::new();
    for member in &event.members {
        let reader = match member.kind {
            EventFieldKind::Key => &mut keys,
            EventFieldKind::Data | EventFieldKind::Nested | EventFieldKind::Flat => &mut data,
        };
        object.insert(member.name.clone(), decode_value(abi, &member.ty, reader)?);
    }
    keys.finish()?;
    data.finish()?;
    Ok(Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedded_abis::{COUNTER_CONTRACT_ABI, STRK_ABI};
    use crate::reason::{ReasonVariant, decode_reason};
    use pretty_assertions::assert_eq;

    fn counter_abi() -> Abi {
        Abi::from_json(COUNTER_CONTRACT_ABI).unwrap()
    }

    fn strk_abi() -> Abi {
        Abi::from_json(STRK_ABI).unwrap()
    }

    #[test]
    fn test_encode_u256_splits_low_high() {
        let abi = strk_abi();
        let approve = abi.function("approve").unwrap();
        let spender = Felt::from(0x1234u32);
        let amount = U256::from(1u8) << 130 | U256::from(5u8);

        let calldata = encode_calldata(
            approve,
            &[ScalarOrAddress::Address(spender), ScalarOrAddress::Uint(amount)],
        )
        .unwrap();
        assert_eq!(calldata, vec![spender, Felt::from(5u8), Felt::from(4u8)]);
    }

    #[test]
    fn test_encode_u32_range() {
        let abi = counter_abi();
        let set_counter = abi.function("set_counter").unwrap();

        assert_eq!(
            encode_calldata(set_counter, &[42u64.into()]).unwrap(),
            vec![Felt::from(42u8)]
        );
        assert!(matches!(
            encode_calldata(set_counter, &[(u32::MAX as u64 + 1).into()]),
            Err(CalldataError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_encode_argument_count_and_type() {
        let abi = counter_abi();
        let set_counter = abi.function("set_counter").unwrap();
        assert_eq!(
            encode_calldata(set_counter, &[]),
            Err(CalldataError::ArgumentCount {
                expected: 1,
                actual: 0
            })
        );
        assert!(matches!(
            encode_calldata(set_counter, &[true.into()]),
            Err(CalldataError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_encode_felt_rejects_values_above_prime() {
        let abi = strk_abi();
        let balance_of = abi.function("balance_of").unwrap();
        assert!(matches!(
            encode_calldata(balance_of, &[ScalarOrAddress::Uint(U256::MAX)]),
            Err(CalldataError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_decode_u256_output() {
        let abi = strk_abi();
        let balance_of = abi.function("balance_of").unwrap();
        let (low, high) = split_u256(U256::from(3u8) << 128usize | U256::from(9u8));
        let values = decode_outputs(&abi, balance_of, &[low, high]).unwrap();
        let expected = (U256::from(3u8) << 128usize | U256::from(9u8)).to_string();
        assert_eq!(values, vec![json!(expected)]);
    }

    #[test]
    fn test_decode_outputs_rejects_trailing_felts() {
        let abi = counter_abi();
        let get_counter = abi.function("get_counter").unwrap();
        assert_eq!(
            decode_outputs(&abi, get_counter, &[Felt::from(7u8), Felt::ONE]),
            Err(CalldataError::TrailingData(1))
        );
        assert_eq!(
            decode_outputs(&abi, get_counter, &[Felt::from(7u8)]).unwrap(),
            vec![json!(7)]
        );
    }

    #[test]
    fn test_decode_array() {
        let abi = Abi::default();
        let value = decode_single(
            &abi,
            "core::array::Span::<core::integer::u8>",
            &[Felt::from(2u8), Felt::from(4u8), Felt::from(5u8)],
        )
        .unwrap();
        assert_eq!(value, json!([4, 5]));

        assert!(matches!(
            decode_single(&abi, "core::array::Array::<core::felt252>", &[Felt::from(3u8)]),
            Err(CalldataError::UnexpectedEnd(_))
        ));
    }

    #[test]
    fn test_decode_counter_changed_event() {
        let abi = counter_abi();
        let selector = get_selector_from_name("CounterChanged").unwrap();
        let caller = Felt::from(0xabcu32);

        let value = decode_event(
            &abi,
            "CounterChanged",
            &[selector, caller],
            &[Felt::from(7u8), Felt::from(6u8), Felt::ONE],
        )
        .unwrap();

        assert_eq!(value["caller"], json!(caller.to_fixed_hex_string()));
        assert_eq!(value["old_value"], json!(7));
        assert_eq!(value["new_value"], json!(6));
        assert_eq!(
            value["reason"],
            json!({"variant": {"Increase": null, "Decrease": {}, "Reset": null, "Set": null}})
        );
        assert_eq!(decode_reason(&value["reason"]), ReasonVariant::Decrease);
    }

    #[test]
    fn test_decode_event_checks_selector() {
        let abi = counter_abi();
        let wrong = get_selector_from_name("Transfer").unwrap();
        assert!(matches!(
            decode_event(&abi, "CounterChanged", &[wrong, Felt::ONE], &[]),
            Err(CalldataError::SelectorMismatch { .. })
        ));
        assert!(matches!(
            decode_event(&abi, "Missing", &[wrong], &[]),
            Err(CalldataError::EventNotFound(_))
        ));
    }

    #[test]
    fn test_decode_enum_index_out_of_range() {
        let abi = counter_abi();
        assert!(matches!(
            decode_single(&abi, "contracts::counter::ChangeReason", &[Felt::from(9u8)]),
            Err(CalldataError::InvalidValue { .. })
        ));
    }
}
