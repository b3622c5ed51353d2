//! Decoding of the `reason` field carried by `CounterChanged` events
//!
//! Depending on which ABI decoding path produced an event, the reason arrives
//! in one of several shapes:
//!
//! 1. a plain string: `"Increase"`
//! 2. a nested variant map: `{"variant": {"Increase": {}, "Decrease": null}}`
//! 3. the variant names as direct keys: `{"Reset": {}}`
//! 4. a discriminant field: `{"type": "Set"}`, `{"kind": ..}`, `{"__kind": ..}`
//!
//! [`ReasonShape::classify`] recognizes the shape and [`decode_reason`] maps it
//! onto [`ReasonVariant`]. Decoding is total: anything else is
//! [`ReasonVariant::Unknown`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Why the counter changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonVariant {
    Increase,
    Decrease,
    Reset,
    Set,
    /// The payload did not match any known shape or variant
    Unknown,
}

/// Canonical variant names, in declaration order
pub const CANONICAL_VARIANTS: [&str; 4] = ["Increase", "Decrease", "Reset", "Set"];

/// Field names some serializers use for the active variant
pub const DISCRIMINANT_FIELDS: [&str; 3] = ["type", "kind", "__kind"];

impl ReasonVariant {
    /// Parses a canonical variant name; anything else is `None`
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Increase" => Some(Self::Increase),
            "Decrease" => Some(Self::Decrease),
            "Reset" => Some(Self::Reset),
            "Set" => Some(Self::Set),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increase => "Increase",
            Self::Decrease => "Decrease",
            Self::Reset => "Reset",
            Self::Set => "Set",
            Self::Unknown => "Unknown",
        }
    }

    /// Label shown next to an event
    pub fn label(&self) -> &'static str {
        match self {
            Self::Increase => "Increased",
            Self::Decrease => "Decreased",
            Self::Reset => "Reset",
            Self::Set => "Set by Owner",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ReasonVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The serialization shape a reason payload arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonShape<'a> {
    /// A canonical variant name as a bare string
    Plain(&'a str),
    /// `{"variant": {..}}` with the first non-null entry active
    NestedVariant(&'a str),
    /// A canonical variant name used directly as a key
    DirectKey(&'a str),
    /// A string under one of [`DISCRIMINANT_FIELDS`]
    Discriminant(&'a str),
    Unrecognized,
}

impl<'a> ReasonShape<'a> {
    /// Tries each shape in order; the first match wins
    pub fn classify(value: &'a Value) -> Self {
        if let Value::String(name) = value {
            return match ReasonVariant::from_name(name) {
                Some(_) => Self::Plain(name),
                None => Self::Unrecognized,
            };
        }

        let Value::Object(object) = value else {
            return Self::Unrecognized;
        };

        if let Some(name) = object
            .get("variant")
            .and_then(Value::as_object)
            .and_then(first_present_key)
        {
            return Self::NestedVariant(name);
        }

        if let Some(name) = CANONICAL_VARIANTS
            .into_iter()
            .find(|name| object.get(*name).is_some_and(|v| !v.is_null()))
        {
            return Self::DirectKey(name);
        }

        DISCRIMINANT_FIELDS
            .into_iter()
            .find_map(|field| object.get(field).and_then(Value::as_str))
            .map_or(Self::Unrecognized, Self::Discriminant)
    }

    /// The variant name this shape carries, if any
    pub fn name(&self) -> Option<&'a str> {
        match self {
            Self::Plain(name)
            | Self::NestedVariant(name)
            | Self::DirectKey(name)
            | Self::Discriminant(name) => Some(name),
            Self::Unrecognized => None,
        }
    }

    pub fn variant(&self) -> ReasonVariant {
        self.name()
            .and_then(ReasonVariant::from_name)
            .unwrap_or(ReasonVariant::Unknown)
    }
}

fn first_present_key(variants: &Map<String, Value>) -> Option<&str> {
    variants
        .iter()
        .find(|(_, payload)| !payload.is_null())
        .map(|(name, _)| name.as_str())
}

/// Decodes a reason payload into its variant; never fails
pub fn decode_reason(value: &Value) -> ReasonVariant {
    ReasonShape::classify(value).variant()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_string() {
        assert_eq!(decode_reason(&json!("Decrease")), ReasonVariant::Decrease);
        assert_eq!(
            ReasonShape::classify(&json!("Set")),
            ReasonShape::Plain("Set")
        );
    }

    #[test]
    fn test_plain_string_not_canonical() {
        assert_eq!(decode_reason(&json!("Explode")), ReasonVariant::Unknown);
        assert_eq!(decode_reason(&json!("increase")), ReasonVariant::Unknown);
    }

    #[test]
    fn test_nested_variant_map() {
        let payload = json!({"variant": {"Reset": {}}});
        assert_eq!(decode_reason(&payload), ReasonVariant::Reset);

        let payload = json!({"variant": {"Increase": null, "Decrease": null, "Reset": null, "Set": {}}});
        assert_eq!(
            ReasonShape::classify(&payload),
            ReasonShape::NestedVariant("Set")
        );
    }

    #[test]
    fn test_nested_variant_all_inactive_falls_through() {
        let payload = json!({"variant": {"Increase": null}, "kind": "Decrease"});
        assert_eq!(
            ReasonShape::classify(&payload),
            ReasonShape::Discriminant("Decrease")
        );
    }

    #[test]
    fn test_direct_keys() {
        let payload = json!({"Increase": null, "Reset": {}});
        assert_eq!(
            ReasonShape::classify(&payload),
            ReasonShape::DirectKey("Reset")
        );
        assert_eq!(decode_reason(&json!({"Increase": []})), ReasonVariant::Increase);
    }

    #[test]
    fn test_discriminant_fields() {
        assert_eq!(decode_reason(&json!({"type": "Set"})), ReasonVariant::Set);
        assert_eq!(decode_reason(&json!({"kind": "Increase"})), ReasonVariant::Increase);
        assert_eq!(decode_reason(&json!({"__kind": "Reset"})), ReasonVariant::Reset);
        // non-string discriminants are skipped
        assert_eq!(
            decode_reason(&json!({"type": 3, "kind": "Decrease"})),
            ReasonVariant::Decrease
        );
    }

    #[test]
    fn test_unrelated_values() {
        assert_eq!(decode_reason(&json!({"foo": "bar"})), ReasonVariant::Unknown);
        assert_eq!(decode_reason(&Value::Null), ReasonVariant::Unknown);
        assert_eq!(decode_reason(&json!(2)), ReasonVariant::Unknown);
        assert_eq!(decode_reason(&json!(["Increase"])), ReasonVariant::Unknown);
        assert_eq!(decode_reason(&json!({"variant": "Reset"})), ReasonVariant::Unknown);
    }

    #[test]
    fn test_nested_unknown_variant_is_unknown() {
        let payload = json!({"variant": {"Explode": {}}});
        assert_eq!(
            ReasonShape::classify(&payload),
            ReasonShape::NestedVariant("Explode")
        );
        assert_eq!(decode_reason(&payload), ReasonVariant::Unknown);
    }

    #[test]
    fn test_labels() {
        assert_eq!(ReasonVariant::Set.label(), "Set by Owner");
        assert_eq!(ReasonVariant::Unknown.label(), "Unknown");
        assert_eq!(ReasonVariant::Decrease.to_string(), "Decrease");
    }
}
