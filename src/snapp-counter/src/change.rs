//! `CounterChanged` events projected from raw event payloads

use serde::Serialize;
use serde_json::Value;

use crate::events::{EventPosition, RawEvent};
use crate::network::{ChainAddress, TransactionId, parse_felt};
use crate::reason::{ReasonVariant, decode_reason};

/// Name of the event the counter contract emits on every change
pub const COUNTER_CHANGED: &str = "CounterChanged";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub caller: ChainAddress,
    pub old_value: u64,
    pub new_value: u64,
    pub reason: ReasonVariant,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<TransactionId>,
    #[serde(skip)]
    pub position: EventPosition,
}

impl ChangeEvent {
    /// Projects a raw event; `None` when `caller` or either value is missing
    /// or malformed
    ///
    /// The reason never makes an event invalid; it decodes to
    /// [`ReasonVariant::Unknown`] at worst.
    pub fn from_raw(raw: &RawEvent) -> Option<Self> {
        let args = &raw.parsed_args;
        let caller = args.get("caller").and_then(felt_value)?;
        let old_value = args.get("old_value").and_then(integer_value)?;
        let new_value = args.get("new_value").and_then(integer_value)?;
        let reason = args.get("reason").map_or(ReasonVariant::Unknown, decode_reason);

        let block_number = raw
            .block
            .as_ref()
            .map(|block| block.block_number)
            .or(Some(raw.position.block_number));
        let transaction_hash = raw
            .transaction_hash
            .or_else(|| raw.transaction.as_ref().map(|tx| tx.transaction_hash));

        Some(Self {
            caller,
            old_value,
            new_value,
            reason,
            block_number,
            transaction_hash,
            position: raw.position,
        })
    }

    /// Signed change, `new_value - old_value`
    pub fn delta(&self) -> i128 {
        i128::from(self.new_value) - i128::from(self.old_value)
    }
}

/// Accepts a JSON number, a decimal string or a 0x-hex string
fn integer_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => {
            let text = text.trim();
            text.strip_prefix("0x")
                .map_or_else(|| text.parse().ok(), |hex| u64::from_str_radix(hex, 16).ok())
        }
        _ => None,
    }
}

fn felt_value(value: &Value) -> Option<ChainAddress> {
    match value {
        Value::String(text) => parse_felt(text).ok(),
        Value::Number(number) => number.as_u64().map(ChainAddress::from),
        _ => None,
    }
}

/// Running count of changes per reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReasonCounts {
    pub increase: u64,
    pub decrease: u64,
    pub reset: u64,
    pub set: u64,
    pub unknown: u64,
}

impl ReasonCounts {
    pub fn record(&mut self, reason: ReasonVariant) {
        let slot = match reason {
            ReasonVariant::Increase => &mut self.increase,
            ReasonVariant::Decrease => &mut self.decrease,
            ReasonVariant::Reset => &mut self.reset,
            ReasonVariant::Set => &mut self.set,
            ReasonVariant::Unknown => &mut self.unknown,
        };
        *slot += 1;
    }

    pub fn get(&self, reason: ReasonVariant) -> u64 {
        match reason {
            ReasonVariant::Increase => self.increase,
            ReasonVariant::Decrease => self.decrease,
            ReasonVariant::Reset => self.reset,
            ReasonVariant::Set => self.set,
            ReasonVariant::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> u64 {
        self.increase + self.decrease + self.reset + self.set + self.unknown
    }
}

impl<'a> FromIterator<&'a ChangeEvent> for ReasonCounts {
    fn from_iter<T: IntoIterator<Item = &'a ChangeEvent>>(iter: T) -> Self {
        let mut counts = Self::default();
        for event in iter {
            counts.record(event.reason);
        }
        counts
    }
}
