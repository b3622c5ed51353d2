//! Fixed-point conversion between STRK and its smallest unit (FRI)
//!
//! One STRK is `10^18` FRI. Conversions into FRI are exact; conversions back
//! to a floating point STRK value are for display only. [`format_strk`] works
//! in integer arithmetic and is exact for any magnitude.

use alloy_primitives::{
    U256,
    utils::{UnitsError, parse_units},
};

/// STRK token decimals
pub const STRK_DECIMALS: u8 = 18;

/// Number of FRI in one STRK
pub const FRI_PER_STRK: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Decimals shown by default when formatting a STRK amount
pub const DEFAULT_DISPLAY_DECIMALS: usize = 4;

/// STRK token address on devnet
pub const STRK_TOKEN_ADDRESS: &str =
    "0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d";

/// Payment charged by the counter contract to reset the counter (1 STRK)
pub const RESET_PAYMENT_AMOUNT: U256 = FRI_PER_STRK;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Invalid STRK amount `{input}`: {reason}")]
    Invalid { input: String, reason: String },

    #[error("STRK amount cannot be negative: {0}")]
    Negative(String),
}

/// Converts a whole number of STRK into FRI
pub fn strk_to_fri(amount: u64) -> U256 {
    U256::from(amount) * FRI_PER_STRK
}

/// Converts FRI into a floating point STRK value
///
/// The whole part is computed exactly before the conversion to `f64`, so whole
/// token amounts below 2^53 come back unchanged.
pub fn fri_to_strk(amount: U256) -> f64 {
    let whole = amount / FRI_PER_STRK;
    let fraction = amount % FRI_PER_STRK;
    u256_to_f64(whole) + u256_to_f64(fraction) / 1e18
}

/// Formats a FRI amount as STRK with exactly `decimals` fractional digits
///
/// Rounds half-up at the last shown digit. Never switches to exponent
/// notation, whatever the magnitude.
pub fn format_strk(amount: U256, decimals: usize) -> String {
    let shown = decimals.min(STRK_DECIMALS as usize);
    let dropped = STRK_DECIMALS as usize - shown;
    let divisor = pow10(dropped);

    let quotient = amount / divisor;
    let remainder = amount % divisor;
    // Half-up; `divisor - remainder` avoids overflowing `remainder * 2` near U256::MAX.
    let rounded = if dropped > 0 && remainder >= divisor - remainder {
        quotient + U256::from(1u8)
    } else {
        quotient
    };

    let scale = pow10(shown);
    let whole = rounded / scale;
    let fraction = rounded % scale;

    // Extra decimals beyond 18 are always zero.
    let padding = "0".repeat(decimals - shown);
    if decimals == 0 {
        whole.to_string()
    } else {
        format!("{whole}.{:0>width$}{padding}", fraction.to_string(), width = shown)
    }
}

/// Formats a FRI amount with the default number of display decimals
pub fn format_strk_default(amount: U256) -> String {
    format_strk(amount, DEFAULT_DISPLAY_DECIMALS)
}

/// Parses a decimal STRK string (e.g. "1.5") into FRI
pub fn parse_strk(input: &str) -> Result<U256, AmountError> {
    let trimmed = input.trim();
    let parsed = parse_units(trimmed, STRK_DECIMALS).map_err(|e: UnitsError| {
        AmountError::Invalid {
            input: trimmed.to_string(),
            reason: e.to_string(),
        }
    })?;

    if parsed.is_negative() {
        return Err(AmountError::Negative(trimmed.to_string()));
    }
    Ok(parsed.get_absolute())
}

fn pow10(exp: usize) -> U256 {
    (0..exp).fold(U256::from(1u8), |acc, _| acc * U256::from(10u8))
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0f64, |acc, limb| acc * 18_446_744_073_709_551_616f64 + *limb as f64)
}
