//! Conversion between human-entered decimal amounts and token base units

use crate::error::{BridgeError, BridgeResult};

use ethers::types::U256;

/// Largest decimals value for which `10^decimals` fits in a `U256`
pub const MAX_DECIMALS: u8 = 77;

fn invalid(amount: &str, reason: impl Into<String>) -> BridgeError {
    BridgeError::InvalidAmount {
        amount: amount.to_string(),
        reason: reason.into(),
    }
}

/// Parse a decimal string such as `"100.25"` into base units at `decimals`.
///
/// Fractional digits beyond `decimals` are accepted only if they are zeros.
pub fn parse_units(amount: &str, decimals: u8) -> BridgeResult<U256> {
    if decimals > MAX_DECIMALS {
        return Err(invalid(amount, format!("unsupported decimals {}", decimals)));
    }

    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(invalid(amount, "empty amount"));
    }

    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid(amount, "no digits"));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid(amount, "only digits and a single '.' are allowed"));
    }

    let decimals = decimals as usize;
    let frac_part = if frac_part.len() > decimals {
        let (kept, dropped) = frac_part.split_at(decimals);
        if dropped.chars().any(|c| c != '0') {
            return Err(invalid(
                amount,
                format!("more than {} fractional digits", decimals),
            ));
        }
        kept
    } else {
        frac_part
    };

    let digits = format!("{}{:0<width$}", int_part, frac_part, width = decimals);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }

    U256::from_dec_str(digits).map_err(|_| invalid(amount, "amount overflows 256 bits"))
}

/// Render base units as a canonical decimal string (no trailing zeros)
pub fn format_units(value: U256, decimals: u8) -> String {
    let decimals = decimals.min(MAX_DECIMALS) as usize;
    if decimals == 0 {
        return value.to_string();
    }

    let scale = U256::exp10(decimals);
    let (whole, frac) = value.div_mod(scale);
    let frac = format!("{:0>width$}", frac.to_string(), width = decimals);
    let frac = frac.trim_end_matches('0');

    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    }
}
