//! Canonical fixed-point odds representation and the boundary codecs to and
//! from decimal display values and chain-scaled integers.
//!
//! The source showed odds drifting between decimal strings, floats and
//! scaled integers depending on the code path. This module defines one
//! canonical internal form (`ScaledOdds`, a decimal multiplied by 1000 and
//! truncated to an unsigned integer) and the two conversions every other
//! component needs.

use crate::error::{InvariantError, OddysseyError};

/// A decimal odd represented as `decimal * 1000`, truncated toward zero.
/// This is the representation used at the chain boundary and the one stored
/// alongside every `CycleMatch`.
pub type ScaledOdds = u32;

pub const SCALE: f64 = 1000.0;

/// Converts a decimal odd (e.g. `1.952`) to its scaled integer form.
/// Rejects scientific-notation-shaped inputs and anything outside the sane
/// odds range `(1.0, 50.0]`.
pub fn decimal_to_scaled(decimal: f64) -> Result<ScaledOdds, OddysseyError> {
    if !decimal.is_finite() {
        return Err(OddysseyError::Invariant(InvariantError::ScientificNotationInOdds(
            decimal.to_string(),
        )));
    }
    if decimal <= 1.0 || decimal > 50.0 {
        return Err(OddysseyError::Invariant(InvariantError::CorruptSnapshot(format!(
            "odds value {decimal} out of sane range (1.0, 50.0]"
        ))));
    }
    Ok((decimal * SCALE).trunc() as ScaledOdds)
}

/// Parses a textual odds field, rejecting any representation that looks
/// like scientific notation (`1e3`, `1.5E+2`) — historical rows sometimes
/// stored odds this way and must be treated as corrupt rather than silently
/// coerced.
pub fn parse_decimal_str(raw: &str) -> Result<f64, OddysseyError> {
    let lower = raw.to_ascii_lowercase();
    if lower.contains('e') {
        return Err(OddysseyError::Invariant(InvariantError::ScientificNotationInOdds(
            raw.to_string(),
        )));
    }
    raw.parse::<f64>()
        .map_err(|_| OddysseyError::Invariant(InvariantError::CorruptSnapshot(raw.to_string())))
}

/// Scaled integer back to a decimal for display.
pub fn scaled_to_decimal(scaled: ScaledOdds) -> f64 {
    scaled as f64 / SCALE
}

/// Truncating multiply used by the slip scoring pipeline: `(a * b) / 1000`
/// where `a` is the running score and `b` a scaled odds value, both
/// integer-truncated toward zero.
pub fn truncating_multiply(running: u64, scaled_odds: ScaledOdds) -> u64 {
    (running * scaled_odds as u64) / 1000
}
