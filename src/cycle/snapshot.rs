//! Versioned, single-shape snapshot record persisted alongside a cycle,
//! replacing the source's free-form JSON with mixed string/number typing.
//! `repair_legacy_row` detects and rewrites rows that still carry the
//! legacy shape (string-typed `startTime` or odds).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{InvariantError, OddysseyError};
use crate::odds::{parse_decimal_str, ScaledOdds};
use super::types::{CycleMatch, Moneyline, OverUnder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMatch {
    pub id: i64,
    #[serde(rename = "startTime")]
    pub start_time: i64,
    #[serde(rename = "oddsHome")]
    pub odds_home: ScaledOdds,
    #[serde(rename = "oddsDraw")]
    pub odds_draw: ScaledOdds,
    #[serde(rename = "oddsAway")]
    pub odds_away: ScaledOdds,
    #[serde(rename = "oddsOver")]
    pub odds_over: ScaledOdds,
    #[serde(rename = "oddsUnder")]
    pub odds_under: ScaledOdds,
    pub result: SnapshotResult,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SnapshotResult {
    pub moneyline: Moneyline,
    #[serde(rename = "overUnder")]
    pub over_under: OverUnder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchesSnapshot {
    pub matches: Vec<SnapshotMatch>,
}

impl From<&CycleMatch> for SnapshotMatch {
    fn from(m: &CycleMatch) -> Self {
        SnapshotMatch {
            id: m.fixture_id,
            start_time: m.kickoff.timestamp(),
            odds_home: m.odds_home,
            odds_draw: m.odds_draw,
            odds_away: m.odds_away,
            odds_over: m.odds_over,
            odds_under: m.odds_under,
            result: SnapshotResult { moneyline: m.result_moneyline, over_under: m.result_over_under },
        }
    }
}

impl MatchesSnapshot {
    pub fn from_matches(matches: &[CycleMatch]) -> Self {
        MatchesSnapshot { matches: matches.iter().map(SnapshotMatch::from).collect() }
    }
}

/// Detects whether a raw jsonb blob still carries the legacy shape: a
/// string-typed `startTime` or any string-typed odds field on any of its
/// match entries.
pub fn is_legacy_shape(raw: &Value) -> bool {
    let Some(matches) = raw.get("matches").and_then(Value::as_array) else {
        return false;
    };
    matches.iter().any(|m| {
        let start_is_string = m.get("startTime").map(Value::is_string).unwrap_or(false);
        let odds_keys = ["oddsHome", "oddsDraw", "oddsAway", "oddsOver", "oddsUnder"];
        let odds_is_string = odds_keys.iter().any(|k| m.get(*k).map(Value::is_string).unwrap_or(false));
        start_is_string || odds_is_string
    })
}

/// Rewrites a legacy row's jsonb blob into the canonical numeric shape,
/// rejecting scientific-notation-encoded odds as corrupt rather than
/// silently coercing them.
pub fn repair_legacy_row(raw: &Value) -> Result<Value, OddysseyError> {
    let matches = raw
        .get("matches")
        .and_then(Value::as_array)
        .ok_or_else(|| OddysseyError::Invariant(InvariantError::CorruptSnapshot("missing matches array".into())))?;

    let mut repaired = Vec::with_capacity(matches.len());
    for m in matches {
        let start_time = match m.get("startTime") {
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
                OddysseyError::Invariant(InvariantError::CorruptSnapshot("startTime not an integer".into()))
            })?,
            Some(Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp())
                .map_err(|_| OddysseyError::Invariant(InvariantError::CorruptSnapshot(format!("unparseable startTime {s}"))))?,
            _ => return Err(OddysseyError::Invariant(InvariantError::CorruptSnapshot("missing startTime".into()))),
        };

        let odds_field = |key: &str| -> Result<ScaledOdds, OddysseyError> {
            match m.get(key) {
                Some(Value::Number(n)) => Ok(n.as_u64().unwrap_or(0) as ScaledOdds),
                Some(Value::String(s)) => {
                    let decimal = parse_decimal_str(s)?;
                    Ok((decimal * crate::odds::SCALE).trunc() as ScaledOdds)
                }
                _ => Err(OddysseyError::Invariant(InvariantError::CorruptSnapshot(format!("missing {key}")))),
            }
        };

        repaired.push(serde_json::json!({
            "id": m.get("id").and_then(Value::as_i64).ok_or_else(|| {
                OddysseyError::Invariant(InvariantError::CorruptSnapshot("missing id".into()))
            })?,
            "startTime": start_time,
            "oddsHome": odds_field("oddsHome")?,
            "oddsDraw": odds_field("oddsDraw")?,
            "oddsAway": odds_field("oddsAway")?,
            "oddsOver": odds_field("oddsOver")?,
            "oddsUnder": odds_field("oddsUnder")?,
            "result": m.get("result").cloned().unwrap_or_else(|| serde_json::json!({"moneyline": "Unset", "overUnder": "Unset"})),
        }));
    }

    Ok(serde_json::json!({ "matches": repaired }))
}
