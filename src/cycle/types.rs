use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::odds::ScaledOdds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Moneyline {
    Unset,
    Home,
    Draw,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverUnder {
    Unset,
    Over,
    Under,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CycleMatch {
    pub fixture_id: i64,
    pub display_order: u8,
    pub kickoff: DateTime<Utc>,
    pub odds_home: ScaledOdds,
    pub odds_draw: ScaledOdds,
    pub odds_away: ScaledOdds,
    pub odds_over: ScaledOdds,
    pub odds_under: ScaledOdds,
    pub result_moneyline: Moneyline,
    pub result_over_under: OverUnder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    Created,
    Published,
    AwaitingResults,
    Resolved,
    EvaluationComplete,
    /// Terminal state for a cycle whose on-chain submission failed after
    /// retries; kept for forensic purposes, never auto-deleted.
    Orphan,
}

#[derive(Debug, Clone)]
pub struct Cycle {
    pub id: i64,
    pub status: CycleStatus,
    pub created_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub matches: Vec<CycleMatch>,
    pub resolved: bool,
    pub evaluation_complete: bool,
    pub creation_tx_hash: Option<String>,
    pub resolution_tx_hash: Option<String>,
    pub prize_pool: u128,
    /// The instant from which a ranked prize on this cycle may be claimed.
    /// Meaningless before the cycle is resolved; set to `resolved_at +
    /// claim_delay_hours` when results are submitted.
    pub claimable_start: DateTime<Utc>,
}

impl Cycle {
    pub fn fixture_ids(&self) -> Vec<i64> {
        self.matches.iter().map(|m| m.fixture_id).collect()
    }

    /// A cycle is closed for betting once its first kickoff has passed or
    /// it has already been resolved.
    pub fn closed_for_betting(&self, now: DateTime<Utc>) -> bool {
        if self.resolved {
            return true;
        }
        self.matches.iter().map(|m| m.kickoff).min().map(|first| first <= now).unwrap_or(true)
    }
}
