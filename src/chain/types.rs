//! Wire-format types for the on-chain contract surface. Every numeric field
//! here is already in scaled-integer form.

use crate::cycle::{CycleMatch, Moneyline, OverUnder};
use crate::odds::ScaledOdds;

#[derive(Debug, Clone, Copy)]
pub struct ChainResult {
    pub moneyline: u8,
    pub over_under: u8,
}

impl From<(Moneyline, OverUnder)> for ChainResult {
    fn from((ml, ou): (Moneyline, OverUnder)) -> Self {
        let moneyline = match ml {
            Moneyline::Unset => 0,
            Moneyline::Home => 1,
            Moneyline::Draw => 2,
            Moneyline::Away => 3,
        };
        let over_under = match ou {
            OverUnder::Unset => 0,
            OverUnder::Over => 1,
            OverUnder::Under => 2,
        };
        ChainResult { moneyline, over_under }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChainMatch {
    pub id: u64,
    pub start_time: u64,
    pub odds_home: ScaledOdds,
    pub odds_draw: ScaledOdds,
    pub odds_away: ScaledOdds,
    pub odds_over: ScaledOdds,
    pub odds_under: ScaledOdds,
    pub result: ChainResult,
}

impl From<&CycleMatch> for ChainMatch {
    fn from(m: &CycleMatch) -> Self {
        ChainMatch {
            id: m.fixture_id as u64,
            start_time: m.kickoff.timestamp() as u64,
            odds_home: m.odds_home,
            odds_draw: m.odds_draw,
            odds_away: m.odds_away,
            odds_over: m.odds_over,
            odds_under: m.odds_under,
            result: (m.result_moneyline, m.result_over_under).into(),
        }
    }
}

/// `(fixtureId, betType, selection_hash, selectedOdd)` — the wire shape of
/// a single prediction.
#[derive(Debug, Clone, Copy)]
pub struct ChainPrediction {
    pub fixture_id: u64,
    pub bet_type: u8, // 0 = Moneyline, 1 = OverUnder
    pub selection: [u8; 32],
    pub selected_odd: u32,
}
