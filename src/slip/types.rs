use chrono::{DateTime, Utc};

use crate::odds::ScaledOdds;
use super::prediction::Selection;

#[derive(Debug, Clone, Copy)]
pub struct Prediction {
    pub fixture_id: i64,
    pub selection: Selection,
    pub selected_odd: ScaledOdds,
}

impl Prediction {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "fixtureId": self.fixture_id,
            "betType": self.selection.bet_type(),
            "selection": self.selection.canonical(),
            "selectedOdd": self.selected_odd,
        })
    }

    pub fn from_value(v: &serde_json::Value) -> Result<Self, crate::error::OddysseyError> {
        let fixture_id = v["fixtureId"].as_i64().ok_or_else(|| corrupt("fixtureId"))?;
        let selection_str = v["selection"].as_str().ok_or_else(|| corrupt("selection"))?;
        let selected_odd = v["selectedOdd"].as_u64().ok_or_else(|| corrupt("selectedOdd"))? as ScaledOdds;
        Ok(Prediction {
            fixture_id,
            selection: Selection::from_human(selection_str)?,
            selected_odd,
        })
    }
}

fn corrupt(field: &str) -> crate::error::OddysseyError {
    crate::error::InvariantError::CorruptSnapshot(format!("prediction missing or malformed field {field}")).into()
}

#[derive(Debug, Clone)]
pub struct Slip {
    pub id: i64,
    pub cycle_id: i64,
    pub player: String,
    pub placed_at: DateTime<Utc>,
    pub predictions: Vec<Prediction>,
    pub is_evaluated: bool,
    pub correct_count: u8,
    pub final_score: u64,
    pub leaderboard_rank: Option<u8>,
    pub prize_claimed: bool,
    pub placement_tx_hash: Option<String>,
}

impl Slip {
    pub fn fixture_ids(&self) -> Vec<i64> {
        self.predictions.iter().map(|p| p.fixture_id).collect()
    }
}
