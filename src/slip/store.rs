use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::info;

use crate::error::OddysseyError;
use super::types::{Prediction, Slip};

#[derive(Debug, Clone)]
pub struct PrizeClaim {
    pub cycle_id: i64,
    pub slip_id: i64,
    pub player: String,
    pub rank: u8,
    pub amount: u128,
    pub claimed: bool,
    pub claim_tx_hash: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SlipStore: Send + Sync {
    async fn next_slip_id(&self) -> Result<i64, OddysseyError>;

    async fn insert_slip(
        &self,
        id: i64,
        cycle_id: i64,
        player: &str,
        predictions: Vec<Prediction>,
        placement_tx_hash: &str,
    ) -> Result<Slip, OddysseyError>;

    async fn get_slip(&self, id: i64) -> Result<Option<Slip>, OddysseyError>;
    async fn list_slips_for_cycle(&self, cycle_id: i64) -> Result<Vec<Slip>, OddysseyError>;

    async fn mark_evaluated(&self, id: i64, correct_count: u8, final_score: u64) -> Result<(), OddysseyError>;

    /// Sets (or clears, when `rank` is `None`) a slip's leaderboard rank.
    async fn set_rank(&self, id: i64, rank: Option<u8>) -> Result<(), OddysseyError>;

    /// Upserts the prize-claim row for `(cycle_id, slip_id, player)` with
    /// the rank and amount computed at ranking time; leaves `claimed` and
    /// the tx hash untouched if the row already exists and is claimed.
    async fn upsert_prize_claim(
        &self,
        cycle_id: i64,
        slip_id: i64,
        player: &str,
        rank: u8,
        amount: u128,
    ) -> Result<(), OddysseyError>;

    async fn get_claim(&self, cycle_id: i64, slip_id: i64, player: &str) -> Result<Option<PrizeClaim>, OddysseyError>;

    async fn mark_claimed(
        &self,
        cycle_id: i64,
        slip_id: i64,
        player: &str,
        claim_tx_hash: &str,
        claimed_at: DateTime<Utc>,
    ) -> Result<(), OddysseyError>;
}

pub struct PostgresSlipStore {
    pool: PgPool,
}

impl PostgresSlipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn slip_from_row(row: &sqlx::postgres::PgRow) -> Result<Slip, OddysseyError> {
        let raw_predictions: serde_json::Value = row.get("predictions");
        let predictions = raw_predictions
            .as_array()
            .ok_or_else(|| crate::error::InvariantError::CorruptSnapshot("predictions is not an array".into()))?
            .iter()
            .map(Prediction::from_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Slip {
            id: row.get("slip_id"),
            cycle_id: row.get("cycle_id"),
            player: row.get("player"),
            placed_at: row.get("placed_at"),
            predictions,
            is_evaluated: row.get("is_evaluated"),
            correct_count: row.get::<i16, _>("correct_count") as u8,
            final_score: row.get::<i64, _>("final_score") as u64,
            leaderboard_rank: row.get::<Option<i16>, _>("leaderboard_rank").map(|r| r as u8),
            prize_claimed: row.get("prize_claimed"),
            placement_tx_hash: row.get("placement_tx_hash"),
        })
    }
}

#[async_trait]
impl SlipStore for PostgresSlipStore {
    async fn next_slip_id(&self) -> Result<i64, OddysseyError> {
        let row = sqlx::query("SELECT nextval('oddyssey_slip_id_seq') AS id").fetch_one(&self.pool).await?;
        Ok(row.get("id"))
    }

    async fn insert_slip(
        &self,
        id: i64,
        cycle_id: i64,
        player: &str,
        predictions: Vec<Prediction>,
        placement_tx_hash: &str,
    ) -> Result<Slip, OddysseyError> {
        let placed_at = Utc::now();
        let predictions_json = serde_json::Value::Array(predictions.iter().map(Prediction::to_value).collect());

        sqlx::query(
            r#"INSERT INTO oddyssey_slips
                (slip_id, cycle_id, player, placed_at, predictions, is_evaluated, correct_count,
                 final_score, leaderboard_rank, prize_claimed, placement_tx_hash)
               VALUES ($1, $2, $3, $4, $5, false, 0, 0, NULL, false, $6)"#,
        )
        .bind(id)
        .bind(cycle_id)
        .bind(player)
        .bind(placed_at)
        .bind(&predictions_json)
        .bind(placement_tx_hash)
        .execute(&self.pool)
        .await?;

        Ok(Slip {
            id,
            cycle_id,
            player: player.to_string(),
            placed_at,
            predictions,
            is_evaluated: false,
            correct_count: 0,
            final_score: 0,
            leaderboard_rank: None,
            prize_claimed: false,
            placement_tx_hash: Some(placement_tx_hash.to_string()),
        })
    }

    async fn get_slip(&self, id: i64) -> Result<Option<Slip>, OddysseyError> {
        let row = sqlx::query("SELECT * FROM oddyssey_slips WHERE slip_id = $1").bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::slip_from_row).transpose()
    }

    async fn list_slips_for_cycle(&self, cycle_id: i64) -> Result<Vec<Slip>, OddysseyError> {
        let rows = sqlx::query("SELECT * FROM oddyssey_slips WHERE cycle_id = $1").bind(cycle_id).fetch_all(&self.pool).await?;
        rows.iter().map(Self::slip_from_row).collect()
    }

    async fn mark_evaluated(&self, id: i64, correct_count: u8, final_score: u64) -> Result<(), OddysseyError> {
        sqlx::query(
            "UPDATE oddyssey_slips SET is_evaluated = true, correct_count = $1, final_score = $2 WHERE slip_id = $3",
        )
        .bind(correct_count as i16)
        .bind(final_score as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_rank(&self, id: i64, rank: Option<u8>) -> Result<(), OddysseyError> {
        sqlx::query("UPDATE oddyssey_slips SET leaderboard_rank = $1 WHERE slip_id = $2")
            .bind(rank.map(|r| r as i16))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_prize_claim(
        &self,
        cycle_id: i64,
        slip_id: i64,
        player: &str,
        rank: u8,
        amount: u128,
    ) -> Result<(), OddysseyError> {
        sqlx::query(
            r#"INSERT INTO oddyssey_prize_claims (cycle_id, slip_id, player, rank, amount, claimed)
               VALUES ($1, $2, $3, $4, $5, false)
               ON CONFLICT (cycle_id, slip_id, player) DO UPDATE
                   SET rank = EXCLUDED.rank, amount = EXCLUDED.amount"#,
        )
        .bind(cycle_id)
        .bind(slip_id)
        .bind(player)
        .bind(rank as i16)
        .bind(amount as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_claim(&self, cycle_id: i64, slip_id: i64, player: &str) -> Result<Option<PrizeClaim>, OddysseyError> {
        let row = sqlx::query(
            "SELECT * FROM oddyssey_prize_claims WHERE cycle_id = $1 AND slip_id = $2 AND player = $3",
        )
        .bind(cycle_id)
        .bind(slip_id)
        .bind(player)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| PrizeClaim {
            cycle_id: r.get("cycle_id"),
            slip_id: r.get("slip_id"),
            player: r.get("player"),
            rank: r.get::<i16, _>("rank") as u8,
            amount: r.get::<i64, _>("amount") as u128,
            claimed: r.get("claimed"),
            claim_tx_hash: r.get("claim_tx_hash"),
            claimed_at: r.get("claimed_at"),
        }))
    }

    async fn mark_claimed(
        &self,
        cycle_id: i64,
        slip_id: i64,
        player: &str,
        claim_tx_hash: &str,
        claimed_at: DateTime<Utc>,
    ) -> Result<(), OddysseyError> {
        sqlx::query(
            r#"UPDATE oddyssey_prize_claims SET claimed = true, claim_tx_hash = $1, claimed_at = $2
               WHERE cycle_id = $3 AND slip_id = $4 AND player = $5"#,
        )
        .bind(claim_tx_hash)
        .bind(claimed_at)
        .bind(cycle_id)
        .bind(slip_id)
        .bind(player)
        .execute(&self.pool)
        .await?;
        sqlx::query("UPDATE oddyssey_slips SET prize_claimed = true WHERE slip_id = $1").bind(slip_id).execute(&self.pool).await?;
        info!("prize claimed for cycle {cycle_id} slip {slip_id} by {player}");
        Ok(())
    }
}
