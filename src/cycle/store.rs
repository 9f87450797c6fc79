use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use tracing::{info, warn};

use crate::error::OddysseyError;
use super::snapshot::{is_legacy_shape, repair_legacy_row, MatchesSnapshot};
use super::types::{Cycle, CycleMatch, CycleStatus, Moneyline, OverUnder};

#[async_trait]
pub trait CycleStore: Send + Sync {
    async fn next_cycle_id(&self) -> Result<i64, OddysseyError>;

    /// Inserts the cycle row and its ten match rows in one transaction.
    /// Enforces the `(game_date)` overwrite-protection unique index: a
    /// second attempt for the same UTC day returns the existing cycle
    /// instead of inserting a duplicate.
    async fn create_cycle(
        &self,
        id: i64,
        game_date: NaiveDate,
        matches: Vec<CycleMatch>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Cycle, OddysseyError>;

    async fn attach_creation_tx(&self, id: i64, hash: &str) -> Result<(), OddysseyError>;
    async fn attach_resolution_tx(&self, id: i64, hash: &str) -> Result<(), OddysseyError>;
    async fn mark_orphan(&self, id: i64) -> Result<(), OddysseyError>;

    async fn get_cycle(&self, id: i64) -> Result<Option<Cycle>, OddysseyError>;
    /// The latest unresolved cycle, or the latest cycle if none unresolved.
    async fn get_current_cycle(&self) -> Result<Option<Cycle>, OddysseyError>;
    async fn get_cycle_for_date(&self, game_date: NaiveDate) -> Result<Option<Cycle>, OddysseyError>;
    async fn list_cycles_by_date(&self, game_date: NaiveDate) -> Result<Vec<Cycle>, OddysseyError>;
    async fn list_unresolved(&self) -> Result<Vec<Cycle>, OddysseyError>;

    /// Records results and flips `resolved`. `claimable_start` is the
    /// instant from which a ranked prize becomes claimable.
    async fn submit_results(
        &self,
        id: i64,
        results: Vec<(i64, Moneyline, OverUnder)>,
        resolved_at: DateTime<Utc>,
        claimable_start: DateTime<Utc>,
    ) -> Result<(), OddysseyError>;
    async fn mark_evaluation_complete(&self, id: i64) -> Result<(), OddysseyError>;

    /// Deletes cycles (and descendant rows) older than `cycle_days`, and
    /// daily-selection rows older than `selection_days`.
    async fn purge_older_than(&self, cycle_days: i64, selection_days: i64) -> Result<u64, OddysseyError>;

    /// Scans persisted snapshots for the legacy shape and rewrites them.
    /// Returns the number of rows repaired.
    async fn repair_snapshot_types(&self) -> Result<u64, OddysseyError>;

    async fn max_cycle_id(&self) -> Result<Option<i64>, OddysseyError>;

    /// The fixture ids persisted by `MatchSelectJob` for `game_date`, if
    /// any. Backs the overwrite-protection check: a second selection run
    /// for the same day is a no-op rather than a duplicate insert.
    async fn get_daily_selection(&self, game_date: NaiveDate) -> Result<Option<Vec<i64>>, OddysseyError>;

    /// Records the ten fixture ids chosen for `game_date`. A conflict on
    /// `game_date` is silently ignored — the unique index is the
    /// overwrite-protection mechanism itself.
    async fn persist_daily_selection(&self, game_date: NaiveDate, fixture_ids: &[i64]) -> Result<(), OddysseyError>;

    /// Persists one health-monitor alert.
    async fn record_alert(&self, severity: &str, message: &str, details: serde_json::Value) -> Result<(), OddysseyError>;
}

pub struct PostgresCycleStore {
    pool: PgPool,
}

impl PostgresCycleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_cycle_from_row(&self, row: &sqlx::postgres::PgRow) -> Result<Cycle, OddysseyError> {
        let id: i64 = row.get("cycle_id");
        let status_str: String = row.get("status");
        let snapshot: serde_json::Value = row.get("matches");
        let parsed: MatchesSnapshot = serde_json::from_value(snapshot)
            .map_err(|e| crate::error::InvariantError::CorruptSnapshot(e.to_string()))?;

        let match_rows = sqlx::query(
            r#"SELECT fixture_id, display_order, start_time, odds_home, odds_draw, odds_away,
                      odds_over, odds_under, result_moneyline, result_over_under
               FROM oddyssey_cycle_matches WHERE cycle_id = $1 ORDER BY display_order"#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let matches: Vec<CycleMatch> = match_rows
            .into_iter()
            .map(|r| CycleMatch {
                fixture_id: r.get("fixture_id"),
                display_order: r.get::<i16, _>("display_order") as u8,
                kickoff: DateTime::from_timestamp(r.get::<i64, _>("start_time"), 0).unwrap_or_else(Utc::now),
                odds_home: r.get::<i32, _>("odds_home") as u32,
                odds_draw: r.get::<i32, _>("odds_draw") as u32,
                odds_away: r.get::<i32, _>("odds_away") as u32,
                odds_over: r.get::<i32, _>("odds_over") as u32,
                odds_under: r.get::<i32, _>("odds_under") as u32,
                result_moneyline: parse_moneyline(r.get("result_moneyline")),
                result_over_under: parse_over_under(r.get("result_over_under")),
            })
            .collect();

        let _ = parsed; // snapshot kept for the repair routine; row-level matches are authoritative here

        Ok(Cycle {
            id,
            status: parse_status(&status_str),
            created_at: row.get("created_at"),
            start_time: row.get("start_time"),
            end_time: row.get("end_time"),
            matches,
            resolved: row.get("resolved"),
            evaluation_complete: row.get("evaluation_complete"),
            creation_tx_hash: row.get("creation_tx_hash"),
            resolution_tx_hash: row.get("resolution_tx_hash"),
            prize_pool: row.get::<i64, _>("prize_pool") as u128,
            claimable_start: row.get::<Option<DateTime<Utc>>, _>("claimable_start").unwrap_or_else(|| row.get("end_time")),
        })
    }
}

fn parse_status(s: &str) -> CycleStatus {
    match s {
        "Created" => CycleStatus::Created,
        "Published" => CycleStatus::Published,
        "AwaitingResults" => CycleStatus::AwaitingResults,
        "Resolved" => CycleStatus::Resolved,
        "EvaluationComplete" => CycleStatus::EvaluationComplete,
        _ => CycleStatus::Orphan,
    }
}

fn status_str(s: CycleStatus) -> &'static str {
    match s {
        CycleStatus::Created => "Created",
        CycleStatus::Published => "Published",
        CycleStatus::AwaitingResults => "AwaitingResults",
        CycleStatus::Resolved => "Resolved",
        CycleStatus::EvaluationComplete => "EvaluationComplete",
        CycleStatus::Orphan => "Orphan",
    }
}

fn parse_moneyline(s: String) -> Moneyline {
    match s.as_str() {
        "Home" => Moneyline::Home,
        "Draw" => Moneyline::Draw,
        "Away" => Moneyline::Away,
        _ => Moneyline::Unset,
    }
}

fn parse_over_under(s: String) -> OverUnder {
    match s.as_str() {
        "Over" => OverUnder::Over,
        "Under" => OverUnder::Under,
        _ => OverUnder::Unset,
    }
}

fn moneyline_str(m: Moneyline) -> &'static str {
    match m {
        Moneyline::Unset => "Unset",
        Moneyline::Home => "Home",
        Moneyline::Draw => "Draw",
        Moneyline::Away => "Away",
    }
}

fn over_under_str(o: OverUnder) -> &'static str {
    match o {
        OverUnder::Unset => "Unset",
        OverUnder::Over => "Over",
        OverUnder::Under => "Under",
    }
}

#[async_trait]
impl CycleStore for PostgresCycleStore {
    async fn next_cycle_id(&self) -> Result<i64, OddysseyError> {
        let row = sqlx::query("SELECT nextval('oddyssey_cycle_id_seq') AS id").fetch_one(&self.pool).await?;
        Ok(row.get("id"))
    }

    async fn create_cycle(
        &self,
        id: i64,
        game_date: NaiveDate,
        matches: Vec<CycleMatch>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Cycle, OddysseyError> {
        if matches.len() != 10 {
            return Err(crate::error::InvariantError::WrongMatchCount(matches.len()).into());
        }

        if let Some(existing) = self.get_cycle_for_date(game_date).await? {
            info!("cycle already exists for {game_date}, returning existing cycle {}", existing.id);
            return Ok(existing);
        }

        let mut tx = self.pool.begin().await?;

        let snapshot = MatchesSnapshot::from_matches(&matches);
        let snapshot_json = serde_json::to_value(&snapshot)
            .map_err(|e| crate::error::InvariantError::CorruptSnapshot(e.to_string()))?;

        let inserted = sqlx::query(
            r#"INSERT INTO oddyssey_cycles (cycle_id, game_date, status, created_at, start_time, end_time,
                    matches, resolved, evaluation_complete, prize_pool)
               VALUES ($1, $2, 'Created', NOW(), $3, $4, $5, false, false, 0)
               ON CONFLICT (game_date) DO NOTHING"#,
        )
        .bind(id)
        .bind(game_date)
        .bind(start_at)
        .bind(end_at)
        .bind(&snapshot_json)
        .execute(&mut *tx)
        .await?;

        // Another call for the same game_date won the insert race between
        // our pre-check and here; drop our half-built transaction and
        // return the row that actually landed, rather than fabricating a
        // Cycle that doesn't exist in oddyssey_cycles.
        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return self
                .get_cycle_for_date(game_date)
                .await?
                .ok_or_else(|| crate::error::InvariantError::CorruptSnapshot(format!("lost create_cycle race for {game_date} but no row exists")).into());
        }

        for m in &matches {
            sqlx::query(
                r#"INSERT INTO oddyssey_cycle_matches
                    (cycle_id, fixture_id, display_order, start_time, odds_home, odds_draw, odds_away,
                     odds_over, odds_under, result_moneyline, result_over_under)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                   ON CONFLICT (cycle_id, fixture_id) DO NOTHING"#,
            )
            .bind(id)
            .bind(m.fixture_id)
            .bind(m.display_order as i16)
            .bind(m.kickoff.timestamp())
            .bind(m.odds_home as i32)
            .bind(m.odds_draw as i32)
            .bind(m.odds_away as i32)
            .bind(m.odds_over as i32)
            .bind(m.odds_under as i32)
            .bind(moneyline_str(m.result_moneyline))
            .bind(over_under_str(m.result_over_under))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Cycle {
            id,
            status: CycleStatus::Created,
            created_at: Utc::now(),
            start_time: start_at,
            end_time: end_at,
            matches,
            resolved: false,
            evaluation_complete: false,
            creation_tx_hash: None,
            resolution_tx_hash: None,
            prize_pool: 0,
            claimable_start: end_at,
        })
    }

    async fn attach_creation_tx(&self, id: i64, hash: &str) -> Result<(), OddysseyError> {
        sqlx::query("UPDATE oddyssey_cycles SET creation_tx_hash = $1, status = 'Published' WHERE cycle_id = $2")
            .bind(hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn attach_resolution_tx(&self, id: i64, hash: &str) -> Result<(), OddysseyError> {
        sqlx::query("UPDATE oddyssey_cycles SET resolution_tx_hash = $1 WHERE cycle_id = $2")
            .bind(hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_orphan(&self, id: i64) -> Result<(), OddysseyError> {
        warn!("marking cycle {id} as orphaned after terminal chain submission failure");
        sqlx::query("UPDATE oddyssey_cycles SET status = 'Orphan' WHERE cycle_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_cycle(&self, id: i64) -> Result<Option<Cycle>, OddysseyError> {
        let row = sqlx::query("SELECT * FROM oddyssey_cycles WHERE cycle_id = $1").bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(r) => Ok(Some(self.load_cycle_from_row(&r).await?)),
            None => Ok(None),
        }
    }

    async fn get_current_cycle(&self) -> Result<Option<Cycle>, OddysseyError> {
        let row = sqlx::query(
            r#"SELECT * FROM oddyssey_cycles WHERE resolved = false ORDER BY cycle_id DESC LIMIT 1"#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => Some(r),
            None => sqlx::query("SELECT * FROM oddyssey_cycles ORDER BY cycle_id DESC LIMIT 1").fetch_optional(&self.pool).await?,
        };

        match row {
            Some(r) => Ok(Some(self.load_cycle_from_row(&r).await?)),
            None => Ok(None),
        }
    }

    async fn get_cycle_for_date(&self, game_date: NaiveDate) -> Result<Option<Cycle>, OddysseyError> {
        let row = sqlx::query("SELECT * FROM oddyssey_cycles WHERE game_date = $1")
            .bind(game_date)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => Ok(Some(self.load_cycle_from_row(&r).await?)),
            None => Ok(None),
        }
    }

    async fn list_cycles_by_date(&self, game_date: NaiveDate) -> Result<Vec<Cycle>, OddysseyError> {
        let rows = sqlx::query("SELECT * FROM oddyssey_cycles WHERE game_date = $1")
            .bind(game_date)
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            out.push(self.load_cycle_from_row(r).await?);
        }
        Ok(out)
    }

    async fn list_unresolved(&self) -> Result<Vec<Cycle>, OddysseyError> {
        let rows = sqlx::query("SELECT * FROM oddyssey_cycles WHERE resolved = false AND status != 'Orphan'")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            out.push(self.load_cycle_from_row(r).await?);
        }
        Ok(out)
    }

    async fn submit_results(
        &self,
        id: i64,
        results: Vec<(i64, Moneyline, OverUnder)>,
        resolved_at: DateTime<Utc>,
        claimable_start: DateTime<Utc>,
    ) -> Result<(), OddysseyError> {
        let mut tx = self.pool.begin().await?;
        for (fixture_id, ml, ou) in &results {
            sqlx::query(
                r#"UPDATE oddyssey_cycle_matches SET result_moneyline = $1, result_over_under = $2
                   WHERE cycle_id = $3 AND fixture_id = $4"#,
            )
            .bind(moneyline_str(*ml))
            .bind(over_under_str(*ou))
            .bind(id)
            .bind(fixture_id)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            r#"UPDATE oddyssey_cycles SET resolved = true, resolved_at = $1, claimable_start = $2,
                   status = 'Resolved' WHERE cycle_id = $3"#,
        )
        .bind(resolved_at)
        .bind(claimable_start)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn mark_evaluation_complete(&self, id: i64) -> Result<(), OddysseyError> {
        sqlx::query("UPDATE oddyssey_cycles SET evaluation_complete = true, status = 'EvaluationComplete' WHERE cycle_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_older_than(&self, cycle_days: i64, selection_days: i64) -> Result<u64, OddysseyError> {
        let cycles_deleted = sqlx::query(
            "DELETE FROM oddyssey_cycles WHERE created_at < NOW() - ($1 || ' days')::interval",
        )
        .bind(cycle_days)
        .execute(&self.pool)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM oddyssey_daily_selections WHERE created_at < NOW() - ($1 || ' days')::interval")
            .bind(selection_days)
            .execute(&self.pool)
            .await?;

        info!("purged {cycles_deleted} cycles older than {cycle_days} days");
        Ok(cycles_deleted)
    }

    async fn repair_snapshot_types(&self) -> Result<u64, OddysseyError> {
        let rows = sqlx::query("SELECT cycle_id, matches FROM oddyssey_cycles").fetch_all(&self.pool).await?;
        let mut repaired = 0u64;
        for row in rows {
            let id: i64 = row.get("cycle_id");
            let raw: serde_json::Value = row.get("matches");
            if is_legacy_shape(&raw) {
                match repair_legacy_row(&raw) {
                    Ok(fixed) => {
                        sqlx::query("UPDATE oddyssey_cycles SET matches = $1 WHERE cycle_id = $2")
                            .bind(&fixed)
                            .bind(id)
                            .execute(&self.pool)
                            .await?;
                        repaired += 1;
                    }
                    Err(e) => warn!("cycle {id} has a corrupt legacy snapshot that could not be repaired: {e}"),
                }
            }
        }
        Ok(repaired)
    }

    async fn max_cycle_id(&self) -> Result<Option<i64>, OddysseyError> {
        let row = sqlx::query("SELECT MAX(cycle_id) AS max_id FROM oddyssey_cycles").fetch_one(&self.pool).await?;
        Ok(row.get("max_id"))
    }

    async fn get_daily_selection(&self, game_date: NaiveDate) -> Result<Option<Vec<i64>>, OddysseyError> {
        let row = sqlx::query("SELECT fixture_ids FROM oddyssey_daily_selections WHERE game_date = $1")
            .bind(game_date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(r) => {
                let raw: serde_json::Value = r.get("fixture_ids");
                let ids: Vec<i64> = serde_json::from_value(raw)
                    .map_err(|e| crate::error::InvariantError::CorruptSnapshot(e.to_string()))?;
                Some(ids)
            }
            None => None,
        })
    }

    async fn persist_daily_selection(&self, game_date: NaiveDate, fixture_ids: &[i64]) -> Result<(), OddysseyError> {
        let ids_json = serde_json::to_value(fixture_ids)
            .map_err(|e| crate::error::InvariantError::CorruptSnapshot(e.to_string()))?;
        sqlx::query(
            r#"INSERT INTO oddyssey_daily_selections (game_date, fixture_ids, created_at)
               VALUES ($1, $2, NOW())
               ON CONFLICT (game_date) DO NOTHING"#,
        )
        .bind(game_date)
        .bind(&ids_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_alert(&self, severity: &str, message: &str, details: serde_json::Value) -> Result<(), OddysseyError> {
        sqlx::query(
            "INSERT INTO oddyssey_alerts (severity, message, details, created_at) VALUES ($1, $2, $3, NOW())",
        )
        .bind(severity)
        .bind(message)
        .bind(&details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
