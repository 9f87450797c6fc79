use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::{PgPool, Row};
use tracing::info;

use super::{apply_candidate_filters, Candidate, Fixture, FixtureReadModel, FixtureStatus, OddsQuote};

pub struct PostgresFixtureReadModel {
    pool: PgPool,
}

impl PostgresFixtureReadModel {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_from_str(s: &str) -> FixtureStatus {
    match s {
        "NS" | "NotStarted" => FixtureStatus::NotStarted,
        "Finished" | "FT" | "AET" | "PEN" => FixtureStatus::Finished,
        "InProgress" | "1H" | "2H" | "HT" | "ET" | "LIVE" => FixtureStatus::InProgress,
        _ => FixtureStatus::Other,
    }
}

#[async_trait]
impl FixtureReadModel for PostgresFixtureReadModel {
    async fn candidates_for_date(
        &self,
        date: NaiveDate,
        min_kickoff_hour_utc: u32,
        relaxed: bool,
    ) -> Result<Vec<Candidate>, sqlx::Error> {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let end = date.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap()).and_utc();

        let rows = sqlx::query(
            r#"
            SELECT
                f.id, f.home_team_name, f.away_team_name, f.league_name, f.country,
                f.date AS kickoff, f.status_short,
                f.home_score, f.away_score,
                o.odds_home, o.odds_draw, o.odds_away, o.odds_over, o.odds_under
            FROM football_fixtures f
            JOIN football_odds_1x2_ou o ON o.fixture_id = f.id
            WHERE f.date BETWEEN $1 AND $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let raw: Vec<Candidate> = rows
            .into_iter()
            .filter_map(|row| {
                let status_short: String = row.try_get("status_short").ok()?;
                let fixture = Fixture {
                    id: row.try_get("id").ok()?,
                    home_team: row.try_get("home_team_name").ok()?,
                    away_team: row.try_get("away_team_name").ok()?,
                    league_name: row.try_get("league_name").ok()?,
                    country: row.try_get("country").ok()?,
                    kickoff: row.try_get("kickoff").ok()?,
                    status: status_from_str(&status_short),
                    finished_score: match (row.try_get::<Option<i32>, _>("home_score").ok()?, row.try_get::<Option<i32>, _>("away_score").ok()?) {
                        (Some(h), Some(a)) => Some((h as u32, a as u32)),
                        _ => None,
                    },
                };
                let odds = OddsQuote {
                    home: row.try_get("odds_home").ok()?,
                    draw: row.try_get("odds_draw").ok()?,
                    away: row.try_get("odds_away").ok()?,
                    over: row.try_get("odds_over").ok()?,
                    under: row.try_get("odds_under").ok()?,
                };
                Some(Candidate { fixture, odds })
            })
            .collect();

        Ok(apply_candidate_filters(raw, min_kickoff_hour_utc, relaxed))
    }

    async fn results_for(&self, fixture_ids: &[i64]) -> Result<Vec<(i64, Option<(u32, u32)>)>, sqlx::Error> {
        if fixture_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT id, status_short, home_score, away_score
            FROM football_fixtures
            WHERE id = ANY($1)
            "#,
        )
        .bind(fixture_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let status_short: String = row.get("status_short");
                let score = if status_from_str(&status_short) == FixtureStatus::Finished {
                    match (row.get::<Option<i32>, _>("home_score"), row.get::<Option<i32>, _>("away_score")) {
                        (Some(h), Some(a)) => Some((h as u32, a as u32)),
                        _ => None,
                    }
                } else {
                    None
                };
                (id, score)
            })
            .collect())
    }

    /// Re-syncs status/score for exactly these fixtures from the upstream
    /// provider's staging table (`football_fixtures_live`, kept current by
    /// the external ingestion service the core never calls directly) into
    /// the canonical `football_fixtures` row `results_for` reads. Scoped to
    /// the ids the resolve gate asks about, never a bulk catalog ingest.
    async fn refresh_statuses(&self, fixture_ids: &[i64]) -> Result<(), sqlx::Error> {
        if fixture_ids.is_empty() {
            return Ok(());
        }
        let result = sqlx::query(
            r#"
            UPDATE football_fixtures AS f
            SET status_short = live.status_short,
                home_score = live.home_score,
                away_score = live.away_score
            FROM football_fixtures_live AS live
            WHERE f.id = live.id AND f.id = ANY($1)
            "#,
        )
        .bind(fixture_ids)
        .execute(&self.pool)
        .await?;
        info!("refreshed status for {}/{} fixtures from upstream", result.rows_affected(), fixture_ids.len());
        Ok(())
    }
}
