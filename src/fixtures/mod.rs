//! Read-only view over fixtures and their 1X2 / Over-Under-2.5 odds. The
//! core never writes here — the upstream fixtures/odds provider is an
//! external collaborator that keeps this store populated.

mod store;

pub use store::PostgresFixtureReadModel;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixtureStatus {
    NotStarted,
    InProgress,
    Finished,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub id: i64,
    pub home_team: String,
    pub away_team: String,
    pub league_name: String,
    pub country: String,
    pub kickoff: DateTime<Utc>,
    pub status: FixtureStatus,
    pub finished_score: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OddsQuote {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
    pub over: f64,
    pub under: f64,
}

/// The five known default placeholders a provider fills in when a book has
/// not yet priced a market. A candidate whose odds match this tuple exactly
/// is rejected as mock data rather than sold to users as real.
const MOCK_ODDS: (f64, f64, f64, f64, f64) = (1.5, 3.0, 2.5, 1.8, 2.0);

impl OddsQuote {
    pub fn is_complete(&self) -> bool {
        [self.home, self.draw, self.away, self.over, self.under]
            .iter()
            .all(|v| *v > 1.0 && *v <= 50.0)
    }

    pub fn looks_like_mock_data(&self) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() < f64::EPSILON;
        close(self.home, MOCK_ODDS.0)
            && close(self.draw, MOCK_ODDS.1)
            && close(self.away, MOCK_ODDS.2)
            && close(self.over, MOCK_ODDS.3)
            && close(self.under, MOCK_ODDS.4)
    }

    /// Relaxed acceptance used on the selector's second pass: full 1X2 is
    /// still required, but default OU odds (1.8 / 2.0) are tolerated.
    pub fn has_complete_moneyline(&self) -> bool {
        [self.home, self.draw, self.away].iter().all(|v| *v > 1.0 && *v <= 50.0)
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub fixture: Fixture,
    pub odds: OddsQuote,
}

const WOMENS_LEAGUE_MARKERS: [&str; 3] = ["women", "female", "ladies"];

fn mentions_womens_league(fixture: &Fixture) -> bool {
    let haystacks = [
        fixture.league_name.as_str(),
        fixture.home_team.as_str(),
        fixture.away_team.as_str(),
    ];
    haystacks.iter().any(|h| {
        let lower = h.to_lowercase();
        WOMENS_LEAGUE_MARKERS.iter().any(|marker| lower.contains(marker))
    })
}

#[async_trait]
pub trait FixtureReadModel: Send + Sync {
    /// Fixtures whose kickoff falls within `date`'s UTC day, complete odds,
    /// `NotStarted`, excluding women's leagues and kickoffs before
    /// `min_kickoff_hour_utc`. Deduplicated by fixture id.
    async fn candidates_for_date(
        &self,
        date: NaiveDate,
        min_kickoff_hour_utc: u32,
        relaxed: bool,
    ) -> Result<Vec<Candidate>, sqlx::Error>;

    /// Final scores for fixtures that have finished; `None` for the rest.
    async fn results_for(&self, fixture_ids: &[i64]) -> Result<Vec<(i64, Option<(u32, u32)>)>, sqlx::Error>;

    /// Refreshes the status of the given fixtures against the upstream
    /// store before a readiness decision is made (§4.E resolution gate).
    async fn refresh_statuses(&self, fixture_ids: &[i64]) -> Result<(), sqlx::Error>;
}

/// Applies the filters that are independent of the concrete store: women's
/// leagues, minimum kickoff hour, mock-odds rejection, dedup by fixture id.
/// Kept separate from the SQL fetch so it is unit-testable without a
/// database.
pub fn apply_candidate_filters(
    raw: Vec<Candidate>,
    min_kickoff_hour_utc: u32,
    relaxed: bool,
) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .filter(|c| c.fixture.status == FixtureStatus::NotStarted)
        .filter(|c| c.fixture.kickoff > Utc::now())
        .filter(|c| !mentions_womens_league(&c.fixture))
        .filter(|c| c.fixture.kickoff.hour_utc() >= min_kickoff_hour_utc)
        .filter(|c| if relaxed { c.odds.has_complete_moneyline() } else { c.odds.is_complete() })
        .filter(|c| !c.odds.looks_like_mock_data())
        .filter(|c| seen.insert(c.fixture.id))
        .collect()
}

trait HourUtc {
    fn hour_utc(&self) -> u32;
}

impl HourUtc for DateTime<Utc> {
    fn hour_utc(&self) -> u32 {
        use chrono::Timelike;
        self.hour()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn fixture(id: i64, hour: u32, league: &str, home: &str, away: &str) -> Fixture {
        let kickoff = (Utc::now() + ChronoDuration::days(1))
            .date_naive()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
            .and_utc();
        Fixture {
            id,
            home_team: home.to_string(),
            away_team: away.to_string(),
            league_name: league.to_string(),
            country: "England".to_string(),
            kickoff,
            status: FixtureStatus::NotStarted,
            finished_score: None,
        }
    }

    fn full_odds() -> OddsQuote {
        OddsQuote { home: 2.1, draw: 3.3, away: 3.4, over: 1.9, under: 1.95 }
    }

    #[test]
    fn excludes_womens_leagues_case_insensitively() {
        let candidates = vec![
            Candidate { fixture: fixture(1, 15, "Women's Super League", "A", "B"), odds: full_odds() },
            Candidate { fixture: fixture(2, 15, "Premier League", "C FC Ladies", "D"), odds: full_odds() },
            Candidate { fixture: fixture(3, 15, "Premier League", "Arsenal", "Chelsea"), odds: full_odds() },
        ];
        let filtered = apply_candidate_filters(candidates, 11, false);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].fixture.id, 3);
    }

    #[test]
    fn excludes_kickoffs_before_minimum_hour() {
        let candidates = vec![
            Candidate { fixture: fixture(1, 9, "La Liga", "A", "B"), odds: full_odds() },
            Candidate { fixture: fixture(2, 15, "La Liga", "C", "D"), odds: full_odds() },
        ];
        let filtered = apply_candidate_filters(candidates, 11, false);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].fixture.id, 2);
    }

    #[test]
    fn rejects_mock_odds() {
        let mock = OddsQuote { home: 1.5, draw: 3.0, away: 2.5, over: 1.8, under: 2.0 };
        let candidates = vec![Candidate { fixture: fixture(1, 15, "La Liga", "A", "B"), odds: mock }];
        assert!(apply_candidate_filters(candidates, 11, false).is_empty());
    }

    #[test]
    fn deduplicates_by_fixture_id() {
        let f = fixture(1, 15, "La Liga", "A", "B");
        let candidates = vec![
            Candidate { fixture: f.clone(), odds: full_odds() },
            Candidate { fixture: f, odds: full_odds() },
        ];
        assert_eq!(apply_candidate_filters(candidates, 11, false).len(), 1);
    }

    #[test]
    fn relaxed_pass_accepts_default_ou_but_requires_full_moneyline() {
        let relaxed_odds = OddsQuote { home: 2.1, draw: 3.3, away: 3.4, over: 1.8, under: 2.0 };
        let candidates = vec![Candidate { fixture: fixture(1, 15, "La Liga", "A", "B"), odds: relaxed_odds }];
        assert_eq!(apply_candidate_filters(candidates, 11, true).len(), 1);
    }
}
