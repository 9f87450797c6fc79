//! `selectDaily`: chooses exactly ten fixtures for a given date from a
//! large candidate pool using league-priority, odds-quality and
//! time-distribution scoring.

pub mod leagues;
pub mod scoring;

use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::error::{InvariantError, OddysseyError, PredicateError};
use crate::fixtures::{Candidate, FixtureReadModel};
use scoring::{score_candidates, Scored};
use leagues::HIGH_PRIORITY_THRESHOLD;

pub const MATCHES_PER_CYCLE: usize = 10;

pub struct MatchSelector<'a> {
    fixtures: &'a dyn FixtureReadModel,
    min_kickoff_hour_utc: u32,
}

impl<'a> MatchSelector<'a> {
    pub fn new(fixtures: &'a dyn FixtureReadModel, min_kickoff_hour_utc: u32) -> Self {
        Self { fixtures, min_kickoff_hour_utc }
    }

    pub async fn select_daily(&self, date: NaiveDate) -> Result<Vec<Candidate>, OddysseyError> {
        let mut candidates = self.fixtures.candidates_for_date(date, self.min_kickoff_hour_utc, false).await?;

        if candidates.len() < MATCHES_PER_CYCLE {
            warn!(
                "only {} strict candidates for {date}, retrying with relaxed OU odds",
                candidates.len()
            );
            candidates = self.fixtures.candidates_for_date(date, self.min_kickoff_hour_utc, true).await?;
        }

        if candidates.len() < MATCHES_PER_CYCLE {
            return Err(OddysseyError::Predicate(PredicateError::InsufficientCandidates));
        }

        let seed = seed_from_date(date);
        let scored = score_candidates(&candidates, seed);
        let selected_indices = select_with_diversity(&scored, &candidates);

        let chosen: Vec<Candidate> = selected_indices.into_iter().map(|i| candidates[i].clone()).collect();
        let validated = validate_selection(chosen)?;

        info!("selected {} matches for {date}", validated.len());
        Ok(sort_by_kickoff(validated))
    }
}

fn seed_from_date(date: NaiveDate) -> u64 {
    // Deterministic per calendar day: stable across retries in the same
    // call, but differs day to day.
    date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp() as u64
}

/// Sorts descending by score, then walks twice: first admitting at most two
/// matches per high-priority league, then filling remaining slots with the
/// best available regardless of league.
fn select_with_diversity(scored: &[Scored], candidates: &[Candidate]) -> Vec<usize> {
    let mut ordered: Vec<&Scored> = scored.iter().collect();
    ordered.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected = Vec::with_capacity(MATCHES_PER_CYCLE);
    let mut per_league_count: HashMap<&str, u32> = HashMap::new();
    let mut taken = vec![false; scored.len()];

    for s in ordered.iter() {
        if selected.len() >= MATCHES_PER_CYCLE {
            break;
        }
        if s.league_priority >= HIGH_PRIORITY_THRESHOLD {
            let league = candidates[s.index].fixture.league_name.as_str();
            let count = per_league_count.entry(league).or_insert(0);
            if *count < 2 {
                selected.push(s.index);
                taken[s.index] = true;
                *count += 1;
            }
        }
    }

    for s in ordered.iter() {
        if selected.len() >= MATCHES_PER_CYCLE {
            break;
        }
        if !taken[s.index] {
            selected.push(s.index);
            taken[s.index] = true;
        }
    }

    selected
}

fn validate_selection(chosen: Vec<Candidate>) -> Result<Vec<Candidate>, OddysseyError> {
    if chosen.len() != MATCHES_PER_CYCLE {
        return Err(OddysseyError::Invariant(InvariantError::WrongMatchCount(chosen.len())));
    }

    let mut seen = std::collections::HashSet::new();
    for c in &chosen {
        if !seen.insert(c.fixture.id) {
            return Err(OddysseyError::Invariant(InvariantError::DuplicateFixtureInCycle(seen.len())));
        }
    }

    let now = Utc::now();
    for c in &chosen {
        if c.fixture.kickoff <= now {
            return Err(OddysseyError::Invariant(InvariantError::ValidationFailed(format!(
                "fixture {} kickoff is not in the future",
                c.fixture.id
            ))));
        }
        let vals = [c.odds.home, c.odds.draw, c.odds.away];
        if vals.iter().any(|v| *v <= 1.0 || *v > 50.0) {
            return Err(OddysseyError::Invariant(InvariantError::ValidationFailed(format!(
                "fixture {} has an out-of-range moneyline odd",
                c.fixture.id
            ))));
        }
        let ou = [c.odds.over, c.odds.under];
        if ou.iter().any(|v| *v <= 1.0 || *v > 10.0) {
            return Err(OddysseyError::Invariant(InvariantError::ValidationFailed(format!(
                "fixture {} has an out-of-range OU odd",
                c.fixture.id
            ))));
        }
    }

    Ok(chosen)
}

fn sort_by_kickoff(mut chosen: Vec<Candidate>) -> Vec<Candidate> {
    chosen.sort_by_key(|c| c.fixture.kickoff);
    chosen
}
