//! Owns the cycle state machine: `None → Created → Published →
//! AwaitingResults → Resolved → EvaluationComplete`, with an `Orphan`
//! terminal state for cycles whose on-chain submission never lands. Every
//! dependency is passed in at construction — no singletons.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::chain::{ChainGateway, ChainMatch, ChainResult};
use crate::cycle::{Cycle, CycleMatch, CycleStore, Moneyline, OverUnder};
use crate::error::{ErrorClass, InvariantError, OddysseyError};
use crate::fixtures::FixtureReadModel;
use crate::odds::decimal_to_scaled;
use crate::retry::RetryPolicy;
use crate::selector::MatchSelector;
use crate::slip::SlipPipeline;

pub struct CycleLifecycleManager {
    fixtures: Arc<dyn FixtureReadModel>,
    cycles: Arc<dyn CycleStore>,
    chain: Arc<dyn ChainGateway>,
    slips: Arc<SlipPipeline>,
    retry: RetryPolicy,
    min_kickoff_hour_utc: u32,
    cycle_duration_hours: i64,
    resolution_buffer_hours: i64,
    claim_delay_hours: i64,
}

impl CycleLifecycleManager {
    pub fn new(
        fixtures: Arc<dyn FixtureReadModel>,
        cycles: Arc<dyn CycleStore>,
        chain: Arc<dyn ChainGateway>,
        slips: Arc<SlipPipeline>,
        retry: RetryPolicy,
        min_kickoff_hour_utc: u32,
        cycle_duration_hours: i64,
        resolution_buffer_hours: i64,
        claim_delay_hours: i64,
    ) -> Self {
        Self {
            fixtures,
            cycles,
            chain,
            slips,
            retry,
            min_kickoff_hour_utc,
            cycle_duration_hours,
            resolution_buffer_hours,
            claim_delay_hours,
        }
    }

    /// Runs the selector and records its ten fixture ids against `date`,
    /// with overwrite protection — a day that already has a persisted
    /// selection is a no-op. Does not touch the chain or create a cycle;
    /// `createDailyCycle` re-runs selection independently and compares
    /// against what was persisted here.
    pub async fn select_and_persist_daily_matches(&self, date: NaiveDate) -> Result<(), OddysseyError> {
        if let Some(existing) = self.cycles.get_daily_selection(date).await? {
            info!("{} matches already persisted for {date}, skipping selection", existing.len());
            return Ok(());
        }

        let selector = MatchSelector::new(self.fixtures.as_ref(), self.min_kickoff_hour_utc);
        let candidates = selector.select_daily(date).await?;
        let fixture_ids: Vec<i64> = candidates.iter().map(|c| c.fixture.id).collect();
        self.cycles.persist_daily_selection(date, &fixture_ids).await?;
        info!("persisted {} selected matches for {date}", fixture_ids.len());
        Ok(())
    }

    /// Idempotent per UTC day: a second call for the same `date` returns the
    /// already-created cycle instead of minting a duplicate.
    pub async fn create_daily_cycle(&self, date: NaiveDate) -> Result<Cycle, OddysseyError> {
        if let Some(existing) = self.cycles.get_cycle_for_date(date).await? {
            info!("cycle {} already exists for {date}", existing.id);
            return Ok(existing);
        }

        let selector = MatchSelector::new(self.fixtures.as_ref(), self.min_kickoff_hour_utc);
        let candidates = selector.select_daily(date).await?;

        if let Some(persisted) = self.cycles.get_daily_selection(date).await? {
            let mut persisted_sorted = persisted.clone();
            let mut fresh_sorted: Vec<i64> = candidates.iter().map(|c| c.fixture.id).collect();
            persisted_sorted.sort_unstable();
            fresh_sorted.sort_unstable();
            if persisted_sorted != fresh_sorted {
                warn!(
                    "selection drift for {date}: MatchSelectJob persisted {:?}, NewCycleJob selected {:?}",
                    persisted_sorted, fresh_sorted
                );
            }
        } else {
            let fixture_ids: Vec<i64> = candidates.iter().map(|c| c.fixture.id).collect();
            self.cycles.persist_daily_selection(date, &fixture_ids).await?;
        }

        let id = self.cycles.next_cycle_id().await?;
        let start_at = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let end_at = start_at + chrono::Duration::hours(self.cycle_duration_hours);

        let matches: Vec<CycleMatch> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| {
                Ok::<_, OddysseyError>(CycleMatch {
                    fixture_id: c.fixture.id,
                    display_order: (i + 1) as u8,
                    kickoff: c.fixture.kickoff,
                    odds_home: decimal_to_scaled(c.odds.home)?,
                    odds_draw: decimal_to_scaled(c.odds.draw)?,
                    odds_away: decimal_to_scaled(c.odds.away)?,
                    odds_over: decimal_to_scaled(c.odds.over)?,
                    odds_under: decimal_to_scaled(c.odds.under)?,
                    result_moneyline: Moneyline::Unset,
                    result_over_under: OverUnder::Unset,
                })
            })
            .collect::<Result<_, _>>()?;

        let cycle = self.cycles.create_cycle(id, date, matches, start_at, end_at).await?;

        let chain_matches: [ChainMatch; 10] =
            cycle.matches.iter().map(ChainMatch::from).collect::<Vec<_>>().try_into().map_err(|_| InvariantError::WrongMatchCount(cycle.matches.len()))?;

        let cycles = self.cycles.clone();
        let chain = self.chain.clone();
        let submit_id = cycle.id;
        let submission = self
            .retry
            .run("submitDailyCycle", || {
                let chain = chain.clone();
                let chain_matches = chain_matches;
                async move { chain.submit_daily_cycle(chain_matches).await }
            })
            .await;

        let cycle = match submission {
            Ok(hash) => {
                cycles.attach_creation_tx(submit_id, &hash).await?;
                self.cycles.get_cycle(submit_id).await?.unwrap_or(cycle)
            }
            Err(e) if e.classify() == ErrorClass::Fatal => {
                error!("cycle {submit_id} failed to publish on-chain after retries: {e}");
                cycles.mark_orphan(submit_id).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        match self.chain.get_current_cycle_id().await {
            Ok(chain_id) if chain_id != cycle.id => {
                warn!("cycle sync mismatch after creation: db={} chain={chain_id}", cycle.id);
            }
            Err(e) => warn!("could not verify chain cycle id after creation: {e}"),
            _ => {}
        }

        Ok(cycle)
    }

    /// Hourly tick during the late window. Returns the ids of cycles that
    /// were resolved this tick.
    pub async fn check_and_resolve(&self, now: DateTime<Utc>) -> Result<Vec<i64>, OddysseyError> {
        let mut resolved = Vec::new();
        for cycle in self.cycles.list_unresolved().await? {
            if now < cycle.end_time + chrono::Duration::hours(self.resolution_buffer_hours) {
                continue;
            }

            let fixture_ids = cycle.fixture_ids();
            self.fixtures.refresh_statuses(&fixture_ids).await?;
            let results = self.fixtures.results_for(&fixture_ids).await?;

            if results.len() != fixture_ids.len() || results.iter().any(|(_, score)| score.is_none()) {
                info!("cycle {} not yet ready to resolve", cycle.id);
                continue;
            }

            let outcomes: Vec<(i64, Moneyline, OverUnder)> = results
                .into_iter()
                .map(|(fixture_id, score)| {
                    let (home, away) = score.expect("checked above");
                    (fixture_id, moneyline_outcome(home, away), over_under_outcome(home, away))
                })
                .collect();

            let chain_results: [ChainResult; 10] = cycle
                .matches
                .iter()
                .map(|m| {
                    let (_, ml, ou) = outcomes.iter().find(|(id, _, _)| *id == m.fixture_id).copied().unwrap_or((m.fixture_id, Moneyline::Unset, OverUnder::Unset));
                    ChainResult::from((ml, ou))
                })
                .collect::<Vec<_>>()
                .try_into()
                .map_err(|_| InvariantError::WrongMatchCount(cycle.matches.len()))?;

            let cycle_id = cycle.id;
            let chain = self.chain.clone();
            let tx_hash = self
                .retry
                .run("submitCycleResults", || {
                    let chain = chain.clone();
                    async move { chain.submit_cycle_results(cycle_id, chain_results).await }
                })
                .await?;

            let claimable_start = now + chrono::Duration::hours(self.claim_delay_hours);
            self.cycles.submit_results(cycle_id, outcomes, now, claimable_start).await?;
            self.cycles.attach_resolution_tx(cycle_id, &tx_hash).await?;
            self.evaluate_cycle(cycle_id).await?;
            resolved.push(cycle_id);
        }
        Ok(resolved)
    }

    /// `Resolved → EvaluationComplete`: evaluates every slip belonging to
    /// the cycle, ranks them, then flips the completion flag.
    pub async fn evaluate_cycle(&self, cycle_id: i64) -> Result<(), OddysseyError> {
        self.slips.evaluate_all_for_cycle(cycle_id).await?;
        self.cycles.mark_evaluation_complete(cycle_id).await?;
        Ok(())
    }

    /// Reconciles local state with the chain and repairs legacy snapshot
    /// rows; invoked at boot and whenever a sync mismatch is suspected.
    pub async fn sync_repair(&self) -> Result<(), OddysseyError> {
        let db_max = self.cycles.max_cycle_id().await?;
        match (db_max, self.chain.get_current_cycle_id().await) {
            (Some(db), Ok(chain)) if db != chain => {
                warn!("sync repair found mismatch: db max cycle id {db} vs chain current {chain}");
            }
            (None, Ok(_)) => {}
            (_, Err(e)) => warn!("sync repair could not reach chain: {e}"),
            _ => {}
        }

        let repaired = self.cycles.repair_snapshot_types().await?;
        if repaired > 0 {
            info!("repaired {repaired} legacy cycle snapshot rows");
        }
        Ok(())
    }
}

fn moneyline_outcome(home: u32, away: u32) -> Moneyline {
    use std::cmp::Ordering;
    match home.cmp(&away) {
        Ordering::Greater => Moneyline::Home,
        Ordering::Equal => Moneyline::Draw,
        Ordering::Less => Moneyline::Away,
    }
}

/// `total > 2.5 ⇒ Over`: since goals are integers this is equivalent to
/// `total >= 3`.
fn over_under_outcome(home: u32, away: u32) -> OverUnder {
    if home + away > 2 {
        OverUnder::Over
    } else {
        OverUnder::Under
    }
}
