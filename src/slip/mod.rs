//! Validates, persists, transforms, evaluates and ranks slips. Owns no
//! database pool directly — it composes a [`SlipStore`], a
//! [`crate::cycle::CycleStore`] and a [`crate::chain::ChainGateway`] passed
//! in at construction.

pub mod prediction;
pub mod store;
pub mod types;

pub use prediction::{MoneylinePick, OverUnderPick, Selection, SelectionInput};
pub use store::{PostgresSlipStore, PrizeClaim, SlipStore};
pub use types::{Prediction, Slip};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::chain::{ChainGateway, ChainPrediction};
use crate::cycle::{CycleMatch, CycleStore, Moneyline, OverUnder};
use crate::error::{OddysseyError, PredicateError};
use crate::lock::LockRegistry;
use crate::odds::truncating_multiply;

/// The rank → prize-pool-share table, applied to the top 5 eligible slips.
const PRIZE_SHARES_PERCENT: [u64; 5] = [40, 30, 20, 5, 5];

/// A prediction as submitted by a caller, before it has been matched against
/// the cycle's on-chain odds.
pub struct RawPrediction {
    pub fixture_id: i64,
    pub selection: SelectionInput,
    pub selected_odd: u32,
}

pub struct SlipPipeline {
    cycles: Arc<dyn CycleStore>,
    chain: Arc<dyn ChainGateway>,
    slips: Arc<dyn SlipStore>,
    locks: Arc<LockRegistry>,
    placement_rate_limit: u32,
    placement_rate_window: Duration,
}

impl SlipPipeline {
    pub fn new(
        cycles: Arc<dyn CycleStore>,
        chain: Arc<dyn ChainGateway>,
        slips: Arc<dyn SlipStore>,
        locks: Arc<LockRegistry>,
        placement_rate_limit: u32,
        placement_rate_window: Duration,
    ) -> Self {
        Self { cycles, chain, slips, locks, placement_rate_limit, placement_rate_window }
    }

    pub async fn place_slip(
        &self,
        player: &str,
        cycle_id: Option<i64>,
        raw: Vec<RawPrediction>,
    ) -> Result<Slip, OddysseyError> {
        let rate_key = format!("placeSlip:{player}");
        if !self.locks.check_rate(&rate_key, self.placement_rate_limit, self.placement_rate_window).await {
            return Err(PredicateError::RateLimited.into());
        }

        let cycle = match cycle_id {
            Some(id) => self.cycles.get_cycle(id).await?,
            None => self.cycles.get_current_cycle().await?,
        }
        .ok_or(PredicateError::NoCurrentCycle)?;

        if cycle.closed_for_betting(Utc::now()) {
            return Err(PredicateError::SlipClosedForBetting.into());
        }

        let on_chain = self.chain.get_cycle_matches(cycle.id).await?;

        let predictions: Vec<Prediction> = raw
            .iter()
            .map(|r| {
                Ok::<_, OddysseyError>(Prediction {
                    fixture_id: r.fixture_id,
                    selection: r.selection.resolve()?,
                    selected_odd: r.selected_odd,
                })
            })
            .collect::<Result<_, _>>()?;

        validate_against_chain(&predictions, &on_chain)?;

        let chain_predictions: Vec<ChainPrediction> = predictions
            .iter()
            .map(|p| ChainPrediction {
                fixture_id: p.fixture_id as u64,
                bet_type: p.selection.bet_type(),
                selection: p.selection.keccak(),
                selected_odd: p.selected_odd,
            })
            .collect();
        let chain_predictions: [ChainPrediction; 10] = chain_predictions
            .try_into()
            .map_err(|_| crate::error::InvariantError::WrongMatchCount(predictions.len()))?;

        let tx_hash = self.chain.place_slip(chain_predictions).await?;

        let id = self.slips.next_slip_id().await?;
        let slip = self.slips.insert_slip(id, cycle.id, player, predictions, &tx_hash).await?;

        info!("slip {id} placed by {player} on cycle {}", cycle.id);
        Ok(slip)
    }

    /// Idempotent: a re-evaluated slip is returned unchanged.
    pub async fn evaluate_slip(&self, slip_id: i64) -> Result<Slip, OddysseyError> {
        let slip = self.slips.get_slip(slip_id).await?.ok_or(PredicateError::NoCurrentCycle)?;
        if slip.is_evaluated {
            return Ok(slip);
        }

        let cycle = self.cycles.get_cycle(slip.cycle_id).await?.ok_or(PredicateError::NoCurrentCycle)?;
        let outcomes: std::collections::HashMap<i64, &CycleMatch> =
            cycle.matches.iter().map(|m| (m.fixture_id, m)).collect();

        let mut correct_count = 0u8;
        let mut score = 1000u64;
        for p in &slip.predictions {
            let Some(m) = outcomes.get(&p.fixture_id) else { continue };
            let is_correct = match p.selection {
                Selection::Moneyline(pick) => moneyline_matches(pick, m.result_moneyline),
                Selection::OverUnder(pick) => over_under_matches(pick, m.result_over_under),
            };
            if is_correct {
                correct_count += 1;
                score = truncating_multiply(score, p.selected_odd);
            }
        }
        let final_score = if correct_count == 0 { 0 } else { score };

        self.slips.mark_evaluated(slip_id, correct_count, final_score).await?;
        info!("slip {slip_id} evaluated: correctCount={correct_count} finalScore={final_score}");

        Ok(Slip { is_evaluated: true, correct_count, final_score, ..slip })
    }

    pub async fn evaluate_all_for_cycle(&self, cycle_id: i64) -> Result<(), OddysseyError> {
        let slips = self.slips.list_slips_for_cycle(cycle_id).await?;
        for slip in slips {
            self.evaluate_slip(slip.id).await?;
        }
        self.rank_cycle(cycle_id).await?;
        Ok(())
    }

    /// Ranks evaluated slips for a resolved cycle.
    /// Only slips with `correctCount >= 7` are eligible; the top 5 are
    /// assigned a prize share of the cycle's pool.
    pub async fn rank_cycle(&self, cycle_id: i64) -> Result<Vec<Slip>, OddysseyError> {
        let cycle = self.cycles.get_cycle(cycle_id).await?.ok_or(PredicateError::NoCurrentCycle)?;
        let mut slips = self.slips.list_slips_for_cycle(cycle_id).await?;

        let mut eligible: Vec<Slip> = slips.drain(..).filter(|s| s.is_evaluated && s.correct_count >= 7).collect();
        eligible.sort_by(|a, b| {
            b.final_score
                .cmp(&a.final_score)
                .then(b.correct_count.cmp(&a.correct_count))
                .then(a.placed_at.cmp(&b.placed_at))
        });

        let mut ranked = Vec::with_capacity(eligible.len());
        for (i, mut slip) in eligible.into_iter().enumerate() {
            let rank = (i + 1) as u8;
            self.slips.set_rank(slip.id, Some(rank)).await?;
            slip.leaderboard_rank = Some(rank);

            if let Some(share) = PRIZE_SHARES_PERCENT.get(i) {
                let amount = (cycle.prize_pool * (*share as u128)) / 100;
                self.slips.upsert_prize_claim(cycle_id, slip.id, &slip.player, rank, amount).await?;
            }
            ranked.push(slip);
        }

        info!("ranked {} eligible slips for cycle {cycle_id}", ranked.len());
        Ok(ranked)
    }

    /// A player may claim once per (cycle, slip, player); only after the
    /// slip is evaluated, the cycle resolved, the slip holds a ranked prize,
    /// and `now` is past the cycle's `claimable_start`. `now` is supplied
    /// by the caller rather than read internally, matching
    /// `Cycle::closed_for_betting`'s pattern elsewhere in this crate.
    pub async fn claim_prize(&self, cycle_id: i64, slip_id: i64, player: &str, now: chrono::DateTime<Utc>) -> Result<String, OddysseyError> {
        let slip = self.slips.get_slip(slip_id).await?.ok_or(PredicateError::NoCurrentCycle)?;
        if slip.player != player {
            return Err(PredicateError::UnauthorizedClaim.into());
        }

        let claim = self
            .slips
            .get_claim(cycle_id, slip_id, player)
            .await?
            .ok_or(PredicateError::NotEligibleForPrize { correct_count: slip.correct_count })?;

        if claim.claimed {
            return Err(PredicateError::AlreadyClaimed.into());
        }

        let cycle = self.cycles.get_cycle(cycle_id).await?.ok_or(PredicateError::NoCurrentCycle)?;
        if !cycle.resolved || !slip.is_evaluated || slip.correct_count < 7 {
            return Err(PredicateError::NotEligibleForPrize { correct_count: slip.correct_count }.into());
        }
        if now < cycle.claimable_start {
            return Err(PredicateError::ClaimWindowNotOpen.into());
        }

        let tx_hash = self.chain.claim_prize(cycle_id, slip_id, player).await?;
        self.slips.mark_claimed(cycle_id, slip_id, player, &tx_hash, Utc::now()).await?;
        Ok(tx_hash)
    }
}

fn moneyline_matches(pick: MoneylinePick, result: Moneyline) -> bool {
    matches!(
        (pick, result),
        (MoneylinePick::Home, Moneyline::Home) | (MoneylinePick::Draw, Moneyline::Draw) | (MoneylinePick::Away, Moneyline::Away)
    )
}

fn over_under_matches(pick: OverUnderPick, result: OverUnder) -> bool {
    matches!((pick, result), (OverUnderPick::Over, OverUnder::Over) | (OverUnderPick::Under, OverUnder::Under))
}

/// Verifies the prediction set is, as a set, exactly the cycle's ten
/// fixtures, and each `selectedOdd` matches the on-chain odds for that
/// fixture's market.
fn validate_against_chain(predictions: &[Prediction], on_chain: &[crate::chain::ChainMatch; 10]) -> Result<(), OddysseyError> {
    let predicted_ids: HashSet<i64> = predictions.iter().map(|p| p.fixture_id).collect();
    let chain_ids: HashSet<i64> = on_chain.iter().map(|m| m.id as i64).collect();
    if predicted_ids != chain_ids || predictions.len() != 10 {
        return Err(PredicateError::PredictionMismatch.into());
    }

    for p in predictions {
        let m = on_chain.iter().find(|m| m.id as i64 == p.fixture_id).expect("checked above");
        let expected_odd = match p.selection {
            Selection::Moneyline(MoneylinePick::Home) => m.odds_home,
            Selection::Moneyline(MoneylinePick::Draw) => m.odds_draw,
            Selection::Moneyline(MoneylinePick::Away) => m.odds_away,
            Selection::OverUnder(OverUnderPick::Over) => m.odds_over,
            Selection::OverUnder(OverUnderPick::Under) => m.odds_under,
        };
        if expected_odd != p.selected_odd {
            return Err(PredicateError::PredictionMismatch.into());
        }
    }

    Ok(())
}
