//! Read-only checks over cycle state. Never writes to business state —
//! only observes and reports.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;

use crate::chain::ChainGateway;
use crate::cycle::CycleStore;
use crate::error::OddysseyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

fn severity_str(s: Severity) -> &'static str {
    match s {
        Severity::Info => "Info",
        Severity::Warning => "Warning",
        Severity::Critical => "Critical",
    }
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub severity: Severity,
    pub message: String,
    pub details: serde_json::Value,
}

pub struct HealthMonitor {
    cycles: Arc<dyn CycleStore>,
    chain: Arc<dyn ChainGateway>,
    /// Target daily creation instant, in UTC hour/minute — 00:05 per the
    /// `NewCycleJob` schedule.
    expected_creation_hour: u32,
    expected_creation_minute: u32,
    off_schedule_tolerance: ChronoDuration,
}

impl HealthMonitor {
    pub fn new(cycles: Arc<dyn CycleStore>, chain: Arc<dyn ChainGateway>) -> Self {
        Self {
            cycles,
            chain,
            expected_creation_hour: 0,
            expected_creation_minute: 5,
            off_schedule_tolerance: ChronoDuration::minutes(15),
        }
    }

    pub async fn run_all(&self, lookback_days: i64) -> Result<Vec<Alert>, OddysseyError> {
        let mut alerts = Vec::new();
        alerts.extend(self.missing_cycles(lookback_days).await?);
        alerts.extend(self.off_schedule_creation(lookback_days).await?);
        alerts.extend(self.failed_transaction().await?);
        alerts.extend(self.delayed_resolution().await?);
        alerts.extend(self.cycle_sync().await?);

        for alert in &alerts {
            if let Err(e) = self.cycles.record_alert(severity_str(alert.severity), &alert.message, alert.details.clone()).await {
                tracing::warn!("failed to persist alert: {e}");
            }
        }

        Ok(alerts)
    }

    /// For each UTC day in the last `lookback_days`, a cycle should exist.
    pub async fn missing_cycles(&self, lookback_days: i64) -> Result<Vec<Alert>, OddysseyError> {
        let today = Utc::now().date_naive();
        let mut alerts = Vec::new();
        for offset in 1..=lookback_days {
            let date = today - ChronoDuration::days(offset);
            if self.cycles.get_cycle_for_date(date).await?.is_none() {
                alerts.push(Alert {
                    severity: Severity::Warning,
                    message: format!("no cycle found for {date}"),
                    details: json!({ "date": date.to_string() }),
                });
            }
        }
        Ok(alerts)
    }

    /// A cycle's creation instant should land within `off_schedule_tolerance`
    /// of the daily 00:05 target.
    pub async fn off_schedule_creation(&self, lookback_days: i64) -> Result<Vec<Alert>, OddysseyError> {
        let today = Utc::now().date_naive();
        let mut alerts = Vec::new();
        for offset in 1..=lookback_days {
            let date = today - ChronoDuration::days(offset);
            let Some(cycle) = self.cycles.get_cycle_for_date(date).await? else { continue };
            let target: DateTime<Utc> = date
                .and_hms_opt(self.expected_creation_hour, self.expected_creation_minute, 0)
                .unwrap()
                .and_utc();
            let drift = (cycle.created_at - target).num_seconds().abs();
            if ChronoDuration::seconds(drift) > self.off_schedule_tolerance {
                alerts.push(Alert {
                    severity: Severity::Info,
                    message: format!("cycle {} created off-schedule by {drift}s", cycle.id),
                    details: json!({ "cycleId": cycle.id, "createdAt": cycle.created_at, "driftSeconds": drift }),
                });
            }
        }
        Ok(alerts)
    }

    /// A resolved cycle must carry a resolution tx hash; a published one a
    /// creation tx hash.
    pub async fn failed_transaction(&self) -> Result<Vec<Alert>, OddysseyError> {
        let mut alerts = Vec::new();
        for cycle in self.cycles.list_unresolved().await? {
            if cycle.creation_tx_hash.is_none() {
                alerts.push(Alert {
                    severity: Severity::Critical,
                    message: format!("cycle {} has no creation tx hash", cycle.id),
                    details: json!({ "cycleId": cycle.id }),
                });
            }
            if cycle.resolved && cycle.resolution_tx_hash.is_none() {
                alerts.push(Alert {
                    severity: Severity::Critical,
                    message: format!("cycle {} is resolved but has no resolution tx hash", cycle.id),
                    details: json!({ "cycleId": cycle.id }),
                });
            }
        }
        Ok(alerts)
    }

    /// A cycle whose last kickoff is more than 4 hours past should be
    /// resolved by now.
    pub async fn delayed_resolution(&self) -> Result<Vec<Alert>, OddysseyError> {
        let now = Utc::now();
        let mut alerts = Vec::new();
        for cycle in self.cycles.list_unresolved().await? {
            let Some(latest_kickoff) = cycle.matches.iter().map(|m| m.kickoff).max() else { continue };
            if now - latest_kickoff > ChronoDuration::hours(4) {
                alerts.push(Alert {
                    severity: Severity::Critical,
                    message: format!("cycle {} is unresolved more than 4h after its last kickoff", cycle.id),
                    details: json!({ "cycleId": cycle.id, "latestKickoff": latest_kickoff }),
                });
            }
        }
        Ok(alerts)
    }

    /// DB `max(cycleId)` should equal chain `getCurrentCycleId()`.
    pub async fn cycle_sync(&self) -> Result<Vec<Alert>, OddysseyError> {
        let db_max = self.cycles.max_cycle_id().await?;
        let chain_current = self.chain.get_current_cycle_id().await;
        let alert = match (db_max, chain_current) {
            (Some(db), Ok(chain)) if db != chain => Some(Alert {
                severity: Severity::Critical,
                message: format!("db max cycle id {db} does not match chain current cycle id {chain}"),
                details: json!({ "db": db, "chain": chain }),
            }),
            (_, Err(e)) => Some(Alert {
                severity: Severity::Warning,
                message: format!("could not read chain current cycle id: {e}"),
                details: json!({}),
            }),
            _ => None,
        };
        Ok(alert.into_iter().collect())
    }
}
