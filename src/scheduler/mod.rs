//! Cooperative, in-process scheduler with four jobs on the UTC calendar.
//! Each job acquires its named process-level lock for its full duration so
//! overlapping invocations are impossible, and records its last run / last
//! error in [`JobStatus`] for the health surface.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::cycle::CycleStore;
use crate::error::OddysseyError;
use crate::health::{Alert, HealthMonitor};
use crate::lifecycle::CycleLifecycleManager;
use crate::lock::LockRegistry;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default)]
pub struct JobStatus {
    pub last_run: Option<chrono::DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub running: bool,
    pub jobs: Vec<(&'static str, JobStatus)>,
}

impl SchedulerStatus {
    pub fn healthy(&self) -> bool {
        self.running && self.jobs.len() == 4
    }
}

const JOB_NAMES: [&str; 4] = ["matchSelect", "newCycle", "resolve", "cleanup"];

pub struct Scheduler {
    inner: tokio::sync::Mutex<Option<JobScheduler>>,
    locks: Arc<LockRegistry>,
    lifecycle: Arc<CycleLifecycleManager>,
    cycles: Arc<dyn CycleStore>,
    health: Arc<HealthMonitor>,
    statuses: Arc<DashMap<&'static str, JobStatus>>,
    cycle_cleanup_days: i64,
    daily_match_cleanup_days: i64,
    running: std::sync::atomic::AtomicBool,
    new_cycle_retry: RetryPolicy,
}

impl Scheduler {
    pub fn new(
        locks: Arc<LockRegistry>,
        lifecycle: Arc<CycleLifecycleManager>,
        cycles: Arc<dyn CycleStore>,
        health: Arc<HealthMonitor>,
        cycle_cleanup_days: i64,
        daily_match_cleanup_days: i64,
    ) -> Self {
        let statuses = Arc::new(DashMap::new());
        for name in JOB_NAMES {
            statuses.insert(name, JobStatus::default());
        }
        Self {
            inner: tokio::sync::Mutex::new(None),
            locks,
            lifecycle,
            cycles,
            health,
            statuses,
            cycle_cleanup_days,
            daily_match_cleanup_days,
            running: std::sync::atomic::AtomicBool::new(false),
            new_cycle_retry: RetryPolicy::new(3, std::time::Duration::from_millis(500), std::time::Duration::from_secs(30)),
        }
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), OddysseyError> {
        let mut scheduler = JobScheduler::new().await.map_err(|e| scheduler_error(e.to_string()))?;

        let me = self.clone();
        scheduler
            .add(
                Job::new_async("0 1 0 * * *", move |_uuid, _l| {
                    let me = me.clone();
                    Box::pin(async move { me.run_match_select().await })
                })
                .map_err(|e| scheduler_error(e.to_string()))?,
            )
            .await
            .map_err(|e| scheduler_error(e.to_string()))?;

        let me = self.clone();
        scheduler
            .add(
                Job::new_async("0 5 0 * * *", move |_uuid, _l| {
                    let me = me.clone();
                    Box::pin(async move { me.run_new_cycle().await })
                })
                .map_err(|e| scheduler_error(e.to_string()))?,
            )
            .await
            .map_err(|e| scheduler_error(e.to_string()))?;

        let me = self.clone();
        scheduler
            .add(
                Job::new_async("0 0 22-23,0-6 * * *", move |_uuid, _l| {
                    let me = me.clone();
                    Box::pin(async move { me.run_resolve().await })
                })
                .map_err(|e| scheduler_error(e.to_string()))?,
            )
            .await
            .map_err(|e| scheduler_error(e.to_string()))?;

        let me = self.clone();
        scheduler
            .add(
                Job::new_async("0 0 3 * * Sun", move |_uuid, _l| {
                    let me = me.clone();
                    Box::pin(async move { me.run_cleanup().await })
                })
                .map_err(|e| scheduler_error(e.to_string()))?,
            )
            .await
            .map_err(|e| scheduler_error(e.to_string()))?;

        scheduler.start().await.map_err(|e| scheduler_error(e.to_string()))?;
        *self.inner.lock().await = Some(scheduler);
        self.running.store(true, std::sync::atomic::Ordering::SeqCst);
        info!("scheduler started with 4 jobs");
        Ok(())
    }

    /// Stops future tick dispatch; an in-flight job is allowed to finish —
    /// all jobs are written to be idempotent so a crash mid-transition can
    /// be completed on the next tick.
    pub async fn stop(&self) -> Result<(), OddysseyError> {
        if let Some(mut scheduler) = self.inner.lock().await.take() {
            scheduler.shutdown().await.map_err(|e| scheduler_error(e.to_string()))?;
        }
        self.running.store(false, std::sync::atomic::Ordering::SeqCst);
        info!("scheduler stopped");
        Ok(())
    }

    pub fn status(&self) -> SchedulerStatus {
        let jobs = JOB_NAMES
            .iter()
            .map(|name| (*name, self.statuses.get(name).map(|s| s.clone()).unwrap_or_default()))
            .collect();
        SchedulerStatus { running: self.running.load(std::sync::atomic::Ordering::SeqCst), jobs }
    }

    pub async fn health_check(&self) -> Result<Vec<Alert>, OddysseyError> {
        self.health.run_all(14).await
    }

    pub async fn trigger_match_selection(&self) -> Result<(), OddysseyError> {
        self.run_match_select().await;
        Ok(())
    }

    pub async fn trigger_new_cycle(&self) -> Result<(), OddysseyError> {
        self.run_new_cycle().await;
        Ok(())
    }

    pub async fn trigger_resolution(&self) -> Result<(), OddysseyError> {
        self.run_resolve().await;
        Ok(())
    }

    async fn run_match_select(&self) {
        let _guard = self.locks.acquire("matchSelect").await;
        self.record(
            "matchSelect",
            self.lifecycle.select_and_persist_daily_matches(Utc::now().date_naive()).await,
        );
    }

    /// Up to 3 attempts with exponential backoff between them; only retries
    /// while the failure classifies as transient.
    async fn run_new_cycle(&self) {
        let _guard = self.locks.acquire("newCycle").await;
        let date = Utc::now().date_naive();
        let lifecycle = self.lifecycle.clone();
        let result = self
            .new_cycle_retry
            .run("createDailyCycle", || {
                let lifecycle = lifecycle.clone();
                async move { lifecycle.create_daily_cycle(date).await }
            })
            .await
            .map(|_| ());
        self.record("newCycle", result);
    }

    async fn run_resolve(&self) {
        let _guard = self.locks.acquire("resolve").await;
        self.record("resolve", self.lifecycle.check_and_resolve(Utc::now()).await.map(|_| ()));
    }

    async fn run_cleanup(&self) {
        let _guard = self.locks.acquire("cleanup").await;
        let result = self
            .cycles
            .purge_older_than(self.cycle_cleanup_days, self.daily_match_cleanup_days)
            .await
            .map(|_| ());
        self.record("cleanup", result);
    }

    fn record(&self, job: &'static str, result: Result<(), OddysseyError>) {
        let mut status = JobStatus { last_run: Some(Utc::now()), last_error: None };
        if let Err(e) = result {
            error!("job {job} failed: {e}");
            status.last_error = Some(e.to_string());
        }
        self.statuses.insert(job, status);
    }
}

fn scheduler_error(msg: String) -> OddysseyError {
    crate::error::TransientError::Upstream(format!("scheduler: {msg}")).into()
}
