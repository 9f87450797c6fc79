use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use ethers::types::Address;
use oddyssey_core::chain::EthersChainGateway;
use oddyssey_core::cycle::PostgresCycleStore;
use oddyssey_core::fixtures::PostgresFixtureReadModel;
use oddyssey_core::health::HealthMonitor;
use oddyssey_core::lifecycle::CycleLifecycleManager;
use oddyssey_core::lock::LockRegistry;
use oddyssey_core::retry::RetryPolicy;
use oddyssey_core::scheduler::Scheduler;
use oddyssey_core::slip::{PostgresSlipStore, SlipPipeline};
use oddyssey_core::{db, Config};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenvy::dotenv().ok();

    info!("🚀 Starting Oddyssey core engine...");

    let config = Config::from_env();
    info!("📋 Configuration loaded");

    info!("🔌 Connecting to Postgres...");
    let pool = db::connect(&config.database_url).await.context("connecting to Postgres")?;
    info!("✅ Connected to Postgres");

    let contract_address = Address::from_str(&config.oddyssey_contract_address)
        .context("parsing ODDYSSEY_CONTRACT_ADDRESS")?;
    info!("⛓️  Connecting to chain RPC...");
    let chain = Arc::new(
        EthersChainGateway::new(
            &config.chain_rpc_url,
            config.fallback_rpc_url.clone(),
            contract_address,
            &config.oracle_private_key,
            config.rpc_max_retries,
        )
        .await
        .context("building the chain gateway")?,
    );
    info!("✅ Chain gateway ready");

    let fixtures = Arc::new(PostgresFixtureReadModel::new(pool.clone()));
    let cycles = Arc::new(PostgresCycleStore::new(pool.clone()));
    let slip_store = Arc::new(PostgresSlipStore::new(pool.clone()));
    let locks = Arc::new(LockRegistry::new());

    let slips = Arc::new(SlipPipeline::new(
        cycles.clone(),
        chain.clone(),
        slip_store.clone(),
        locks.clone(),
        config.placement_rate_limit,
        std::time::Duration::from_secs(config.placement_rate_window_secs),
    ));

    let retry = RetryPolicy::from_config(config.rpc_max_retries, 500);
    let lifecycle = Arc::new(CycleLifecycleManager::new(
        fixtures,
        cycles.clone(),
        chain.clone(),
        slips,
        retry,
        config.min_kickoff_hour_utc,
        config.cycle_duration_hours,
        config.resolution_buffer_hours,
        config.claim_delay_hours,
    ));

    info!("🧮 Running startup sync repair...");
    if let Err(e) = lifecycle.sync_repair().await {
        tracing::warn!("startup sync repair failed: {e}");
    }

    let health = Arc::new(HealthMonitor::new(cycles.clone(), chain));
    let scheduler = Arc::new(Scheduler::new(
        locks,
        lifecycle,
        cycles,
        health,
        config.cycle_cleanup_days,
        config.daily_match_cleanup_days,
    ));

    scheduler.start().await?;
    info!("🗓️  Scheduler running — four jobs registered on the UTC calendar");

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutdown signal received");
    scheduler.stop().await?;

    Ok(())
}
