use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,

    pub chain_rpc_url: String,
    pub fallback_rpc_url: Option<String>,
    pub oddyssey_contract_address: String,
    pub oracle_private_key: String,

    pub matches_per_cycle: usize,
    pub min_kickoff_hour_utc: u32,
    pub cycle_duration_hours: i64,
    pub resolution_buffer_hours: i64,
    pub claim_delay_hours: i64,
    pub cycle_cleanup_days: i64,
    pub daily_match_cleanup_days: i64,

    pub placement_rate_limit: u32,
    pub placement_rate_window_secs: u64,

    pub rpc_timeout_ms: u64,
    pub rpc_max_retries: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),

            chain_rpc_url: env::var("CHAIN_RPC_URL").expect("CHAIN_RPC_URL must be set"),
            fallback_rpc_url: env::var("FALLBACK_RPC_URL").ok().filter(|s| !s.is_empty()),
            oddyssey_contract_address: env::var("ODDYSSEY_CONTRACT_ADDRESS")
                .expect("ODDYSSEY_CONTRACT_ADDRESS must be set"),
            oracle_private_key: env::var("ORACLE_PRIVATE_KEY")
                .expect("ORACLE_PRIVATE_KEY must be set"),

            matches_per_cycle: parse_env_or("MATCHES_PER_CYCLE", 10),
            min_kickoff_hour_utc: parse_env_or("MIN_KICKOFF_HOUR_UTC", 11),
            cycle_duration_hours: parse_env_or("CYCLE_DURATION_HOURS", 24),
            resolution_buffer_hours: parse_env_or("RESOLUTION_BUFFER_HOURS", 2),
            claim_delay_hours: parse_env_or("CLAIM_DELAY_HOURS", 0),
            cycle_cleanup_days: parse_env_or("CYCLE_CLEANUP_DAYS", 30),
            daily_match_cleanup_days: parse_env_or("DAILY_MATCH_CLEANUP_DAYS", 7),

            placement_rate_limit: parse_env_or("PLACEMENT_RATE_LIMIT", 3),
            placement_rate_window_secs: parse_env_or("PLACEMENT_RATE_WINDOW_SECS", 60),

            rpc_timeout_ms: parse_env_or("RPC_TIMEOUT_MS", 8_000),
            rpc_max_retries: parse_env_or("RPC_MAX_RETRIES", 3),
        }
    }
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            eprintln!("Warning: invalid value for {key}, using default");
            default
        }),
        Err(_) => default,
    }
}
