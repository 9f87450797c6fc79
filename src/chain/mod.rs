//! Abstracts the on-chain Oddyssey contract with retries and sane timeouts.
//! The core never implements the contract itself — only the ABI surface it
//! consumes.

pub mod ethers_gateway;
pub mod types;

pub use ethers_gateway::EthersChainGateway;
pub use types::{ChainMatch, ChainPrediction, ChainResult};

use async_trait::async_trait;

use crate::error::OddysseyError;

#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn submit_daily_cycle(&self, matches: [ChainMatch; 10]) -> Result<String, OddysseyError>;
    async fn submit_cycle_results(&self, cycle_id: i64, results: [ChainResult; 10]) -> Result<String, OddysseyError>;
    async fn get_current_cycle_id(&self) -> Result<i64, OddysseyError>;
    async fn get_cycle_matches(&self, cycle_id: i64) -> Result<[ChainMatch; 10], OddysseyError>;
    async fn place_slip(&self, predictions: [ChainPrediction; 10]) -> Result<String, OddysseyError>;
    async fn claim_prize(&self, cycle_id: i64, slip_id: i64, player: &str) -> Result<String, OddysseyError>;
}
