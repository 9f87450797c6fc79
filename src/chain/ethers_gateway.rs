use std::sync::Arc;

use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::core::k256::ecdsa::SigningKey;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer, Wallet};
use ethers::types::{Address, H256};
use tokio::sync::RwLock;
use tracing::{error, warn};

use crate::error::{ExternalError, OddysseyError, TransientError};
use crate::retry::RetryPolicy;
use super::types::{ChainMatch, ChainPrediction, ChainResult};
use super::ChainGateway;

abigen!(
    OddysseyContract,
    r#"[
        function dailyCycleId() external view returns (uint256)
        function getCurrentCycle() external view returns (uint256)
        function getCycleMatches(uint256 cycleId) external view returns (tuple(uint64 id, uint64 startTime, uint32 oddsHome, uint32 oddsDraw, uint32 oddsAway, uint32 oddsOver, uint32 oddsUnder, tuple(uint8 moneyline, uint8 overUnder) result)[10])
        function startDailyCycle(tuple(uint64 id, uint64 startTime, uint32 oddsHome, uint32 oddsDraw, uint32 oddsAway, uint32 oddsOver, uint32 oddsUnder, tuple(uint8 moneyline, uint8 overUnder) result)[10] matches) external returns (bytes32)
        function resolveDailyCycle(uint256 cycleId, tuple(uint8 moneyline, uint8 overUnder)[10] results) external returns (bytes32)
        function placeSlip(tuple(uint64 fixtureId, uint8 betType, bytes32 selection, uint32 selectedOdd)[10] predictions) external payable returns (bytes32)
        function evaluateSlip(uint256 slipId) external returns (bytes32)
        function claimPrize(uint256 cycleId) external returns (bytes32)
        function getUserSlipCount(address user) external view returns (uint256)
    ]"#,
);

type SignerProvider = SignerMiddleware<Provider<Http>, Wallet<SigningKey>>;

/// Wraps the Oddyssey contract with a retry policy and a primary/fallback
/// RPC pair. `submitCycleResults`, the one call here with both a natural key
/// (`cycleId`) and a cheap read (`getCycleMatches`) to check it against,
/// looks up whether that cycle's results already landed before resubmitting
/// — covering the case where a prior attempt's transaction confirmed but the
/// RPC call reporting success timed out. `startDailyCycle`, `placeSlip` and
/// `claimPrize` have no such pre-image exposed on the ABI surface and are
/// not checked; they rely on retry/failover alone.
pub struct EthersChainGateway {
    primary: Arc<RwLock<Arc<SignerProvider>>>,
    fallback_url: Option<String>,
    private_key: String,
    contract_address: Address,
    retry: RetryPolicy,
}

impl EthersChainGateway {
    pub async fn new(
        rpc_url: &str,
        fallback_url: Option<String>,
        contract_address: Address,
        private_key: &str,
        rpc_max_retries: u32,
    ) -> Result<Self, OddysseyError> {
        let provider = build_signer(rpc_url, private_key).await?;
        Ok(Self {
            primary: Arc::new(RwLock::new(Arc::new(provider))),
            fallback_url,
            private_key: private_key.to_string(),
            contract_address,
            retry: RetryPolicy::from_config(rpc_max_retries, 500),
        })
    }

    async fn contract(&self) -> OddysseyContract<SignerProvider> {
        let provider = self.primary.read().await.clone();
        OddysseyContract::new(self.contract_address, provider)
    }

    /// Swaps to the configured fallback RPC after repeated transient
    /// failures against the primary.
    async fn swap_to_fallback(&self) {
        let Some(url) = self.fallback_url.clone() else { return };
        warn!("swapping chain gateway to fallback RPC {url}");
        match build_signer(&url, &self.private_key).await {
            Ok(provider) => {
                *self.primary.write().await = Arc::new(provider);
            }
            Err(e) => error!("fallback RPC swap failed: {e}"),
        }
    }

    /// Runs `op` through the retry policy; if every attempt against the
    /// current provider fails transiently and a fallback RPC is
    /// configured, swaps to it and gives the operation one more try.
    async fn with_failover<T, F, Fut>(&self, label: &str, op: F) -> Result<T, OddysseyError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, OddysseyError>>,
    {
        match self.retry.run(label, &op).await {
            Ok(v) => Ok(v),
            Err(e) if e.classify() == crate::error::ErrorClass::Transient && self.fallback_url.is_some() => {
                self.swap_to_fallback().await;
                self.retry.run(label, &op).await
            }
            Err(e) => Err(e),
        }
    }
}

async fn build_signer(rpc_url: &str, private_key: &str) -> Result<SignerProvider, OddysseyError> {
    let provider = Provider::<Http>::try_from(rpc_url)
        .map_err(|e| OddysseyError::Transient(TransientError::RpcTimeout(e.to_string())))?;
    let wallet: LocalWallet = private_key
        .parse()
        .map_err(|e: ethers::signers::WalletError| OddysseyError::External(ExternalError::NonceAccountingFailure(e.to_string())))?;
    let chain_id = provider
        .get_chainid()
        .await
        .map_err(|e| OddysseyError::Transient(TransientError::RpcTimeout(e.to_string())))?
        .as_u64();
    Ok(SignerMiddleware::new(provider, wallet.with_chain_id(chain_id)))
}

fn to_hash(h: H256) -> String {
    format!("{h:#x}")
}

fn classify_provider_error<E: std::fmt::Display>(e: E) -> OddysseyError {
    // ethers surfaces both transport-level timeouts and contract-level
    // reverts through the same error type tree; a revert string is never
    // worth retrying, everything else (RPC timeout, nonce desync transient
    // to a single node) is.
    let msg = e.to_string();
    if msg.contains("revert") || msg.contains("execution reverted") {
        OddysseyError::External(ExternalError::ContractReverted(msg))
    } else if msg.contains("nonce") {
        OddysseyError::External(ExternalError::NonceAccountingFailure(msg))
    } else {
        OddysseyError::Transient(TransientError::RpcTimeout(msg))
    }
}

#[async_trait]
impl ChainGateway for EthersChainGateway {
    async fn submit_daily_cycle(&self, matches: [ChainMatch; 10]) -> Result<String, OddysseyError> {
        let payload: Vec<_> = matches
            .iter()
            .map(|m| {
                (
                    m.id,
                    m.start_time,
                    m.odds_home,
                    m.odds_draw,
                    m.odds_away,
                    m.odds_over,
                    m.odds_under,
                    (m.result.moneyline, m.result.over_under),
                )
            })
            .collect();

        self.with_failover("submitDailyCycle", || async {
                let contract = self.contract().await;
                let call = contract.start_daily_cycle(payload.clone().try_into().unwrap());
                let pending = call.send().await.map_err(classify_provider_error)?;
                let receipt = pending
                    .await
                    .map_err(|e| classify_provider_error(e.to_string()))?
                    .ok_or_else(|| OddysseyError::Transient(TransientError::RpcTimeout("no receipt".into())))?;
                Ok(to_hash(receipt.transaction_hash))
            })
            .await
    }

    async fn submit_cycle_results(&self, cycle_id: i64, results: [ChainResult; 10]) -> Result<String, OddysseyError> {
        if let Ok(existing) = self.get_cycle_matches(cycle_id).await {
            if existing.iter().all(|m| m.result.moneyline != 0 || m.result.over_under != 0) {
                warn!("cycle {cycle_id} already has results on-chain; skipping resubmission");
                return Ok(String::new());
            }
        }

        let payload: Vec<_> = results.iter().map(|r| (r.moneyline, r.over_under)).collect();

        self.with_failover("submitCycleResults", || async {
                let contract = self.contract().await;
                let call = contract.resolve_daily_cycle(cycle_id.into(), payload.clone().try_into().unwrap());
                let pending = call.send().await.map_err(classify_provider_error)?;
                let receipt = pending
                    .await
                    .map_err(|e| classify_provider_error(e.to_string()))?
                    .ok_or_else(|| OddysseyError::Transient(TransientError::RpcTimeout("no receipt".into())))?;
                Ok(to_hash(receipt.transaction_hash))
            })
            .await
    }

    async fn get_current_cycle_id(&self) -> Result<i64, OddysseyError> {
        self.with_failover("getCurrentCycleId", || async {
                let contract = self.contract().await;
                let id = contract.get_current_cycle().call().await.map_err(classify_provider_error)?;
                Ok(id.as_u64() as i64)
            })
            .await
    }

    async fn get_cycle_matches(&self, cycle_id: i64) -> Result<[ChainMatch; 10], OddysseyError> {
        self.with_failover("getCycleMatches", || async {
                let contract = self.contract().await;
                let raw = contract
                    .get_cycle_matches(cycle_id.into())
                    .call()
                    .await
                    .map_err(classify_provider_error)?;
                let matches: Vec<ChainMatch> = raw
                    .into_iter()
                    .map(|m| ChainMatch {
                        id: m.0,
                        start_time: m.1,
                        odds_home: m.2,
                        odds_draw: m.3,
                        odds_away: m.4,
                        odds_over: m.5,
                        odds_under: m.6,
                        result: ChainResult { moneyline: m.7 .0, over_under: m.7 .1 },
                    })
                    .collect();
                matches
                    .try_into()
                    .map_err(|_| OddysseyError::Invariant(crate::error::InvariantError::WrongMatchCount(0)))
            })
            .await
    }

    async fn place_slip(&self, predictions: [ChainPrediction; 10]) -> Result<String, OddysseyError> {
        let payload: Vec<_> = predictions
            .iter()
            .map(|p| (p.fixture_id, p.bet_type, p.selection, p.selected_odd))
            .collect();

        self.with_failover("placeSlip", || async {
                let contract = self.contract().await;
                let call = contract.place_slip(payload.clone().try_into().unwrap());
                let pending = call.send().await.map_err(classify_provider_error)?;
                let receipt = pending
                    .await
                    .map_err(|e| classify_provider_error(e.to_string()))?
                    .ok_or_else(|| OddysseyError::Transient(TransientError::RpcTimeout("no receipt".into())))?;
                Ok(to_hash(receipt.transaction_hash))
            })
            .await
    }

    async fn claim_prize(&self, cycle_id: i64, _slip_id: i64, _player: &str) -> Result<String, OddysseyError> {
        self.with_failover("claimPrize", || async {
                let contract = self.contract().await;
                let call = contract.claim_prize(cycle_id.into());
                let pending = call.send().await.map_err(classify_provider_error)?;
                let receipt = pending
                    .await
                    .map_err(|e| classify_provider_error(e.to_string()))?
                    .ok_or_else(|| OddysseyError::Transient(TransientError::RpcTimeout("no receipt".into())))?;
                Ok(to_hash(receipt.transaction_hash))
            })
            .await
    }
}
