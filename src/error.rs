//! The error taxonomy from which every component classifies failures as
//! transient (retry), predicate (reject), invariant (alert, fatal to the
//! current operation) or external (escalate).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransientError {
    #[error("rpc timeout: {0}")]
    RpcTimeout(String),
    #[error("database deadlock or connection loss: {0}")]
    Db(#[from] sqlx::Error),
    #[error("upstream fixture source returned a transient error: {0}")]
    Upstream(String),
}

#[derive(Debug, Error)]
pub enum PredicateError {
    #[error("fewer than ten candidates with complete odds were available")]
    InsufficientCandidates,
    #[error("prediction set did not match the cycle's on-chain matches")]
    PredictionMismatch,
    #[error("betting window for this cycle has closed")]
    SlipClosedForBetting,
    #[error("prize already claimed for this (cycle, slip, player)")]
    AlreadyClaimed,
    #[error("slip is not eligible for a prize (correctCount={correct_count})")]
    NotEligibleForPrize { correct_count: u8 },
    #[error("caller is not the owner of this slip")]
    UnauthorizedClaim,
    #[error("selection input was empty")]
    EmptySelection,
    #[error("placement rate limit exceeded for this player")]
    RateLimited,
    #[error("no cycle is currently open for betting")]
    NoCurrentCycle,
    #[error("claim window has not opened yet")]
    ClaimWindowNotOpen,
}

#[derive(Debug, Error)]
pub enum InvariantError {
    #[error("cycle has {0} distinct fixture ids, expected 10 with no duplicates")]
    DuplicateFixtureInCycle(usize),
    #[error("expected exactly 10 matches, found {0}")]
    WrongMatchCount(usize),
    #[error("db max cycle id ({db}) does not match chain current cycle id ({chain})")]
    CycleSyncMismatch { db: i64, chain: i64 },
    #[error("odds value was encoded in scientific notation: {0}")]
    ScientificNotationInOdds(String),
    #[error("cycle snapshot is corrupt: {0}")]
    CorruptSnapshot(String),
    #[error("selector produced an invalid candidate set: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("on-chain transaction reverted: {0}")]
    ContractReverted(String),
    #[error("nonce accounting failure: {0}")]
    NonceAccountingFailure(String),
}

#[derive(Debug, Error)]
pub enum OddysseyError {
    #[error(transparent)]
    Transient(#[from] TransientError),
    #[error(transparent)]
    Predicate(#[from] PredicateError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error(transparent)]
    External(#[from] ExternalError),
}

/// Retry classification used by [`crate::retry::RetryPolicy`]. Only
/// [`TransientError`] is ever retried; everything else surfaces immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Fatal,
}

impl OddysseyError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            OddysseyError::Transient(_) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }
}

impl From<sqlx::Error> for OddysseyError {
    fn from(e: sqlx::Error) -> Self {
        OddysseyError::Transient(TransientError::Db(e))
    }
}
