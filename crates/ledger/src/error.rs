use std::time::Duration;
use thiserror::Error;

/// Adapter-boundary error taxonomy. Business rejections are final; only
/// `Unavailable` and `Timeout` may be retried, with capped backoff.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient balance for deposit")]
    InsufficientBalance,

    #[error("invoice {0} is not open for funding")]
    NotFundable(String),

    #[error("invoice {0} already has an active escrow")]
    AlreadyFunded(String),

    #[error("escrow {0} is already settled")]
    AlreadySettled(String),

    #[error("escrow {0} cannot be refunded before its due date")]
    NotYetDue(String),

    #[error("unknown escrow: {0}")]
    UnknownEscrow(String),

    #[error("ledger rejected the call: {0}")]
    Rejected(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),
}

impl LedgerError {
    /// Transient infrastructure faults are worth a retry; business
    /// rejections never are.
    pub fn is_retriable(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_) | LedgerError::Timeout(_))
    }
}
