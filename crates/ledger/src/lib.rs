use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use yharvest_core::money::Money;

pub mod error;
pub mod gateway;
pub mod mock;
pub mod retry;

pub use error::LedgerError;

/// Everything the escrow contract needs to open a deposit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub invoice_id: String,
    pub nft_ref: Option<String>,
    pub investor: String,
    pub amount: Money,
    pub due_date: NaiveDate,
    pub file_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositOutcome {
    pub escrow_id: String,
    pub transaction_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub transaction_ref: String,
}

/// Receipt for a message accepted by the consensus log. The sequence number
/// is the log's own ordering, never client wall-clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencedReceipt {
    pub sequence: u64,
    pub transaction_ref: String,
}

/// The three contract operations the accounting layer needs. Implementations
/// translate calls and receipts; they own no business state of their own.
/// At-most-once funding and exactly-once release are the contract's
/// guarantees, surfaced here as business rejections, never re-implemented.
#[async_trait]
pub trait EscrowLedger: Send + Sync {
    async fn deposit(&self, request: DepositRequest) -> Result<DepositOutcome, LedgerError>;
    async fn release(&self, escrow_id: &str) -> Result<SettlementOutcome, LedgerError>;
    async fn refund(&self, escrow_id: &str) -> Result<SettlementOutcome, LedgerError>;
}

/// Append-only consensus log used for audit journaling.
#[async_trait]
pub trait ConsensusJournal: Send + Sync {
    async fn submit(&self, message: &[u8]) -> Result<SequencedReceipt, LedgerError>;
}
