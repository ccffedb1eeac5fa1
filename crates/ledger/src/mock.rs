use super::{
    ConsensusJournal, DepositOutcome, DepositRequest, EscrowLedger, LedgerError, SequencedReceipt,
    SettlementOutcome,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use uuid::Uuid;
use yharvest_core::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockEscrowState {
    Funded,
    Released,
    Refunded,
}

#[derive(Debug, Clone)]
struct MockEscrow {
    invoice_id: String,
    state: MockEscrowState,
    due_date: NaiveDate,
}

/// In-memory stand-in for the escrow contract. Enforces the same
/// preconditions the contract does: one escrow per invoice, release and
/// refund only once, refund only after the due date.
#[derive(Default)]
pub struct MockLedger {
    escrows: Mutex<HashMap<String, MockEscrow>>,
    funded_invoices: Mutex<HashMap<String, String>>,
    balances: Mutex<HashMap<String, Money>>,
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed an investor balance. Investors without a seeded balance are
    /// treated as unlimited for test convenience.
    pub async fn set_balance(&self, investor: &str, balance: Money) {
        self.balances
            .lock()
            .await
            .insert(investor.to_string(), balance);
    }

    fn transaction_ref() -> String {
        format!("0.0.9999@{}", Utc::now().timestamp_micros())
    }
}

#[async_trait]
impl EscrowLedger for MockLedger {
    async fn deposit(&self, request: DepositRequest) -> Result<DepositOutcome, LedgerError> {
        // simulate network latency
        sleep(Duration::from_millis(25)).await;

        let mut funded = self.funded_invoices.lock().await;
        if funded.contains_key(&request.invoice_id) {
            return Err(LedgerError::AlreadyFunded(request.invoice_id));
        }

        {
            let mut balances = self.balances.lock().await;
            if let Some(balance) = balances.get_mut(&request.investor) {
                if *balance < request.amount {
                    return Err(LedgerError::InsufficientBalance);
                }
                *balance = balance
                    .checked_sub(request.amount)
                    .unwrap_or(Money::ZERO);
            }
        }

        let escrow_id = Uuid::new_v4().to_string();
        funded.insert(request.invoice_id.clone(), escrow_id.clone());
        self.escrows.lock().await.insert(
            escrow_id.clone(),
            MockEscrow {
                invoice_id: request.invoice_id,
                state: MockEscrowState::Funded,
                due_date: request.due_date,
            },
        );

        Ok(DepositOutcome {
            escrow_id,
            transaction_ref: Self::transaction_ref(),
        })
    }

    async fn release(&self, escrow_id: &str) -> Result<SettlementOutcome, LedgerError> {
        sleep(Duration::from_millis(25)).await;

        let mut escrows = self.escrows.lock().await;
        let escrow = escrows
            .get_mut(escrow_id)
            .ok_or_else(|| LedgerError::UnknownEscrow(escrow_id.to_string()))?;
        if escrow.state != MockEscrowState::Funded {
            return Err(LedgerError::AlreadySettled(escrow_id.to_string()));
        }
        escrow.state = MockEscrowState::Released;
        tracing::debug!(escrow_id, invoice_id = %escrow.invoice_id, "mock escrow released");

        Ok(SettlementOutcome {
            transaction_ref: Self::transaction_ref(),
        })
    }

    async fn refund(&self, escrow_id: &str) -> Result<SettlementOutcome, LedgerError> {
        sleep(Duration::from_millis(25)).await;

        let mut escrows = self.escrows.lock().await;
        let escrow = escrows
            .get_mut(escrow_id)
            .ok_or_else(|| LedgerError::UnknownEscrow(escrow_id.to_string()))?;
        if escrow.state != MockEscrowState::Funded {
            return Err(LedgerError::AlreadySettled(escrow_id.to_string()));
        }
        if Utc::now().date_naive() <= escrow.due_date {
            return Err(LedgerError::NotYetDue(escrow_id.to_string()));
        }
        escrow.state = MockEscrowState::Refunded;

        Ok(SettlementOutcome {
            transaction_ref: Self::transaction_ref(),
        })
    }
}

/// Monotonic mock of the consensus log. Sequence numbers start at 1.
#[derive(Default)]
pub struct MockJournal {
    next_sequence: AtomicU64,
}

impl MockJournal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ConsensusJournal for MockJournal {
    async fn submit(&self, _message: &[u8]) -> Result<SequencedReceipt, LedgerError> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SequencedReceipt {
            sequence,
            transaction_ref: MockLedger::transaction_ref(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn deposit_request(invoice_id: &str, due_in_days: i64) -> DepositRequest {
        DepositRequest {
            invoice_id: invoice_id.to_string(),
            nft_ref: Some("0.0.555/1".to_string()),
            investor: "0.0.2002".to_string(),
            amount: Money::from_major(8_000),
            due_date: (Utc::now() + ChronoDuration::days(due_in_days)).date_naive(),
            file_hash: "ab".repeat(32),
        }
    }

    #[tokio::test]
    async fn double_release_fails_second_time() {
        let ledger = MockLedger::new();
        let outcome = ledger.deposit(deposit_request("INV-1", 30)).await.unwrap();

        ledger.release(&outcome.escrow_id).await.unwrap();
        let second = ledger.release(&outcome.escrow_id).await;
        assert!(matches!(second, Err(LedgerError::AlreadySettled(_))));
    }

    #[tokio::test]
    async fn at_most_once_funding_per_invoice() {
        let ledger = MockLedger::new();
        ledger.deposit(deposit_request("INV-1", 30)).await.unwrap();
        let second = ledger.deposit(deposit_request("INV-1", 30)).await;
        assert!(matches!(second, Err(LedgerError::AlreadyFunded(_))));
    }

    #[tokio::test]
    async fn refund_requires_elapsed_due_date() {
        let ledger = MockLedger::new();
        let open = ledger.deposit(deposit_request("INV-1", 30)).await.unwrap();
        assert!(matches!(
            ledger.refund(&open.escrow_id).await,
            Err(LedgerError::NotYetDue(_))
        ));

        let overdue = ledger.deposit(deposit_request("INV-2", -1)).await.unwrap();
        ledger.refund(&overdue.escrow_id).await.unwrap();
        assert!(matches!(
            ledger.refund(&overdue.escrow_id).await,
            Err(LedgerError::AlreadySettled(_))
        ));
    }

    #[tokio::test]
    async fn seeded_balance_is_enforced() {
        let ledger = MockLedger::new();
        ledger.set_balance("0.0.2002", Money::from_major(100)).await;
        let result = ledger.deposit(deposit_request("INV-1", 30)).await;
        assert!(matches!(result, Err(LedgerError::InsufficientBalance)));
    }

    #[tokio::test]
    async fn journal_sequences_are_monotonic() {
        let journal = MockJournal::new();
        let first = journal.submit(b"a").await.unwrap();
        let second = journal.submit(b"b").await.unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
    }
}
