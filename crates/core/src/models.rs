use crate::money::{Money, Rate};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of an invoice. Transitions are one-directional; the only
/// branch is `Funded -> Refunded` when the due date elapses unpaid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Issued,
    FundingRequested,
    Funded,
    Paid,
    Settled,
    Refunded,
}

impl InvoiceStatus {
    pub fn can_advance_to(self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Issued, FundingRequested)
                | (FundingRequested, Funded)
                | (Funded, Paid)
                | (Paid, Settled)
                | (Funded, Refunded)
        )
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, InvoiceStatus::Settled | InvoiceStatus::Refunded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Issued => "ISSUED",
            InvoiceStatus::FundingRequested => "FUNDING_REQUESTED",
            InvoiceStatus::Funded => "FUNDED",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Settled => "SETTLED",
            InvoiceStatus::Refunded => "REFUNDED",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid status transition {from:?} -> {to:?}")]
pub struct StatusTransitionError {
    pub from: InvoiceStatus,
    pub to: InvoiceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    Funded,
    Released,
    Refunded,
}

/// Ledger-side artifacts recorded once the invoice NFT is minted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerProof {
    pub token_id: String,
    pub serial_number: u64,
    pub file_id: String,
    pub topic_id: String,
}

/// A supplier's receivable. Never deleted; terminal states archive it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: String,
    pub currency: String,
    pub face_value: Money,
    pub due_date: NaiveDate,
    pub description: String,
    pub supplier: String,
    pub buyer: Option<String>,
    pub status: InvoiceStatus,
    pub document_hash: String,
    pub proof: Option<LedgerProof>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Validated state advance. Callers pair every successful advance with
    /// exactly one audit event.
    pub fn advance(&mut self, next: InvoiceStatus) -> Result<(), StatusTransitionError> {
        if !self.status.can_advance_to(next) {
            return Err(StatusTransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Funds held by the escrow contract against one invoice. Created at
/// funding time, mutated exactly once at settlement, immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub escrow_id: String,
    pub invoice_id: String,
    pub investor: String,
    pub amount: Money,
    pub fee_rate: Rate,
    pub status: EscrowStatus,
    pub deposited_at: DateTime<Utc>,
    pub deposit_tx: String,
    pub settlement_tx: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use InvoiceStatus::*;

    fn invoice(status: InvoiceStatus) -> Invoice {
        Invoice {
            invoice_id: "INV-1".into(),
            currency: "USD".into(),
            face_value: Money::from_major(10_000),
            due_date: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
            description: "widgets".into(),
            supplier: "0.0.1001".into(),
            buyer: None,
            status,
            document_hash: String::new(),
            proof: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn happy_path_transitions() {
        let mut inv = invoice(Issued);
        for next in [FundingRequested, Funded, Paid, Settled] {
            inv.advance(next).unwrap();
            assert_eq!(inv.status, next);
        }
        assert!(inv.status.is_terminal());
    }

    #[test]
    fn refund_only_from_funded() {
        let mut inv = invoice(Funded);
        inv.advance(Refunded).unwrap();

        let mut inv = invoice(Paid);
        assert_eq!(
            inv.advance(Refunded),
            Err(StatusTransitionError {
                from: Paid,
                to: Refunded
            })
        );
    }

    #[test]
    fn no_back_edges() {
        let all = [Issued, FundingRequested, Funded, Paid, Settled, Refunded];
        for (i, from) in all.iter().enumerate() {
            for to in &all[..i] {
                assert!(!from.can_advance_to(*to), "{from:?} -> {to:?} must be rejected");
            }
        }
    }

    #[test]
    fn terminal_states_accept_nothing() {
        let all = [Issued, FundingRequested, Funded, Paid, Settled, Refunded];
        for from in [Settled, Refunded] {
            for to in all {
                assert!(!from.can_advance_to(to));
            }
        }
    }
}
