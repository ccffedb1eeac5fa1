mod audit;

pub use audit::AuditEvent;

use chrono::{NaiveDate, Utc};
use ledger::{retry, ConsensusJournal, DepositRequest, EscrowLedger, LedgerError};
use serde::{Deserialize, Serialize};
use sled::Db;
use std::sync::Arc;
use thiserror::Error;
use yharvest_core::compute_sha256_hex;
use yharvest_core::models::{
    EscrowRecord, EscrowStatus, Invoice, InvoiceStatus, StatusTransitionError,
};
use yharvest_core::money::Money;
use yharvest_core::settlement::{
    self, FundingError, FundingTerms, InvalidTermsError, SettlementSplit,
};
use yharvest_core::validation;

pub use yharvest_core::settlement::FundingPolicy;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invoice not found: {0}")]
    NotFound(String),

    #[error("invoice validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Funding(#[from] FundingError),

    #[error(transparent)]
    Terms(#[from] InvalidTermsError),

    #[error(transparent)]
    Transition(#[from] StatusTransitionError),

    #[error("escrow record missing for invoice {0}")]
    MissingEscrow(String),

    #[error("invoice {0} is not past its due date")]
    NotYetDue(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),

    #[error("record encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Supplier-submitted invoice draft.
#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoice {
    pub currency: String,
    pub face_value: Money,
    pub due_date: NaiveDate,
    pub description: String,
    pub supplier: String,
    pub buyer: Option<String>,
    /// Raw invoice document, hashed and anchored at creation time.
    pub document: Option<Vec<u8>>,
}

/// Result of a successful funding call.
#[derive(Debug, Clone, Serialize)]
pub struct FundingOutcome {
    pub escrow: EscrowRecord,
    pub terms: FundingTerms,
}

/// Result of a successful settlement.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementResult {
    pub split: SettlementSplit,
    pub transaction_ref: String,
}

/// Persistent record of invoices, escrows and the audit trail, orchestrating
/// status transitions around ledger calls. All collaborators are
/// constructor-injected; there is no global registry.
pub struct Registry {
    db: Db,
    ledger: Arc<dyn EscrowLedger>,
    journal: Arc<dyn ConsensusJournal>,
    policy: FundingPolicy,
}

impl Registry {
    pub fn open(
        path: &str,
        ledger: Arc<dyn EscrowLedger>,
        journal: Arc<dyn ConsensusJournal>,
        policy: FundingPolicy,
    ) -> Result<Self, RegistryError> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            ledger,
            journal,
            policy,
        })
    }

    fn invoices_tree(&self) -> Result<sled::Tree, RegistryError> {
        Ok(self.db.open_tree("invoices")?)
    }

    fn escrows_tree(&self) -> Result<sled::Tree, RegistryError> {
        Ok(self.db.open_tree("escrows")?)
    }

    fn audit_tree(&self) -> Result<sled::Tree, RegistryError> {
        Ok(self.db.open_tree("audit")?)
    }

    fn generate_invoice_id() -> String {
        use rand::{distributions::Alphanumeric, Rng};
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        format!("INV-{}", suffix.to_uppercase())
    }

    /// Validate, persist and journal a new invoice, then list it for
    /// funding. Two transitions, two audit events.
    pub async fn create_invoice(&self, new: NewInvoice) -> Result<Invoice, RegistryError> {
        let now = Utc::now();
        let document_hash = new
            .document
            .as_deref()
            .map(compute_sha256_hex)
            .unwrap_or_default();
        let mut invoice = Invoice {
            invoice_id: Self::generate_invoice_id(),
            currency: new.currency,
            face_value: new.face_value,
            due_date: new.due_date,
            description: new.description,
            supplier: new.supplier,
            buyer: new.buyer,
            status: InvoiceStatus::Issued,
            document_hash,
            proof: None,
            created_at: now,
            updated_at: now,
        };
        validation::validate(&invoice).map_err(RegistryError::Validation)?;

        self.put_invoice(&invoice)?;
        self.journal_event(
            AuditEvent::new("invoice_created", &invoice.invoice_id, "NONE", "ISSUED")
                .with_actor(invoice.supplier.clone()),
        )
        .await?;

        invoice.advance(InvoiceStatus::FundingRequested)?;
        self.journal_event(AuditEvent::new(
            "funding_requested",
            &invoice.invoice_id,
            "ISSUED",
            "FUNDING_REQUESTED",
        ))
        .await?;
        self.put_invoice(&invoice)?;

        tracing::info!(invoice_id = %invoice.invoice_id, "invoice created and listed for funding");
        Ok(invoice)
    }

    /// Validate the funding request, deposit into escrow on the ledger, and
    /// advance the invoice to `FUNDED`.
    pub async fn fund(
        &self,
        invoice_id: &str,
        investor: &str,
        amount: Money,
    ) -> Result<FundingOutcome, RegistryError> {
        let mut invoice = self.invoice(invoice_id)?;
        if !invoice.status.can_advance_to(InvoiceStatus::Funded) {
            return Err(StatusTransitionError {
                from: invoice.status,
                to: InvoiceStatus::Funded,
            }
            .into());
        }

        settlement::validate_funding_amount(amount, invoice.face_value, self.policy.min_funding)?;
        let terms = settlement::compute_funding_terms(
            invoice.face_value,
            self.policy.advance_rate,
            self.policy.fee_rate,
        )?;

        let request = DepositRequest {
            invoice_id: invoice.invoice_id.clone(),
            nft_ref: invoice
                .proof
                .as_ref()
                .map(|p| format!("{}/{}", p.token_id, p.serial_number)),
            investor: investor.to_string(),
            amount,
            due_date: invoice.due_date,
            file_hash: invoice.document_hash.clone(),
        };
        let outcome = retry::with_retries(|| self.ledger.deposit(request.clone())).await?;

        let escrow = EscrowRecord {
            escrow_id: outcome.escrow_id.clone(),
            invoice_id: invoice.invoice_id.clone(),
            investor: investor.to_string(),
            amount,
            fee_rate: self.policy.fee_rate,
            status: EscrowStatus::Funded,
            deposited_at: Utc::now(),
            deposit_tx: outcome.transaction_ref.clone(),
            settlement_tx: None,
        };
        self.put_escrow(&escrow)?;

        self.journal_event(
            AuditEvent::new(
                "invoice_funded",
                &invoice.invoice_id,
                invoice.status.as_str(),
                "FUNDED",
            )
            .with_escrow_id(escrow.escrow_id.clone())
            .with_transaction_ref(outcome.transaction_ref)
            .with_amount_minor(amount.minor())
            .with_actor(investor.to_string()),
        )
        .await?;

        invoice.advance(InvoiceStatus::Funded)?;
        self.put_invoice(&invoice)?;

        tracing::info!(
            invoice_id = %invoice.invoice_id,
            escrow_id = %escrow.escrow_id,
            amount = %amount,
            "invoice funded"
        );
        Ok(FundingOutcome { escrow, terms })
    }

    /// Record the buyer's payment. Settlement is a separate step so a
    /// release failure can be retried without re-recording the payment.
    pub async fn mark_paid(
        &self,
        invoice_id: &str,
        payment_ref: Option<String>,
    ) -> Result<Invoice, RegistryError> {
        let mut invoice = self.invoice(invoice_id)?;
        let from = invoice.status;
        invoice.advance(InvoiceStatus::Paid)?;

        let mut event = AuditEvent::new("invoice_paid", invoice_id, from.as_str(), "PAID");
        if let Some(reference) = payment_ref {
            event = event.with_transaction_ref(reference);
        }
        self.journal_event(event).await?;
        self.put_invoice(&invoice)?;

        Ok(invoice)
    }

    /// Release the escrow for a paid invoice and split the proceeds.
    /// Exactly-once disbursement is the contract's guarantee; a second call
    /// surfaces `AlreadySettled` from the ledger.
    pub async fn settle(&self, invoice_id: &str) -> Result<SettlementResult, RegistryError> {
        let invoice = self.invoice(invoice_id)?;
        if invoice.status != InvoiceStatus::Paid {
            return Err(StatusTransitionError {
                from: invoice.status,
                to: InvoiceStatus::Settled,
            }
            .into());
        }
        let escrow = self
            .escrow_for_invoice(invoice_id)?
            .ok_or_else(|| RegistryError::MissingEscrow(invoice_id.to_string()))?;

        let outcome = retry::with_retries(|| self.ledger.release(&escrow.escrow_id)).await?;

        self.update_escrow(&escrow.escrow_id, |rec| {
            rec.status = EscrowStatus::Released;
            rec.settlement_tx = Some(outcome.transaction_ref.clone());
        })?;

        self.journal_event(
            AuditEvent::new("invoice_settled", invoice_id, "PAID", "SETTLED")
                .with_escrow_id(escrow.escrow_id.clone())
                .with_transaction_ref(outcome.transaction_ref.clone()),
        )
        .await?;

        let mut invoice = invoice;
        invoice.advance(InvoiceStatus::Settled)?;
        self.put_invoice(&invoice)?;

        let split = settlement::split_settlement_with_operator_rate(
            invoice.face_value,
            escrow.fee_rate,
            self.policy.operator_rate,
        );
        tracing::info!(
            invoice_id,
            escrow_id = %escrow.escrow_id,
            investor_share = %split.investor_share,
            platform_share = %split.platform_share,
            "invoice settled"
        );
        Ok(SettlementResult {
            split,
            transaction_ref: outcome.transaction_ref,
        })
    }

    /// Return escrowed funds to the investor once the due date has elapsed
    /// without payment.
    pub async fn refund(&self, invoice_id: &str) -> Result<SettlementResult, RegistryError> {
        let mut invoice = self.invoice(invoice_id)?;
        if !invoice.status.can_advance_to(InvoiceStatus::Refunded) {
            return Err(StatusTransitionError {
                from: invoice.status,
                to: InvoiceStatus::Refunded,
            }
            .into());
        }
        if Utc::now().date_naive() <= invoice.due_date {
            return Err(RegistryError::NotYetDue(invoice_id.to_string()));
        }
        let escrow = self
            .escrow_for_invoice(invoice_id)?
            .ok_or_else(|| RegistryError::MissingEscrow(invoice_id.to_string()))?;

        let outcome = retry::with_retries(|| self.ledger.refund(&escrow.escrow_id)).await?;

        self.update_escrow(&escrow.escrow_id, |rec| {
            rec.status = EscrowStatus::Refunded;
            rec.settlement_tx = Some(outcome.transaction_ref.clone());
        })?;

        self.journal_event(
            AuditEvent::new("invoice_refunded", invoice_id, "FUNDED", "REFUNDED")
                .with_escrow_id(escrow.escrow_id.clone())
                .with_transaction_ref(outcome.transaction_ref.clone()),
        )
        .await?;

        invoice.advance(InvoiceStatus::Refunded)?;
        self.put_invoice(&invoice)?;

        tracing::info!(invoice_id, escrow_id = %escrow.escrow_id, "escrow refunded");
        Ok(SettlementResult {
            split: settlement::SettlementSplit {
                investor_share: escrow.amount,
                operator_share: Money::ZERO,
                platform_share: Money::ZERO,
            },
            transaction_ref: outcome.transaction_ref,
        })
    }

    pub fn invoice(&self, invoice_id: &str) -> Result<Invoice, RegistryError> {
        let bytes = self
            .invoices_tree()?
            .get(invoice_id.as_bytes())?
            .ok_or_else(|| RegistryError::NotFound(invoice_id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn list_invoices(&self) -> Result<Vec<Invoice>, RegistryError> {
        let tree = self.invoices_tree()?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_k, v) = item?;
            let invoice: Invoice = serde_json::from_slice(&v)?;
            out.push(invoice);
        }
        out.sort_by_key(|inv| inv.created_at);
        out.reverse();
        Ok(out)
    }

    pub fn escrow_for_invoice(
        &self,
        invoice_id: &str,
    ) -> Result<Option<EscrowRecord>, RegistryError> {
        let tree = self.escrows_tree()?;
        for item in tree.iter() {
            let (_k, v) = item?;
            let record: EscrowRecord = serde_json::from_slice(&v)?;
            if record.invoice_id == invoice_id {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Audit trail for one invoice, ordered by the sequence number the
    /// consensus log assigned. Local timestamps are informational only.
    pub fn audit_trail(&self, invoice_id: &str) -> Result<Vec<AuditEvent>, RegistryError> {
        let tree = self.audit_tree()?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_k, v) = item?;
            let event: AuditEvent = serde_json::from_slice(&v)?;
            if event.invoice_id == invoice_id {
                out.push(event);
            }
        }
        out.sort_by_key(|e| e.sequence);
        Ok(out)
    }

    fn put_invoice(&self, invoice: &Invoice) -> Result<(), RegistryError> {
        self.invoices_tree()?
            .insert(invoice.invoice_id.as_bytes(), serde_json::to_vec(invoice)?)?;
        Ok(())
    }

    fn put_escrow(&self, escrow: &EscrowRecord) -> Result<(), RegistryError> {
        self.escrows_tree()?
            .insert(escrow.escrow_id.as_bytes(), serde_json::to_vec(escrow)?)?;
        Ok(())
    }

    fn update_escrow<F>(&self, escrow_id: &str, mut f: F) -> Result<(), RegistryError>
    where
        F: FnMut(&mut EscrowRecord),
    {
        let tree = self.escrows_tree()?;
        let key = escrow_id.as_bytes();
        let existing = tree
            .get(key)?
            .ok_or_else(|| RegistryError::MissingEscrow(escrow_id.to_string()))?;
        let mut record: EscrowRecord = serde_json::from_slice(&existing)?;
        f(&mut record);
        tree.insert(key, serde_json::to_vec(&record)?)?;
        Ok(())
    }

    /// Submit the event to the consensus log, adopt the assigned sequence,
    /// and persist the sequenced record. Events are never mutated after.
    async fn journal_event(&self, mut event: AuditEvent) -> Result<AuditEvent, RegistryError> {
        let payload = serde_json::to_vec(&topic_payload(&event))?;
        let receipt = retry::with_retries(|| self.journal.submit(&payload)).await?;
        event.sequence = receipt.sequence;
        if event.transaction_ref.is_none() {
            event.transaction_ref = Some(receipt.transaction_ref);
        }

        self.audit_tree()?
            .insert(event.sequence.to_be_bytes(), serde_json::to_vec(&event)?)?;
        tracing::debug!(
            event_type = %event.event_type,
            invoice_id = %event.invoice_id,
            sequence = event.sequence,
            "audit event journaled"
        );
        Ok(event)
    }
}

/// The wire shape journaled to the consensus topic; the mirror crate decodes
/// the same tags back into its `LedgerEvent` union.
fn topic_payload(event: &AuditEvent) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "type": event.event_type,
        "invoice_id": event.invoice_id,
    });
    let object = payload.as_object_mut().unwrap();
    if let Some(escrow_id) = &event.escrow_id {
        object.insert("escrow_id".into(), escrow_id.clone().into());
    }
    if let Some(actor) = &event.actor {
        object.insert("investor".into(), actor.clone().into());
    }
    if let Some(amount) = event.amount_minor {
        object.insert("amount_minor".into(), amount.into());
    }
    if let Some(reference) = &event.transaction_ref {
        object.insert("transaction_ref".into(), reference.clone().into());
    }
    payload
}
