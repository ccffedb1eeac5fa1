use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One append-only record per status transition. `sequence` is assigned by
/// the consensus log when the event is journaled; it is the only ordering
/// key readers may sort by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    #[serde(default)]
    pub sequence: u64,
    pub timestamp: String,
    pub event_type: String,
    pub invoice_id: String,
    pub from_status: String,
    pub to_status: String,
    pub escrow_id: Option<String>,
    pub transaction_ref: Option<String>,
    pub amount_minor: Option<i64>,
    pub actor: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: &str, invoice_id: &str, from_status: &str, to_status: &str) -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now().to_rfc3339(),
            event_type: event_type.to_string(),
            invoice_id: invoice_id.to_string(),
            from_status: from_status.to_string(),
            to_status: to_status.to_string(),
            escrow_id: None,
            transaction_ref: None,
            amount_minor: None,
            actor: None,
        }
    }

    pub fn with_escrow_id(mut self, escrow_id: String) -> Self {
        self.escrow_id = Some(escrow_id);
        self
    }

    pub fn with_transaction_ref(mut self, transaction_ref: String) -> Self {
        self.transaction_ref = Some(transaction_ref);
        self
    }

    pub fn with_amount_minor(mut self, amount_minor: i64) -> Self {
        self.amount_minor = Some(amount_minor);
        self
    }

    pub fn with_actor(mut self, actor: String) -> Self {
        self.actor = Some(actor);
        self
    }
}
