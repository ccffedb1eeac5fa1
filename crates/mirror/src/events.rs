use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status-transition events journaled to the consensus topic. One tagged
/// union, one decode path; call sites never parse topic payloads ad hoc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    InvoiceCreated {
        invoice_id: String,
        token_id: Option<String>,
        document_hash: Option<String>,
    },
    FundingRequested {
        invoice_id: String,
    },
    InvoiceFunded {
        invoice_id: String,
        escrow_id: String,
        investor: String,
        amount_minor: i64,
    },
    InvoicePaid {
        invoice_id: String,
        transaction_ref: Option<String>,
    },
    InvoiceSettled {
        invoice_id: String,
        escrow_id: String,
    },
    InvoiceRefunded {
        invoice_id: String,
        escrow_id: String,
    },
}

/// A decoded topic message with its consensus ordering attached. Display
/// lists sort by `sequence`, never by local timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub sequence: u64,
    pub consensus_timestamp: String,
    pub event: LedgerEvent,
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("topic message {sequence} is not valid base64: {source}")]
    InvalidBase64 {
        sequence: u64,
        source: base64::DecodeError,
    },
    #[error("topic message {sequence} is not valid UTF-8")]
    InvalidUtf8 { sequence: u64 },
    #[error("topic message {sequence} is not a known ledger event: {source}")]
    InvalidPayload {
        sequence: u64,
        source: serde_json::Error,
    },
}

/// Decode one mirror topic message (base64-wrapped JSON) into a
/// [`SequencedEvent`].
pub fn decode_topic_message(
    sequence: u64,
    consensus_timestamp: &str,
    base64_contents: &str,
) -> Result<SequencedEvent, EventDecodeError> {
    let bytes = BASE64
        .decode(base64_contents)
        .map_err(|source| EventDecodeError::InvalidBase64 { sequence, source })?;
    let text =
        std::str::from_utf8(&bytes).map_err(|_| EventDecodeError::InvalidUtf8 { sequence })?;
    let event: LedgerEvent = serde_json::from_str(text)
        .map_err(|source| EventDecodeError::InvalidPayload { sequence, source })?;

    Ok(SequencedEvent {
        sequence,
        consensus_timestamp: consensus_timestamp.to_string(),
        event,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_funded_event() {
        let json = serde_json::json!({
            "type": "invoice_funded",
            "invoice_id": "INV-1",
            "escrow_id": "E-1",
            "investor": "0.0.2002",
            "amount_minor": 800_000,
        });
        let encoded = BASE64.encode(json.to_string());
        let decoded = decode_topic_message(7, "1724900000.000000001", &encoded).unwrap();
        assert_eq!(decoded.sequence, 7);
        assert_eq!(
            decoded.event,
            LedgerEvent::InvoiceFunded {
                invoice_id: "INV-1".into(),
                escrow_id: "E-1".into(),
                investor: "0.0.2002".into(),
                amount_minor: 800_000,
            }
        );
    }

    #[test]
    fn rejects_bad_base64() {
        let err = decode_topic_message(1, "t", "not-base64!!!").unwrap_err();
        assert!(matches!(err, EventDecodeError::InvalidBase64 { sequence: 1, .. }));
    }

    #[test]
    fn rejects_unknown_payload() {
        let encoded = BASE64.encode(r#"{"type":"mystery"}"#);
        let err = decode_topic_message(2, "t", &encoded).unwrap_err();
        assert!(matches!(err, EventDecodeError::InvalidPayload { sequence: 2, .. }));
    }

    #[test]
    fn round_trips_through_json() {
        let event = LedgerEvent::InvoiceSettled {
            invoice_id: "INV-9".into(),
            escrow_id: "E-9".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(serde_json::from_str::<LedgerEvent>(&json).unwrap(), event);
    }
}
