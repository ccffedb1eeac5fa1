use crate::models::Invoice;
use chrono::Utc;

pub fn basic_invoice_checks(invoice: &Invoice) -> Result<(), Vec<String>> {
    let mut errs = Vec::new();

    if invoice.supplier.trim().is_empty() {
        errs.push("Supplier account is mandatory".to_string());
    }

    if !invoice.face_value.is_positive() {
        errs.push("Face value must be positive".to_string());
    }

    if invoice.currency.is_empty() {
        errs.push("Currency code is mandatory".to_string());
    } else if invoice.currency.len() != 3 {
        errs.push("Currency code must be 3 characters (ISO 4217)".to_string());
    }

    if invoice.description.trim().is_empty() {
        errs.push("Description is mandatory".to_string());
    }

    if invoice.due_date <= Utc::now().date_naive() {
        errs.push("Due date must be in the future".to_string());
    }

    if let Some(buyer) = &invoice.buyer {
        if buyer.trim().is_empty() {
            errs.push("Buyer account must not be blank when present".to_string());
        }
    }

    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InvoiceStatus;
    use crate::money::Money;
    use chrono::{Duration, Utc};

    fn valid_invoice() -> Invoice {
        Invoice {
            invoice_id: "INV-1".into(),
            currency: "USD".into(),
            face_value: Money::from_major(10_000),
            due_date: (Utc::now() + Duration::days(60)).date_naive(),
            description: "Q3 component shipment".into(),
            supplier: "0.0.1001".into(),
            buyer: Some("0.0.2002".into()),
            status: InvoiceStatus::Issued,
            document_hash: String::new(),
            proof: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn accepts_valid_invoice() {
        assert!(basic_invoice_checks(&valid_invoice()).is_ok());
    }

    #[test]
    fn accumulates_all_errors() {
        let mut inv = valid_invoice();
        inv.currency = "US".into();
        inv.face_value = Money::ZERO;
        inv.description = "  ".into();
        let errs = basic_invoice_checks(&inv).unwrap_err();
        assert_eq!(errs.len(), 3);
    }

    #[test]
    fn rejects_past_due_date() {
        let mut inv = valid_invoice();
        inv.due_date = (Utc::now() - Duration::days(1)).date_naive();
        assert!(basic_invoice_checks(&inv).is_err());
    }
}
