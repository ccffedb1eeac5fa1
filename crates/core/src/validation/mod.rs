mod rules;

use crate::models::Invoice;

/// Field-level validation of a new invoice before anything touches the
/// ledger. Errors accumulate so the caller can surface them all at once.
pub fn validate(invoice: &Invoice) -> Result<(), Vec<String>> {
    rules::basic_invoice_checks(invoice)
}
