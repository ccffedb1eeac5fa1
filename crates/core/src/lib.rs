pub mod models;
pub mod money;
pub mod settlement;
pub mod validation;

use sha2::{Digest, Sha256};

/// Hash of the invoice document as stored in the ledger file service.
/// The same digest is passed to the escrow contract at deposit time.
pub fn compute_sha256_hex(document: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document);
    let bytes = hasher.finalize();
    hex::encode(bytes)
}
