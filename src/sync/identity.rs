//! Content-derived sale identity.
//!
//! The buyer name is hashed verbatim: two sales that differ only in buyer
//! name casing or padding are distinct.

use sha2::{Digest, Sha256};

use crate::models::ItemId;

/// Hex characters kept from the digest.
pub const IDENTITY_HASH_LEN: usize = 12;

/// Stable identity of one sale from its immutable fields.
pub fn sale_identity(item_id: ItemId, timestamp: i64, buyer_name: &str, total_price: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}|{}", item_id, timestamp, buyer_name, total_price).as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(IDENTITY_HASH_LEN);
    digest
}
