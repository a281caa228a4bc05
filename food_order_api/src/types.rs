//! Identifier types shared across the storage, API and task layers.

use uuid::Uuid;

pub type UserId = String;
pub type ProductId = String;
pub type OrderId = String;
pub type TaskId = Uuid;

/// Prefixes used when minting entity ids.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const PRODUCT: &str = "pro";
    pub const ORDER: &str = "ord";
}

/// Mint a new entity id: the prefix followed by the tail of a random v4 UUID in simple hex
/// form, so every id is 32 characters long regardless of prefix length.
pub fn generate_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    let tail = hex.get(prefix.len()..).unwrap_or_default();
    format!("{prefix}{tail}")
}

/// Shorten an id for log fields.
pub fn abbrev(id: &str) -> &str {
    id.get(..11).unwrap_or(id)
}
