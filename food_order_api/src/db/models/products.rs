//! Storage models for products.

use crate::types::ProductId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct ProductCreateDBRequest {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub image: Option<String>,
}

/// Fields left as `None` are not touched. `image: Some(None)` clears the image.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdateDBRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub image: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct ProductDBResponse {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}
