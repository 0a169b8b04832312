//! Read models for the product catalog and contact book.
//!
//! Product/tax/contact management is owned elsewhere; order entry only
//! consumes these as lookups.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Vendor or customer record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub contact_type: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Quantity-on-hand counter, one row per product.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryRecord {
    pub product_id: i64,
    pub quantity: Decimal,
    pub updated_at: DateTime<Utc>,
}
