//! Request/response DTOs for the HTTP surface.
//!
//! The wire shapes mirror what the frontend already sends: purchase orders
//! wrap header fields in `orderData` and carry a per-line `tax_rate`; sales
//! orders are flat with one order-level `tax_percentage`. When a rate is
//! omitted, the applicable taxes from the catalog are used instead.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Response envelope: every 2xx body is `{"message": ..., "data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

fn positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    Ok(())
}

fn non_negative_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("must_be_non_negative"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct PurchaseOrderData {
    pub vendor_id: i64,
    /// Defaults to today when omitted.
    pub order_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct PurchaseItemRequest {
    pub product_id: i64,
    #[validate(custom(function = "positive_decimal", message = "Quantity must be positive"))]
    pub quantity: Decimal,
    /// Defaults to the catalog price when omitted.
    #[validate(custom(
        function = "non_negative_decimal",
        message = "Unit price cannot be negative"
    ))]
    pub unit_price: Option<Decimal>,
    /// Percentage applied to this line; purchase-side catalog taxes apply
    /// when omitted.
    #[validate(custom(
        function = "non_negative_decimal",
        message = "Tax rate cannot be negative"
    ))]
    pub tax_rate: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePurchaseOrderRequest {
    #[serde(rename = "orderData")]
    #[validate(nested)]
    pub order_data: PurchaseOrderData,
    #[validate(length(min = 1, message = "Order must have at least one item"), nested)]
    pub items: Vec<PurchaseItemRequest>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SalesItemRequest {
    pub product_id: i64,
    #[validate(custom(function = "positive_decimal", message = "Quantity must be positive"))]
    pub quantity: Decimal,
    #[validate(custom(
        function = "non_negative_decimal",
        message = "Unit price cannot be negative"
    ))]
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSalesOrderRequest {
    pub customer_id: i64,
    pub order_date: Option<NaiveDate>,
    /// Order-level percentage; sales-side catalog taxes apply when omitted.
    #[validate(custom(
        function = "non_negative_decimal",
        message = "Tax percentage cannot be negative"
    ))]
    pub tax_percentage: Option<Decimal>,
    #[validate(length(min = 1, message = "Order must have at least one item"), nested)]
    pub items: Vec<SalesItemRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentStatusRequest {
    pub user_invoice_id: i64,
    pub payment_status: String,
}
