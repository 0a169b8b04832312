//! Customer invoice and the per-user invoice projection.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Invoice payment status.
///
/// The declared progression is `Unpaid -> PartiallyPaid -> Paid`, but the
/// update operation deliberately accepts any of the three targets from any
/// current value, matching the reference behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::PartiallyPaid => "PARTIALLY_PAID",
            PaymentStatus::Paid => "PAID",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "UNPAID" => Some(PaymentStatus::Unpaid),
            "PARTIALLY_PAID" => Some(PaymentStatus::PartiallyPaid),
            "PAID" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical customer invoice, materialized exactly once when a sales order
/// is invoiced. Never deleted; only its payment status mutates afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerInvoice {
    pub id: i64,
    pub invoice_number: String,
    pub customer_id: i64,
    pub sales_order_id: i64,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_amount: Decimal,
    pub tax_amount: Decimal,
    pub grand_total: Decimal,
    pub payment_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerInvoice {
    pub fn parsed_status(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_string(&self.payment_status)
    }
}

/// Point-in-time copy of a sales order line; independent of the order after
/// materialization.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerInvoiceItem {
    pub id: i64,
    pub invoice_id: i64,
    pub product_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Denormalized "my invoices" row, derived from [`CustomerInvoice`].
/// Regenerated inside every status-changing transaction rather than
/// independently mutated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserInvoice {
    pub id: i64,
    pub user_id: i64,
    pub invoice_id: i64,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub amount_due: Decimal,
    pub payment_status: String,
    pub updated_at: DateTime<Utc>,
}

/// Invoice plus its line items, as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    pub invoice: CustomerInvoice,
    pub items: Vec<CustomerInvoiceItem>,
}
