//! Purchase and sales order aggregates.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Order lifecycle status.
///
/// One-directional: `Draft -> Confirmed -> Billed` (purchase) or
/// `Draft -> Confirmed -> Invoiced` (sales). `Cancelled` is reachable from
/// `Draft` only. There is no path back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Confirmed,
    Billed,
    Invoiced,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Billed => "BILLED",
            OrderStatus::Invoiced => "INVOICED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "CONFIRMED" => OrderStatus::Confirmed,
            "BILLED" => OrderStatus::Billed,
            "INVOICED" => OrderStatus::Invoiced,
            "CANCELLED" => OrderStatus::Cancelled,
            _ => OrderStatus::Draft,
        }
    }

    /// Whether `self -> target` is a legal transition.
    pub fn allows(&self, target: OrderStatus) -> bool {
        matches!(
            (self, target),
            (OrderStatus::Draft, OrderStatus::Confirmed)
                | (OrderStatus::Draft, OrderStatus::Cancelled)
                | (OrderStatus::Confirmed, OrderStatus::Billed)
                | (OrderStatus::Confirmed, OrderStatus::Invoiced)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Purchase order header.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PurchaseOrder {
    pub id: i64,
    pub vendor_id: i64,
    pub order_date: NaiveDate,
    pub status: String,
    pub total_amount: Decimal,
    pub tax_amount: Decimal,
    pub grand_total: Decimal,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseOrder {
    pub fn parsed_status(&self) -> OrderStatus {
        OrderStatus::from_string(&self.status)
    }
}

/// Purchase order line item. Owned by its order; `line_total` is gross
/// (net + tax) on the purchase side.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PurchaseOrderItem {
    pub id: i64,
    pub purchase_order_id: i64,
    pub product_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
}

/// Sales order header.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SalesOrder {
    pub id: i64,
    pub customer_id: i64,
    pub order_date: NaiveDate,
    pub status: String,
    pub total_amount: Decimal,
    pub tax_amount: Decimal,
    pub grand_total: Decimal,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SalesOrder {
    pub fn parsed_status(&self) -> OrderStatus {
        OrderStatus::from_string(&self.status)
    }
}

/// Sales order line item. `line_total` is net (tax excluded); tax is applied
/// at the order level on the sales side.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SalesOrderItem {
    pub id: i64,
    pub sales_order_id: i64,
    pub product_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Validated input for a purchase order line. `unit_price` has already been
/// defaulted from the catalog when the caller omitted it.
#[derive(Debug, Clone)]
pub struct NewPurchaseItem {
    pub product_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Nominal percentage recorded for the line: the request's rate, or the
    /// sum of the catalog's percentage taxes. Fixed catalog taxes show up in
    /// `tax_amount` but not here; `tax_amount` is the authoritative figure.
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
}

/// Validated input for creating a purchase order, totals precomputed.
#[derive(Debug, Clone)]
pub struct NewPurchaseOrder {
    pub vendor_id: i64,
    pub order_date: NaiveDate,
    pub total_amount: Decimal,
    pub tax_amount: Decimal,
    pub grand_total: Decimal,
    pub created_by: Option<i64>,
    pub items: Vec<NewPurchaseItem>,
}

#[derive(Debug, Clone)]
pub struct NewSalesItem {
    pub product_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Validated input for creating a sales order, totals precomputed.
#[derive(Debug, Clone)]
pub struct NewSalesOrder {
    pub customer_id: i64,
    pub order_date: NaiveDate,
    pub total_amount: Decimal,
    pub tax_amount: Decimal,
    pub grand_total: Decimal,
    pub created_by: Option<i64>,
    pub items: Vec<NewSalesItem>,
}

/// Order header plus its items, as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseOrderWithItems {
    #[serde(flatten)]
    pub order: PurchaseOrder,
    pub items: Vec<PurchaseOrderItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesOrderWithItems {
    #[serde(flatten)]
    pub order: SalesOrder,
    pub items: Vec<SalesOrderItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            OrderStatus::Draft,
            OrderStatus::Confirmed,
            OrderStatus::Billed,
            OrderStatus::Invoiced,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::from_string(status.as_str()), status);
        }
    }

    #[test]
    fn transitions_are_one_directional() {
        assert!(OrderStatus::Draft.allows(OrderStatus::Confirmed));
        assert!(OrderStatus::Draft.allows(OrderStatus::Cancelled));
        assert!(OrderStatus::Confirmed.allows(OrderStatus::Billed));
        assert!(OrderStatus::Confirmed.allows(OrderStatus::Invoiced));

        assert!(!OrderStatus::Draft.allows(OrderStatus::Billed));
        assert!(!OrderStatus::Draft.allows(OrderStatus::Invoiced));
        assert!(!OrderStatus::Confirmed.allows(OrderStatus::Draft));
        assert!(!OrderStatus::Confirmed.allows(OrderStatus::Cancelled));
        assert!(!OrderStatus::Billed.allows(OrderStatus::Confirmed));
        assert!(!OrderStatus::Invoiced.allows(OrderStatus::Draft));
        assert!(!OrderStatus::Cancelled.allows(OrderStatus::Confirmed));
    }
}
