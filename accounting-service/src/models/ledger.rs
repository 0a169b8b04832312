//! Double-entry ledger models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Entry direction (debit or credit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Debit => "DEBIT",
            EntryType::Credit => "CREDIT",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "DEBIT" => Some(EntryType::Debit),
            "CREDIT" => Some(EntryType::Credit),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed reference from a ledger row back to its source document.
///
/// Persisted as the `(reference_id, reference_type)` column pair; modeling
/// it as an enum keeps joins and match arms exhaustive instead of
/// string-matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reference_type", content = "reference_id")]
pub enum DocumentRef {
    #[serde(rename = "PURCHASE_ORDER")]
    PurchaseOrder(i64),
    #[serde(rename = "CUSTOMER_INVOICE")]
    CustomerInvoice(i64),
}

impl DocumentRef {
    pub fn reference_id(&self) -> i64 {
        match self {
            DocumentRef::PurchaseOrder(id) | DocumentRef::CustomerInvoice(id) => *id,
        }
    }

    pub fn reference_type(&self) -> &'static str {
        match self {
            DocumentRef::PurchaseOrder(_) => "PURCHASE_ORDER",
            DocumentRef::CustomerInvoice(_) => "CUSTOMER_INVOICE",
        }
    }

    pub fn from_parts(reference_type: &str, reference_id: i64) -> Option<Self> {
        match reference_type {
            "PURCHASE_ORDER" => Some(DocumentRef::PurchaseOrder(reference_id)),
            "CUSTOMER_INVOICE" => Some(DocumentRef::CustomerInvoice(reference_id)),
            _ => None,
        }
    }
}

/// Named ledger account (chart of accounts row).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub account_type: String,
}

/// Single ledger transaction row. Amount is always non-negative; direction
/// is carried by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerTransaction {
    pub id: i64,
    pub coa_id: i64,
    pub amount: Decimal,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub entry_type: String,
    pub reference_id: i64,
    pub reference_type: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn parsed_type(&self) -> Option<EntryType> {
        EntryType::from_string(&self.entry_type)
    }

    /// Signed amount (positive for debit, negative for credit).
    pub fn signed_amount(&self) -> Decimal {
        match self.parsed_type() {
            Some(EntryType::Debit) => self.amount,
            Some(EntryType::Credit) => -self.amount,
            None => Decimal::ZERO,
        }
    }

    pub fn document_ref(&self) -> Option<DocumentRef> {
        DocumentRef::from_parts(&self.reference_type, self.reference_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ref_round_trips_through_parts() {
        let refs = [
            DocumentRef::PurchaseOrder(7),
            DocumentRef::CustomerInvoice(42),
        ];
        for r in refs {
            assert_eq!(
                DocumentRef::from_parts(r.reference_type(), r.reference_id()),
                Some(r)
            );
        }
        assert_eq!(DocumentRef::from_parts("SOMETHING_ELSE", 1), None);
    }

    #[test]
    fn signed_amount_follows_direction() {
        let amount = Decimal::new(55000, 2); // 550.00
        let debit = LedgerTransaction {
            id: 1,
            coa_id: 1,
            amount,
            entry_type: "DEBIT".to_string(),
            reference_id: 7,
            reference_type: "PURCHASE_ORDER".to_string(),
            created_at: Utc::now(),
        };
        let credit = LedgerTransaction {
            entry_type: "CREDIT".to_string(),
            ..debit.clone()
        };
        assert_eq!(debit.signed_amount(), amount);
        assert_eq!(credit.signed_amount(), -amount);
        assert_eq!(debit.signed_amount() + credit.signed_amount(), Decimal::ZERO);
    }
}
