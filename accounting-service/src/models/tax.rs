//! Tax definition model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// How a tax amount is derived from a base amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputationMethod {
    Percentage,
    Fixed,
}

impl ComputationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputationMethod::Percentage => "percentage",
            ComputationMethod::Fixed => "fixed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "fixed" => ComputationMethod::Fixed,
            _ => ComputationMethod::Percentage,
        }
    }
}

/// Which transaction side a tax definition applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxSide {
    Sales,
    Purchase,
    Both,
}

impl TaxSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxSide::Sales => "sales",
            TaxSide::Purchase => "purchase",
            TaxSide::Both => "both",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sales" => TaxSide::Sales,
            "purchase" => TaxSide::Purchase,
            _ => TaxSide::Both,
        }
    }

    /// Whether a tax declared for `self` participates on the requested side.
    pub fn applies_to(&self, requested: TaxSide) -> bool {
        matches!(self, TaxSide::Both) || *self == requested
    }
}

/// Tax definition. Immutable once referenced by a posted line item; rate
/// changes only affect future orders.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tax {
    pub id: i64,
    pub name: String,
    pub computation_method: String,
    pub value: Decimal,
    pub applicable_on: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Tax {
    pub fn method(&self) -> ComputationMethod {
        ComputationMethod::from_string(&self.computation_method)
    }

    pub fn side(&self) -> TaxSide {
        TaxSide::from_string(&self.applicable_on)
    }
}
