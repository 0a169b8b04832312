//! Pure tax computation.
//!
//! No I/O and no rounding at intermediate steps; the same inputs must give
//! bit-identical outputs at every call site (order entry, invoice
//! generation, payment reconciliation). Amounts are rounded only at the
//! persistence boundary via [`round_money`].

use crate::models::{ComputationMethod, Tax, TaxSide};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// A tax definition as applied to one base amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxApplication {
    pub tax_id: Option<i64>,
    pub name: String,
    pub method: ComputationMethod,
    pub value: Decimal,
    pub applicable_on: TaxSide,
}

impl From<&Tax> for TaxApplication {
    fn from(tax: &Tax) -> Self {
        Self {
            tax_id: Some(tax.id),
            name: tax.name.clone(),
            method: tax.method(),
            value: tax.value,
            applicable_on: tax.side(),
        }
    }
}

/// One computed tax line of a breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxLine {
    pub tax_id: Option<i64>,
    pub name: String,
    pub amount: Decimal,
}

/// Result of a tax computation over one base amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxBreakdown {
    pub total_tax: Decimal,
    pub lines: Vec<TaxLine>,
}

/// Compute the per-tax breakdown and total for `base_amount` on the given
/// transaction side.
///
/// Percentage taxes scale with the base; fixed taxes are flat per base
/// amount. Taxes declared for the other side are skipped. Zero or negative
/// tax values are valid and simply compute through.
pub fn compute(base_amount: Decimal, taxes: &[TaxApplication], side: TaxSide) -> TaxBreakdown {
    let mut lines = Vec::new();
    let mut total_tax = Decimal::ZERO;

    for tax in taxes {
        if !tax.applicable_on.applies_to(side) {
            continue;
        }
        let amount = match tax.method {
            ComputationMethod::Percentage => base_amount * tax.value / Decimal::from(100),
            ComputationMethod::Fixed => tax.value,
        };
        total_tax += amount;
        lines.push(TaxLine {
            tax_id: tax.tax_id,
            name: tax.name.clone(),
            amount,
        });
    }

    TaxBreakdown { total_tax, lines }
}

/// Shorthand for a single order-level percentage (the sales-order flow).
pub fn percentage_of(base_amount: Decimal, percentage: Decimal) -> Decimal {
    base_amount * percentage / Decimal::from(100)
}

/// Round a monetary amount to 2 decimal places, half-up. Applied exactly
/// once, when an amount is persisted or returned.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Tax-exclusive line total: quantity x unit price.
pub fn net_line_total(quantity: Decimal, unit_price: Decimal) -> Decimal {
    quantity * unit_price
}

/// Tax-inclusive line total. The purchase flow persists gross totals; the
/// sales flow persists net ones. Kept as two named computations on purpose.
pub fn gross_line_total(quantity: Decimal, unit_price: Decimal, tax_amount: Decimal) -> Decimal {
    net_line_total(quantity, unit_price) + tax_amount
}
