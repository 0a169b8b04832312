//! Purchase order handlers.
//!
//! Creation prices each line from the catalog, applies the requested (or
//! catalog) purchase-side taxes and persists the order in DRAFT. Billing
//! runs the composite transaction (stock in, ledger posting, status flip).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{ApiResponse, CreatePurchaseOrderRequest},
    middleware::Actor,
    models::{
        ComputationMethod, NewPurchaseItem, NewPurchaseOrder, PurchaseOrder,
        PurchaseOrderWithItems, TaxSide,
    },
    services::tax::{self, TaxApplication},
    AppState,
};

/// An explicit line rate stands alone; otherwise the catalog's
/// purchase-side taxes apply.
fn line_taxes(rate: Option<Decimal>, catalog: &[TaxApplication]) -> Vec<TaxApplication> {
    match rate {
        Some(value) => vec![TaxApplication {
            tax_id: None,
            name: "Line tax".to_string(),
            method: ComputationMethod::Percentage,
            value,
            applicable_on: TaxSide::Both,
        }],
        None => catalog.to_vec(),
    }
}

/// Create a purchase order in DRAFT.
pub async fn create_purchase_order(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreatePurchaseOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PurchaseOrderWithItems>>), AppError> {
    payload.validate()?;

    let vendor = state
        .db
        .get_contact_by_id(payload.order_data.vendor_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Vendor {} not found",
                payload.order_data.vendor_id
            ))
        })?;

    let catalog_taxes: Vec<TaxApplication> = state
        .db
        .find_taxes_by_applicable_on(TaxSide::Purchase)
        .await?
        .iter()
        .map(TaxApplication::from)
        .collect();
    let catalog_rate: Decimal = catalog_taxes
        .iter()
        .filter(|t| t.method == ComputationMethod::Percentage)
        .map(|t| t.value)
        .sum();

    let mut items = Vec::with_capacity(payload.items.len());
    let mut total_amount = Decimal::ZERO;
    let mut tax_amount = Decimal::ZERO;

    for line in &payload.items {
        let product = state
            .db
            .find_product_by_id(line.product_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Product {} not found", line.product_id))
            })?;

        let unit_price = line.unit_price.unwrap_or(product.price);
        let base = tax::net_line_total(line.quantity, unit_price);
        let taxes = line_taxes(line.tax_rate, &catalog_taxes);
        let breakdown = tax::compute(base, &taxes, TaxSide::Purchase);
        let line_tax = tax::round_money(breakdown.total_tax);

        total_amount += base;
        tax_amount += line_tax;

        items.push(NewPurchaseItem {
            product_id: product.id,
            quantity: line.quantity,
            unit_price,
            // Nominal rate only; fixed catalog taxes are carried by
            // tax_amount, not this column.
            tax_rate: line.tax_rate.unwrap_or(catalog_rate),
            tax_amount: line_tax,
            line_total: tax::round_money(tax::gross_line_total(
                line.quantity,
                unit_price,
                line_tax,
            )),
        });
    }

    let input = NewPurchaseOrder {
        vendor_id: vendor.id,
        order_date: payload
            .order_data
            .order_date
            .unwrap_or_else(|| Utc::now().date_naive()),
        total_amount: tax::round_money(total_amount),
        tax_amount: tax::round_money(tax_amount),
        grand_total: tax::round_money(total_amount + tax_amount),
        created_by: Some(actor.0),
        items,
    };

    let order = state.db.create_purchase_order(&input).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("Purchase order created", order)),
    ))
}

/// Get a purchase order with its items.
pub async fn get_purchase_order(
    State(state): State<AppState>,
    Path(po_id): Path<i64>,
) -> Result<Json<ApiResponse<PurchaseOrderWithItems>>, AppError> {
    let order = state
        .db
        .get_purchase_order(po_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Purchase order {} not found", po_id)))?;

    Ok(Json(ApiResponse::new("Purchase order", order)))
}

/// Confirm a DRAFT purchase order.
pub async fn confirm_purchase_order(
    State(state): State<AppState>,
    Path(po_id): Path<i64>,
) -> Result<Json<ApiResponse<PurchaseOrder>>, AppError> {
    let order = state.db.confirm_purchase_order(po_id).await?;
    Ok(Json(ApiResponse::new("Purchase order confirmed", order)))
}

/// Cancel a DRAFT purchase order.
pub async fn cancel_purchase_order(
    State(state): State<AppState>,
    Path(po_id): Path<i64>,
) -> Result<Json<ApiResponse<PurchaseOrder>>, AppError> {
    let order = state.db.cancel_purchase_order(po_id).await?;
    Ok(Json(ApiResponse::new("Purchase order cancelled", order)))
}

/// Bill a CONFIRMED purchase order: stock in and ledger posting, atomically.
pub async fn bill_purchase_order(
    State(state): State<AppState>,
    Path(po_id): Path<i64>,
) -> Result<Json<ApiResponse<PurchaseOrderWithItems>>, AppError> {
    let order = state.db.bill_purchase_order(po_id).await?;
    Ok(Json(ApiResponse::new("Purchase order billed", order)))
}
