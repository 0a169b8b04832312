//! Sales order handlers.
//!
//! Creation prices each line from the catalog; stored line totals are net and
//! tax is computed once at the order level, from the request's
//! `tax_percentage` or from the catalog's sales-side taxes. Invoicing runs
//! the composite transaction (stock out, ledger posting, invoice
//! materialization, status flip).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{ApiResponse, CreateSalesOrderRequest},
    middleware::Actor,
    models::{
        InvoiceWithItems, NewSalesItem, NewSalesOrder, SalesOrder, SalesOrderWithItems, TaxSide,
        UserInvoice,
    },
    services::tax::{self, TaxApplication},
    AppState,
};

#[derive(Debug, Serialize)]
pub struct InvoicedOrder {
    pub order: SalesOrderWithItems,
    pub invoice: InvoiceWithItems,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_invoice: Option<UserInvoice>,
}

/// Create a sales order in DRAFT.
pub async fn create_sales_order(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateSalesOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SalesOrderWithItems>>), AppError> {
    payload.validate()?;

    let customer = state
        .db
        .get_contact_by_id(payload.customer_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Customer {} not found", payload.customer_id))
        })?;

    let mut items = Vec::with_capacity(payload.items.len());
    let mut total_amount = Decimal::ZERO;

    for line in &payload.items {
        let product = state
            .db
            .find_product_by_id(line.product_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Product {} not found", line.product_id))
            })?;

        let unit_price = line.unit_price.unwrap_or(product.price);
        let line_total = tax::round_money(tax::net_line_total(line.quantity, unit_price));
        total_amount += line_total;

        items.push(NewSalesItem {
            product_id: product.id,
            quantity: line.quantity,
            unit_price,
            line_total,
        });
    }

    // One order-level tax amount: explicit percentage wins, otherwise the
    // catalog's sales-side taxes apply.
    let tax_amount = match payload.tax_percentage {
        Some(percentage) => tax::percentage_of(total_amount, percentage),
        None => {
            let taxes: Vec<TaxApplication> = state
                .db
                .find_taxes_by_applicable_on(TaxSide::Sales)
                .await?
                .iter()
                .map(TaxApplication::from)
                .collect();
            tax::compute(total_amount, &taxes, TaxSide::Sales).total_tax
        }
    };
    let tax_amount = tax::round_money(tax_amount);

    let input = NewSalesOrder {
        customer_id: customer.id,
        order_date: payload
            .order_date
            .unwrap_or_else(|| Utc::now().date_naive()),
        total_amount,
        tax_amount,
        grand_total: tax::round_money(total_amount + tax_amount),
        created_by: Some(actor.0),
        items,
    };

    let order = state.db.create_sales_order(&input).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new("Sales order created", order)),
    ))
}

/// Get a sales order with its items.
pub async fn get_sales_order(
    State(state): State<AppState>,
    Path(so_id): Path<i64>,
) -> Result<Json<ApiResponse<SalesOrderWithItems>>, AppError> {
    let order = state
        .db
        .get_sales_order(so_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Sales order {} not found", so_id)))?;

    Ok(Json(ApiResponse::new("Sales order", order)))
}

/// Confirm a DRAFT sales order.
pub async fn confirm_sales_order(
    State(state): State<AppState>,
    Path(so_id): Path<i64>,
) -> Result<Json<ApiResponse<SalesOrder>>, AppError> {
    let order = state.db.confirm_sales_order(so_id).await?;
    Ok(Json(ApiResponse::new("Sales order confirmed", order)))
}

/// Cancel a DRAFT sales order.
pub async fn cancel_sales_order(
    State(state): State<AppState>,
    Path(so_id): Path<i64>,
) -> Result<Json<ApiResponse<SalesOrder>>, AppError> {
    let order = state.db.cancel_sales_order(so_id).await?;
    Ok(Json(ApiResponse::new("Sales order cancelled", order)))
}

/// Invoice a CONFIRMED sales order: stock out, ledger posting and invoice
/// materialization, atomically.
pub async fn invoice_sales_order(
    State(state): State<AppState>,
    Path(so_id): Path<i64>,
) -> Result<(StatusCode, Json<ApiResponse<InvoicedOrder>>), AppError> {
    let invoice_date = Utc::now().date_naive();
    let (order, invoice, user_invoice) = state
        .db
        .invoice_sales_order(
            so_id,
            invoice_date,
            state.config.invoicing.due_days,
            state.config.invoicing.allow_negative_stock,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            "Customer invoice generated",
            InvoicedOrder {
                order,
                invoice,
                user_invoice,
            },
        )),
    ))
}
