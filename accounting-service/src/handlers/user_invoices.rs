//! User invoice handlers.
//!
//! `user_invoices` is a per-user projection of `customer_invoices`. Payment
//! status is addressed through the projection row id but written to the
//! canonical invoice; the projection is regenerated from it in the same
//! transaction.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{ApiResponse, UpdatePaymentStatusRequest},
    middleware::Actor,
    models::{PaymentStatus, UserInvoice},
    AppState,
};

/// List the acting user's invoices, newest first.
pub async fn list_user_invoices(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<ApiResponse<Vec<UserInvoice>>>, AppError> {
    let invoices = state.db.list_user_invoices(actor.0).await?;
    Ok(Json(ApiResponse::new("User invoices", invoices)))
}

/// Get one user-invoice projection row.
pub async fn get_user_invoice(
    State(state): State<AppState>,
    Path(user_invoice_id): Path<i64>,
) -> Result<Json<ApiResponse<UserInvoice>>, AppError> {
    let invoice = state
        .db
        .get_user_invoice(user_invoice_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("User invoice {} not found", user_invoice_id))
        })?;

    Ok(Json(ApiResponse::new("User invoice", invoice)))
}

/// Update an invoice's payment status.
///
/// The path id and the body's `userInvoiceId` must agree; the body keeps the
/// original wire shape used by the frontend.
pub async fn update_payment_status(
    State(state): State<AppState>,
    Path(user_invoice_id): Path<i64>,
    Json(payload): Json<UpdatePaymentStatusRequest>,
) -> Result<Json<ApiResponse<UserInvoice>>, AppError> {
    if payload.user_invoice_id != user_invoice_id {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Body userInvoiceId {} does not match path id {}",
            payload.user_invoice_id,
            user_invoice_id
        )));
    }

    let status = PaymentStatus::from_string(&payload.payment_status).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "Unknown payment status: {}",
            payload.payment_status
        ))
    })?;

    let (_, projection) = state.db.set_payment_status(user_invoice_id, status).await?;

    Ok(Json(ApiResponse::new(
        "Payment status updated",
        projection,
    )))
}
