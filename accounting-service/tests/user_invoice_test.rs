//! User invoice projection and payment status integration tests.

mod common;

use common::TestApp;
use rust_decimal::Decimal;
use serde_json::json;

/// Runs the full sales flow and returns the user-invoice projection row id.
async fn invoiced_user_invoice_id(app: &TestApp) -> i64 {
    let customer_id = app.seed_contact("Globex Ltd").await;
    let product_id = app.seed_product("Gadget", Decimal::new(10000, 2)).await;

    let response = app
        .client()
        .post(format!("{}/sales-orders", app.address))
        .json(&json!({
            "customer_id": customer_id,
            "tax_percentage": 18,
            "items": [{ "product_id": product_id, "quantity": 1 }]
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    let so_id = body["data"]["id"].as_i64().expect("Missing order id");

    let response = app
        .client()
        .put(format!("{}/sales-orders/{}/confirm", app.address, so_id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);

    let response = app
        .client()
        .put(format!("{}/sales-orders/{}/invoice", app.address, so_id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    body["data"]["user_invoice"]["id"]
        .as_i64()
        .expect("Missing user invoice id")
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn listing_is_scoped_to_the_acting_user() {
    let app = TestApp::spawn().await;
    let ui_id = invoiced_user_invoice_id(&app).await;

    let response = app
        .client()
        .get(format!("{}/user-invoices", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    let invoices = body["data"].as_array().expect("Expected array");
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0]["id"].as_i64(), Some(ui_id));

    // A different user sees nothing.
    let response = app
        .anonymous_client()
        .get(format!("{}/user-invoices", app.address))
        .header("X-User-ID", "777")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert!(body["data"].as_array().expect("Expected array").is_empty());

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn listing_requires_user_header() {
    let app = TestApp::spawn().await;

    let response = app
        .anonymous_client()
        .get(format!("{}/user-invoices", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 401);

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn payment_status_update_reaches_invoice_and_projection() {
    let app = TestApp::spawn().await;
    let ui_id = invoiced_user_invoice_id(&app).await;

    let response = app
        .client()
        .put(format!("{}/user-invoices/{}/status", app.address, ui_id))
        .json(&json!({ "userInvoiceId": ui_id, "paymentStatus": "PAID" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["data"]["payment_status"], "PAID");

    // Canonical invoice updated too.
    let projection = app
        .db
        .get_user_invoice(ui_id)
        .await
        .expect("Failed to fetch projection")
        .expect("Projection missing");
    let invoice = app
        .db
        .get_customer_invoice(projection.invoice_id)
        .await
        .expect("Failed to fetch invoice")
        .expect("Invoice missing");
    assert_eq!(invoice.invoice.payment_status, "PAID");
    assert_eq!(projection.payment_status, "PAID");

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn payment_status_updates_are_lenient_about_direction() {
    let app = TestApp::spawn().await;
    let ui_id = invoiced_user_invoice_id(&app).await;

    for status in ["PAID", "PARTIALLY_PAID"] {
        let response = app
            .client()
            .put(format!("{}/user-invoices/{}/status", app.address, ui_id))
            .json(&json!({ "userInvoiceId": ui_id, "paymentStatus": status }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status(), 200);
    }

    // Stepping back from PAID is accepted; both rows carry the second value.
    let projection = app
        .db
        .get_user_invoice(ui_id)
        .await
        .expect("Failed to fetch projection")
        .expect("Projection missing");
    let invoice = app
        .db
        .get_customer_invoice(projection.invoice_id)
        .await
        .expect("Failed to fetch invoice")
        .expect("Invoice missing");
    assert_eq!(projection.payment_status, "PARTIALLY_PAID");
    assert_eq!(invoice.invoice.payment_status, "PARTIALLY_PAID");

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn unknown_payment_status_is_rejected() {
    let app = TestApp::spawn().await;
    let ui_id = invoiced_user_invoice_id(&app).await;

    let response = app
        .client()
        .put(format!("{}/user-invoices/{}/status", app.address, ui_id))
        .json(&json!({ "userInvoiceId": ui_id, "paymentStatus": "VOID" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn mismatched_body_id_is_rejected() {
    let app = TestApp::spawn().await;
    let ui_id = invoiced_user_invoice_id(&app).await;

    let response = app
        .client()
        .put(format!("{}/user-invoices/{}/status", app.address, ui_id))
        .json(&json!({ "userInvoiceId": ui_id + 1, "paymentStatus": "PAID" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn missing_user_invoice_returns_404() {
    let app = TestApp::spawn().await;

    let response = app
        .client()
        .get(format!("{}/user-invoices/9999", app.address))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 404);

    let response = app
        .client()
        .put(format!("{}/user-invoices/9999/status", app.address))
        .json(&json!({ "userInvoiceId": 9999, "paymentStatus": "PAID" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}
