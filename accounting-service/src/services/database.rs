//! Database service for accounting-service.
//!
//! All SQL lives here. The bill/invoice transitions are composite
//! transactions: inventory, ledger postings, invoice materialization and the
//! status flip either all commit or all roll back.

use crate::models::{
    Account, Contact, CustomerInvoice, CustomerInvoiceItem, DocumentRef, InventoryRecord,
    InvoiceWithItems,
    LedgerTransaction, NewPurchaseOrder, NewSalesOrder, OrderStatus, PaymentStatus, Product,
    PurchaseOrder, PurchaseOrderItem, PurchaseOrderWithItems, SalesOrder, SalesOrderItem,
    SalesOrderWithItems, Tax, TaxSide, UserInvoice,
};
use crate::services::metrics::{DB_QUERY_DURATION, ORDER_TRANSITIONS_TOTAL};
use chrono::{Duration as ChronoDuration, NaiveDate};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::Transaction;
use std::time::Duration;
use tracing::{info, instrument, warn};

const PURCHASE_COLUMNS: &str = "id, vendor_id, order_date, status, total_amount, tax_amount, \
     grand_total, created_by, created_at, updated_at";
const SALES_COLUMNS: &str = "id, customer_id, order_date, status, total_amount, tax_amount, \
     grand_total, created_by, created_at, updated_at";
const INVOICE_COLUMNS: &str = "id, invoice_number, customer_id, sales_order_id, invoice_date, \
     due_date, total_amount, tax_amount, grand_total, payment_status, created_at, updated_at";
const USER_INVOICE_COLUMNS: &str = "id, user_id, invoice_id, invoice_number, invoice_date, \
     due_date, amount_due, payment_status, updated_at";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "accounting-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Catalog / Contact lookups (read-only collaborators)
    // -------------------------------------------------------------------------

    /// Find a product by id.
    #[instrument(skip(self))]
    pub async fn find_product_by_id(&self, product_id: i64) -> Result<Option<Product>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_product_by_id"])
            .start_timer();

        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, description, price, is_active, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch product: {}", e)))?;

        timer.observe_duration();
        Ok(product)
    }

    /// List active taxes applicable on the given side (or `both`).
    #[instrument(skip(self))]
    pub async fn find_taxes_by_applicable_on(&self, side: TaxSide) -> Result<Vec<Tax>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_taxes_by_applicable_on"])
            .start_timer();

        let taxes = sqlx::query_as::<_, Tax>(
            r#"
            SELECT id, name, computation_method, value, applicable_on, active, created_at
            FROM taxes
            WHERE active = TRUE AND (applicable_on = $1 OR applicable_on = 'both')
            ORDER BY id
            "#,
        )
        .bind(side.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch taxes: {}", e)))?;

        timer.observe_duration();
        Ok(taxes)
    }

    /// Find a vendor/customer contact by id.
    #[instrument(skip(self))]
    pub async fn get_contact_by_id(&self, contact_id: i64) -> Result<Option<Contact>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_contact_by_id"])
            .start_timer();

        let contact = sqlx::query_as::<_, Contact>(
            r#"
            SELECT id, name, contact_type, email, created_at, updated_at
            FROM contacts
            WHERE id = $1
            "#,
        )
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch contact: {}", e)))?;

        timer.observe_duration();
        Ok(contact)
    }

    /// Get the inventory record for a product, if one exists.
    #[instrument(skip(self))]
    pub async fn get_inventory(
        &self,
        product_id: i64,
    ) -> Result<Option<InventoryRecord>, AppError> {
        let record = sqlx::query_as::<_, InventoryRecord>(
            "SELECT product_id, quantity, updated_at FROM inventory WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch inventory: {}", e))
        })?;
        Ok(record)
    }

    /// Look up a ledger account.
    #[instrument(skip(self))]
    pub async fn get_account_by_id(&self, coa_id: i64) -> Result<Option<Account>, AppError> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, name, account_type FROM chart_of_accounts WHERE id = $1",
        )
        .bind(coa_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch account: {}", e)))?;
        Ok(account)
    }

    /// All ledger rows written for one source document.
    #[instrument(skip(self))]
    pub async fn get_transactions_by_reference(
        &self,
        reference: DocumentRef,
    ) -> Result<Vec<LedgerTransaction>, AppError> {
        let rows = sqlx::query_as::<_, LedgerTransaction>(
            r#"
            SELECT id, coa_id, amount, type, reference_id, reference_type, created_at
            FROM transactions
            WHERE reference_type = $1 AND reference_id = $2
            ORDER BY id
            "#,
        )
        .bind(reference.reference_type())
        .bind(reference.reference_id())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch transactions: {}", e))
        })?;
        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // Purchase Orders
    // -------------------------------------------------------------------------

    /// Create a purchase order with its line items in one transaction.
    #[instrument(skip(self, input), fields(vendor_id = %input.vendor_id))]
    pub async fn create_purchase_order(
        &self,
        input: &NewPurchaseOrder,
    ) -> Result<PurchaseOrderWithItems, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_purchase_order"])
            .start_timer();

        let mut tx = self.begin().await?;

        let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            INSERT INTO purchase_orders
                (vendor_id, order_date, status, total_amount, tax_amount, grand_total, created_by)
            VALUES ($1, $2, 'DRAFT', $3, $4, $5, $6)
            RETURNING {PURCHASE_COLUMNS}
            "#
        ))
        .bind(input.vendor_id)
        .bind(input.order_date)
        .bind(input.total_amount)
        .bind(input.tax_amount)
        .bind(input.grand_total)
        .bind(input.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create purchase order: {}", e))
        })?;

        let mut items = Vec::with_capacity(input.items.len());
        for item in &input.items {
            let row = sqlx::query_as::<_, PurchaseOrderItem>(
                r#"
                INSERT INTO purchase_order_items
                    (purchase_order_id, product_id, quantity, unit_price, tax_rate, tax_amount, line_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, purchase_order_id, product_id, quantity, unit_price, tax_rate,
                    tax_amount, line_total
                "#,
            )
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.tax_rate)
            .bind(item.tax_amount)
            .bind(item.line_total)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create order item: {}", e))
            })?;
            items.push(row);
        }

        self.commit(tx).await?;
        timer.observe_duration();

        info!(
            purchase_order_id = %order.id,
            grand_total = %order.grand_total,
            items = items.len(),
            "Purchase order created"
        );

        Ok(PurchaseOrderWithItems { order, items })
    }

    /// Fetch a purchase order with its items.
    #[instrument(skip(self))]
    pub async fn get_purchase_order(
        &self,
        po_id: i64,
    ) -> Result<Option<PurchaseOrderWithItems>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_purchase_order"])
            .start_timer();

        let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchase_orders WHERE id = $1"
        ))
        .bind(po_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch purchase order: {}", e))
        })?;

        let Some(order) = order else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, PurchaseOrderItem>(
            r#"
            SELECT id, purchase_order_id, product_id, quantity, unit_price, tax_rate,
                tax_amount, line_total
            FROM purchase_order_items
            WHERE purchase_order_id = $1
            ORDER BY id
            "#,
        )
        .bind(po_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch items: {}", e)))?;

        timer.observe_duration();
        Ok(Some(PurchaseOrderWithItems { order, items }))
    }

    /// Confirm a purchase order (`DRAFT -> CONFIRMED`). Guarded update: only
    /// flips the status when the order is currently in `DRAFT`.
    #[instrument(skip(self))]
    pub async fn confirm_purchase_order(&self, po_id: i64) -> Result<PurchaseOrder, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["confirm_purchase_order"])
            .start_timer();

        let updated = sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            UPDATE purchase_orders
            SET status = 'CONFIRMED', updated_at = NOW()
            WHERE id = $1 AND status = 'DRAFT'
            RETURNING {PURCHASE_COLUMNS}
            "#
        ))
        .bind(po_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to confirm purchase order: {}", e))
        })?;

        timer.observe_duration();

        match updated {
            Some(order) => {
                ORDER_TRANSITIONS_TOTAL
                    .with_label_values(&["purchase", "confirm"])
                    .inc();
                info!(purchase_order_id = %order.id, "Purchase order confirmed");
                Ok(order)
            }
            None => Err(self.purchase_transition_failure(po_id, OrderStatus::Draft).await),
        }
    }

    /// Cancel a purchase order. Draft-only.
    #[instrument(skip(self))]
    pub async fn cancel_purchase_order(&self, po_id: i64) -> Result<PurchaseOrder, AppError> {
        let updated = sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            UPDATE purchase_orders
            SET status = 'CANCELLED', updated_at = NOW()
            WHERE id = $1 AND status = 'DRAFT'
            RETURNING {PURCHASE_COLUMNS}
            "#
        ))
        .bind(po_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to cancel purchase order: {}", e))
        })?;

        match updated {
            Some(order) => {
                ORDER_TRANSITIONS_TOTAL
                    .with_label_values(&["purchase", "cancel"])
                    .inc();
                info!(purchase_order_id = %order.id, "Purchase order cancelled");
                Ok(order)
            }
            None => Err(self.purchase_transition_failure(po_id, OrderStatus::Draft).await),
        }
    }

    /// Bill a purchase order (`CONFIRMED -> BILLED`).
    ///
    /// Composite transaction: increments inventory per item, posts
    /// DEBIT "Purchases Expense" / CREDIT "Accounts Payable" for the grand
    /// total, flips the status. The `FOR UPDATE` lock plus the in-transaction
    /// status check reject a concurrent second billing.
    #[instrument(skip(self))]
    pub async fn bill_purchase_order(
        &self,
        po_id: i64,
    ) -> Result<PurchaseOrderWithItems, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["bill_purchase_order"])
            .start_timer();

        let mut tx = self.begin().await?;

        let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchase_orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(po_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch purchase order: {}", e))
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Purchase order {} not found", po_id)))?;

        if order.parsed_status() != OrderStatus::Confirmed {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Purchase order {} is {}, expected CONFIRMED",
                po_id,
                order.status
            )));
        }

        let items = sqlx::query_as::<_, PurchaseOrderItem>(
            r#"
            SELECT id, purchase_order_id, product_id, quantity, unit_price, tax_rate,
                tax_amount, line_total
            FROM purchase_order_items
            WHERE purchase_order_id = $1
            ORDER BY id
            "#,
        )
        .bind(po_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch items: {}", e)))?;

        // Receiving stock: atomic upsert, absent row treated as zero.
        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO inventory (product_id, quantity)
                VALUES ($1, $2)
                ON CONFLICT (product_id)
                DO UPDATE SET quantity = inventory.quantity + EXCLUDED.quantity,
                              updated_at = NOW()
                "#,
            )
            .bind(item.product_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to adjust inventory: {}", e))
            })?;
        }

        Self::post_ledger_pair(
            &mut tx,
            "Purchases Expense",
            "Accounts Payable",
            order.grand_total,
            DocumentRef::PurchaseOrder(po_id),
        )
        .await?;

        let order = sqlx::query_as::<_, PurchaseOrder>(&format!(
            r#"
            UPDATE purchase_orders
            SET status = 'BILLED', updated_at = NOW()
            WHERE id = $1
            RETURNING {PURCHASE_COLUMNS}
            "#
        ))
        .bind(po_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update order status: {}", e))
        })?;

        self.commit(tx).await?;
        timer.observe_duration();

        ORDER_TRANSITIONS_TOTAL
            .with_label_values(&["purchase", "bill"])
            .inc();
        info!(
            purchase_order_id = %order.id,
            grand_total = %order.grand_total,
            "Purchase order billed"
        );

        Ok(PurchaseOrderWithItems { order, items })
    }

    // -------------------------------------------------------------------------
    // Sales Orders
    // -------------------------------------------------------------------------

    /// Create a sales order with its line items in one transaction.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn create_sales_order(
        &self,
        input: &NewSalesOrder,
    ) -> Result<SalesOrderWithItems, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_sales_order"])
            .start_timer();

        let mut tx = self.begin().await?;

        let order = sqlx::query_as::<_, SalesOrder>(&format!(
            r#"
            INSERT INTO sales_orders
                (customer_id, order_date, status, total_amount, tax_amount, grand_total, created_by)
            VALUES ($1, $2, 'DRAFT', $3, $4, $5, $6)
            RETURNING {SALES_COLUMNS}
            "#
        ))
        .bind(input.customer_id)
        .bind(input.order_date)
        .bind(input.total_amount)
        .bind(input.tax_amount)
        .bind(input.grand_total)
        .bind(input.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create sales order: {}", e))
        })?;

        let mut items = Vec::with_capacity(input.items.len());
        for item in &input.items {
            let row = sqlx::query_as::<_, SalesOrderItem>(
                r#"
                INSERT INTO sales_order_items
                    (sales_order_id, product_id, quantity, unit_price, line_total)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, sales_order_id, product_id, quantity, unit_price, line_total
                "#,
            )
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.line_total)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create order item: {}", e))
            })?;
            items.push(row);
        }

        self.commit(tx).await?;
        timer.observe_duration();

        info!(
            sales_order_id = %order.id,
            grand_total = %order.grand_total,
            items = items.len(),
            "Sales order created"
        );

        Ok(SalesOrderWithItems { order, items })
    }

    /// Fetch a sales order with its items.
    #[instrument(skip(self))]
    pub async fn get_sales_order(
        &self,
        so_id: i64,
    ) -> Result<Option<SalesOrderWithItems>, AppError> {
        let order = sqlx::query_as::<_, SalesOrder>(&format!(
            "SELECT {SALES_COLUMNS} FROM sales_orders WHERE id = $1"
        ))
        .bind(so_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch sales order: {}", e))
        })?;

        let Some(order) = order else {
            return Ok(None);
        };

        let items = self.sales_order_items(so_id).await?;
        Ok(Some(SalesOrderWithItems { order, items }))
    }

    /// Confirm a sales order (`DRAFT -> CONFIRMED`).
    #[instrument(skip(self))]
    pub async fn confirm_sales_order(&self, so_id: i64) -> Result<SalesOrder, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["confirm_sales_order"])
            .start_timer();

        let updated = sqlx::query_as::<_, SalesOrder>(&format!(
            r#"
            UPDATE sales_orders
            SET status = 'CONFIRMED', updated_at = NOW()
            WHERE id = $1 AND status = 'DRAFT'
            RETURNING {SALES_COLUMNS}
            "#
        ))
        .bind(so_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to confirm sales order: {}", e))
        })?;

        timer.observe_duration();

        match updated {
            Some(order) => {
                ORDER_TRANSITIONS_TOTAL
                    .with_label_values(&["sales", "confirm"])
                    .inc();
                info!(sales_order_id = %order.id, "Sales order confirmed");
                Ok(order)
            }
            None => Err(self.sales_transition_failure(so_id, OrderStatus::Draft).await),
        }
    }

    /// Cancel a sales order. Draft-only.
    #[instrument(skip(self))]
    pub async fn cancel_sales_order(&self, so_id: i64) -> Result<SalesOrder, AppError> {
        let updated = sqlx::query_as::<_, SalesOrder>(&format!(
            r#"
            UPDATE sales_orders
            SET status = 'CANCELLED', updated_at = NOW()
            WHERE id = $1 AND status = 'DRAFT'
            RETURNING {SALES_COLUMNS}
            "#
        ))
        .bind(so_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to cancel sales order: {}", e))
        })?;

        match updated {
            Some(order) => {
                ORDER_TRANSITIONS_TOTAL
                    .with_label_values(&["sales", "cancel"])
                    .inc();
                info!(sales_order_id = %order.id, "Sales order cancelled");
                Ok(order)
            }
            None => Err(self.sales_transition_failure(so_id, OrderStatus::Draft).await),
        }
    }

    /// Invoice a sales order (`CONFIRMED -> INVOICED`).
    ///
    /// Composite transaction: decrements inventory per item, posts
    /// DEBIT "Accounts Receivable" / CREDIT "Sales Income" for the grand
    /// total, materializes the customer invoice with copied line items plus
    /// the per-user projection row, and flips the status.
    #[instrument(skip(self))]
    pub async fn invoice_sales_order(
        &self,
        so_id: i64,
        invoice_date: NaiveDate,
        due_days: i64,
        allow_negative_stock: bool,
    ) -> Result<(SalesOrderWithItems, InvoiceWithItems, Option<UserInvoice>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["invoice_sales_order"])
            .start_timer();

        let mut tx = self.begin().await?;

        let order = sqlx::query_as::<_, SalesOrder>(&format!(
            "SELECT {SALES_COLUMNS} FROM sales_orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(so_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch sales order: {}", e))
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Sales order {} not found", so_id)))?;

        if order.parsed_status() != OrderStatus::Confirmed {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Sales order {} is {}, expected CONFIRMED",
                so_id,
                order.status
            )));
        }

        let items = sqlx::query_as::<_, SalesOrderItem>(
            r#"
            SELECT id, sales_order_id, product_id, quantity, unit_price, line_total
            FROM sales_order_items
            WHERE sales_order_id = $1
            ORDER BY id
            "#,
        )
        .bind(so_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch items: {}", e)))?;

        // Shipping stock: atomic decrement, absent row treated as zero.
        for item in &items {
            let remaining: Decimal = sqlx::query_scalar(
                r#"
                INSERT INTO inventory (product_id, quantity)
                VALUES ($1, -$2::NUMERIC)
                ON CONFLICT (product_id)
                DO UPDATE SET quantity = inventory.quantity + EXCLUDED.quantity,
                              updated_at = NOW()
                RETURNING quantity
                "#,
            )
            .bind(item.product_id)
            .bind(item.quantity)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to adjust inventory: {}", e))
            })?;

            if !allow_negative_stock && remaining < Decimal::ZERO {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Insufficient stock for product {}: would drop to {}",
                    item.product_id,
                    remaining
                )));
            }
        }

        // Materialize the invoice; the number comes from a sequence so it is
        // unique under concurrent invoicing.
        let due_date = invoice_date + ChronoDuration::days(due_days);
        let invoice = sqlx::query_as::<_, CustomerInvoice>(&format!(
            r#"
            INSERT INTO customer_invoices
                (invoice_number, customer_id, sales_order_id, invoice_date, due_date,
                 total_amount, tax_amount, grand_total, payment_status)
            VALUES (next_invoice_number(), $1, $2, $3, $4, $5, $6, $7, 'UNPAID')
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(order.customer_id)
        .bind(so_id)
        .bind(invoice_date)
        .bind(due_date)
        .bind(order.total_amount)
        .bind(order.tax_amount)
        .bind(order.grand_total)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e))
        })?;

        let mut invoice_items = Vec::with_capacity(items.len());
        for item in &items {
            let row = sqlx::query_as::<_, CustomerInvoiceItem>(
                r#"
                INSERT INTO customer_invoice_items (invoice_id, product_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4)
                RETURNING id, invoice_id, product_id, quantity, unit_price
                "#,
            )
            .bind(invoice.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice item: {}", e))
            })?;
            invoice_items.push(row);
        }

        Self::post_ledger_pair(
            &mut tx,
            "Accounts Receivable",
            "Sales Income",
            invoice.grand_total,
            DocumentRef::CustomerInvoice(invoice.id),
        )
        .await?;

        // Projection row for the creator's "my invoices" listing.
        let user_invoice = match order.created_by {
            Some(user_id) => Some(Self::regenerate_user_invoice(&mut tx, user_id, &invoice).await?),
            None => {
                warn!(sales_order_id = %so_id, "Sales order has no creator; skipping user-invoice projection");
                None
            }
        };

        let order = sqlx::query_as::<_, SalesOrder>(&format!(
            r#"
            UPDATE sales_orders
            SET status = 'INVOICED', updated_at = NOW()
            WHERE id = $1
            RETURNING {SALES_COLUMNS}
            "#
        ))
        .bind(so_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update order status: {}", e))
        })?;

        self.commit(tx).await?;
        timer.observe_duration();

        ORDER_TRANSITIONS_TOTAL
            .with_label_values(&["sales", "invoice"])
            .inc();
        info!(
            sales_order_id = %order.id,
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            grand_total = %invoice.grand_total,
            "Customer invoice generated"
        );

        Ok((
            SalesOrderWithItems { order, items },
            InvoiceWithItems {
                invoice,
                items: invoice_items,
            },
            user_invoice,
        ))
    }

    // -------------------------------------------------------------------------
    // Invoices & payment status
    // -------------------------------------------------------------------------

    /// List the projection rows for one user, newest first.
    #[instrument(skip(self))]
    pub async fn list_user_invoices(&self, user_id: i64) -> Result<Vec<UserInvoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_user_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, UserInvoice>(&format!(
            r#"
            SELECT {USER_INVOICE_COLUMNS}
            FROM user_invoices
            WHERE user_id = $1
            ORDER BY invoice_date DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list user invoices: {}", e))
        })?;

        timer.observe_duration();
        Ok(invoices)
    }

    /// Fetch one projection row.
    #[instrument(skip(self))]
    pub async fn get_user_invoice(
        &self,
        user_invoice_id: i64,
    ) -> Result<Option<UserInvoice>, AppError> {
        let invoice = sqlx::query_as::<_, UserInvoice>(&format!(
            "SELECT {USER_INVOICE_COLUMNS} FROM user_invoices WHERE id = $1"
        ))
        .bind(user_invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch user invoice: {}", e))
        })?;
        Ok(invoice)
    }

    /// Fetch the canonical invoice with its items.
    #[instrument(skip(self))]
    pub async fn get_customer_invoice(
        &self,
        invoice_id: i64,
    ) -> Result<Option<InvoiceWithItems>, AppError> {
        let invoice = sqlx::query_as::<_, CustomerInvoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM customer_invoices WHERE id = $1"
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch invoice: {}", e)))?;

        let Some(invoice) = invoice else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, CustomerInvoiceItem>(
            r#"
            SELECT id, invoice_id, product_id, quantity, unit_price
            FROM customer_invoice_items
            WHERE invoice_id = $1
            ORDER BY id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch invoice items: {}", e))
        })?;

        Ok(Some(InvoiceWithItems { invoice, items }))
    }

    /// Set an invoice's payment status through its projection row id.
    ///
    /// Updates the canonical `customer_invoices` row and regenerates the
    /// `user_invoices` projection from it in the same transaction.
    #[instrument(skip(self))]
    pub async fn set_payment_status(
        &self,
        user_invoice_id: i64,
        status: PaymentStatus,
    ) -> Result<(CustomerInvoice, UserInvoice), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_payment_status"])
            .start_timer();

        let mut tx = self.begin().await?;

        let projection = sqlx::query_as::<_, UserInvoice>(&format!(
            "SELECT {USER_INVOICE_COLUMNS} FROM user_invoices WHERE id = $1 FOR UPDATE"
        ))
        .bind(user_invoice_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to fetch user invoice: {}", e))
        })?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("User invoice {} not found", user_invoice_id))
        })?;

        let invoice = sqlx::query_as::<_, CustomerInvoice>(&format!(
            r#"
            UPDATE customer_invoices
            SET payment_status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(projection.invoice_id)
        .bind(status.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice status: {}", e))
        })?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Invoice {} referenced by projection is missing",
                projection.invoice_id
            ))
        })?;

        let projection =
            Self::regenerate_user_invoice(&mut tx, projection.user_id, &invoice).await?;

        self.commit(tx).await?;
        timer.observe_duration();

        info!(
            invoice_id = %invoice.id,
            user_invoice_id = %projection.id,
            payment_status = %invoice.payment_status,
            "Invoice payment status updated"
        );

        Ok((invoice, projection))
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }

    async fn commit(&self, tx: Transaction<'static, Postgres>) -> Result<(), AppError> {
        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })
    }

    async fn sales_order_items(&self, so_id: i64) -> Result<Vec<SalesOrderItem>, AppError> {
        sqlx::query_as::<_, SalesOrderItem>(
            r#"
            SELECT id, sales_order_id, product_id, quantity, unit_price, line_total
            FROM sales_order_items
            WHERE sales_order_id = $1
            ORDER BY id
            "#,
        )
        .bind(so_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch items: {}", e)))
    }

    /// Write the balanced DEBIT/CREDIT pair for one posting event. Accounts
    /// are resolved by name inside the transaction; both rows carry the same
    /// amount, so debits equal credits by construction.
    async fn post_ledger_pair(
        tx: &mut Transaction<'static, Postgres>,
        debit_account: &str,
        credit_account: &str,
        amount: Decimal,
        reference: DocumentRef,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (coa_id, amount, type, reference_id, reference_type)
            VALUES
                ((SELECT id FROM chart_of_accounts WHERE name = $1), $3, 'DEBIT', $4, $5),
                ((SELECT id FROM chart_of_accounts WHERE name = $2), $3, 'CREDIT', $4, $5)
            "#,
        )
        .bind(debit_account)
        .bind(credit_account)
        .bind(amount)
        .bind(reference.reference_id())
        .bind(reference.reference_type())
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to post ledger entries: {}", e))
        })?;
        Ok(())
    }

    /// Upsert the projection row from the canonical invoice. The projection
    /// is always derived, never independently mutated.
    async fn regenerate_user_invoice(
        tx: &mut Transaction<'static, Postgres>,
        user_id: i64,
        invoice: &CustomerInvoice,
    ) -> Result<UserInvoice, AppError> {
        sqlx::query_as::<_, UserInvoice>(&format!(
            r#"
            INSERT INTO user_invoices
                (user_id, invoice_id, invoice_number, invoice_date, due_date,
                 amount_due, payment_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (invoice_id)
            DO UPDATE SET invoice_number = EXCLUDED.invoice_number,
                          invoice_date = EXCLUDED.invoice_date,
                          due_date = EXCLUDED.due_date,
                          amount_due = EXCLUDED.amount_due,
                          payment_status = EXCLUDED.payment_status,
                          updated_at = NOW()
            RETURNING {USER_INVOICE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(invoice.id)
        .bind(&invoice.invoice_number)
        .bind(invoice.invoice_date)
        .bind(invoice.due_date)
        .bind(invoice.grand_total)
        .bind(&invoice.payment_status)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Failed to regenerate user invoice projection: {}",
                e
            ))
        })
    }

    /// Zero rows matched a guarded purchase-order update: report whether the
    /// order is absent or in the wrong state.
    async fn purchase_transition_failure(&self, po_id: i64, expected: OrderStatus) -> AppError {
        let status: Result<Option<String>, _> =
            sqlx::query_scalar("SELECT status FROM purchase_orders WHERE id = $1")
                .bind(po_id)
                .fetch_optional(&self.pool)
                .await;

        match status {
            Ok(Some(current)) => AppError::InvalidState(anyhow::anyhow!(
                "Purchase order {} is {}, expected {}",
                po_id,
                current,
                expected
            )),
            Ok(None) => AppError::NotFound(anyhow::anyhow!("Purchase order {} not found", po_id)),
            Err(e) => AppError::DatabaseError(anyhow::anyhow!("Failed to fetch status: {}", e)),
        }
    }

    async fn sales_transition_failure(&self, so_id: i64, expected: OrderStatus) -> AppError {
        let status: Result<Option<String>, _> =
            sqlx::query_scalar("SELECT status FROM sales_orders WHERE id = $1")
                .bind(so_id)
                .fetch_optional(&self.pool)
                .await;

        match status {
            Ok(Some(current)) => AppError::InvalidState(anyhow::anyhow!(
                "Sales order {} is {}, expected {}",
                so_id,
                current,
                expected
            )),
            Ok(None) => AppError::NotFound(anyhow::anyhow!("Sales order {} not found", so_id)),
            Err(e) => AppError::DatabaseError(anyhow::anyhow!("Failed to fetch status: {}", e)),
        }
    }
}
