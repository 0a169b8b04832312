//! Application startup and lifecycle management.

use crate::config::Config;
use crate::handlers;
use crate::middleware::metrics_middleware;
use crate::services::metrics::init_metrics;
use crate::services::Database;
use axum::middleware::from_fn;
use axum::{
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: Database,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: Config) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: Config, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let state = AppState {
            config: config.clone(),
            db,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Accounting service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped by Ctrl+C or SIGTERM. In-flight
    /// requests are drained before the server exits.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Self::router(self.state);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics_handler))
            .route(
                "/purchase-orders",
                post(handlers::purchase_orders::create_purchase_order),
            )
            .route(
                "/purchase-orders/:id",
                get(handlers::purchase_orders::get_purchase_order),
            )
            .route(
                "/purchase-orders/:id/confirm",
                put(handlers::purchase_orders::confirm_purchase_order),
            )
            .route(
                "/purchase-orders/:id/cancel",
                put(handlers::purchase_orders::cancel_purchase_order),
            )
            .route(
                "/purchase-orders/:id/bill",
                put(handlers::purchase_orders::bill_purchase_order),
            )
            .route(
                "/sales-orders",
                post(handlers::sales_orders::create_sales_order),
            )
            .route(
                "/sales-orders/:id",
                get(handlers::sales_orders::get_sales_order),
            )
            .route(
                "/sales-orders/:id/confirm",
                put(handlers::sales_orders::confirm_sales_order),
            )
            .route(
                "/sales-orders/:id/cancel",
                put(handlers::sales_orders::cancel_sales_order),
            )
            .route(
                "/sales-orders/:id/invoice",
                put(handlers::sales_orders::invoice_sales_order),
            )
            .route(
                "/user-invoices",
                get(handlers::user_invoices::list_user_invoices),
            )
            .route(
                "/user-invoices/:id",
                get(handlers::user_invoices::get_user_invoice),
            )
            .route(
                "/user-invoices/:id/status",
                put(handlers::user_invoices::update_payment_status),
            )
            .layer(CorsLayer::permissive())
            .layer(from_fn(metrics_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        user_id = tracing::field::Empty,
                    )
                }),
            )
            .with_state(state)
    }
}
