use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub invoicing: InvoicingConfig,
    pub service_name: String,
    pub log_level: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct InvoicingConfig {
    /// Days between invoice date and due date.
    pub due_days: i64,
    /// When false, invoicing a sales order fails if stock would go negative.
    pub allow_negative_stock: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("ACCOUNTING_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("ACCOUNTING_SERVICE_PORT")
            .unwrap_or_else(|_| "3007".to_string())
            .parse()?;

        let db_url =
            env::var("ACCOUNTING_DATABASE_URL").context("ACCOUNTING_DATABASE_URL must be set")?;
        let max_connections = env::var("ACCOUNTING_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("ACCOUNTING_DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let due_days = env::var("ACCOUNTING_INVOICE_DUE_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()?;
        let allow_negative_stock = env::var("ACCOUNTING_ALLOW_NEGATIVE_STOCK")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let log_level = env::var("ACCOUNTING_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: db_url,
                max_connections,
                min_connections,
            },
            invoicing: InvoicingConfig {
                due_days,
                allow_negative_stock,
            },
            service_name: "accounting-service".to_string(),
            log_level,
        })
    }
}
