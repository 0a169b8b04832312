pub mod database;
pub mod metrics;
pub mod tax;

pub use database::Database;
