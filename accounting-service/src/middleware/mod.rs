pub mod actor;
pub mod http_metrics;

pub use actor::Actor;
pub use http_metrics::metrics_middleware;
