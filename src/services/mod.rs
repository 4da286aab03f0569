pub mod health;
pub mod query;

pub use health::{CacheSummary, ComponentHealth, HealthResponse, HealthState, HealthStatus};
pub use query::OrderQuery;
