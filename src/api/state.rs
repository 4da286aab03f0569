use std::sync::Arc;

use crate::services::{HealthState, OrderQuery};

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    /// Cache-first order lookups
    pub query: OrderQuery,

    /// Component health
    pub health: Arc<HealthState>,
}

impl AppState {
    pub fn new(query: OrderQuery, health: Arc<HealthState>) -> Self {
        Self { query, health }
    }
}
