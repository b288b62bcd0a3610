//! Shared application state for all routes.

use crate::registry::EntityRegistry;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Built once at startup; never mutated afterwards, so no lock is needed.
    pub registry: Arc<EntityRegistry>,
}
