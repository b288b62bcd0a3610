//! Example consumer: binds a `sessions` table and serves its REST interface.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Expects a `sessions` table, e.g.:
//!
//! ```sql
//! CREATE TABLE sessions (
//!     session_id   TEXT PRIMARY KEY,
//!     ip           TEXT NOT NULL,
//!     session_data TEXT,
//!     hits         BIGINT,
//!     created_at   TIMESTAMPTZ,
//!     updated_at   TIMESTAMPTZ
//! );
//! ```

use restab::{
    common_routes_with_ready, entity_routes, AppState, EntityConfig, EntityRegistry, FieldRule,
    PaginationDefaults, PrimaryKeyPolicy,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("restab=info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/restab".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let mut registry = EntityRegistry::new();
    registry.bind_default("sessions", sessions_config())?;

    let state = AppState {
        pool,
        registry: Arc::new(registry),
    };

    let app = axum::Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .nest("/api/v1", entity_routes(state));

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn sessions_config() -> EntityConfig {
    let mut fields = HashMap::new();
    fields.insert(
        "session_id".to_string(),
        FieldRule::text().with_format("uuid"),
    );
    fields.insert("ip".to_string(), FieldRule::text().required().trimmed());
    fields.insert("session_data".to_string(), FieldRule::text());
    fields.insert("hits".to_string(), FieldRule::integer());
    EntityConfig {
        table: "sessions".into(),
        primary_key: "session_id".into(),
        primary_key_policy: PrimaryKeyPolicy::Guid,
        fields,
        on_create_timestamp: Some("created_at".into()),
        on_update_timestamp: Some("updated_at".into()),
        upsert: None,
        default_pagination: Some(PaginationDefaults { page: 1, per_page: 100 }),
    }
}
