//! Entity CRUD routes. Parameterized paths so Path extractors receive the
//! entity segment and id; handlers resolve the entity from the registry.

use crate::handlers::entity::{
    create, delete_many, delete_one, list, read, replace, schema, update_many, update_one,
};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/:entity",
            get(list).post(create).patch(update_many).delete(delete_many),
        )
        // Static segment wins over :id, so /:entity/schema stays reachable.
        .route("/:entity/schema", get(schema))
        .route(
            "/:entity/:id",
            get(read).patch(update_one).put(replace).delete(delete_one),
        )
        .with_state(state)
}
