use axum::Router;

use crate::state::SharedState;

pub mod control;
pub mod docs;
pub mod health;
pub mod ingest;
pub mod session;
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(session::router())
        .merge(ingest::router())
        .merge(sse::router())
        .merge(control::router(state.clone()));

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
