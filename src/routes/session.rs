use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::session::SessionSnapshot, services::session_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/session",
    tag = "session",
    responses((status = 200, description = "Current session snapshot", body = SessionSnapshot))
)]
/// Return the observer-facing projection of the whole session.
pub async fn session_snapshot(State(state): State<SharedState>) -> Json<SessionSnapshot> {
    Json(session_service::session_snapshot(&state).await)
}

/// Configure the session snapshot route.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/session", get(session_snapshot))
}
