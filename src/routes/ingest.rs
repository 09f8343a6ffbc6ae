use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use axum_valid::Valid;

use crate::{
    dto::{control::ActionResponse, ingest::ChatEventRequest},
    services::chat_service,
    state::SharedState,
};

#[utoipa::path(
    post,
    path = "/ingest/chat",
    tag = "ingest",
    request_body = ChatEventRequest,
    responses((status = 202, description = "Event accepted (it may still be dropped as noise)", body = ActionResponse))
)]
/// Deliver one chat message from a transport into the session engine.
///
/// Acceptance only means the event was well-formed; whether it affects the
/// ledger depends on the current phase and the message content.
pub async fn ingest_chat(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<ChatEventRequest>>,
) -> (StatusCode, Json<ActionResponse>) {
    chat_service::handle_chat_event(&state, payload).await;
    (
        StatusCode::ACCEPTED,
        Json(ActionResponse {
            message: "accepted".into(),
        }),
    )
}

/// Configure the chat ingress route.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ingest/chat", post(ingest_chat))
}
