use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dto::control::{ActionResponse, StartVoteRequest},
    error::AppError,
    services::session_service,
    state::SharedState,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Operator endpoints driving the vote cycle. All of them require the token
/// issued by the `/sse/admin` stream.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/control/vote/start", post(start_vote))
        .route("/control/vote/tally", post(tally))
        .route("/control/pause", post(pause))
        .route("/control/resume", post(resume))
        .route("/control/abort", post(abort))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

#[utoipa::path(
    post,
    path = "/control/vote/start",
    tag = "control",
    params(("X-Admin-Token" = String, Header, description = "Token issued by the /sse/admin stream")),
    request_body = StartVoteRequest,
    responses(
        (status = 200, description = "Vote cycle opened", body = ActionResponse),
        (status = 409, description = "A cycle is already running")
    )
)]
/// Open a vote cycle, optionally overriding the countdown length.
pub async fn start_vote(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<StartVoteRequest>>,
) -> Result<Json<ActionResponse>, AppError> {
    let duration = payload.duration_secs.map(Duration::from_secs);
    session_service::open_vote(&state, duration).await?;
    Ok(Json(ActionResponse {
        message: "vote cycle opened".into(),
    }))
}

#[utoipa::path(
    post,
    path = "/control/vote/tally",
    tag = "control",
    params(("X-Admin-Token" = String, Header, description = "Token issued by the /sse/admin stream")),
    responses(
        (status = 200, description = "Vote closed and merged", body = ActionResponse),
        (status = 409, description = "No vote is running")
    )
)]
/// Close the running vote early and merge what was collected.
pub async fn tally(
    State(state): State<SharedState>,
) -> Result<Json<ActionResponse>, AppError> {
    session_service::close_vote(&state).await?;
    Ok(Json(ActionResponse {
        message: "vote closed".into(),
    }))
}

#[utoipa::path(
    post,
    path = "/control/pause",
    tag = "control",
    params(("X-Admin-Token" = String, Header, description = "Token issued by the /sse/admin stream")),
    responses((status = 200, description = "Pause attempted", body = ActionResponse))
)]
/// Freeze the armed deadline, preserving its remaining time.
pub async fn pause(State(state): State<SharedState>) -> Json<ActionResponse> {
    let message = if session_service::pause(&state).await {
        "paused"
    } else {
        "nothing to pause"
    };
    Json(ActionResponse {
        message: message.into(),
    })
}

#[utoipa::path(
    post,
    path = "/control/resume",
    tag = "control",
    params(("X-Admin-Token" = String, Header, description = "Token issued by the /sse/admin stream")),
    responses((status = 200, description = "Resume attempted", body = ActionResponse))
)]
/// Re-arm a paused deadline, or start a fresh auto-repeat cycle.
pub async fn resume(State(state): State<SharedState>) -> Json<ActionResponse> {
    let message = match session_service::resume(&state).await {
        Some(kind) => format!("resumed {kind:?}"),
        None => "nothing to resume".to_string(),
    };
    Json(ActionResponse { message })
}

#[utoipa::path(
    post,
    path = "/control/abort",
    tag = "control",
    params(("X-Admin-Token" = String, Header, description = "Token issued by the /sse/admin stream")),
    responses((status = 200, description = "Session forced back to idle", body = ActionResponse))
)]
/// Drop the current cycle and return to idle.
pub async fn abort(State(state): State<SharedState>) -> Json<ActionResponse> {
    session_service::abort(&state).await;
    Json(ActionResponse {
        message: "session reset to idle".into(),
    })
}

async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    if state.admin().token_matches(&provided).await {
        Ok(next.run(req).await)
    } else {
        Err(AppError::Unauthorized(
            "invalid or uninitialised admin token".into(),
        ))
    }
}
