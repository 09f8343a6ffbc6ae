use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
/// Body for `POST /control/vote/start`.
pub struct StartVoteRequest {
    /// Countdown override in seconds; the engine minimum still applies.
    #[validate(range(min = 1, max = 3600))]
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Generic acknowledgement returned by control routes.
pub struct ActionResponse {
    /// Human-readable confirmation.
    pub message: String,
}
