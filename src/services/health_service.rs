use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether the engine can reach its story collaborator, plus the
/// current phase.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let phase = state.phase().await.into();
    if state.is_degraded().await {
        warn!("story client unavailable (degraded mode)");
        HealthResponse::degraded(phase)
    } else {
        HealthResponse::ok(phase)
    }
}
