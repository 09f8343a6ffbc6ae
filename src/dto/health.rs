use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::session::PhaseSnapshot;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Current phase of the session cycle.
    pub phase: PhaseSnapshot,
}

impl HealthResponse {
    /// Health response indicating the engine can reach its collaborators.
    pub fn ok(phase: PhaseSnapshot) -> Self {
        Self {
            status: "ok".to_string(),
            phase,
        }
    }

    /// Health response indicating the engine runs without a story client.
    pub fn degraded(phase: PhaseSnapshot) -> Self {
        Self {
            status: "degraded".to_string(),
            phase,
        }
    }
}
