use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::session::{MergeTrace, PhaseSnapshot};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// Optional SSE event name.
    pub event: Option<String>,
    /// Pre-serialized data field.
    pub data: String,
}

impl ServerEvent {
    /// Build an event from an already serialized data string.
    pub fn new<E>(event: E, data: String) -> Self
    where
        E: Into<Option<String>>,
    {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`public` or `admin`).
    pub stream: String,
    /// Whether the engine is running without a story client.
    pub degraded: bool,
    /// Operator token returned when the stream is privileged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever the session phase changes.
pub struct PhaseChangedEvent {
    /// The phase just entered.
    pub phase: PhaseSnapshot,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a cycle produced an action that was handed to the story
/// service.
pub struct ActionSubmittedEvent {
    /// The action text that was submitted.
    pub action: String,
    /// Party the action was submitted for.
    pub party: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Operator-stream event carrying the trace of a finished blend merge.
pub struct MergeTraceEvent {
    /// The captured trace.
    pub trace: MergeTrace,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a cycle was abandoned because a collaborator failed.
pub struct CycleErrorEvent {
    /// Human-readable description of the failure.
    pub message: String,
}
