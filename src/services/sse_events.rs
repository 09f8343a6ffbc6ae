use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        session::MergeTrace,
        sse::{
            ActionSubmittedEvent, CycleErrorEvent, MergeTraceEvent, PhaseChangedEvent, ServerEvent,
        },
    },
    services::session_service,
    state::{SharedState, state_machine::Phase},
};

const EVENT_PHASE_CHANGED: &str = "phase_changed";
const EVENT_SESSION: &str = "session";
const EVENT_ACTION_SUBMITTED: &str = "action.submitted";
const EVENT_MERGE_TRACE: &str = "merge.trace";
const EVENT_CYCLE_ERROR: &str = "cycle.error";

/// Broadcast a phase change to both streams.
pub fn broadcast_phase_changed(state: &SharedState, phase: Phase) {
    let payload = PhaseChangedEvent {
        phase: phase.into(),
    };
    send_public_event(state, EVENT_PHASE_CHANGED, &payload);
    send_admin_event(state, EVENT_PHASE_CHANGED, &payload);
}

/// Broadcast a full session snapshot to public subscribers.
pub async fn broadcast_session(state: &SharedState) {
    let snapshot = session_service::session_snapshot(state).await;
    send_public_event(state, EVENT_SESSION, &snapshot);
}

/// Broadcast that an action was handed to the story service.
pub fn broadcast_action_submitted(state: &SharedState, action: &str) {
    let payload = ActionSubmittedEvent {
        action: action.to_string(),
        party: state.config().party_name().to_string(),
    };
    send_public_event(state, EVENT_ACTION_SUBMITTED, &payload);
}

/// Push a finished merge trace onto the operator stream.
pub fn broadcast_merge_trace(state: &SharedState, trace: &MergeTrace) {
    let payload = MergeTraceEvent {
        trace: trace.clone(),
    };
    send_admin_event(state, EVENT_MERGE_TRACE, &payload);
}

/// Report an abandoned cycle to the operator stream.
pub fn broadcast_cycle_error(state: &SharedState, message: &str) {
    let payload = CycleErrorEvent {
        message: message.to_string(),
    };
    send_admin_event(state, EVENT_CYCLE_ERROR, &payload);
}

fn send_public_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}

fn send_admin_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.admin_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize admin SSE payload"),
    }
}
