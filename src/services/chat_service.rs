//! Turns raw chat messages into ledger operations and cycle commands.
//!
//! Everything that does not match a known pattern, arrives outside the vote
//! phase, or comes from a caller without the required privilege is dropped
//! without any response; that noise is expected in a public chat stream.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::{
    dto::ingest::{ChatEventRequest, ChatSource},
    services::{session_service, sse_events},
    state::{SharedState, state_machine::Phase},
};

static SUBMISSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^>\s*(.+)$").expect("submission pattern"));

static VOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:\+1\s+@(\w+)|@(\w+)\s+\+1)$").expect("vote pattern"));

/// What a chat message turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMessage {
    /// Privileged request to open a vote cycle.
    OpenVote,
    /// Privileged request to close the running vote early.
    Tally,
    /// An action suggestion.
    Submission(String),
    /// A vote for another user's suggestion.
    Vote(String),
    /// Anything else.
    Noise,
}

/// Classify one raw chat line.
pub fn parse_message(text: &str) -> ParsedMessage {
    let trimmed = text.trim();

    if trimmed.eq_ignore_ascii_case("!vote") {
        return ParsedMessage::OpenVote;
    }
    if trimmed.eq_ignore_ascii_case("!tally") {
        return ParsedMessage::Tally;
    }

    if let Some(captures) = SUBMISSION_RE.captures(trimmed) {
        return ParsedMessage::Submission(captures[1].to_string());
    }

    if let Some(captures) = VOTE_RE.captures(trimmed) {
        let target = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str().to_string());
        if let Some(target) = target {
            return ParsedMessage::Vote(target);
        }
    }

    ParsedMessage::Noise
}

/// Whether this event may issue cycle commands. Only privileged users on the
/// moderated transport qualify.
fn may_command(event: &ChatEventRequest) -> bool {
    event.privileged && event.source == ChatSource::Twitch
}

/// Route one chat event into the session engine.
pub async fn handle_chat_event(state: &SharedState, event: ChatEventRequest) {
    match parse_message(&event.text) {
        ParsedMessage::OpenVote => {
            if !may_command(&event) {
                return;
            }
            if let Err(err) = session_service::open_vote(state, None).await {
                debug!(user = %event.user, error = %err, "chat !vote ignored");
            }
        }
        ParsedMessage::Tally => {
            if !may_command(&event) {
                return;
            }
            if let Err(err) = session_service::close_vote(state).await {
                debug!(user = %event.user, error = %err, "chat !tally failed");
            }
        }
        ParsedMessage::Submission(text) => {
            record_submission(state, &event.user, &text).await;
        }
        ParsedMessage::Vote(target) => {
            record_vote(state, &event.user, &target).await;
        }
        ParsedMessage::Noise => {}
    }
}

/// Add a submission behind the vote-phase gate. Phase check and mutation
/// happen under the same session lock.
async fn record_submission(state: &SharedState, user: &str, text: &str) {
    let debug_mode = state.config().debug_mode();
    let changed = state
        .with_session_mut(|core| {
            if core.machine.phase() != Phase::Vote {
                return false;
            }
            core.ledger.submit(user, text, debug_mode)
        })
        .await;

    if changed {
        sse_events::broadcast_session(state).await;
    }
}

/// Add a vote behind the vote-phase gate.
async fn record_vote(state: &SharedState, voter: &str, target: &str) {
    let changed = state
        .with_session_mut(|core| {
            if core.machine.phase() != Phase::Vote {
                return false;
            }
            core.ledger.vote(voter, target)
        })
        .await;

    if changed {
        sse_events::broadcast_session(state).await;
    }
}
