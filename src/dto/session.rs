use serde::Serialize;
use utoipa::ToSchema;

use crate::state::{
    ledger::Submission,
    state_machine::Phase,
    timers::{TimerKind, TimerStatus},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
/// Serialized form of the session phase.
pub enum PhaseSnapshot {
    /// Resting between cycles.
    Idle,
    /// Collecting submissions and votes.
    Vote,
    /// Merging submissions into one action.
    Combine,
}

impl From<Phase> for PhaseSnapshot {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Idle => PhaseSnapshot::Idle,
            Phase::Vote => PhaseSnapshot::Vote,
            Phase::Combine => PhaseSnapshot::Combine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Which deadline a timer snapshot describes.
pub enum TimerKindSnapshot {
    /// The vote-phase countdown.
    Vote,
    /// The cooldown before the next automatic cycle.
    AutoRepeat,
}

impl From<TimerKind> for TimerKindSnapshot {
    fn from(kind: TimerKind) -> Self {
        match kind {
            TimerKind::Vote => TimerKindSnapshot::Vote,
            TimerKind::AutoRepeat => TimerKindSnapshot::AutoRepeat,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
/// Serialized state of the armed or paused deadline.
pub struct TimerSnapshot {
    /// Which deadline this describes.
    pub kind: TimerKindSnapshot,
    /// Seconds until the deadline fires (frozen while paused).
    pub remaining_secs: u64,
    /// Whether the deadline is paused.
    pub paused: bool,
}

impl From<TimerStatus> for TimerSnapshot {
    fn from(status: TimerStatus) -> Self {
        Self {
            kind: status.kind.into(),
            remaining_secs: status.remaining.as_secs(),
            paused: status.paused,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// One ledger entry as shown to observers.
pub struct SubmissionSummary {
    /// Submitter's display name.
    pub user: String,
    /// The suggested action text.
    pub text: String,
    /// Effective vote count.
    pub votes: u32,
}

impl From<&Submission> for SubmissionSummary {
    fn from(submission: &Submission) -> Self {
        Self {
            user: submission.user.clone(),
            text: submission.text.clone(),
            votes: submission.vote_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Record of the prompts and response behind the most recent blend merge.
pub struct MergeTrace {
    /// System prompt sent to the completion endpoint.
    pub system_prompt: String,
    /// User prompt carrying context and submissions.
    pub user_prompt: String,
    /// The model's response text.
    pub response: String,
    /// Model that served the call.
    pub model: String,
    /// RFC 3339 timestamp of the call.
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Serializable projection of the whole session, broadcast on every state
/// change and served at `GET /session`.
pub struct SessionSnapshot {
    /// Current phase.
    pub phase: PhaseSnapshot,
    /// Number of transitions applied so far.
    pub version: usize,
    /// Whether the timer subsystem is paused.
    pub paused: bool,
    /// Leading ledger entries in arrival order.
    pub submissions: Vec<SubmissionSummary>,
    /// Total number of ledger entries (may exceed the listed ones).
    pub submission_count: usize,
    /// Armed or paused deadline, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer: Option<TimerSnapshot>,
    /// Trace of the most recent blend merge, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_trace: Option<MergeTrace>,
}
