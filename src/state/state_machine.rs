use thiserror::Error;

/// High-level phase of the submit-and-vote cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No cycle is running; chat input is ignored and auto-repeat may be armed.
    Idle,
    /// Submissions and votes are being collected until the deadline.
    Vote,
    /// The collected submissions are being merged into one action.
    Combine,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Phase::Idle => "idle",
            Phase::Vote => "vote",
            Phase::Combine => "combine",
        };
        f.write_str(label)
    }
}

/// Events that can be applied to the phase machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Begin collecting submissions; valid only while idle.
    OpenVote,
    /// Stop collecting and move on to merging; valid only while voting.
    CloseVote,
    /// Force the machine back to idle from any phase.
    Reset,
}

/// Error returned when an event cannot be applied from the current phase.
///
/// Chat- and timer-driven callers treat this as a silent no-op; only the
/// control routes surface it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Phase the machine was in when the event arrived.
    pub from: Phase,
    /// The event that cannot be applied from this phase.
    pub event: PhaseEvent,
}

/// State machine enforcing the `idle -> vote -> combine -> idle` cycle.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: Phase,
    version: usize,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            version: 0,
        }
    }
}

impl PhaseMachine {
    /// Create a machine resting in the idle phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Apply an event, returning the new phase or an [`InvalidTransition`]
    /// that leaves the machine untouched.
    pub fn apply(&mut self, event: PhaseEvent) -> Result<Phase, InvalidTransition> {
        let next = match (self.phase, event) {
            (Phase::Idle, PhaseEvent::OpenVote) => Phase::Vote,
            (Phase::Vote, PhaseEvent::CloseVote) => Phase::Combine,
            (_, PhaseEvent::Reset) => Phase::Idle,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        self.phase = next;
        self.version += 1;
        Ok(next)
    }
}
