//! Shared application state: the session core (phase machine + ledger), the
//! timer subsystem, collaborator handles, and the SSE hubs.

pub mod ledger;
mod sse;
pub mod state_machine;
pub mod timers;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, watch};

use crate::{
    clients::{ChatSink, CompletionClient, StoryClient, models::StoryContext},
    config::AppConfig,
    dto::session::MergeTrace,
    error::ServiceError,
    state::{
        ledger::SubmissionLedger,
        state_machine::{InvalidTransition, Phase, PhaseEvent, PhaseMachine},
        timers::{CycleTimers, TimerKind},
    },
};

pub use self::sse::{AdminSseState, SseHub, SseState};

/// Cheaply clonable handle on the application state.
pub type SharedState = Arc<AppState>;

/// Broadcast channel capacity for each SSE hub.
const SSE_CAPACITY: usize = 16;

/// The one logical unit of mutable session state: phase and ledger move
/// together under a single lock, so a phase check and the mutation it guards
/// can never interleave with a transition.
pub struct SessionCore {
    /// Phase machine enforcing the idle/vote/combine cycle.
    pub machine: PhaseMachine,
    /// Current cycle's submissions and voters.
    pub ledger: SubmissionLedger,
}

impl SessionCore {
    fn new() -> Self {
        Self {
            machine: PhaseMachine::new(),
            ledger: SubmissionLedger::new(),
        }
    }
}

/// Central application state storing the session core, timers, collaborator
/// handles, and broadcast hubs.
pub struct AppState {
    config: AppConfig,
    session: RwLock<SessionCore>,
    timers: CycleTimers,
    story_context: RwLock<StoryContext>,
    last_trace: RwLock<Option<MergeTrace>>,
    sse: SseState,
    story_client: RwLock<Option<Arc<dyn StoryClient>>>,
    completion_client: RwLock<Option<Arc<dyn CompletionClient>>>,
    chat_sinks: DashMap<String, Arc<dyn ChatSink>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct the state wrapped in an [`Arc`], together with the timer
    /// tick receiver the session worker drains.
    ///
    /// The application starts in degraded mode until a story client is
    /// installed.
    pub fn new(config: AppConfig) -> (SharedState, mpsc::UnboundedReceiver<TimerKind>) {
        let (timers, timer_rx) = CycleTimers::new();
        let (degraded_tx, _rx) = watch::channel(true);
        let state = Arc::new(Self {
            config,
            session: RwLock::new(SessionCore::new()),
            timers,
            story_context: RwLock::new(StoryContext::default()),
            last_trace: RwLock::new(None),
            sse: SseState::new(SSE_CAPACITY),
            story_client: RwLock::new(None),
            completion_client: RwLock::new(None),
            chat_sinks: DashMap::new(),
            degraded: degraded_tx,
        });
        (state, timer_rx)
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The timer subsystem.
    pub fn timers(&self) -> &CycleTimers {
        &self.timers
    }

    /// Hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        self.sse.public()
    }

    /// Hub used for the operator SSE stream.
    pub fn admin_sse(&self) -> &SseHub {
        self.sse.admin().hub()
    }

    /// Operator stream bundle (hub plus connection token).
    pub fn admin(&self) -> &AdminSseState {
        self.sse.admin()
    }

    /// Read the session core under its lock.
    pub async fn with_session<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SessionCore) -> R,
    {
        let guard = self.session.read().await;
        f(&guard)
    }

    /// Mutate the session core under its lock.
    pub async fn with_session_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut SessionCore) -> R,
    {
        let mut guard = self.session.write().await;
        f(&mut guard)
    }

    /// Snapshot the current phase.
    pub async fn phase(&self) -> Phase {
        self.session.read().await.machine.phase()
    }

    /// Apply a phase event to the session core.
    pub async fn apply_phase(&self, event: PhaseEvent) -> Result<Phase, InvalidTransition> {
        self.session.write().await.machine.apply(event)
    }

    /// Replace the cached story context.
    pub async fn set_story_context(&self, context: StoryContext) {
        *self.story_context.write().await = context;
    }

    /// Clone the cached story context.
    pub async fn story_context(&self) -> StoryContext {
        self.story_context.read().await.clone()
    }

    /// Store the trace of the most recent blend merge (or clear it).
    pub async fn set_last_trace(&self, trace: Option<MergeTrace>) {
        *self.last_trace.write().await = trace;
    }

    /// Trace of the most recent blend merge, if any.
    pub async fn last_trace(&self) -> Option<MergeTrace> {
        self.last_trace.read().await.clone()
    }

    /// Install the story client and leave degraded mode.
    pub async fn install_story_client(&self, client: Arc<dyn StoryClient>) {
        {
            let mut guard = self.story_client.write().await;
            *guard = Some(client);
        }
        let _ = self.degraded.send(false);
    }

    /// Remove the story client and enter degraded mode.
    pub async fn clear_story_client(&self) {
        {
            let mut guard = self.story_client.write().await;
            guard.take();
        }
        let _ = self.degraded.send(true);
    }

    /// Handle on the story client, if one is installed.
    pub async fn story_client(&self) -> Option<Arc<dyn StoryClient>> {
        self.story_client.read().await.clone()
    }

    /// Story client handle, or a degraded-mode error.
    pub async fn require_story_client(&self) -> Result<Arc<dyn StoryClient>, ServiceError> {
        self.story_client().await.ok_or(ServiceError::Degraded)
    }

    /// Install or replace the completion client used for blend mode.
    pub async fn install_completion_client(&self, client: Arc<dyn CompletionClient>) {
        *self.completion_client.write().await = Some(client);
    }

    /// Handle on the completion client, if one is installed. `None` selects
    /// tally mode.
    pub async fn completion_client(&self) -> Option<Arc<dyn CompletionClient>> {
        self.completion_client.read().await.clone()
    }

    /// Register an outbound chat transport under its source name, replacing
    /// any previous sink for that source.
    pub fn register_chat_sink(&self, source: impl Into<String>, sink: Arc<dyn ChatSink>) {
        self.chat_sinks.insert(source.into(), sink);
    }

    /// Registry of outbound chat transports keyed by source name.
    pub fn chat_sinks(&self) -> &DashMap<String, Arc<dyn ChatSink>> {
        &self.chat_sinks
    }

    /// Whether the engine currently lacks a story client.
    pub async fn is_degraded(&self) -> bool {
        self.story_client.read().await.is_none()
    }

    /// Subscribe to degraded-mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }
}
