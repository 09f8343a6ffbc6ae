//! Cycle orchestration: opening and closing votes, merging, hand-off to the
//! story service, pause/resume, and the worker that drains timer ticks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    clients::ChatSink,
    dto::session::{SessionSnapshot, SubmissionSummary},
    error::ServiceError,
    services::{merge_service, sse_events},
    state::{
        SharedState,
        ledger::Submission,
        state_machine::{Phase, PhaseEvent},
        timers::{MIN_VOTE_DURATION, TimerKind},
    },
};

/// How many ledger entries a snapshot lists.
const SNAPSHOT_LIMIT: usize = 50;

/// Open a vote cycle: transition to `vote`, clear the ledger, arm the
/// countdown, and announce the round.
///
/// Fails with an invalid-state error when a cycle is already running.
pub async fn open_vote(
    state: &SharedState,
    duration_override: Option<Duration>,
) -> Result<(), ServiceError> {
    state
        .with_session_mut(|core| {
            core.machine.apply(PhaseEvent::OpenVote)?;
            // The ledger is cleared exactly on entering `vote`.
            core.ledger.clear();
            Ok::<_, ServiceError>(())
        })
        .await?;

    state.timers().cancel_all();
    let duration = duration_override
        .unwrap_or_else(|| state.config().vote_duration())
        .max(MIN_VOTE_DURATION);
    state.timers().start_vote(duration);

    info!(duration_secs = duration.as_secs(), "vote cycle opened");
    send_chat(
        state,
        &format!(
            "Voting is open for {}s! Suggest an action with \"> your action\" \
             or support one with \"+1 @name\".",
            duration.as_secs()
        ),
    )
    .await;

    sse_events::broadcast_phase_changed(state, Phase::Vote);
    sse_events::broadcast_session(state).await;
    Ok(())
}

/// Close the running vote: transition to `combine`, merge the ledger into
/// one action, hand it to the story service, and return to `idle`.
///
/// Collaborator failures abandon the round with a chat notice; the session
/// never stays in `combine`.
pub async fn close_vote(state: &SharedState) -> Result<(), ServiceError> {
    state
        .with_session_mut(|core| core.machine.apply(PhaseEvent::CloseVote))
        .await?;
    state.timers().cancel_vote();
    sse_events::broadcast_phase_changed(state, Phase::Combine);
    sse_events::broadcast_session(state).await;

    let outcome = run_combine(state).await;
    finish_cycle(state).await;

    match outcome {
        Ok(Some(announcement)) => {
            send_chat(state, &announcement).await;
            Ok(())
        }
        Ok(None) => {
            send_chat(state, "No suggestions came in this round.").await;
            Ok(())
        }
        Err(err) => {
            warn!(error = %err, "round abandoned after collaborator failure");
            send_chat(
                state,
                "Something went wrong while submitting the action; this round was abandoned.",
            )
            .await;
            sse_events::broadcast_cycle_error(state, &err.to_string());
            Err(err)
        }
    }
}

/// Force the session back to idle, dropping the current cycle. Auto-repeat
/// scheduling continues when configured.
pub async fn abort(state: &SharedState) {
    finish_cycle(state).await;
    send_chat(state, "This round was called off.").await;
}

/// Freeze the armed deadline. Returns whether anything was paused.
pub async fn pause(state: &SharedState) -> bool {
    let paused = state.timers().pause();
    if paused {
        info!("timers paused");
        sse_events::broadcast_session(state).await;
    }
    paused
}

/// Re-arm a paused deadline, or start a fresh auto-repeat cycle when
/// nothing was paused and one is configured.
pub async fn resume(state: &SharedState) -> Option<TimerKind> {
    let resumed = state.timers().resume(state.config().auto_repeat());
    if let Some(kind) = resumed {
        info!(kind = ?kind, "timers resumed");
        sse_events::broadcast_session(state).await;
    }
    resumed
}

/// Drain timer ticks for the lifetime of the process. A vote tick closes
/// the running vote, an auto-repeat tick opens the next one; stale ticks
/// bounce off the phase guards.
pub async fn run_session_worker(
    state: SharedState,
    mut ticks: mpsc::UnboundedReceiver<TimerKind>,
) {
    while let Some(kind) = ticks.recv().await {
        match kind {
            TimerKind::Vote => {
                if let Err(err) = close_vote(&state).await {
                    debug!(error = %err, "vote deadline tick dropped");
                }
            }
            TimerKind::AutoRepeat => {
                if let Err(err) = open_vote(&state, None).await {
                    debug!(error = %err, "auto-repeat tick dropped");
                }
            }
        }
    }
}

/// Assemble the observer-facing projection of the whole session.
pub async fn session_snapshot(state: &SharedState) -> SessionSnapshot {
    let (phase, version, submissions, submission_count) = state
        .with_session(|core| {
            (
                core.machine.phase(),
                core.machine.version(),
                core.ledger
                    .snapshot(SNAPSHOT_LIMIT)
                    .iter()
                    .map(SubmissionSummary::from)
                    .collect::<Vec<_>>(),
                core.ledger.len(),
            )
        })
        .await;

    SessionSnapshot {
        phase: phase.into(),
        version,
        paused: state.timers().is_paused(),
        submissions,
        submission_count,
        timer: state.timers().status().map(Into::into),
        last_trace: state.last_trace().await,
    }
}

/// Deliver a message through every registered chat transport, best effort.
pub async fn send_chat(state: &SharedState, text: &str) {
    let sinks: Vec<(String, Arc<dyn ChatSink>)> = state
        .chat_sinks()
        .iter()
        .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
        .collect();

    if sinks.is_empty() {
        debug!(text, "no chat transports registered; dropping announcement");
        return;
    }

    for (source, sink) in sinks {
        if let Err(err) = sink.send_message(text.to_string()).await {
            warn!(source = %source, error = %err, "failed to deliver chat message");
        }
    }
}

/// Merge the frozen ledger and hand the result to the story service.
/// Returns the chat announcement, or `None` when the ledger was empty.
async fn run_combine(state: &SharedState) -> Result<Option<String>, ServiceError> {
    let entries: Vec<Submission> = state
        .with_session(|core| core.ledger.entries().to_vec())
        .await;
    if entries.is_empty() {
        state.set_last_trace(None).await;
        return Ok(None);
    }

    let announcement = match state.completion_client().await {
        Some(client) => {
            let context = state.story_context().await;
            let merge_entries = entries.iter().map(Into::into).collect();
            let outcome = merge_service::blend(
                client,
                merge_service::MergeSettings::from(state.config()),
                &context,
                merge_entries,
            )
            .await?;

            state.set_last_trace(outcome.trace.clone()).await;
            if let Some(trace) = outcome.trace.as_ref() {
                sse_events::broadcast_merge_trace(state, trace);
            }
            submit_action(state, &outcome.action).await?;
            format!("The chorus has spoken: {}", outcome.action)
        }
        None => {
            state.set_last_trace(None).await;
            let (action, user, votes) = state
                .with_session(|core| {
                    core.ledger
                        .winner()
                        .map(|winner| (winner.text.clone(), winner.user.clone(), winner.vote_count()))
                })
                .await
                .ok_or_else(|| ServiceError::InvalidState("ledger emptied during combine".into()))?;

            submit_action(state, &action).await?;
            format!("{user}'s suggestion wins with {votes} vote(s): {action}")
        }
    };

    Ok(Some(announcement))
}

async fn submit_action(state: &SharedState, action: &str) -> Result<(), ServiceError> {
    let story = state.require_story_client().await?;
    let party = state.config().party_name().to_string();
    story
        .submit_action(action.to_string(), party)
        .await
        .map_err(ServiceError::from)?;
    info!(action, "action submitted to the story service");
    sse_events::broadcast_action_submitted(state, action);
    Ok(())
}

/// Return to idle and arm the next automatic cycle when configured.
async fn finish_cycle(state: &SharedState) {
    let _ = state.apply_phase(PhaseEvent::Reset).await;
    state.timers().cancel_all();
    if let Some(delay) = state.config().auto_repeat() {
        state.timers().start_auto_repeat(delay);
    }
    sse_events::broadcast_phase_changed(state, Phase::Idle);
    sse_events::broadcast_session(state).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::FutureExt;
    use futures::future::BoxFuture;
    use tokio::task::yield_now;

    use super::*;
    use crate::{
        clients::{
            ClientError, ClientResult, CompletionClient, StoryClient,
            models::{CompletionRequest, CompletionResponse, StoryContext},
        },
        config::AppConfig,
        dto::ingest::{ChatEventRequest, ChatSource},
        services::chat_service,
        state::AppState,
    };

    #[derive(Default)]
    struct RecordingStory {
        actions: Arc<Mutex<Vec<(String, String)>>>,
        fail: bool,
    }

    impl RecordingStory {
        fn failing() -> Self {
            Self {
                actions: Arc::default(),
                fail: true,
            }
        }

        fn actions(&self) -> Vec<(String, String)> {
            self.actions.lock().unwrap().clone()
        }
    }

    impl StoryClient for RecordingStory {
        fn submit_action(
            &self,
            text: String,
            party_name: String,
        ) -> BoxFuture<'static, ClientResult<()>> {
            if self.fail {
                return async { Err(ClientError::Rejected("scripted failure".into())) }.boxed();
            }
            self.actions.lock().unwrap().push((text, party_name));
            async { Ok(()) }.boxed()
        }

        fn fetch_context(&self) -> BoxFuture<'static, ClientResult<StoryContext>> {
            async { Ok(StoryContext::default()) }.boxed()
        }
    }

    struct CannedCompletion {
        text: String,
    }

    impl CompletionClient for CannedCompletion {
        fn complete(
            &self,
            _request: CompletionRequest,
        ) -> BoxFuture<'static, ClientResult<CompletionResponse>> {
            let text = self.text.clone();
            async move {
                Ok(CompletionResponse {
                    text,
                    model: "fake-model".into(),
                })
            }
            .boxed()
        }
    }

    fn config(json: &str) -> AppConfig {
        serde_json::from_str(json).unwrap()
    }

    fn chat(user: &str, text: &str) -> ChatEventRequest {
        ChatEventRequest {
            source: ChatSource::Twitch,
            user: user.into(),
            text: text.into(),
            privileged: false,
        }
    }

    fn moderator(text: &str) -> ChatEventRequest {
        ChatEventRequest {
            source: ChatSource::Twitch,
            user: "mod".into(),
            text: text.into(),
            privileged: true,
        }
    }

    async fn settle() {
        for _ in 0..64 {
            yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tally_cycle_submits_the_most_supported_action() {
        let (state, ticks) = AppState::new(config(r#"{"vote_duration_secs": 30}"#));
        let story = Arc::new(RecordingStory::default());
        state.install_story_client(story.clone()).await;
        let worker = tokio::spawn(run_session_worker(state.clone(), ticks));

        open_vote(&state, None).await.unwrap();
        chat_service::handle_chat_event(&state, chat("alice", "> open the door")).await;
        chat_service::handle_chat_event(&state, chat("bob", "> search the room")).await;
        for voter in ["carol", "dave", "erin"] {
            chat_service::handle_chat_event(&state, chat(voter, "+1 @alice")).await;
        }

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;

        assert_eq!(
            story.actions(),
            vec![("open the door".to_string(), "The Party".to_string())]
        );
        assert_eq!(state.phase().await, Phase::Idle);
        worker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn blend_cycle_submits_the_synthesized_action() {
        let (state, ticks) = AppState::new(config(r#"{"vote_duration_secs": 10}"#));
        let story = Arc::new(RecordingStory::default());
        state.install_story_client(story.clone()).await;
        state
            .install_completion_client(Arc::new(CannedCompletion {
                text: "open the door, then search the room".into(),
            }))
            .await;
        let worker = tokio::spawn(run_session_worker(state.clone(), ticks));

        open_vote(&state, None).await.unwrap();
        chat_service::handle_chat_event(&state, chat("alice", "> open the door")).await;
        chat_service::handle_chat_event(&state, chat("bob", "> search the room")).await;

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;

        assert_eq!(
            story.actions(),
            vec![(
                "open the door, then search the room".to_string(),
                "The Party".to_string()
            )]
        );
        assert!(state.last_trace().await.is_some());
        worker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn chat_input_outside_the_vote_phase_is_dropped() {
        let (state, _ticks) = AppState::new(config("{}"));
        chat_service::handle_chat_event(&state, chat("alice", "> open the door")).await;
        assert_eq!(
            state.with_session(|core| core.ledger.len()).await,
            0,
            "idle-phase submission must be discarded"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn commands_require_privilege_on_the_moderated_transport() {
        let (state, _ticks) = AppState::new(config("{}"));

        chat_service::handle_chat_event(&state, chat("alice", "!vote")).await;
        assert_eq!(state.phase().await, Phase::Idle);

        let mut youtube_mod = moderator("!vote");
        youtube_mod.source = ChatSource::Youtube;
        chat_service::handle_chat_event(&state, youtube_mod).await;
        assert_eq!(state.phase().await, Phase::Idle);

        chat_service::handle_chat_event(&state, moderator("!vote")).await;
        assert_eq!(state.phase().await, Phase::Vote);
    }

    #[tokio::test(start_paused = true)]
    async fn tally_command_closes_the_vote_early() {
        let (state, _ticks) = AppState::new(config("{}"));
        let story = Arc::new(RecordingStory::default());
        state.install_story_client(story.clone()).await;

        chat_service::handle_chat_event(&state, moderator("!vote")).await;
        chat_service::handle_chat_event(&state, chat("alice", "> hide")).await;
        chat_service::handle_chat_event(&state, moderator("!tally")).await;

        assert_eq!(state.phase().await, Phase::Idle);
        assert_eq!(story.actions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn collaborator_failure_abandons_the_round_to_idle() {
        let (state, _ticks) = AppState::new(config("{}"));
        state
            .install_story_client(Arc::new(RecordingStory::failing()))
            .await;

        open_vote(&state, None).await.unwrap();
        chat_service::handle_chat_event(&state, chat("alice", "> hide")).await;

        let result = close_vote(&state).await;
        assert!(matches!(result, Err(ServiceError::Unavailable(_))));
        assert_eq!(state.phase().await, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_ledger_skips_the_story_submission() {
        let (state, _ticks) = AppState::new(config("{}"));
        let story = Arc::new(RecordingStory::default());
        state.install_story_client(story.clone()).await;

        open_vote(&state, None).await.unwrap();
        close_vote(&state).await.unwrap();

        assert!(story.actions().is_empty());
        assert_eq!(state.phase().await, Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn open_vote_fails_while_a_cycle_is_running() {
        let (state, _ticks) = AppState::new(config("{}"));
        open_vote(&state, None).await.unwrap();
        assert!(matches!(
            open_vote(&state, None).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn finished_cycle_arms_auto_repeat_and_reopens() {
        let (state, ticks) =
            AppState::new(config(r#"{"vote_duration_secs": 10, "auto_repeat_secs": 20}"#));
        let story = Arc::new(RecordingStory::default());
        state.install_story_client(story.clone()).await;
        let worker = tokio::spawn(run_session_worker(state.clone(), ticks));

        open_vote(&state, None).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(state.phase().await, Phase::Idle);

        let snapshot = session_snapshot(&state).await;
        let timer = snapshot.timer.expect("auto-repeat should be armed");
        assert_eq!(timer.remaining_secs, 20);

        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(state.phase().await, Phase::Vote);
        worker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reflects_ledger_and_pause_state() {
        let (state, _ticks) = AppState::new(config("{}"));
        open_vote(&state, None).await.unwrap();
        chat_service::handle_chat_event(&state, chat("alice", "> hide")).await;

        assert!(pause(&state).await);
        let snapshot = session_snapshot(&state).await;
        assert!(snapshot.paused);
        assert_eq!(snapshot.submission_count, 1);
        assert_eq!(snapshot.submissions[0].user, "alice");
        assert_eq!(snapshot.submissions[0].votes, 1);

        assert!(resume(&state).await.is_some());
        assert!(!session_snapshot(&state).await.paused);
    }
}
