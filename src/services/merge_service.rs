//! Blend-mode merge: recursively reduce an arbitrary number of submissions
//! into one action through the completion collaborator, batching to stay
//! inside a per-call size budget.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, try_join_all};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    clients::{
        CompletionClient,
        models::{CompletionRequest, SectionKind, StoryContext},
    },
    config::AppConfig,
    dto::session::MergeTrace,
    error::ServiceError,
    state::ledger::Submission,
};

/// Size budget for a single completion call, in rough tokens.
const TARGET_BATCH_TOKENS: usize = 16_000;
/// Rough token cost of one enumerated submission.
const TOKENS_PER_SUBMISSION: usize = 50;

/// Largest number of submissions merged in one completion call.
pub fn batch_size() -> usize {
    (TARGET_BATCH_TOKENS / TOKENS_PER_SUBMISSION).max(3)
}

/// One candidate fed into a blend merge.
#[derive(Debug, Clone)]
pub struct MergeEntry {
    /// Who (or which intermediate batch) the text came from.
    pub label: String,
    /// The candidate action text.
    pub text: String,
}

impl From<&Submission> for MergeEntry {
    fn from(submission: &Submission) -> Self {
        Self {
            label: submission.user.clone(),
            text: submission.text.clone(),
        }
    }
}

/// Prompt parameters for a blend merge, detached from [`AppConfig`] so the
/// recursion can own them.
#[derive(Debug, Clone)]
pub struct MergeSettings {
    /// Model identifier for the completion calls.
    pub model: String,
    /// Upper bound on response tokens per call.
    pub max_tokens: u32,
    /// Character name addressed in the prompts.
    pub character_name: String,
}

impl From<&AppConfig> for MergeSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.model().to_string(),
            max_tokens: config.max_completion_tokens(),
            character_name: config.character_name().to_string(),
        }
    }
}

/// Result of a blend merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The synthesized action text.
    pub action: String,
    /// Trace of the final completion call; absent when no call was made.
    pub trace: Option<MergeTrace>,
}

/// Merge `entries` into one action through the completion collaborator.
///
/// A single entry is returned verbatim without any call. Any failed call
/// fails the whole merge; there is no partial-result fallback.
pub async fn blend(
    client: Arc<dyn CompletionClient>,
    settings: MergeSettings,
    context: &StoryContext,
    entries: Vec<MergeEntry>,
) -> Result<MergeOutcome, ServiceError> {
    let story: Arc<str> = Arc::from(assemble_story_text(context));
    let last_action = context.most_recent_action.clone();
    merge_round(client, Arc::new(settings), story, entries, last_action).await
}

/// One recursion round. Splits into contiguous batches when the input
/// exceeds [`batch_size`], merges every batch concurrently, and recurses on
/// the intermediate results. The batch count is strictly smaller than the
/// input count, so the recursion always terminates.
fn merge_round(
    client: Arc<dyn CompletionClient>,
    settings: Arc<MergeSettings>,
    story: Arc<str>,
    entries: Vec<MergeEntry>,
    last_action: Option<String>,
) -> BoxFuture<'static, Result<MergeOutcome, ServiceError>> {
    async move {
        if entries.is_empty() {
            return Err(ServiceError::InvalidInput(
                "cannot merge an empty submission list".into(),
            ));
        }

        if let [only] = entries.as_slice() {
            return Ok(MergeOutcome {
                action: only.text.clone(),
                trace: None,
            });
        }

        let size = batch_size();
        if entries.len() <= size {
            return merge_batch(client, settings, story, entries, last_action).await;
        }

        let calls = entries
            .chunks(size)
            .map(<[MergeEntry]>::to_vec)
            .enumerate()
            .map(|(index, batch)| {
                let client = Arc::clone(&client);
                let settings = Arc::clone(&settings);
                let story = Arc::clone(&story);
                let last_action = last_action.clone();
                async move {
                    merge_batch(client, settings, story, batch, last_action)
                        .await
                        .map(|outcome| MergeEntry {
                            label: format!("Batch{}", index + 1),
                            text: outcome.action,
                        })
                }
            })
            .collect::<Vec<_>>();

        let intermediates = try_join_all(calls).await?;
        // The most recent action only belongs to the leaf-level calls.
        merge_round(client, settings, story, intermediates, None).await
    }
    .boxed()
}

/// Merge one batch with a single completion call.
async fn merge_batch(
    client: Arc<dyn CompletionClient>,
    settings: Arc<MergeSettings>,
    story: Arc<str>,
    entries: Vec<MergeEntry>,
    last_action: Option<String>,
) -> Result<MergeOutcome, ServiceError> {
    let system_prompt = build_system_prompt(&settings);
    let user_prompt = build_user_prompt(&story, last_action.as_deref(), &entries, &settings);

    let response = client
        .complete(CompletionRequest {
            system_prompt: system_prompt.clone(),
            user_prompt: user_prompt.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
        })
        .await?;

    let trace = MergeTrace {
        system_prompt,
        user_prompt,
        response: response.text.clone(),
        model: response.model,
        timestamp: now_rfc3339(),
    };

    Ok(MergeOutcome {
        action: response.text.trim().to_string(),
        trace: Some(trace),
    })
}

/// Concatenate the prompt-worthy story sections, skipping instructions and
/// author's notes.
fn assemble_story_text(context: &StoryContext) -> String {
    let mut parts = Vec::new();
    for section in &context.sections {
        match section.kind {
            SectionKind::Story => parts.push(section.text.as_str()),
            SectionKind::Instructions | SectionKind::AuthorsNote => {}
        }
    }
    parts.join("\n\n")
}

fn build_system_prompt(settings: &MergeSettings) -> String {
    format!(
        "You merge action suggestions from a live audience into the single \
         action {name} takes next. Blend the ideas into one coherent action \
         of at most two sentences, written in second person. Do not begin \
         your answer with {name}'s name.",
        name = settings.character_name
    )
}

fn build_user_prompt(
    story: &str,
    last_action: Option<&str>,
    entries: &[MergeEntry],
    settings: &MergeSettings,
) -> String {
    let mut prompt = String::new();
    if !story.is_empty() {
        prompt.push_str(story);
        prompt.push_str("\n\n");
    }
    if let Some(action) = last_action {
        prompt.push_str("Most recent action:\n");
        prompt.push_str(action);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Suggested actions:\n");
    for (index, entry) in entries.iter().enumerate() {
        prompt.push_str(&format!("{}. {}: {}\n", index + 1, entry.label, entry.text));
    }

    prompt.push_str(&format!(
        "\nCombine these into the one action {} takes next.",
        settings.character_name
    ));
    prompt
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::clients::{ClientError, ClientResult, models::{CompletionResponse, StorySection}};

    #[derive(Default)]
    struct RecordingInner {
        requests: Mutex<Vec<CompletionRequest>>,
        concurrent: AtomicUsize,
        peak: AtomicUsize,
    }

    /// Fake completion client that records every request and tracks how many
    /// calls were in flight at once.
    struct RecordingCompletion {
        inner: Arc<RecordingInner>,
        fail: bool,
    }

    impl RecordingCompletion {
        fn new() -> Self {
            Self {
                inner: Arc::new(RecordingInner::default()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                inner: Arc::new(RecordingInner::default()),
                fail: true,
            }
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.inner.requests.lock().unwrap().clone()
        }

        fn call_count(&self) -> usize {
            self.inner.requests.lock().unwrap().len()
        }

        fn peak_concurrency(&self) -> usize {
            self.inner.peak.load(Ordering::SeqCst)
        }
    }

    impl CompletionClient for RecordingCompletion {
        fn complete(
            &self,
            request: CompletionRequest,
        ) -> BoxFuture<'static, ClientResult<CompletionResponse>> {
            let inner = Arc::clone(&self.inner);
            let fail = self.fail;
            async move {
                let call = {
                    let mut requests = inner.requests.lock().unwrap();
                    requests.push(request);
                    requests.len()
                };
                if fail {
                    return Err(ClientError::Rejected("scripted failure".into()));
                }

                let now = inner.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                inner.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inner.concurrent.fetch_sub(1, Ordering::SeqCst);

                Ok(CompletionResponse {
                    text: format!("merged call {call}"),
                    model: "fake-model".into(),
                })
            }
            .boxed()
        }
    }

    fn settings() -> MergeSettings {
        MergeSettings {
            model: "fake-model".into(),
            max_tokens: 128,
            character_name: "Ilya".into(),
        }
    }

    fn entries(count: usize) -> Vec<MergeEntry> {
        (0..count)
            .map(|i| MergeEntry {
                label: format!("user{i}"),
                text: format!("action {i}"),
            })
            .collect()
    }

    fn enumerated_lines(request: &CompletionRequest) -> usize {
        request
            .user_prompt
            .lines()
            .filter(|line| {
                line.split_once(". ")
                    .is_some_and(|(n, _)| n.parse::<usize>().is_ok())
            })
            .count()
    }

    #[test]
    fn batch_size_comes_from_the_token_budget() {
        assert_eq!(batch_size(), 320);
    }

    #[tokio::test]
    async fn single_entry_returns_verbatim_without_any_call() {
        let client = Arc::new(RecordingCompletion::new());
        let outcome = blend(
            Arc::clone(&client) as Arc<dyn CompletionClient>,
            settings(),
            &StoryContext::default(),
            entries(1),
        )
        .await
        .unwrap();

        assert_eq!(outcome.action, "action 0");
        assert!(outcome.trace.is_none());
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn small_input_merges_in_one_call() {
        let client = Arc::new(RecordingCompletion::new());
        let outcome = blend(
            Arc::clone(&client) as Arc<dyn CompletionClient>,
            settings(),
            &StoryContext::default(),
            entries(12),
        )
        .await
        .unwrap();

        assert_eq!(client.call_count(), 1);
        assert_eq!(outcome.action, "merged call 1");
        assert!(outcome.trace.is_some());

        let requests = client.requests();
        assert_eq!(enumerated_lines(&requests[0]), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn large_input_fans_out_then_converges() {
        let client = Arc::new(RecordingCompletion::new());
        let outcome = blend(
            Arc::clone(&client) as Arc<dyn CompletionClient>,
            settings(),
            &StoryContext {
                sections: Vec::new(),
                most_recent_action: Some("You entered the vault.".into()),
            },
            entries(700),
        )
        .await
        .unwrap();

        // 320 + 320 + 60 leaf batches, then one merge of the 3 intermediates.
        let requests = client.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(enumerated_lines(&requests[0]), 320);
        assert_eq!(enumerated_lines(&requests[1]), 320);
        assert_eq!(enumerated_lines(&requests[2]), 60);
        assert_eq!(enumerated_lines(&requests[3]), 3);
        assert!(client.peak_concurrency() >= 3);

        // The intermediate entries are labeled by batch.
        assert!(requests[3].user_prompt.contains("1. Batch1:"));
        assert!(requests[3].user_prompt.contains("3. Batch3:"));

        // The most recent action reaches only the leaf-level calls.
        for request in &requests[..3] {
            assert!(request.user_prompt.contains("Most recent action:"));
        }
        assert!(!requests[3].user_prompt.contains("Most recent action:"));

        assert_eq!(outcome.action, "merged call 4");
    }

    #[tokio::test]
    async fn story_context_is_filtered_into_the_prompt() {
        let client = Arc::new(RecordingCompletion::new());
        let context = StoryContext {
            sections: vec![
                StorySection {
                    kind: SectionKind::Story,
                    text: "The gate stands open.".into(),
                },
                StorySection {
                    kind: SectionKind::Instructions,
                    text: "Always answer in rhyme.".into(),
                },
                StorySection {
                    kind: SectionKind::AuthorsNote,
                    text: "Keep the tone grim.".into(),
                },
            ],
            most_recent_action: Some("You lit the torch.".into()),
        };

        blend(
            Arc::clone(&client) as Arc<dyn CompletionClient>,
            settings(),
            &context,
            entries(2),
        )
        .await
        .unwrap();

        let request = &client.requests()[0];
        assert!(request.user_prompt.contains("The gate stands open."));
        assert!(!request.user_prompt.contains("Always answer in rhyme."));
        assert!(!request.user_prompt.contains("Keep the tone grim."));
        assert!(request.user_prompt.contains("Most recent action:\nYou lit the torch."));
        assert!(request.system_prompt.contains("Ilya"));
    }

    #[tokio::test]
    async fn any_failed_call_fails_the_whole_merge() {
        let client = Arc::new(RecordingCompletion::failing());
        let result = blend(
            Arc::clone(&client) as Arc<dyn CompletionClient>,
            settings(),
            &StoryContext::default(),
            entries(700),
        )
        .await;

        assert!(matches!(result, Err(ServiceError::Unavailable(_))));
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let client = Arc::new(RecordingCompletion::new());
        let result = blend(
            Arc::clone(&client) as Arc<dyn CompletionClient>,
            settings(),
            &StoryContext::default(),
            Vec::new(),
        )
        .await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }
}
