//! Background refresh of the story context used by blend-mode prompts.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::state::SharedState;

const REFRESH_INTERVAL: Duration = Duration::from_secs(15);
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Periodically pull the story context from the story client into shared
/// state, backing off on failures. Never blocks the orchestration loop;
/// the merge engine simply reads whatever was cached last.
pub async fn run_context_supervisor(state: SharedState) {
    let mut delay = INITIAL_RETRY_DELAY;

    loop {
        let Some(client) = state.story_client().await else {
            // Degraded mode: wait for a client to be installed.
            sleep(REFRESH_INTERVAL).await;
            continue;
        };

        match client.fetch_context().await {
            Ok(context) => {
                debug!(
                    sections = context.sections.len(),
                    has_recent_action = context.most_recent_action.is_some(),
                    "story context refreshed"
                );
                state.set_story_context(context).await;
                delay = INITIAL_RETRY_DELAY;
                sleep(REFRESH_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "story context fetch failed; backing off");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
            }
        }
    }
}
