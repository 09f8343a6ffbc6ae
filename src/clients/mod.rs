//! Trait interfaces for the external collaborators the session engine talks
//! to: the story service, the language-model completion endpoint, and the
//! chat transports. Implementations live outside this crate; the engine only
//! ever sees these trait objects.

pub mod models;

use std::error::Error;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::clients::models::{CompletionRequest, CompletionResponse, StoryContext};

/// Result alias for collaborator calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Error raised by a collaborator regardless of its underlying transport.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The collaborator could not be reached or failed mid-call.
    #[error("collaborator unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying transport or protocol error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The collaborator answered but refused the request.
    #[error("collaborator rejected the request: {0}")]
    Rejected(String),
}

impl ClientError {
    /// Construct an unavailable error from any transport failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        ClientError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Abstraction over the story/game service the chosen action is handed to.
pub trait StoryClient: Send + Sync {
    /// Submit one action on behalf of the party. Best-effort: a failure is
    /// surfaced to the caller, never retried here.
    fn submit_action(&self, text: String, party_name: String) -> BoxFuture<'static, ClientResult<()>>;
    /// Fetch the current story context (sections plus most recent action).
    fn fetch_context(&self) -> BoxFuture<'static, ClientResult<StoryContext>>;
}

/// Abstraction over the language-model endpoint used in blend mode.
pub trait CompletionClient: Send + Sync {
    /// Run one completion call and return the model's text.
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> BoxFuture<'static, ClientResult<CompletionResponse>>;
}

/// Outbound side of a chat transport (announcements, winner messages,
/// error notices).
pub trait ChatSink: Send + Sync {
    /// Post a message to the chat channel this sink is bound to.
    fn send_message(&self, text: String) -> BoxFuture<'static, ClientResult<()>>;
}
