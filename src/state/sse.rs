use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use crate::dto::sse::ServerEvent;

/// SSE sub-state carved out from [`AppState`](super::AppState): one public
/// hub for observers and one token-guarded hub for the operator console.
pub struct SseState {
    public: SseHub,
    admin: AdminSseState,
}

impl SseState {
    /// Build both hubs with the given per-stream channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            public: SseHub::new(capacity),
            admin: AdminSseState::new(capacity),
        }
    }

    /// Hub fanning out public session events.
    pub fn public(&self) -> &SseHub {
        &self.public
    }

    /// Operator-only hub plus its connection token.
    pub fn admin(&self) -> &AdminSseState {
        &self.admin
    }
}

/// Operator stream bundle: a hub and the single-connection token that also
/// authorizes the control routes.
pub struct AdminSseState {
    hub: SseHub,
    token: Mutex<Option<String>>,
}

impl AdminSseState {
    fn new(capacity: usize) -> Self {
        Self {
            hub: SseHub::new(capacity),
            token: Mutex::new(None),
        }
    }

    /// Hub used for operator-only events (merge traces, cycle errors).
    pub fn hub(&self) -> &SseHub {
        &self.hub
    }

    /// Mint the connection token. Fails when another operator stream
    /// already holds it.
    pub async fn claim_token(&self) -> Option<String> {
        let mut guard = self.token.lock().await;
        match &mut *guard {
            slot @ None => {
                let token = Uuid::new_v4().simple().to_string();
                slot.replace(token.clone());
                Some(token)
            }
            Some(_) => None,
        }
    }

    /// Drop the stored token so the next operator connection negotiates a
    /// fresh one.
    pub async fn release_token(&self) {
        self.token.lock().await.take();
    }

    /// Compare a presented token against the stored one.
    pub async fn token_matches(&self, presented: &str) -> bool {
        self.token
            .lock()
            .await
            .as_deref()
            .is_some_and(|token| token == presented)
    }
}

/// Broadcast hub wrapper shared by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a hub backed by a Tokio broadcast channel.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a subscriber for subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Fan an event out to every current subscriber, ignoring delivery
    /// errors (a hub with no listeners is fine).
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}
