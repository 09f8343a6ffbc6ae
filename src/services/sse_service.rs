//! Plumbing between the broadcast hubs and axum SSE responses.

use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    state::SharedState,
};

/// Subscribe to the shared public SSE stream.
pub fn subscribe_public(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.public_sse().subscribe()
}

/// Subscribe to the operator SSE stream, minting its single-connection
/// token.
pub async fn subscribe_admin(
    state: &SharedState,
) -> Result<(broadcast::Receiver<ServerEvent>, String), ServiceError> {
    let Some(token) = state.admin().claim_token().await else {
        return Err(ServiceError::Unauthorized(
            "another operator stream is already active".into(),
        ));
    };
    Ok((state.admin_sse().subscribe(), token))
}

/// Identifies the target SSE stream so teardown can run stream-specific
/// bookkeeping once the connection drops.
#[derive(Clone)]
pub enum StreamKind {
    /// Anonymous observer stream.
    Public,
    /// Operator stream; carries the shared state so the connection token
    /// can be released after the forwarder task finishes.
    Admin(SharedState),
}

/// Convert a broadcast receiver into an SSE response, forwarding events
/// until the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                received = receiver.recv() => {
                    match received {
                        Ok(payload) => {
                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }
                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        // Drop lagged events but keep the stream alive.
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }

        match kind {
            StreamKind::Public => info!("public SSE stream disconnected"),
            StreamKind::Admin(state) => {
                state.admin().release_token().await;
                info!("operator SSE stream disconnected");
            }
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Send the initial handshake for a freshly opened stream.
pub async fn broadcast_handshake(state: &SharedState, stream: &str, token: Option<String>) {
    let payload = Handshake {
        stream: stream.to_string(),
        degraded: state.is_degraded().await,
        token,
    };
    let hub = if stream == "admin" {
        state.admin_sse()
    } else {
        state.public_sse()
    };
    if let Ok(event) = ServerEvent::json(Some("handshake".to_string()), &payload) {
        hub.broadcast(event);
    }
}
