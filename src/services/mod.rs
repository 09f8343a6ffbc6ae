//! Business logic between the HTTP surface and the shared session state.

pub mod chat_service;
pub mod context_service;
pub mod documentation;
pub mod health_service;
pub mod merge_service;
pub mod session_service;
pub mod sse_events;
pub mod sse_service;
