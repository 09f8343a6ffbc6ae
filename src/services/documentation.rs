use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for chorus-back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::session_snapshot,
        crate::routes::ingest::ingest_chat,
        crate::routes::sse::public_stream,
        crate::routes::sse::admin_stream,
        crate::routes::control::start_vote,
        crate::routes::control::tally,
        crate::routes::control::pause,
        crate::routes::control::resume,
        crate::routes::control::abort,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ingest::ChatEventRequest,
            crate::dto::control::StartVoteRequest,
            crate::dto::control::ActionResponse,
            crate::dto::session::SessionSnapshot,
            crate::dto::sse::Handshake,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "session", description = "Session snapshot"),
        (name = "ingest", description = "Chat event ingress for transports"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "control", description = "Operator controls for the vote cycle"),
    )
)]
pub struct ApiDoc;
