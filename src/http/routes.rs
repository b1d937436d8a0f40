use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/:session_id", get(handlers::get_session))
        .route("/sessions/:session_id/resume", post(handlers::resume_session))
        .route("/sessions/:session_id/attempts", get(handlers::get_attempts))
        // Question flow
        .route("/sessions/:session_id/answer", post(handlers::begin_answer))
        .route("/sessions/:session_id/advance", post(handlers::advance))
        .route("/sessions/:session_id/detach", post(handlers::detach))
        // Set completion
        .route(
            "/sessions/:session_id/sets/:set/retry",
            post(handlers::retry_set),
        )
        .route(
            "/sessions/:session_id/sets/:set/advance",
            post(handlers::advance_set),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
