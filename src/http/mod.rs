//! HTTP API for driving interview sessions from a browser
//!
//! - POST /sessions - Persist a handoff record and start a session
//! - POST /sessions/:id/resume - Start a session from its persisted record
//! - GET /sessions/:id - Session snapshot
//! - GET /sessions/:id/attempts - Correlated attempt ids
//! - POST /sessions/:id/answer | advance | detach - Question flow
//! - POST /sessions/:id/sets/:set/retry | advance - Set completion choices
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
