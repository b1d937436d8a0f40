//! Interview backend collaborators
//!
//! The session talks to the backend for recording control, next-set
//! generation and prior-attempt lookups. `InterviewApi` is the seam;
//! `HttpInterviewApi` is the production implementation.

mod extract;
mod http;
mod retry;

pub use extract::{first_array_at, first_string_at};
pub use http::HttpInterviewApi;
pub use retry::with_retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// Response of a successful stop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopReceipt {
    /// Interview the recording was filed under, when the backend says
    pub interview_uuid: Option<String>,
}

/// What the backend remembers about an earlier attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorAttempt {
    pub text: Option<String>,
}

/// Backend operations consumed by a session
#[async_trait]
pub trait InterviewApi: Send + Sync {
    /// Start recording the given live media session; returns the recording id
    async fn start_recording(&self, live_session_id: &str) -> Result<String, ApiError>;

    /// Stop a recording and wait for the backend's answer
    async fn stop_recording(&self, recording_id: &str) -> Result<StopReceipt, ApiError>;

    /// Generate the next question set for an interview (raw server questions)
    async fn generate_next_question_set(&self, session_id: &str) -> Result<Vec<Value>, ApiError>;

    /// Look up the question text of an earlier attempt
    async fn lookup_prior_attempt_text(&self, attempt_id: &str) -> Result<PriorAttempt, ApiError>;

    /// Tell the backend a recording is abandoned. Fire-and-forget: returns
    /// immediately and no response is awaited.
    fn detach_recording(&self, recording_id: &str);
}
