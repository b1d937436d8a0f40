//! Error types shared across the session components.

use thiserror::Error;

use crate::session::Phase;

/// Failures talking to the interview backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{operation} failed with status {status}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("{operation} response has no {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
    #[error("{0}")]
    Other(String),
}

/// Errors emitted by the recording controller.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("a recording is already active or starting")]
    AlreadyInFlight,
    #[error("no active recording")]
    NoActiveRecording,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors emitted by the handoff store.
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("handoff record {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Errors emitted by session commands.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no questions loaded")]
    NoQuestions,
    #[error("question {index} has no identifier")]
    MissingQuestionId { index: usize },
    #[error("cannot {action} while {phase}")]
    InvalidPhase { action: &'static str, phase: Phase },
    #[error("set {set} is outside the configured {total} sets")]
    SetOutOfRange { set: usize, total: usize },
    #[error("set {set} has no completed results")]
    SetNotReady { set: usize },
    #[error("set {set} is already being generated")]
    GenerationInFlight { set: usize },
    #[error("session already complete")]
    SessionComplete,
    #[error("session is no longer running")]
    Closed,
    #[error("result feed is held by session {owner}")]
    FeedBusy { owner: String },
    #[error("media session unavailable: {0}")]
    Media(String),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error(transparent)]
    Api(#[from] ApiError),
}
