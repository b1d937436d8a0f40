use serde::Serialize;
use tokio::sync::oneshot;

use super::machine::Phase;
use crate::api::StopReceipt;
use crate::correlator::AttemptId;
use crate::error::{ApiError, SessionError};
use crate::navigation::FeedbackRoute;
use crate::sets::AdvancePlan;

/// Things the session tells its viewers about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionNotice {
    PhaseChanged {
        phase: Phase,
        index: usize,
    },
    /// First result of a set the user has already left
    SetResultsArriving {
        set: usize,
    },
    /// All results of a set are in; retry or advance may be chosen
    SetReady {
        set: usize,
        attempt_ids: Vec<AttemptId>,
        is_last: bool,
        feedback_route: Option<FeedbackRoute>,
    },
    NextSetFailed {
        set: usize,
        reason: String,
    },
    RecordingStartFailed {
        reason: String,
    },
    LoadFailed {
        reason: String,
    },
    Completed {
        attempt_ids: Vec<AttemptId>,
    },
}

pub(crate) type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Requests from a `SessionHandle`
pub(crate) enum Command {
    BeginAnswer { reply: Reply<()> },
    Advance { reply: Reply<()> },
    /// Countdown tick; `None` when sent by the built-in ticker
    Tick { reply: Option<Reply<()>> },
    RetrySet { set: usize, reply: Reply<Vec<AttemptId>> },
    AdvanceSet { set: usize, reply: Reply<AdvancePlan> },
    Detach { reply: Reply<()> },
    SubmitResult { attempt_id: AttemptId, reply: Reply<()> },
}

/// Everything the session task consumes, in arrival order
pub(crate) enum Envelope {
    Command(Command),
    RecordingStarted(Result<String, ApiError>),
    RecordingStopped {
        recording_id: String,
        result: Result<StopReceipt, ApiError>,
    },
    NextSetGenerated {
        /// Set whose "advance" asked for generation
        set: usize,
        result: Result<Vec<serde_json::Value>, ApiError>,
    },
    Result(AttemptId),
}
