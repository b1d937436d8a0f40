pub mod api;
pub mod config;
pub mod correlator;
pub mod error;
pub mod handoff;
pub mod http;
pub mod media;
pub mod navigation;
pub mod nats;
pub mod question;
pub mod recording;
pub mod session;
pub mod sets;

pub use api::{HttpInterviewApi, InterviewApi, PriorAttempt, StopReceipt};
pub use config::Config;
pub use correlator::{AttemptId, Correlation, FeedLease, ResultCorrelator, ResultHub};
pub use error::{ApiError, HandoffError, RecordingError, SessionError};
pub use handoff::{FileHandoffStore, HandoffRecord, HandoffStore, MemoryHandoffStore};
pub use http::{create_router, AppState};
pub use media::{LocalMediaProvider, LocalMediaSession, MediaProvider, MediaSession};
pub use navigation::{FeedbackRoute, InterviewType, SessionQuery};
pub use nats::{NatsClient, ResultTopic};
pub use question::{build_units, QuestionKind, QuestionUnit};
pub use recording::RecordingController;
pub use session::{
    Phase, SessionController, SessionDeps, SessionHandle, SessionLaunch, SessionNotice,
    SessionSettings, SessionSnapshot,
};
pub use sets::{AdvancePlan, SetCompletion};
