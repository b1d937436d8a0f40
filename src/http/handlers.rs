use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use super::state::AppState;
use crate::correlator::AttemptId;
use crate::error::{RecordingError, SessionError};
use crate::handoff::HandoffRecord;
use crate::navigation::SessionQuery;
use crate::session::{SessionHandle, SessionLaunch, SessionSnapshot};
use crate::sets::AdvancePlan;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    pub interview_type: Option<String>,

    /// Raw server questions
    #[serde(default)]
    pub questions: Vec<Value>,

    pub total_interview_sets: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptsResponse {
    pub attempt_ids: Vec<AttemptId>,
    pub set_map: BTreeMap<usize, Vec<AttemptId>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySetResponse {
    pub removed: Vec<AttemptId>,
    pub session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceSetResponse {
    pub plan: AdvancePlan,
    pub session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error response with its status code
#[derive(Debug)]
pub struct HandlerError {
    status: StatusCode,
    message: String,
}

impl HandlerError {
    fn not_found(session_id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("Session {} not found", session_id),
        }
    }
}

impl From<SessionError> for HandlerError {
    fn from(e: SessionError) -> Self {
        let status = match &e {
            SessionError::Closed => StatusCode::NOT_FOUND,
            SessionError::SetOutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SessionError::Api(_)
            | SessionError::Media(_)
            | SessionError::Recording(RecordingError::Api(_)) => StatusCode::BAD_GATEWAY,
            SessionError::Handoff(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SessionError::NoQuestions
            | SessionError::MissingQuestionId { .. }
            | SessionError::InvalidPhase { .. }
            | SessionError::SetNotReady { .. }
            | SessionError::GenerationInFlight { .. }
            | SessionError::SessionComplete
            | SessionError::FeedBusy { .. }
            | SessionError::Recording(_) => StatusCode::CONFLICT,
        };
        if status.is_server_error() {
            error!("Session request failed: {}", e);
        } else {
            warn!("Session request rejected: {}", e);
        }
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

type HandlerResult<T> = Result<Json<T>, HandlerError>;

async fn find(state: &AppState, session_id: &str) -> Result<SessionHandle, HandlerError> {
    state
        .session(session_id)
        .await
        .ok_or_else(|| HandlerError::not_found(session_id))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions
/// Persist a handoff record and start a session from it
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionSnapshot>), HandlerError> {
    let session_id = req
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if state.session(&session_id).await.is_some() {
        return Err(HandlerError {
            status: StatusCode::CONFLICT,
            message: format!("Session {} is already running", session_id),
        });
    }

    info!("Creating session {}", session_id);

    let record = HandoffRecord::new(
        session_id.clone(),
        req.interview_type,
        req.questions,
        req.total_interview_sets,
    );

    let mut launch = SessionLaunch::new(session_id);
    if let Err(e) = state.deps.store.create(&record) {
        warn!("Handoff record {} not persisted, session cannot be resumed: {}", record.key(), e);
        launch.record = Some(record);
    }

    let handle = state.spawn(launch).await?;
    Ok((StatusCode::CREATED, Json(handle.snapshot())))
}

/// POST /sessions/:session_id/resume
/// Start (or rejoin) a session from its persisted record and navigation parameters
pub async fn resume_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    RawQuery(query): RawQuery,
) -> HandlerResult<SessionSnapshot> {
    if let Some(handle) = state.session(&session_id).await {
        info!("Session {} already running", session_id);
        return Ok(Json(handle.snapshot()));
    }

    let query = SessionQuery::parse(query.as_deref().unwrap_or_default());
    if let Some(named) = query.session_id().filter(|named| *named != session_id) {
        warn!("Query names session {} but path says {}; using the path", named, session_id);
    }
    let launch = SessionLaunch::from_query(session_id.clone(), &query);

    info!("Resuming session {}", session_id);
    let handle = state.spawn(launch).await?;
    Ok(Json(handle.snapshot()))
}

/// GET /sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> HandlerResult<SessionSnapshot> {
    let handle = find(&state, &session_id).await?;
    Ok(Json(handle.snapshot()))
}

/// GET /sessions/:session_id/attempts
/// Correlated attempt ids, globally and per set
pub async fn get_attempts(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> HandlerResult<AttemptsResponse> {
    let snapshot = find(&state, &session_id).await?.snapshot();
    Ok(Json(AttemptsResponse {
        attempt_ids: snapshot.attempt_ids,
        set_map: snapshot.set_map,
    }))
}

/// POST /sessions/:session_id/answer
pub async fn begin_answer(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> HandlerResult<SessionSnapshot> {
    let handle = find(&state, &session_id).await?;
    handle.begin_answer().await?;
    Ok(Json(handle.snapshot()))
}

/// POST /sessions/:session_id/advance
pub async fn advance(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> HandlerResult<SessionSnapshot> {
    let handle = find(&state, &session_id).await?;
    handle.advance().await?;
    Ok(Json(handle.snapshot()))
}

/// POST /sessions/:session_id/detach
/// The viewer is leaving; abandon any live recording
pub async fn detach(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> HandlerResult<SessionSnapshot> {
    let handle = find(&state, &session_id).await?;
    handle.detach().await?;
    Ok(Json(handle.snapshot()))
}

/// POST /sessions/:session_id/sets/:set/retry
pub async fn retry_set(
    State(state): State<AppState>,
    Path((session_id, set)): Path<(String, usize)>,
) -> HandlerResult<RetrySetResponse> {
    let handle = find(&state, &session_id).await?;
    let removed = handle.retry_set(set).await?;
    Ok(Json(RetrySetResponse {
        removed,
        session: handle.snapshot(),
    }))
}

/// POST /sessions/:session_id/sets/:set/advance
pub async fn advance_set(
    State(state): State<AppState>,
    Path((session_id, set)): Path<(String, usize)>,
) -> HandlerResult<AdvanceSetResponse> {
    let handle = find(&state, &session_id).await?;
    let plan = handle.advance_set(set).await?;
    Ok(Json(AdvanceSetResponse {
        plan,
        session: handle.snapshot(),
    }))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
