use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{info, warn};

use crate::api::{InterviewApi, StopReceipt};
use crate::error::{ApiError, RecordingError};

/// Pending start request; resolves to the backend's recording id
pub type StartFuture = BoxFuture<'static, Result<String, ApiError>>;

/// Pending stop request
pub type StopFuture = BoxFuture<'static, Result<StopReceipt, ApiError>>;

/// Owns the single recording handle of a session.
///
/// Requests are split in two halves so the owner can keep processing events
/// while the backend call is in flight: `begin_*` checks and marks the
/// in-flight state and hands back a future, `finish_*` records its outcome.
/// At most one handle exists at a time and a start is never re-issued while
/// one is pending.
pub struct RecordingController {
    api: Arc<dyn InterviewApi>,
    handle: Option<String>,
    start_pending: bool,
    stops_in_flight: HashSet<String>,
}

impl RecordingController {
    pub fn new(api: Arc<dyn InterviewApi>) -> Self {
        Self {
            api,
            handle: None,
            start_pending: false,
            stops_in_flight: HashSet::new(),
        }
    }

    /// Current recording id, if one is live
    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }

    pub fn is_start_pending(&self) -> bool {
        self.start_pending
    }

    /// Whether a stop for `recording_id` has been issued and not yet answered
    pub fn is_stopping(&self, recording_id: &str) -> bool {
        self.stops_in_flight.contains(recording_id)
    }

    pub fn begin_start(&mut self, live_session_id: &str) -> Result<StartFuture, RecordingError> {
        if self.handle.is_some() || self.start_pending {
            return Err(RecordingError::AlreadyInFlight);
        }

        self.start_pending = true;
        info!("Starting recording for live session {}", live_session_id);

        let api = Arc::clone(&self.api);
        let live_session_id = live_session_id.to_string();
        Ok(async move { api.start_recording(&live_session_id).await }.boxed())
    }

    pub fn finish_start(&mut self, result: Result<String, ApiError>) -> Result<String, RecordingError> {
        self.start_pending = false;

        let recording_id = result?;
        if let Some(previous) = self.handle.replace(recording_id.clone()) {
            // Only reachable if someone bypassed begin_start
            warn!("Replacing live recording {}; detaching it", previous);
            self.api.detach_recording(&previous);
        }
        Ok(recording_id)
    }

    /// Issue a stop for `recording_id`, or the live handle when `None`.
    ///
    /// Returns `Ok(None)` when a stop for the same recording is already in
    /// flight; overlapping stops collapse into the first one.
    pub fn begin_stop(
        &mut self,
        recording_id: Option<&str>,
    ) -> Result<Option<(String, StopFuture)>, RecordingError> {
        let recording_id = recording_id
            .map(str::to_string)
            .or_else(|| self.handle.clone())
            .ok_or(RecordingError::NoActiveRecording)?;

        if !self.stops_in_flight.insert(recording_id.clone()) {
            info!("Stop for {} already in flight", recording_id);
            return Ok(None);
        }

        let api = Arc::clone(&self.api);
        let id = recording_id.clone();
        let stop = async move { api.stop_recording(&id).await }.boxed();
        Ok(Some((recording_id, stop)))
    }

    /// Record the outcome of a stop. The handle is released whether or not
    /// the backend accepted it.
    pub fn finish_stop(
        &mut self,
        recording_id: &str,
        result: Result<StopReceipt, ApiError>,
    ) -> Result<StopReceipt, RecordingError> {
        self.stops_in_flight.remove(recording_id);
        if self.handle.as_deref() == Some(recording_id) {
            self.handle = None;
        }

        match result {
            Ok(receipt) => {
                info!("Recording {} stopped", recording_id);
                Ok(receipt)
            }
            Err(e) => {
                warn!("Stopping recording {} failed: {}", recording_id, e);
                Err(e.into())
            }
        }
    }

    /// Abandon the live recording without waiting for the backend.
    /// At most one notification is sent per handle.
    pub fn detach(&mut self) -> Option<String> {
        let recording_id = self.handle.take()?;
        if !self.stops_in_flight.contains(&recording_id) {
            info!("Detaching recording {}", recording_id);
            self.api.detach_recording(&recording_id);
        }
        Some(recording_id)
    }

    /// Forget the handle. Called on every question-index transition.
    pub fn clear(&mut self) {
        self.handle = None;
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.detach();
    }
}
