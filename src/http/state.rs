use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::error::SessionError;
use crate::session::{SessionController, SessionDeps, SessionHandle, SessionLaunch};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Running sessions (session_id → handle)
    pub sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,

    /// Collaborators handed to every new session
    pub deps: SessionDeps,
}

impl AppState {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            deps,
        }
    }

    /// Handle of a running session; finished sessions are dropped
    pub async fn session(&self, session_id: &str) -> Option<SessionHandle> {
        let handle = self.sessions.read().await.get(session_id).cloned()?;
        if handle.is_closed() {
            self.sessions.write().await.remove(session_id);
            return None;
        }
        Some(handle)
    }

    /// Spawn a session, replacing any earlier one with the same id. The
    /// entry is dropped again once the session task stops.
    pub async fn spawn(&self, launch: SessionLaunch) -> Result<SessionHandle, SessionError> {
        let session_id = launch.session_id.clone();
        let handle = SessionController::try_spawn(launch, self.deps.clone())?;

        if self
            .sessions
            .write()
            .await
            .insert(session_id.clone(), handle.clone())
            .is_some()
        {
            info!("Replaced running session {}", session_id);
        }

        let sessions = Arc::clone(&self.sessions);
        let watched = handle.clone();
        tokio::spawn(async move {
            watched.closed().await;
            let mut sessions = sessions.write().await;
            if sessions.get(&session_id).map_or(false, |h| h.same_session(&watched)) {
                sessions.remove(&session_id);
                info!("Session {} removed", session_id);
            }
        });

        Ok(handle)
    }
}
