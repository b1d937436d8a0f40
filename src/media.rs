//! Live media binding
//!
//! Each question set records against one live media session. The session
//! only needs to join it before recording and leave it when a set is left;
//! the transport itself lives with the client.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::correlator::base_id;

#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Join (or stay in) the live session for `session_id`; returns the id
    /// recordings should be started against. Retry suffixes are ignored.
    async fn join(&self, session_id: &str) -> Result<String>;

    /// Tear down the current binding. No-op when not joined.
    async fn leave(&self) -> Result<()>;
}

/// Opens one binding per session, so leaving in one session never tears
/// down another's
pub trait MediaProvider: Send + Sync {
    fn open(&self, session_id: &str) -> Arc<dyn MediaSession>;
}

/// Hands every session its own `LocalMediaSession`
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMediaProvider;

impl MediaProvider for LocalMediaProvider {
    fn open(&self, session_id: &str) -> Arc<dyn MediaSession> {
        debug!("Opening media binding for session {}", session_id);
        Arc::new(LocalMediaSession::new())
    }
}

/// In-process binding used when the client owns the media transport
#[derive(Debug, Default)]
pub struct LocalMediaSession {
    live: Mutex<Option<String>>,
}

impl LocalMediaSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently joined live session
    pub fn current(&self) -> Option<String> {
        self.live.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl MediaSession for LocalMediaSession {
    async fn join(&self, session_id: &str) -> Result<String> {
        let live_id = base_id(session_id).to_string();
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());

        if live.as_deref() == Some(live_id.as_str()) {
            debug!("Already joined live session {}", live_id);
        } else {
            info!("Joining live session {}", live_id);
            *live = Some(live_id.clone());
        }
        Ok(live_id)
    }

    async fn leave(&self) -> Result<()> {
        if let Some(live_id) = self.live.lock().unwrap_or_else(|e| e.into_inner()).take() {
            info!("Left live session {}", live_id);
        }
        Ok(())
    }
}
