use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::attempt::AttemptId;
use crate::error::SessionError;

/// Progress counters for the interview currently using the feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterviewProgress {
    pub in_progress: bool,
    pub total_questions: usize,
    pub completed_questions: usize,
}

struct Owner {
    lease: u64,
    session_id: String,
    results: mpsc::UnboundedSender<AttemptId>,
    progress: InterviewProgress,
}

#[derive(Default)]
struct Feed {
    owner: Option<Owner>,
    next_lease: u64,
}

/// Fan-out point between the result feed and its listeners.
///
/// Attempt ids carry nothing that names their session, so the feed belongs
/// to one session at a time. That session claims a [`FeedLease`] and is the
/// only one fed results; passive listeners (a completion view subscribing
/// late) see every id. Interview progress lives with the lease.
pub struct ResultHub {
    tx: broadcast::Sender<AttemptId>,
    feed: Mutex<Feed>,
}

impl ResultHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            feed: Mutex::new(Feed::default()),
        }
    }

    /// Register a passive listener
    pub fn subscribe(&self) -> broadcast::Receiver<AttemptId> {
        self.tx.subscribe()
    }

    /// Take the feed for `session_id`.
    ///
    /// Fails while another live session holds it. Claiming again for the
    /// same session id takes the feed over from the earlier holder.
    pub fn claim(self: &Arc<Self>, session_id: &str) -> Result<FeedLease, SessionError> {
        let mut feed = self.lock();
        if let Some(owner) = &feed.owner {
            if owner.session_id != session_id && !owner.results.is_closed() {
                return Err(SessionError::FeedBusy {
                    owner: owner.session_id.clone(),
                });
            }
            info!("Session {} takes the result feed from {}", session_id, owner.session_id);
        }

        feed.next_lease += 1;
        let lease = feed.next_lease;
        let (results, rx) = mpsc::unbounded_channel();
        feed.owner = Some(Owner {
            lease,
            session_id: session_id.to_string(),
            results,
            progress: InterviewProgress::default(),
        });
        debug!("Result feed lease {} for {}", lease, session_id);

        Ok(FeedLease {
            hub: Arc::clone(self),
            lease,
            session_id: session_id.to_string(),
            results: Some(rx),
        })
    }

    /// Session holding the feed, if it is still alive
    pub fn owner(&self) -> Option<String> {
        self.lock()
            .owner
            .as_ref()
            .filter(|owner| !owner.results.is_closed())
            .map(|owner| owner.session_id.clone())
    }

    /// Deliver an id to the feed holder and every passive listener; returns
    /// how many received it
    pub fn publish(&self, attempt_id: AttemptId) -> usize {
        let owned = {
            let feed = self.lock();
            feed.owner
                .as_ref()
                .map_or(false, |owner| owner.results.send(attempt_id.clone()).is_ok())
        };
        let listeners = self.tx.send(attempt_id.clone()).unwrap_or(0);

        let delivered = listeners + usize::from(owned);
        if delivered == 0 {
            warn!("No listeners registered for attempt {}", attempt_id);
        }
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Progress of the feed holder; default when the feed is free
    pub fn progress(&self) -> InterviewProgress {
        self.lock()
            .owner
            .as_ref()
            .map(|owner| owner.progress)
            .unwrap_or_default()
    }

    /// Whether the feed may be torn down. Refused while an interview is in
    /// progress so results for answered questions are still delivered.
    pub fn can_release(&self) -> bool {
        let progress = self.progress();
        if progress.in_progress {
            info!(
                "Keeping result feed open ({}/{} questions completed)",
                progress.completed_questions, progress.total_questions
            );
        }
        !progress.in_progress
    }

    fn update(&self, lease: u64, f: impl FnOnce(&mut InterviewProgress)) {
        let mut feed = self.lock();
        match feed.owner.as_mut() {
            Some(owner) if owner.lease == lease => f(&mut owner.progress),
            _ => debug!("Lease {} no longer holds the feed", lease),
        }
    }

    fn end_interview(&self, lease: u64) {
        let mut feed = self.lock();
        if feed.owner.as_ref().map_or(false, |owner| owner.lease == lease) {
            if let Some(owner) = feed.owner.take() {
                info!("Session {} released the result feed", owner.session_id);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Feed> {
        self.feed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ResultHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// One session's hold on the result feed; released on drop
pub struct FeedLease {
    hub: Arc<ResultHub>,
    lease: u64,
    session_id: String,
    results: Option<mpsc::UnboundedReceiver<AttemptId>>,
}

impl FeedLease {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Receiver of the ids published while this lease holds the feed.
    /// Handed out once.
    pub fn take_results(&mut self) -> Option<mpsc::UnboundedReceiver<AttemptId>> {
        self.results.take()
    }

    pub fn begin_interview(&self, total_questions: usize) {
        self.hub.update(self.lease, |progress| {
            *progress = InterviewProgress {
                in_progress: true,
                total_questions,
                completed_questions: 0,
            };
        });
        info!(
            "Interview {} started ({} questions expected)",
            self.session_id, total_questions
        );
    }

    /// Count a finished question; the interview ends once all are done
    pub fn complete_question(&self) {
        self.hub.update(self.lease, |progress| {
            progress.completed_questions += 1;
            if progress.completed_questions >= progress.total_questions {
                progress.in_progress = false;
                info!("All {} questions completed", progress.total_questions);
            }
        });
    }
}

impl Drop for FeedLease {
    fn drop(&mut self) {
        self.hub.end_interview(self.lease);
    }
}
