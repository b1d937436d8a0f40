#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use interview_session::{
    ApiError, HandoffError, HandoffRecord, HandoffStore, InterviewApi, MediaProvider,
    MediaSession, MemoryHandoffStore, PriorAttempt, ResultHub, SessionDeps, SessionHandle,
    SessionNotice, SessionSettings, SessionSnapshot, StopReceipt,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// Backend double with switchable failures
#[derive(Default)]
pub struct FakeApi {
    pub starts: AtomicUsize,
    pub stops: Mutex<Vec<String>>,
    pub detached: Mutex<Vec<String>>,
    pub generate_calls: AtomicUsize,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_generate: AtomicBool,
    /// Questions handed out by `generate_next_question_set`
    pub generated: Mutex<Vec<Value>>,
    pub prior_texts: Mutex<HashMap<String, String>>,
    pub interview_uuid: Mutex<Option<String>>,
}

#[async_trait]
impl InterviewApi for FakeApi {
    async fn start_recording(&self, _live_session_id: &str) -> Result<String, ApiError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ApiError::Other("start refused".into()));
        }
        let n = self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(format!("rec-{}", n))
    }

    async fn stop_recording(&self, recording_id: &str) -> Result<StopReceipt, ApiError> {
        self.stops.lock().unwrap().push(recording_id.to_string());
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(ApiError::Other("network error".into()));
        }
        Ok(StopReceipt {
            interview_uuid: self.interview_uuid.lock().unwrap().clone(),
        })
    }

    async fn generate_next_question_set(&self, _session_id: &str) -> Result<Vec<Value>, ApiError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_generate.load(Ordering::SeqCst) {
            return Err(ApiError::Other("generation timed out".into()));
        }
        Ok(self.generated.lock().unwrap().clone())
    }

    async fn lookup_prior_attempt_text(&self, attempt_id: &str) -> Result<PriorAttempt, ApiError> {
        match self.prior_texts.lock().unwrap().get(attempt_id) {
            Some(text) => Ok(PriorAttempt {
                text: Some(text.clone()),
            }),
            None => Err(ApiError::Other("feedback not found".into())),
        }
    }

    fn detach_recording(&self, recording_id: &str) {
        self.detached.lock().unwrap().push(recording_id.to_string());
    }
}

/// Media double remembering joins and leaves
#[derive(Default)]
pub struct FakeMedia {
    pub joins: Mutex<Vec<String>>,
    pub leaves: AtomicUsize,
}

#[async_trait]
impl MediaSession for FakeMedia {
    async fn join(&self, session_id: &str) -> anyhow::Result<String> {
        let live = interview_session::correlator::base_id(session_id).to_string();
        self.joins.lock().unwrap().push(live.clone());
        Ok(live)
    }

    async fn leave(&self) -> anyhow::Result<()> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands every session its own `FakeMedia`
#[derive(Default)]
pub struct FakeMediaProvider {
    pub opened: Mutex<Vec<(String, Arc<FakeMedia>)>>,
}

impl FakeMediaProvider {
    /// Binding opened for `session_id`; the latest one if opened twice
    pub fn session(&self, session_id: &str) -> Arc<FakeMedia> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| id == session_id)
            .map(|(_, media)| media.clone())
            .unwrap_or_else(|| panic!("no media opened for {}", session_id))
    }
}

impl MediaProvider for FakeMediaProvider {
    fn open(&self, session_id: &str) -> Arc<dyn MediaSession> {
        let media = Arc::new(FakeMedia::default());
        self.opened
            .lock()
            .unwrap()
            .push((session_id.to_string(), media.clone()));
        media
    }
}

/// In-memory store whose writes can be made to fail
#[derive(Default)]
pub struct FakeStore {
    pub inner: MemoryHandoffStore,
    pub fail_writes: AtomicBool,
}

impl FakeStore {
    fn check_writable(&self) -> Result<(), HandoffError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HandoffError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        Ok(())
    }
}

impl HandoffStore for FakeStore {
    fn create(&self, record: &HandoffRecord) -> Result<(), HandoffError> {
        self.check_writable()?;
        self.inner.create(record)
    }

    fn read(&self, session_id: &str) -> Result<HandoffRecord, HandoffError> {
        self.inner.read(session_id)
    }

    fn extend(&self, session_id: &str, questions: &[Value]) -> Result<HandoffRecord, HandoffError> {
        self.check_writable()?;
        self.inner.extend(session_id, questions)
    }
}

pub struct Harness {
    pub api: Arc<FakeApi>,
    pub media: Arc<FakeMediaProvider>,
    pub store: Arc<FakeStore>,
    pub hub: Arc<ResultHub>,
    pub settings: SessionSettings,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            api: Arc::new(FakeApi::default()),
            media: Arc::new(FakeMediaProvider::default()),
            store: Arc::new(FakeStore::default()),
            hub: Arc::new(ResultHub::new(64)),
            settings: SessionSettings {
                tick_interval_ms: 0,
                ..SessionSettings::default()
            },
        }
    }

    pub fn deps(&self) -> SessionDeps {
        SessionDeps {
            api: self.api.clone(),
            media: self.media.clone(),
            store: self.store.clone(),
            hub: self.hub.clone(),
            settings: self.settings.clone(),
        }
    }

    /// Persist a handoff record with `sets` generated question sets
    pub fn seed(&self, session_id: &str, sets: usize, total_sets: Option<usize>) {
        let record = HandoffRecord::new(
            session_id,
            Some("behavioral".to_string()),
            raw_questions("q", sets),
            total_sets,
        );
        self.store.create(&record).unwrap();
    }
}

/// `sets` server questions, each with two follow-ups
pub fn raw_questions(prefix: &str, sets: usize) -> Vec<Value> {
    (0..sets)
        .map(|s| {
            json!({
                "id": format!("{}{}", prefix, s),
                "question": format!("Main question {}", s),
                "followUps": [
                    { "id": format!("{}{}-f1", prefix, s), "question": "Why?" },
                    { "id": format!("{}{}-f2", prefix, s), "question": "What next?" }
                ]
            })
        })
        .collect()
}

/// Wait until the published snapshot satisfies `done`
pub async fn wait_for<F>(handle: &SessionHandle, mut done: F) -> SessionSnapshot
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    let mut rx = handle.watch();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if done(&snapshot) {
                    return snapshot.clone();
                }
            }
            rx.changed().await.expect("session stopped");
        }
    })
    .await
    .expect("timed out waiting for session state")
}

/// Next notice matching `wanted`, skipping the rest
pub async fn next_notice<F>(rx: &mut broadcast::Receiver<SessionNotice>, mut wanted: F) -> SessionNotice
where
    F: FnMut(&SessionNotice) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let notice = rx.recv().await.expect("notice channel closed");
            if wanted(&notice) {
                return notice;
            }
        }
    })
    .await
    .expect("timed out waiting for notice")
}

/// Start recording the current question and wait until it is live
pub async fn answer(handle: &SessionHandle) -> SessionSnapshot {
    handle.begin_answer().await.unwrap();
    wait_for(handle, |s| s.phase == interview_session::Phase::Answering).await
}

/// Answer the current question and move past it
pub async fn answer_and_advance(handle: &SessionHandle) -> SessionSnapshot {
    answer(handle).await;
    handle.advance().await.unwrap();
    handle.snapshot()
}

/// Poll `done` until it holds
pub async fn eventually<F>(mut done: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held")
}

/// Walk a one-set session to completion and hand in every result
pub async fn finish_single_set(handle: &SessionHandle) {
    for _ in 0..3 {
        answer_and_advance(handle).await;
    }
    for id in ["a0", "a1", "a2"] {
        handle.submit_result(id.into()).await.unwrap();
    }
}
