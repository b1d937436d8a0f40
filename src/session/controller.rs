use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval_at, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::config::SessionSettings;
use super::events::{Command, Envelope, Reply, SessionNotice};
use super::machine::{transition, Event, Phase, SessionState};
use super::snapshot::SessionSnapshot;
use crate::api::{InterviewApi, StopReceipt};
use crate::correlator::{AttemptId, FeedLease, ResultCorrelator, ResultHub};
use crate::error::{ApiError, HandoffError, RecordingError, SessionError};
use crate::handoff::{HandoffRecord, HandoffStore};
use crate::media::{MediaProvider, MediaSession};
use crate::navigation::{expected_question_total, resolve_total_sets, FeedbackRoute, InterviewType, SessionQuery};
use crate::question::{build_units, QuestionUnit};
use crate::recording::RecordingController;
use crate::sets::{AdvancePlan, SetCompletion, SetSignal};

const NOTICE_CAPACITY: usize = 64;

/// How a session is entered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionLaunch {
    /// Interview id; also the handoff record key
    pub session_id: String,
    pub interview_type: Option<InterviewType>,
    /// Explicit set count, overriding the handoff record
    pub total_sets: Option<usize>,
    /// Prior attempts to answer again (retry mode)
    pub retry_attempt_ids: Vec<String>,
    /// Question index to resume at
    pub resume_index: Option<usize>,
    /// Generate questions when the record has none
    pub generate_next: bool,
    /// Record to use instead of reading the store, for when it could not
    /// be persisted
    #[serde(skip)]
    pub record: Option<HandoffRecord>,
}

impl SessionLaunch {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    /// Launch for `session_id` described by navigation parameters
    pub fn from_query(session_id: impl Into<String>, query: &SessionQuery) -> Self {
        Self {
            session_id: session_id.into(),
            interview_type: query.interview_type,
            total_sets: query.count,
            retry_attempt_ids: query.attempt_ids.clone(),
            resume_index: query.step,
            generate_next: query.generate_next,
            record: None,
        }
    }

    pub fn is_retry(&self) -> bool {
        !self.retry_attempt_ids.is_empty()
    }
}

/// Collaborators shared by every session
#[derive(Clone)]
pub struct SessionDeps {
    pub api: Arc<dyn InterviewApi>,
    pub media: Arc<dyn MediaProvider>,
    pub store: Arc<dyn HandoffStore>,
    pub hub: Arc<ResultHub>,
    pub settings: SessionSettings,
}

/// Cloneable front of a running session.
///
/// Every request is queued to the session task and answered once it has been
/// applied; the snapshot visible through the handle already reflects it.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: Arc<str>,
    tx: mpsc::Sender<Envelope>,
    snapshot: watch::Receiver<SessionSnapshot>,
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the session task has stopped
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Whether both handles front the same running session
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Start recording the current question
    pub async fn begin_answer(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::BeginAnswer { reply }).await
    }

    /// Finish the current answer and move on
    pub async fn advance(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Advance { reply }).await
    }

    /// One countdown step, for sessions without the built-in ticker
    pub async fn tick(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Tick { reply: Some(reply) }).await
    }

    /// Answer a presented set again; returns the attempt ids it dropped
    pub async fn retry_set(&self, set: usize) -> Result<Vec<AttemptId>, SessionError> {
        self.request(|reply| Command::RetrySet { set, reply }).await
    }

    /// Move on from a presented set
    pub async fn advance_set(&self, set: usize) -> Result<AdvancePlan, SessionError> {
        self.request(|reply| Command::AdvanceSet { set, reply }).await
    }

    /// The viewer went away. Any live recording is abandoned; results keep
    /// being correlated.
    pub async fn detach(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Detach { reply }).await
    }

    /// Feed a result directly, bypassing the hub
    pub async fn submit_result(&self, attempt_id: AttemptId) -> Result<(), SessionError> {
        self.request(|reply| Command::SubmitResult { attempt_id, reply }).await
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope::Command(command(reply)))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }
}

struct LoadedQuestions {
    units: Vec<QuestionUnit>,
    total_sets: usize,
    result_id: Option<String>,
    interview_type: Option<InterviewType>,
}

/// The session task. Owns all mutable session state and applies envelopes
/// one at a time; collaborator calls run on their own tasks and report back
/// through the same queue.
pub struct SessionController {
    launch: SessionLaunch,
    deps: SessionDeps,
    state: SessionState,
    interview_type: Option<InterviewType>,
    media: Arc<dyn MediaSession>,
    /// Hold on the result feed; `None` once released
    lease: Option<FeedLease>,
    /// Why the feed could not be claimed
    claim_error: Option<SessionError>,
    recorder: RecordingController,
    correlator: ResultCorrelator,
    sets: SetCompletion,
    /// Set whose successor is being generated
    generating: Option<usize>,
    tx: mpsc::WeakSender<Envelope>,
    snapshot: watch::Sender<SessionSnapshot>,
    notices: broadcast::Sender<SessionNotice>,
    last_activity: Instant,
    /// When the finished session gave up the feed
    released_at: Option<Instant>,
}

impl SessionController {
    /// Spawn a session task and return its handle. If another session holds
    /// the result feed the task reports `LoadFailed` and stops.
    pub fn spawn(launch: SessionLaunch, deps: SessionDeps) -> SessionHandle {
        let lease = deps.hub.claim(&launch.session_id);
        Self::start(launch, deps, lease)
    }

    /// Like [`spawn`](Self::spawn), but refuses up front while another
    /// session holds the result feed
    pub fn try_spawn(launch: SessionLaunch, deps: SessionDeps) -> Result<SessionHandle, SessionError> {
        let lease = deps.hub.claim(&launch.session_id)?;
        Ok(Self::start(launch, deps, Ok(lease)))
    }

    fn start(launch: SessionLaunch, deps: SessionDeps, lease: Result<FeedLease, SessionError>) -> SessionHandle {
        let settings = deps.settings.clone();
        let initial_sets = launch
            .total_sets
            .filter(|&n| n > 0)
            .unwrap_or(settings.default_total_sets);

        let (tx, rx) = mpsc::channel(settings.command_buffer.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::loading(
            &launch.session_id,
            launch.interview_type,
            initial_sets.max(1),
            settings.answer_time_secs,
        ));
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        // Results are routed from the moment the feed is claimed, so none
        // arriving during the load is missed
        let (lease, claim_error) = match lease {
            Ok(mut lease) => {
                if let Some(results) = lease.take_results() {
                    spawn_result_forwarder(results, tx.downgrade());
                }
                (Some(lease), None)
            }
            Err(e) => (None, Some(e)),
        };
        if let Some(period) = settings.tick_interval() {
            spawn_ticker(period, tx.downgrade());
        }

        let handle = SessionHandle {
            session_id: Arc::from(launch.session_id.as_str()),
            tx: tx.clone(),
            snapshot: snapshot_rx,
            notices: notices.clone(),
        };

        let controller = SessionController {
            interview_type: launch.interview_type,
            media: deps.media.open(&launch.session_id),
            lease,
            claim_error,
            state: SessionState::new(&settings, initial_sets),
            recorder: RecordingController::new(Arc::clone(&deps.api)),
            correlator: ResultCorrelator::new(settings.set_size),
            sets: SetCompletion::new(),
            generating: None,
            tx: tx.downgrade(),
            snapshot: snapshot_tx,
            notices,
            last_activity: Instant::now(),
            released_at: None,
            launch,
            deps,
        };
        tokio::spawn(controller.run(rx));

        handle
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Envelope>) {
        if let Some(e) = self.claim_error.take() {
            error!("Session {} not started: {}", self.launch.session_id, e);
            self.notify(SessionNotice::LoadFailed { reason: e.to_string() });
            return;
        }
        info!("Session {} started", self.launch.session_id);

        let loaded = self.load().await;
        self.publish();

        while loaded {
            let next = match self.deadline() {
                Some(deadline) => match timeout_at(deadline, rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        if self.released_at.is_some() {
                            info!("Session {} finished", self.launch.session_id);
                        } else {
                            warn!("Session {} idle, stopping", self.launch.session_id);
                        }
                        break;
                    }
                },
                None => rx.recv().await,
            };
            let Some(envelope) = next else { break };
            self.handle(envelope).await;
        }

        self.shutdown().await;
        info!("Session {} stopped", self.launch.session_id);
    }

    /// When the task stops unless something arrives first
    fn deadline(&self) -> Option<Instant> {
        let settings = &self.deps.settings;
        match self.released_at {
            Some(released) => Some(released + Duration::from_secs(settings.linger_secs)),
            None => settings.idle_timeout().map(|idle| self.last_activity + idle),
        }
    }

    async fn shutdown(&mut self) {
        self.detach().await;
        self.publish();
        self.lease = None;
    }

    async fn handle(&mut self, envelope: Envelope) {
        let from_ticker = matches!(envelope, Envelope::Command(Command::Tick { reply: None }));
        if !from_ticker {
            self.last_activity = Instant::now();
        }

        match envelope {
            Envelope::Command(command) => self.handle_command(command).await,
            Envelope::RecordingStarted(result) => self.on_recording_started(result),
            Envelope::RecordingStopped { recording_id, result } => {
                self.on_recording_stopped(&recording_id, result)
            }
            Envelope::NextSetGenerated { set, result } => self.on_next_set_generated(set, result).await,
            Envelope::Result(attempt_id) => self.on_result(attempt_id),
        }
        self.release_if_finished();
        self.publish();
    }

    /// Give up the feed once the session is complete and every answered
    /// question has its result
    fn release_if_finished(&mut self) {
        if self.released_at.is_some() || self.state.phase != Phase::Complete || !self.results_drained() {
            return;
        }
        info!(
            "Session {} has all {} results; releasing the result feed",
            self.launch.session_id,
            self.correlator.attempt_ids().len()
        );
        self.lease = None;
        self.released_at = Some(Instant::now());
    }

    fn results_drained(&self) -> bool {
        let loaded = self.state.questions.len();
        (0..self.state.total_sets).all(|set| {
            let expected = loaded
                .saturating_sub(self.state.set_start(set))
                .min(self.state.set_size);
            self.correlator.set_attempts(set).len() >= expected
        })
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::BeginAnswer { reply } => {
                let result = self.begin_answer().await;
                self.respond(reply, result);
            }
            Command::Advance { reply } => {
                let result = self.advance().await;
                self.respond(reply, result);
            }
            Command::Tick { reply } => {
                self.tick().await;
                if let Some(reply) = reply {
                    self.respond(reply, Ok(()));
                }
            }
            Command::RetrySet { set, reply } => {
                let result = self.retry_set(set).await;
                self.respond(reply, result);
            }
            Command::AdvanceSet { set, reply } => {
                let result = self.advance_set(set).await;
                self.respond(reply, result);
            }
            Command::Detach { reply } => {
                self.detach().await;
                self.respond(reply, Ok(()));
            }
            Command::SubmitResult { attempt_id, reply } => {
                self.on_result(attempt_id);
                self.respond(reply, Ok(()));
            }
        }
    }

    // Loading

    /// Returns whether the session can run
    async fn load(&mut self) -> bool {
        match self.load_questions().await {
            Ok(loaded) => {
                self.state.total_sets = loaded.total_sets.max(1);
                if self.interview_type.is_none() {
                    self.interview_type = loaded.interview_type;
                }
                if let Some(result_id) = loaded.result_id {
                    self.apply(Event::ResultId(result_id));
                }

                info!(
                    "Session {} loaded {} questions ({} sets)",
                    self.launch.session_id,
                    loaded.units.len(),
                    self.state.total_sets
                );
                self.apply(Event::QuestionsLoaded {
                    questions: loaded.units,
                    start_index: self.launch.resume_index.unwrap_or(0),
                });

                let expected = expected_question_total(
                    self.interview_type,
                    self.state.total_sets,
                    self.state.set_size,
                );
                if let Some(lease) = &self.lease {
                    lease.begin_interview(expected);
                }
                true
            }
            Err(e) => {
                error!("Session {} failed to load: {}", self.launch.session_id, e);
                self.notify(SessionNotice::LoadFailed { reason: e.to_string() });
                false
            }
        }
    }

    /// Retry mode, then the handoff record, then on-demand generation
    async fn load_questions(&self) -> Result<LoadedQuestions, SessionError> {
        let session_id = self.launch.session_id.as_str();
        let set_size = self.state.set_size;

        if self.launch.is_retry() {
            let units = self.retry_units().await;
            if units.is_empty() {
                return Err(SessionError::NoQuestions);
            }
            return Ok(LoadedQuestions {
                total_sets: (units.len() + set_size - 1) / set_size,
                units,
                result_id: non_empty(session_id),
                interview_type: None,
            });
        }

        let stored = match &self.launch.record {
            Some(record) => Ok(record.clone()),
            None => self.deps.store.read(session_id),
        };
        let record = match stored {
            Ok(record) => Some(record),
            Err(HandoffError::NotFound(key)) => {
                info!("No handoff record {}", key);
                None
            }
            Err(e) => {
                warn!("Handoff record for {} unreadable: {}", session_id, e);
                None
            }
        };

        let total_sets = resolve_total_sets(
            self.launch.total_sets,
            record.as_ref(),
            self.deps.settings.default_total_sets,
        );
        let interview_type = record
            .as_ref()
            .and_then(|r| r.interview_type.as_deref())
            .and_then(InterviewType::parse);
        let mut units = record.as_ref().map(HandoffRecord::units).unwrap_or_default();

        if units.is_empty() && self.launch.generate_next {
            info!("Generating questions for {}", session_id);
            let raw = self.deps.api.generate_next_question_set(session_id).await?;
            units = build_units(&raw);
            self.persist_generated(record.is_some(), &raw, total_sets);
        }

        if units.is_empty() {
            return Err(SessionError::NoQuestions);
        }

        let result_id = record
            .map(|r| r.session_id)
            .and_then(|id| non_empty(&id))
            .or_else(|| non_empty(session_id));

        Ok(LoadedQuestions {
            units,
            total_sets,
            result_id,
            interview_type,
        })
    }

    /// Units for retry mode, texts looked up from the prior attempts
    async fn retry_units(&self) -> Vec<QuestionUnit> {
        let limit = self.deps.settings.retry_question_limit.max(1);
        let ids: Vec<&str> = self
            .launch
            .retry_attempt_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .take(limit)
            .collect();

        let lookups = ids.iter().map(|id| self.deps.api.lookup_prior_attempt_text(id));
        let texts = join_all(lookups).await;

        let parent = ids.first().map(|id| id.to_string());
        ids.iter()
            .zip(texts)
            .enumerate()
            .map(|(i, (id, looked_up))| {
                let prior = looked_up.unwrap_or_else(|e| {
                    warn!("Prior attempt {} lookup failed: {}", id, e);
                    Default::default()
                });
                if i == 0 {
                    let text = prior.text.unwrap_or_else(|| "Main question (retry)".to_string());
                    QuestionUnit::main(Some(id.to_string()), text)
                } else {
                    let text = prior.text.unwrap_or_else(|| format!("Follow-up {} (retry)", i));
                    QuestionUnit::follow(Some(id.to_string()), text, parent.clone(), i)
                }
            })
            .collect()
    }

    /// Storage failures only cost the ability to resume
    fn persist_generated(&self, has_record: bool, raw: &[Value], total_sets: usize) {
        let session_id = &self.launch.session_id;
        let persisted = if has_record {
            self.deps.store.extend(session_id, raw).map(|_| ())
        } else {
            let record = HandoffRecord::new(
                session_id.clone(),
                self.interview_type.map(|t| t.as_str().to_string()),
                raw.to_vec(),
                Some(total_sets),
            );
            self.deps.store.create(&record)
        };

        if let Err(e) = persisted {
            warn!("Keeping generated questions for {} in memory only: {}", session_id, e);
        }
    }

    // Recording

    async fn begin_answer(&mut self) -> Result<(), SessionError> {
        if self.recorder.handle().is_some() || self.recorder.is_start_pending() {
            return Err(RecordingError::AlreadyInFlight.into());
        }
        if self.state.phase != Phase::Preparing {
            return Err(SessionError::InvalidPhase {
                action: "start answering",
                phase: self.state.phase,
            });
        }

        let index = self.state.current_index;
        let question_id = self
            .state
            .current_question()
            .ok_or(SessionError::NoQuestions)?
            .id
            .clone();
        let Some(question_id) = question_id else {
            error!("Question {} has no id; refusing to record against it", index);
            return Err(SessionError::MissingQuestionId { index });
        };

        let live_session_id = match self.media.join(&question_id).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Joining live session {} failed: {}", question_id, e);
                self.notify(SessionNotice::RecordingStartFailed { reason: e.to_string() });
                return Err(SessionError::Media(e.to_string()));
            }
        };

        let start = self.recorder.begin_start(&live_session_id)?;
        self.apply(Event::BeginRecording);
        self.post(async move { Envelope::RecordingStarted(start.await) });
        Ok(())
    }

    fn on_recording_started(&mut self, result: Result<String, ApiError>) {
        match self.recorder.finish_start(result) {
            Ok(recording_id) if self.state.phase == Phase::WaitingRecording => {
                info!("Recording {} live for question {}", recording_id, self.state.current_index);
                self.apply(Event::RecordingStarted);
            }
            Ok(recording_id) => {
                warn!("Recording {} came up after the user left; detaching", recording_id);
                self.recorder.detach();
            }
            Err(e) => {
                warn!("Recording start failed: {}", e);
                self.apply(Event::RecordingFailed);
                self.notify(SessionNotice::RecordingStartFailed { reason: e.to_string() });
            }
        }
    }

    /// Issue a stop for the live recording without waiting for it
    fn stop_live_recording(&mut self) {
        match self.recorder.begin_stop(None) {
            Ok(Some((recording_id, stop))) => {
                self.post(async move {
                    let result = stop.await;
                    Envelope::RecordingStopped { recording_id, result }
                });
            }
            Ok(None) => {}
            Err(e) => debug!("Nothing to stop: {}", e),
        }
    }

    fn on_recording_stopped(&mut self, recording_id: &str, result: Result<StopReceipt, ApiError>) {
        match self.recorder.finish_stop(recording_id, result) {
            Ok(receipt) => {
                if let Some(interview_uuid) = receipt.interview_uuid {
                    self.apply(Event::ResultId(interview_uuid));
                }
                if let Some(lease) = &self.lease {
                    lease.complete_question();
                }
            }
            Err(e) => warn!("Continuing without stop confirmation for {}: {}", recording_id, e),
        }
    }

    async fn leave_media(&self) {
        if let Err(e) = self.media.leave().await {
            warn!("Leaving live session failed: {}", e);
        }
    }

    // Navigation

    async fn advance(&mut self) -> Result<(), SessionError> {
        if self.state.phase != Phase::Answering {
            return Err(SessionError::InvalidPhase {
                action: "advance",
                phase: self.state.phase,
            });
        }
        self.advance_question().await;
        Ok(())
    }

    async fn advance_question(&mut self) {
        self.stop_live_recording();

        if self.state.is_last_in_set() {
            self.leave_media().await;
        }

        self.apply(Event::Advance);
        self.recorder.clear();

        let signals = self.sets.on_question_advanced(self.correlator.per_set(), &self.state);
        self.emit(signals);

        if self.state.phase == Phase::Complete {
            self.finish();
        }
    }

    async fn tick(&mut self) {
        if self.state.phase != Phase::Answering {
            return;
        }
        self.apply(Event::Tick);
        if self.state.time_is_up() {
            info!("Time is up on question {}", self.state.current_index);
            self.advance_question().await;
        }
    }

    async fn retry_set(&mut self, set: usize) -> Result<Vec<AttemptId>, SessionError> {
        self.sets.begin_retry(set, &self.state)?;
        let removed = self.correlator.retry_set(set);

        if self.recorder.handle().is_some() {
            self.stop_live_recording();
        }
        self.leave_media().await;

        self.apply(Event::EnterSet(set));
        self.recorder.clear();

        info!("Retrying set {} from question {}", set, self.state.current_index);
        Ok(removed)
    }

    async fn advance_set(&mut self, set: usize) -> Result<AdvancePlan, SessionError> {
        let plan = self.sets.plan_advance(set, &self.state)?;

        match plan {
            AdvancePlan::Finish => {
                self.sets.resolve(set);
                if self.state.phase != Phase::Complete {
                    self.stop_live_recording();
                    self.leave_media().await;
                    self.apply(Event::Complete);
                    self.recorder.clear();
                    self.finish();
                }
            }
            AdvancePlan::NextSet {
                set: next,
                needs_generation: false,
            } => {
                self.sets.resolve(set);
                self.enter_set_if_behind(next).await;
            }
            AdvancePlan::NextSet {
                set: next,
                needs_generation: true,
            } => {
                if self.generating.is_some() {
                    return Err(SessionError::GenerationInFlight { set: next });
                }
                self.generating = Some(set);
                info!("Generating questions for set {}", next);

                let api = Arc::clone(&self.deps.api);
                let session_id = self.launch.session_id.clone();
                self.post(async move {
                    let result = api.generate_next_question_set(&session_id).await;
                    Envelope::NextSetGenerated { set, result }
                });
            }
        }

        Ok(plan)
    }

    /// Jump to the start of `set` unless the user is already at or past it
    async fn enter_set_if_behind(&mut self, set: usize) {
        let start = self.state.set_start(set);
        if self.state.current_index < start {
            self.stop_live_recording();
            self.leave_media().await;
            self.apply(Event::EnterSet(set));
            self.recorder.clear();
        } else if self.state.current_index == start && self.state.phase == Phase::Loading {
            self.apply(Event::EnterSet(set));
        }
    }

    async fn on_next_set_generated(&mut self, set: usize, result: Result<Vec<Value>, ApiError>) {
        self.generating = None;
        let next = set + 1;

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Generating set {} failed: {}", next, e);
                self.notify(SessionNotice::NextSetFailed {
                    set: next,
                    reason: e.to_string(),
                });
                return;
            }
        };

        let units = build_units(&raw);
        if units.is_empty() {
            warn!("Generation for set {} returned no questions", next);
            self.notify(SessionNotice::NextSetFailed {
                set: next,
                reason: "no questions generated".to_string(),
            });
            return;
        }

        if let Err(e) = self.deps.store.extend(&self.launch.session_id, &raw) {
            warn!("Keeping set {} in memory only: {}", next, e);
        }

        if self.state.has_set(next) {
            debug!("Set {} already loaded; dropping generated copy", next);
        } else {
            self.apply(Event::QuestionsAppended(units));
        }
        self.sets.resolve(set);
        self.enter_set_if_behind(next).await;
    }

    async fn detach(&mut self) {
        if let Some(recording_id) = self.recorder.detach() {
            info!("Session {} detached from recording {}", self.launch.session_id, recording_id);
        }
        if self.state.phase.allows_recording() {
            self.apply(Event::Interrupted);
        }
        self.leave_media().await;
    }

    // Results

    fn on_result(&mut self, attempt_id: AttemptId) {
        let Some(correlation) = self.correlator.record(attempt_id) else {
            return;
        };
        let signals = self
            .sets
            .on_correlated(&correlation, self.correlator.per_set(), &self.state);
        self.emit(signals);
    }

    fn emit(&self, signals: Vec<SetSignal>) {
        for signal in signals {
            let notice = match signal {
                SetSignal::ResultsArriving(set) => SessionNotice::SetResultsArriving { set },
                SetSignal::Present(set) => {
                    let attempt_ids = self.correlator.set_attempts(set).to_vec();
                    SessionNotice::SetReady {
                        set,
                        is_last: self.state.is_last_set(set),
                        feedback_route: FeedbackRoute::for_set(
                            self.state.result_id.as_deref(),
                            &attempt_ids,
                            self.state.total_sets,
                            set,
                        ),
                        attempt_ids,
                    }
                }
            };
            self.notify(notice);
        }
    }

    fn finish(&mut self) {
        info!(
            "Session {} complete with {} results",
            self.launch.session_id,
            self.correlator.attempt_ids().len()
        );
        self.notify(SessionNotice::Completed {
            attempt_ids: self.correlator.attempt_ids().to_vec(),
        });
    }

    // Plumbing

    fn apply(&mut self, event: Event) {
        let (phase, index) = (self.state.phase, self.state.current_index);
        self.state = transition(self.state.clone(), &event);

        if self.state.phase != phase || self.state.current_index != index {
            info!(
                "Session {}: {} #{} -> {} #{}",
                self.launch.session_id, phase, index, self.state.phase, self.state.current_index
            );
            self.notify(SessionNotice::PhaseChanged {
                phase: self.state.phase,
                index: self.state.current_index,
            });
        }
    }

    fn notify(&self, notice: SessionNotice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }

    fn respond<T>(&self, reply: Reply<T>, result: Result<T, SessionError>) {
        self.publish();
        if reply.send(result).is_err() {
            debug!("Requester for session {} went away", self.launch.session_id);
        }
    }

    /// Run a collaborator call on its own task and queue its outcome
    fn post<F>(&self, call: F)
    where
        F: Future<Output = Envelope> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let envelope = call.await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(envelope).await;
            }
        });
    }

    fn publish(&self) {
        let snapshot = SessionSnapshot {
            session_id: self.launch.session_id.clone(),
            interview_type: self.interview_type,
            phase: self.state.phase,
            current_index: self.state.current_index,
            current_question: self.state.current_question().cloned(),
            question_count: self.state.questions.len(),
            remaining_secs: self.state.remaining_secs,
            recording_id: self.recorder.handle().map(str::to_string),
            result_id: self.state.result_id.clone(),
            total_sets: self.state.total_sets,
            attempt_ids: self.correlator.attempt_ids().to_vec(),
            set_map: self.correlator.set_map().clone(),
            presented_sets: self.sets.presented(),
            generating_after: self.generating,
            updated_at: chrono::Utc::now(),
        };
        self.snapshot.send_replace(snapshot);
    }
}

fn non_empty(id: &str) -> Option<String> {
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Relay the feed's results into the session queue while the lease lasts
fn spawn_result_forwarder(mut results: mpsc::UnboundedReceiver<AttemptId>, tx: mpsc::WeakSender<Envelope>) {
    tokio::spawn(async move {
        while let Some(attempt_id) = results.recv().await {
            let Some(tx) = tx.upgrade() else { break };
            if tx.send(Envelope::Result(attempt_id)).await.is_err() {
                break;
            }
        }
    });
}

fn spawn_ticker(period: Duration, tx: mpsc::WeakSender<Envelope>) {
    tokio::spawn(async move {
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            let Some(tx) = tx.upgrade() else { break };
            if tx.send(Envelope::Command(Command::Tick { reply: None })).await.is_err() {
                break;
            }
        }
    });
}
