use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::machine::Phase;
use crate::correlator::AttemptId;
use crate::navigation::InterviewType;
use crate::question::QuestionUnit;

/// Read-only view of a session, published after every processed event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,

    pub interview_type: Option<InterviewType>,

    pub phase: Phase,

    pub current_index: usize,

    pub current_question: Option<QuestionUnit>,

    /// Questions loaded so far
    pub question_count: usize,

    /// Countdown seconds left for the current answer
    pub remaining_secs: u32,

    /// Live recording, if any
    pub recording_id: Option<String>,

    /// Interview id used by the result pages
    pub result_id: Option<String>,

    pub total_sets: usize,

    /// Correlated attempt ids in arrival order
    pub attempt_ids: Vec<AttemptId>,

    pub set_map: BTreeMap<usize, Vec<AttemptId>>,

    /// Sets currently offering retry / advance
    pub presented_sets: Vec<usize>,

    /// Set whose successor is being generated
    pub generating_after: Option<usize>,

    pub updated_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub(crate) fn loading(session_id: &str, interview_type: Option<InterviewType>, total_sets: usize, remaining_secs: u32) -> Self {
        Self {
            session_id: session_id.to_string(),
            interview_type,
            phase: Phase::Loading,
            current_index: 0,
            current_question: None,
            question_count: 0,
            remaining_secs,
            recording_id: None,
            result_id: None,
            total_sets,
            attempt_ids: Vec::new(),
            set_map: BTreeMap::new(),
            presented_sets: Vec::new(),
            generating_after: None,
            updated_at: Utc::now(),
        }
    }
}
