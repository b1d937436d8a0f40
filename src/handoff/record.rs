use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::question::{build_units, QuestionUnit};

/// Storage key for a session's handoff record
pub fn store_key(session_id: &str) -> String {
    format!("SESSION_{}", session_id)
}

/// Persisted snapshot handed from the setup flow to the session flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffRecord {
    pub session_id: String,

    #[serde(default)]
    pub interview_type: Option<String>,

    /// Raw server questions, normalised on read
    #[serde(default)]
    pub questions: Vec<Value>,

    /// User-chosen number of question sets
    #[serde(default)]
    pub total_interview_sets: Option<usize>,

    pub created_at: DateTime<Utc>,
}

impl HandoffRecord {
    pub fn new(
        session_id: impl Into<String>,
        interview_type: Option<String>,
        questions: Vec<Value>,
        total_interview_sets: Option<usize>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            interview_type,
            questions,
            total_interview_sets,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> String {
        store_key(&self.session_id)
    }

    /// Flattened question units for this record
    pub fn units(&self) -> Vec<QuestionUnit> {
        build_units(&self.questions)
    }

    /// Total set count, ignoring non-positive values
    pub fn total_sets(&self) -> Option<usize> {
        self.total_interview_sets.filter(|&n| n > 0)
    }
}
