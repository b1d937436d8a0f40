//! Navigation parameters shared by the session and feedback pages

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::form_urlencoded;

use crate::correlator::AttemptId;
use crate::handoff::HandoffRecord;

const STORE_KEY_PREFIX: &str = "SESSION_";

/// Kind of interview being practised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewType {
    Job,
    Personality,
    Presentation,
}

impl InterviewType {
    /// Normalise the spellings used across pages and the backend
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "tech" | "job" | "직무" => Some(Self::Job),
            "behavioral" | "personality" | "인성" => Some(Self::Personality),
            "presentation" | "pt" | "PT" => Some(Self::Presentation),
            other => {
                debug!("Unknown interview type {:?}", other);
                None
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::Personality => "personality",
            Self::Presentation => "presentation",
        }
    }
}

impl fmt::Display for InterviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query parameters a session or feedback page is opened with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionQuery {
    pub interview_type: Option<InterviewType>,
    pub interview_uuid: Option<String>,
    pub store_key: Option<String>,
    pub attempt_ids: Vec<String>,
    pub count: Option<usize>,
    pub step: Option<usize>,
    pub set_index: Option<usize>,
    /// Generate the next set on entry
    pub generate_next: bool,
}

impl SessionQuery {
    /// Parse a query string, with or without the leading `?`.
    /// Unparseable values are treated as absent.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut parsed = Self::default();

        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let value = value.trim();
            match key.as_ref() {
                "type" => parsed.interview_type = InterviewType::parse(value),
                "interviewUuid" => parsed.interview_uuid = non_empty(value),
                "storeKey" => parsed.store_key = non_empty(value),
                "attemptIds" => {
                    parsed.attempt_ids = value
                        .split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect()
                }
                "count" => parsed.count = value.parse().ok(),
                "step" => parsed.step = value.parse().ok(),
                "setIndex" => parsed.set_index = value.parse().ok(),
                "generateNext" => parsed.generate_next = matches!(value, "1" | "true"),
                _ => {}
            }
        }

        parsed
    }

    pub fn to_query_string(&self) -> String {
        let mut out = form_urlencoded::Serializer::new(String::new());
        if let Some(kind) = self.interview_type {
            out.append_pair("type", kind.as_str());
        }
        if let Some(uuid) = &self.interview_uuid {
            out.append_pair("interviewUuid", uuid);
        }
        if let Some(key) = &self.store_key {
            out.append_pair("storeKey", key);
        }
        if !self.attempt_ids.is_empty() {
            out.append_pair("attemptIds", &self.attempt_ids.join(","));
        }
        if let Some(count) = self.count {
            out.append_pair("count", &count.to_string());
        }
        if let Some(step) = self.step {
            out.append_pair("step", &step.to_string());
        }
        if let Some(set_index) = self.set_index {
            out.append_pair("setIndex", &set_index.to_string());
        }
        if self.generate_next {
            out.append_pair("generateNext", "1");
        }
        out.finish()
    }

    /// Session id named by the query: `interviewUuid`, else the store key
    /// without its `SESSION_` prefix
    pub fn session_id(&self) -> Option<&str> {
        self.interview_uuid.as_deref().or_else(|| {
            self.store_key
                .as_deref()
                .map(|key| key.strip_prefix(STORE_KEY_PREFIX).unwrap_or(key))
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Number of sets for a session: a positive `count` parameter, then the
/// handoff record's setting, then `default`
pub fn resolve_total_sets(count: Option<usize>, record: Option<&HandoffRecord>, default: usize) -> usize {
    count
        .filter(|&n| n > 0)
        .or_else(|| record.and_then(HandoffRecord::total_sets))
        .unwrap_or(default)
}

/// Questions the result feed should expect for a whole interview
pub fn expected_question_total(kind: Option<InterviewType>, total_sets: usize, set_size: usize) -> usize {
    match kind {
        Some(InterviewType::Presentation) => 1,
        _ => total_sets * set_size,
    }
}

/// Link to the step-by-step feedback page for one set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackRoute(String);

impl FeedbackRoute {
    pub fn for_set(
        result_id: Option<&str>,
        attempt_ids: &[AttemptId],
        total_sets: usize,
        set_index: usize,
    ) -> Option<Self> {
        let result_id = result_id.filter(|id| !id.is_empty())?;
        let ids: Vec<&str> = attempt_ids
            .iter()
            .map(AttemptId::as_str)
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return None;
        }

        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("step", "2")
            .append_pair("attemptIds", &ids.join(","))
            .append_pair("count", &total_sets.to_string())
            .append_pair("setIndex", &set_index.to_string())
            .finish();

        Some(Self(format!("/results/{}/feedback?{}", result_id, query)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Query part of the route, parsed back
    pub fn query(&self) -> SessionQuery {
        match self.0.split_once('?') {
            Some((_, query)) => SessionQuery::parse(query),
            None => SessionQuery::default(),
        }
    }
}

impl fmt::Display for FeedbackRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
