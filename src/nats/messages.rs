use serde_json::Value;

use crate::correlator::AttemptId;

const ANALYSIS_ID_ALIASES: &[&str] = &["answerAttemptId", "recordingId", "ptAnswerAttemptUuid", "attemptId"];
const PT_ID_ALIASES: &[&str] = &["ptAnswerAttemptUuid", "answerAttemptId", "recordingId", "attemptId"];

/// Per-user subjects carrying analysis results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultTopic {
    AnalysisResults,
    PtAnalysisResults,
    PtFeedbackCompleted,
}

impl ResultTopic {
    pub const ALL: [ResultTopic; 3] = [
        ResultTopic::AnalysisResults,
        ResultTopic::PtAnalysisResults,
        ResultTopic::PtFeedbackCompleted,
    ];

    /// Last subject token
    pub fn name(self) -> &'static str {
        match self {
            ResultTopic::AnalysisResults => "analysis-results",
            ResultTopic::PtAnalysisResults => "pt-analysis-results",
            ResultTopic::PtFeedbackCompleted => "pt-feedback-completed",
        }
    }

    /// `<prefix>.<user>.<name>`
    pub fn subject(self, prefix: &str, user_id: &str) -> String {
        format!("{}.{}.{}", prefix, user_id, self.name())
    }

    pub fn from_subject(subject: &str) -> Option<Self> {
        let name = subject.rsplit('.').next()?;
        Self::ALL.into_iter().find(|topic| topic.name() == name)
    }

    /// Field names that may carry the attempt id, most specific first
    pub fn id_aliases(self) -> &'static [&'static str] {
        match self {
            ResultTopic::AnalysisResults => ANALYSIS_ID_ALIASES,
            ResultTopic::PtAnalysisResults | ResultTopic::PtFeedbackCompleted => PT_ID_ALIASES,
        }
    }
}

/// Attempt id of a result message: the first alias holding a non-empty
/// string or a number
pub fn extract_attempt_id(topic: ResultTopic, payload: &Value) -> Option<AttemptId> {
    topic.id_aliases().iter().find_map(|alias| match payload.get(*alias)? {
        Value::String(s) if !s.trim().is_empty() => Some(AttemptId::new(s.trim())),
        Value::Number(n) => Some(AttemptId::new(n.to_string())),
        _ => None,
    })
}

/// Top-level keys of a payload, for logging messages without an id
pub fn payload_keys(payload: &Value) -> Vec<String> {
    payload
        .as_object()
        .map(|fields| fields.keys().cloned().collect())
        .unwrap_or_default()
}
