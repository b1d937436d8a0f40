use serde::{Deserialize, Serialize};

/// Whether a unit opens a set or follows up on one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Main,
    Follow,
}

/// A single question as presented to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionUnit {
    /// Stable identifier, also used as the live media session id.
    /// `None` when the payload carried no recognisable id.
    pub id: Option<String>,

    pub text: String,

    pub kind: QuestionKind,

    /// Id of the main question a follow-up belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// 1-based position among the parent's follow-ups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_index: Option<usize>,
}

impl QuestionUnit {
    pub fn main(id: Option<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            kind: QuestionKind::Main,
            parent_id: None,
            follow_index: None,
        }
    }

    pub fn follow(
        id: Option<String>,
        text: impl Into<String>,
        parent_id: Option<String>,
        follow_index: usize,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            kind: QuestionKind::Follow,
            parent_id,
            follow_index: Some(follow_index),
        }
    }
}
