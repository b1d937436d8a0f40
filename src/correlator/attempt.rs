use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque answer-attempt identifier, optionally carrying a `~n` retry suffix
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(String);

impl AttemptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier without the retry suffix
    pub fn base(&self) -> &str {
        base_id(&self.0)
    }

    /// `n` from a `base~n` suffix, when numeric
    pub fn retry_number(&self) -> Option<u32> {
        let (_, suffix) = self.0.split_once('~')?;
        suffix.parse().ok()
    }

    /// Whether both ids refer to the same question slot
    pub fn same_slot(&self, other: &AttemptId) -> bool {
        self.base() == other.base()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Strip a `~n` suffix from any session or attempt id
pub fn base_id(id: &str) -> &str {
    match id.split_once('~') {
        Some((base, _)) => base,
        None => id,
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttemptId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AttemptId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
