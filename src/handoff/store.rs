use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use serde_json::Value;
use tracing::{debug, info};

use super::record::{store_key, HandoffRecord};
use crate::error::HandoffError;

/// Keyed persistence for handoff records.
///
/// Implementations must not rely on any in-memory state surviving between
/// the writer and the reader beyond what they persist.
pub trait HandoffStore: Send + Sync {
    /// Persist a record under its session id, replacing any previous one
    fn create(&self, record: &HandoffRecord) -> Result<(), HandoffError>;

    /// Read the record for a session
    fn read(&self, session_id: &str) -> Result<HandoffRecord, HandoffError>;

    /// Append questions to an existing record, keeping existing entries
    fn extend(&self, session_id: &str, questions: &[Value]) -> Result<HandoffRecord, HandoffError>;
}

/// One JSON file per record inside a directory
pub struct FileHandoffStore {
    dir: PathBuf,
}

impl FileHandoffStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, HandoffError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!("Handoff store at {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", store_key(session_id)))
    }

    /// Write through a temp file so readers never observe a torn record
    fn write(&self, record: &HandoffRecord) -> Result<(), HandoffError> {
        let path = self.path_for(&record.session_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        debug!("Wrote handoff record {}", path.display());
        Ok(())
    }
}

impl HandoffStore for FileHandoffStore {
    fn create(&self, record: &HandoffRecord) -> Result<(), HandoffError> {
        self.write(record)
    }

    fn read(&self, session_id: &str) -> Result<HandoffRecord, HandoffError> {
        let path = self.path_for(session_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HandoffError::NotFound(store_key(session_id)))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn extend(&self, session_id: &str, questions: &[Value]) -> Result<HandoffRecord, HandoffError> {
        let mut record = self.read(session_id)?;
        record.questions.extend(questions.iter().cloned());
        self.write(&record)?;
        Ok(record)
    }
}

/// Process-local store, used when no directory is configured and in tests
#[derive(Default)]
pub struct MemoryHandoffStore {
    records: RwLock<HashMap<String, HandoffRecord>>,
}

impl MemoryHandoffStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HandoffStore for MemoryHandoffStore {
    fn create(&self, record: &HandoffRecord) -> Result<(), HandoffError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(record.key(), record.clone());
        Ok(())
    }

    fn read(&self, session_id: &str) -> Result<HandoffRecord, HandoffError> {
        let key = store_key(session_id);
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.get(&key).cloned().ok_or(HandoffError::NotFound(key))
    }

    fn extend(&self, session_id: &str, questions: &[Value]) -> Result<HandoffRecord, HandoffError> {
        let key = store_key(session_id);
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records
            .get_mut(&key)
            .ok_or_else(|| HandoffError::NotFound(key.clone()))?;
        record.questions.extend(questions.iter().cloned());
        Ok(record.clone())
    }
}
