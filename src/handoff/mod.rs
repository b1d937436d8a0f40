//! Session handoff records
//!
//! The setup flow writes one record per session; every page that continues
//! the session reads it back. The record is the only state that survives a
//! full navigation.

mod record;
mod store;

pub use record::{store_key, HandoffRecord};
pub use store::{FileHandoffStore, HandoffStore, MemoryHandoffStore};
