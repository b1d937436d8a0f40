//! Result correlation
//!
//! Analysis results arrive over the push channel long after the answer was
//! recorded, possibly after the user has moved on. The hub hands each
//! attempt id to the session holding the feed and to passive listeners; the
//! correlator assigns ids to sets.

mod attempt;
mod correlator;
mod hub;

pub use attempt::{base_id, AttemptId};
pub use correlator::{Correlation, ResultCorrelator};
pub use hub::{FeedLease, InterviewProgress, ResultHub};
