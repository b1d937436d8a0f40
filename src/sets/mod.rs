//! Set completion and retry
//!
//! Once a set's results are all in, the user gets to repeat the set or move
//! on. This module decides when that choice is offered and what each
//! choice does to the session.

mod protocol;

pub use protocol::{evaluate, AdvancePlan, SetCompletion, SetDecision, SetSignal};
