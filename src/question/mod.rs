//! Question model
//!
//! Server payloads arrive in several shapes. The builder flattens them into
//! an ordered list of `QuestionUnit`s: each main question followed by its
//! follow-ups.

mod builder;
mod unit;

pub use builder::{build_units, FOLLOW_UP_ALIASES, ID_ALIASES, TEXT_ALIASES};
pub use unit::{QuestionKind, QuestionUnit};
