//! Analysis result feed over NATS

pub mod client;
pub mod messages;

pub use client::{dispatch_payload, forward_results, NatsClient};
pub use messages::{extract_attempt_id, ResultTopic};
