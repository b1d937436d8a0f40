//! Recording lifecycle around a single question

mod controller;

pub use controller::{RecordingController, StartFuture, StopFuture};
