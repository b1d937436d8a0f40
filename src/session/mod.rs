//! Session orchestration
//!
//! `machine` holds the pure phase/index transition function. `controller`
//! runs one task per session that owns the machine state together with the
//! recording controller, the result correlator and the set protocol, and
//! applies user commands, countdown ticks and collaborator callbacks in
//! arrival order.

mod config;
mod controller;
mod events;
mod machine;
mod snapshot;

pub use config::SessionSettings;
pub use controller::{SessionController, SessionDeps, SessionHandle, SessionLaunch};
pub use events::SessionNotice;
pub use machine::{transition, Event, Phase, SessionState};
pub use snapshot::SessionSnapshot;
