use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-session tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Seconds allowed per answer before auto-advance
    /// Default: 60
    pub answer_time_secs: u32,

    /// Questions per set (1 main + follow-ups)
    pub set_size: usize,

    /// Sets to run when neither the navigation nor the handoff record says
    pub default_total_sets: usize,

    /// Prior attempts replayed in retry mode
    pub retry_question_limit: usize,

    /// Countdown tick period; 0 disables the built-in ticker
    pub tick_interval_ms: u64,

    /// Buffered commands per session
    pub command_buffer: usize,

    /// Stop a session after this long without commands or results; 0 never
    pub idle_timeout_secs: u64,

    /// How long a finished session stays queryable after its last result
    pub linger_secs: u64,
}

impl SessionSettings {
    pub fn tick_interval(&self) -> Option<Duration> {
        (self.tick_interval_ms > 0).then(|| Duration::from_millis(self.tick_interval_ms))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            answer_time_secs: 60,
            set_size: 3,
            default_total_sets: 3,
            retry_question_limit: 3,
            tick_interval_ms: 1000,
            command_buffer: 64,
            idle_timeout_secs: 1800,
            linger_secs: 60,
        }
    }
}
