use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::SessionSettings;
use crate::question::QuestionUnit;

/// Discrete session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for questions (initial load or a not-yet-generated set)
    Loading,
    /// Question shown, user has not started answering
    Preparing,
    /// Start requested, waiting for the recording to come up
    WaitingRecording,
    /// Recording live, countdown running
    Answering,
    Complete,
}

impl Phase {
    /// Phases in which a recording handle may exist
    pub fn allows_recording(self) -> bool {
        matches!(self, Phase::WaitingRecording | Phase::Answering)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Loading => "loading",
            Phase::Preparing => "preparing",
            Phase::WaitingRecording => "waiting_recording",
            Phase::Answering => "answering",
            Phase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Inputs to the transition function
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Replace the question list and start at `start_index`
    QuestionsLoaded {
        questions: Vec<QuestionUnit>,
        start_index: usize,
    },
    /// A later set's questions became available
    QuestionsAppended(Vec<QuestionUnit>),
    /// User asked to start answering
    BeginRecording,
    RecordingStarted,
    RecordingFailed,
    /// Screen went away while recording; fall back to the prompt
    Interrupted,
    /// Move past the current question (user action or time-up)
    Advance,
    /// One countdown second elapsed
    Tick,
    /// Move to the first question of a set (retry or next set)
    EnterSet(usize),
    Complete,
    ResultId(String),
}

/// Everything the transition function reads and writes
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub phase: Phase,
    pub questions: Vec<QuestionUnit>,
    pub current_index: usize,
    pub remaining_secs: u32,
    /// Interview id used for result pages
    pub result_id: Option<String>,
    pub total_sets: usize,
    pub set_size: usize,
    pub answer_time_secs: u32,
}

impl SessionState {
    pub fn new(settings: &SessionSettings, total_sets: usize) -> Self {
        Self {
            phase: Phase::Loading,
            questions: Vec::new(),
            current_index: 0,
            remaining_secs: settings.answer_time_secs,
            result_id: None,
            total_sets: total_sets.max(1),
            set_size: settings.set_size.max(1),
            answer_time_secs: settings.answer_time_secs,
        }
    }

    pub fn current_question(&self) -> Option<&QuestionUnit> {
        self.questions.get(self.current_index)
    }

    pub fn set_of(&self, index: usize) -> usize {
        index / self.set_size
    }

    pub fn current_set(&self) -> usize {
        self.set_of(self.current_index)
    }

    /// Index of the first question in a set
    pub fn set_start(&self, set: usize) -> usize {
        set * self.set_size
    }

    /// Index of the last question in a set
    pub fn set_end(&self, set: usize) -> usize {
        self.set_start(set) + self.set_size - 1
    }

    pub fn is_last_in_set(&self) -> bool {
        (self.current_index + 1) % self.set_size == 0
    }

    pub fn is_last_set(&self, set: usize) -> bool {
        set + 1 >= self.total_sets
    }

    /// Whether a set's questions are already loaded
    pub fn has_set(&self, set: usize) -> bool {
        self.questions.len() > self.set_start(set)
    }

    pub fn time_is_up(&self) -> bool {
        self.phase == Phase::Answering && self.remaining_secs == 0
    }

    fn enter(mut self, phase: Phase, index: usize) -> Self {
        self.phase = phase;
        self.current_index = index;
        self.remaining_secs = self.answer_time_secs;
        self
    }

    /// `Preparing` when the question exists, `Loading` otherwise
    fn enter_question(self, index: usize) -> Self {
        let phase = if index < self.questions.len() {
            Phase::Preparing
        } else {
            Phase::Loading
        };
        self.enter(phase, index)
    }
}

/// Pure transition function. Events that do not apply to the current phase
/// leave the state unchanged.
pub fn transition(state: SessionState, event: &Event) -> SessionState {
    let from = state.phase;
    let next = match (state.phase, event) {
        (Phase::Complete, Event::ResultId(id)) => SessionState {
            result_id: Some(id.clone()),
            ..state
        },
        (Phase::Complete, _) => state,

        (_, Event::QuestionsLoaded { questions, start_index }) => {
            let mut state = SessionState {
                questions: questions.clone(),
                ..state
            };
            if state.questions.is_empty() {
                state.phase = Phase::Loading;
                state
            } else {
                let index = (*start_index).min(state.questions.len() - 1);
                state.enter(Phase::Preparing, index)
            }
        }

        (phase, Event::QuestionsAppended(more)) => {
            let mut state = state;
            state.questions.extend(more.iter().cloned());
            if phase == Phase::Loading && state.current_question().is_some() {
                let index = state.current_index;
                state.enter(Phase::Preparing, index)
            } else {
                state
            }
        }

        (Phase::Preparing, Event::BeginRecording) if state.current_question().is_some() => {
            SessionState {
                phase: Phase::WaitingRecording,
                ..state
            }
        }

        (Phase::WaitingRecording, Event::RecordingStarted) => {
            let index = state.current_index;
            state.enter(Phase::Answering, index)
        }

        (Phase::WaitingRecording, Event::RecordingFailed)
        | (Phase::WaitingRecording | Phase::Answering, Event::Interrupted) => {
            let index = state.current_index;
            state.enter(Phase::Preparing, index)
        }

        (Phase::Answering, Event::Advance) => advance(state),

        (Phase::Answering, Event::Tick) => SessionState {
            remaining_secs: state.remaining_secs.saturating_sub(1),
            ..state
        },

        (_, Event::EnterSet(set)) => {
            let index = state.set_start(*set);
            state.enter_question(index)
        }

        (_, Event::Complete) => SessionState {
            phase: Phase::Complete,
            ..state
        },

        (_, Event::ResultId(id)) => SessionState {
            result_id: Some(id.clone()),
            ..state
        },

        (_, _) => state,
    };

    if next.phase != from {
        debug!("{} -> {} on {:?}", from, next.phase, event_name(event));
    }
    next
}

/// Next question, the next set's loading slot, or completion
fn advance(state: SessionState) -> SessionState {
    let next = state.current_index + 1;
    if next < state.questions.len() {
        return state.enter(Phase::Preparing, next);
    }

    let set = state.current_set();
    if !state.is_last_set(set) {
        // Next set not generated yet
        return state.enter(Phase::Loading, next);
    }

    SessionState {
        phase: Phase::Complete,
        ..state
    }
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::QuestionsLoaded { .. } => "QuestionsLoaded",
        Event::QuestionsAppended(_) => "QuestionsAppended",
        Event::BeginRecording => "BeginRecording",
        Event::RecordingStarted => "RecordingStarted",
        Event::RecordingFailed => "RecordingFailed",
        Event::Interrupted => "Interrupted",
        Event::Advance => "Advance",
        Event::Tick => "Tick",
        Event::EnterSet(_) => "EnterSet",
        Event::Complete => "Complete",
        Event::ResultId(_) => "ResultId",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(n: usize) -> Vec<QuestionUnit> {
        (0..n)
            .map(|i| {
                if i % 3 == 0 {
                    QuestionUnit::main(Some(format!("q{}", i)), format!("question {}", i))
                } else {
                    QuestionUnit::follow(Some(format!("q{}", i)), "follow", None, i % 3)
                }
            })
            .collect()
    }

    fn loaded(n: usize, total_sets: usize) -> SessionState {
        let state = SessionState::new(&SessionSettings::default(), total_sets);
        transition(
            state,
            &Event::QuestionsLoaded {
                questions: units(n),
                start_index: 0,
            },
        )
    }

    fn answer(state: SessionState) -> SessionState {
        let state = transition(state, &Event::BeginRecording);
        transition(state, &Event::RecordingStarted)
    }

    #[test]
    fn test_loading_to_preparing() {
        let state = loaded(3, 1);
        assert_eq!(state.phase, Phase::Preparing);
        assert_eq!(state.current_index, 0);
    }

    #[test]
    fn test_empty_questions_stay_loading() {
        let state = loaded(0, 1);
        assert_eq!(state.phase, Phase::Loading);
    }

    #[test]
    fn test_start_index_is_clamped() {
        let state = SessionState::new(&SessionSettings::default(), 1);
        let state = transition(
            state,
            &Event::QuestionsLoaded {
                questions: units(3),
                start_index: 10,
            },
        );
        assert_eq!(state.current_index, 2);
    }

    #[test]
    fn test_recording_round_trip() {
        let state = transition(loaded(3, 1), &Event::BeginRecording);
        assert_eq!(state.phase, Phase::WaitingRecording);

        let failed = transition(state.clone(), &Event::RecordingFailed);
        assert_eq!(failed.phase, Phase::Preparing);

        let started = transition(state, &Event::RecordingStarted);
        assert_eq!(started.phase, Phase::Answering);
    }

    #[test]
    fn test_advance_resets_countdown() {
        let mut state = answer(loaded(3, 1));
        for _ in 0..5 {
            state = transition(state, &Event::Tick);
        }
        assert_eq!(state.remaining_secs, 55);

        let state = transition(state, &Event::Advance);
        assert_eq!(state.phase, Phase::Preparing);
        assert_eq!(state.current_index, 1);
        assert_eq!(state.remaining_secs, 60);
    }

    #[test]
    fn test_advance_on_final_question_completes() {
        let mut state = loaded(3, 1);
        for _ in 0..3 {
            state = transition(answer(state), &Event::Advance);
        }
        assert_eq!(state.phase, Phase::Complete);
        assert_eq!(state.current_index, 2);
    }

    #[test]
    fn test_advance_past_loaded_set_waits_for_next_set() {
        let mut state = loaded(3, 2);
        for _ in 0..3 {
            state = transition(answer(state), &Event::Advance);
        }
        assert_eq!(state.phase, Phase::Loading);
        assert_eq!(state.current_index, 3);

        let state = transition(state, &Event::QuestionsAppended(units(3)));
        assert_eq!(state.phase, Phase::Preparing);
        assert_eq!(state.questions.len(), 6);
    }

    #[test]
    fn test_advance_ignored_outside_answering() {
        let state = loaded(3, 1);
        let same = transition(state.clone(), &Event::Advance);
        assert_eq!(same, state);
    }

    #[test]
    fn test_begin_recording_needs_a_question() {
        let state = SessionState {
            phase: Phase::Preparing,
            ..SessionState::new(&SessionSettings::default(), 1)
        };
        let same = transition(state.clone(), &Event::BeginRecording);
        assert_eq!(same.phase, Phase::Preparing);
    }

    #[test]
    fn test_enter_set_resets_to_first_question() {
        let mut state = loaded(6, 2);
        for _ in 0..4 {
            state = transition(answer(state), &Event::Advance);
        }
        assert_eq!(state.current_index, 4);

        let state = transition(state, &Event::EnterSet(0));
        assert_eq!(state.phase, Phase::Preparing);
        assert_eq!(state.current_index, 0);
    }

    #[test]
    fn test_complete_is_terminal() {
        let state = transition(loaded(3, 1), &Event::Complete);
        for event in [Event::EnterSet(0), Event::BeginRecording, Event::Tick] {
            assert_eq!(transition(state.clone(), &event).phase, Phase::Complete);
        }
    }

    #[test]
    fn test_interrupted_returns_to_prompt() {
        let state = transition(answer(loaded(3, 1)), &Event::Interrupted);
        assert_eq!(state.phase, Phase::Preparing);
    }

    #[test]
    fn test_index_never_decreases_without_enter_set() {
        let mut state = loaded(9, 3);
        let mut last = state.current_index;
        let events = [
            Event::BeginRecording,
            Event::Tick,
            Event::RecordingStarted,
            Event::Advance,
            Event::Advance,
            Event::Tick,
            Event::RecordingFailed,
        ];
        for _ in 0..6 {
            for event in &events {
                state = transition(state, event);
                assert!(state.current_index >= last);
                last = state.current_index;
            }
        }
    }
}
