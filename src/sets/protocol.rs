use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::correlator::Correlation;
use crate::error::SessionError;
use crate::session::{Phase, SessionState};

/// What to do with a set's results right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetDecision {
    /// Not all results are in
    Pending,
    /// Filled, but the user is still working in the set
    Defer,
    /// Offer retry / advance now
    Present,
}

/// Outputs of the protocol, turned into notices by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetSignal {
    /// First result of a set the user has already finished
    ResultsArriving(usize),
    /// Set results are ready for the retry/advance choice
    Present(usize),
}

/// Outcome of choosing "advance" on a presented set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdvancePlan {
    /// Continue with `set`; `needs_generation` when its questions are not loaded
    NextSet { set: usize, needs_generation: bool },
    /// That was the final set
    Finish,
}

/// Decide whether a set's results can be presented.
///
/// Presentation waits for exactly `per_set` results and is held back while
/// the user is still on a question of that set.
pub fn evaluate(set: usize, filled: usize, per_set: usize, state: &SessionState) -> SetDecision {
    if filled < per_set {
        return SetDecision::Pending;
    }

    let working_in_set = state.current_set() == set
        && matches!(
            state.phase,
            Phase::Preparing | Phase::WaitingRecording | Phase::Answering
        );

    if working_in_set {
        SetDecision::Defer
    } else {
        SetDecision::Present
    }
}

/// Whether the user is past the end of a set
fn has_passed_set(set: usize, state: &SessionState) -> bool {
    state.current_index > state.set_end(set) || state.phase == Phase::Complete
}

/// Tracks which sets are waiting for, or showing, the retry/advance choice
#[derive(Debug, Clone, Default)]
pub struct SetCompletion {
    deferred: BTreeSet<usize>,
    presented: BTreeSet<usize>,
}

impl SetCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// React to a newly correlated result
    pub fn on_correlated(
        &mut self,
        correlation: &Correlation,
        per_set: usize,
        state: &SessionState,
    ) -> Vec<SetSignal> {
        let set = correlation.set;
        let mut signals = Vec::new();

        if correlation.first_in_set && has_passed_set(set, state) {
            signals.push(SetSignal::ResultsArriving(set));
        }

        if correlation.set_filled {
            let filled = correlation.position + 1;
            match evaluate(set, filled, per_set, state) {
                SetDecision::Present => {
                    self.presented.insert(set);
                    info!("Set {} complete, presenting results", set);
                    signals.push(SetSignal::Present(set));
                }
                SetDecision::Defer => {
                    self.deferred.insert(set);
                    info!("Set {} complete, deferred until the user advances", set);
                }
                SetDecision::Pending => {}
            }
        }

        signals
    }

    /// Re-check deferred sets after the user moved on
    pub fn on_question_advanced(&mut self, per_set: usize, state: &SessionState) -> Vec<SetSignal> {
        let ready: Vec<usize> = self
            .deferred
            .iter()
            .copied()
            .filter(|&set| evaluate(set, per_set, per_set, state) == SetDecision::Present)
            .collect();

        ready
            .into_iter()
            .map(|set| {
                self.deferred.remove(&set);
                self.presented.insert(set);
                debug!("Deferred set {} now presentable", set);
                SetSignal::Present(set)
            })
            .collect()
    }

    pub fn is_presented(&self, set: usize) -> bool {
        self.presented.contains(&set)
    }

    pub fn presented(&self) -> Vec<usize> {
        self.presented.iter().copied().collect()
    }

    /// Validate a retry of `set` and stop presenting it
    pub fn begin_retry(&mut self, set: usize, state: &SessionState) -> Result<(), SessionError> {
        check_range(set, state)?;
        if state.phase == Phase::Complete {
            return Err(SessionError::SessionComplete);
        }
        if !self.presented.remove(&set) {
            return Err(SessionError::SetNotReady { set });
        }
        self.deferred.remove(&set);
        Ok(())
    }

    /// Work out what "advance" means for `set`.
    ///
    /// Allowed for a presented set, or while the user is waiting at the
    /// start of the following set so a missing result cannot strand them.
    pub fn plan_advance(&self, set: usize, state: &SessionState) -> Result<AdvancePlan, SessionError> {
        check_range(set, state)?;

        let waiting_for_next = state.phase == Phase::Loading && state.current_set() == set + 1;
        if !self.presented.contains(&set) && !waiting_for_next {
            return Err(SessionError::SetNotReady { set });
        }

        if state.is_last_set(set) {
            return Ok(AdvancePlan::Finish);
        }

        let next = set + 1;
        Ok(AdvancePlan::NextSet {
            set: next,
            needs_generation: !state.has_set(next),
        })
    }

    /// The user's choice for `set` went through
    pub fn resolve(&mut self, set: usize) {
        self.presented.remove(&set);
        self.deferred.remove(&set);
    }
}

fn check_range(set: usize, state: &SessionState) -> Result<(), SessionError> {
    if set >= state.total_sets {
        return Err(SessionError::SetOutOfRange {
            set,
            total: state.total_sets,
        });
    }
    Ok(())
}
