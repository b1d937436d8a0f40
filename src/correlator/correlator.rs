use std::collections::BTreeMap;

use tracing::{debug, info};

use super::attempt::AttemptId;

/// Where an arriving attempt id was placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub attempt_id: AttemptId,
    /// Set the id was assigned to
    pub set: usize,
    /// Position within the set (0-based)
    pub position: usize,
    /// This is the first id the set received
    pub first_in_set: bool,
    /// This id brought the set to its configured size
    pub set_filled: bool,
}

/// Assigns attempt ids to sets by arrival order.
///
/// The target set is `⌊ids already assigned / per_set⌋`, not the set the
/// user is currently viewing. Results from two different sets that arrive
/// interleaved are therefore misassigned; the feed does not carry the
/// originating question, so arrival order is the only signal available.
#[derive(Debug, Clone)]
pub struct ResultCorrelator {
    per_set: usize,
    /// Global arrival-ordered, de-duplicated id list
    attempt_ids: Vec<AttemptId>,
    set_map: BTreeMap<usize, Vec<AttemptId>>,
}

impl ResultCorrelator {
    pub fn new(per_set: usize) -> Self {
        Self {
            per_set: per_set.max(1),
            attempt_ids: Vec::new(),
            set_map: BTreeMap::new(),
        }
    }

    pub fn per_set(&self) -> usize {
        self.per_set
    }

    /// Record an arriving id. Returns `None` for duplicates.
    pub fn record(&mut self, attempt_id: AttemptId) -> Option<Correlation> {
        if self.attempt_ids.contains(&attempt_id) {
            debug!("Duplicate attempt id {} ignored", attempt_id);
            return None;
        }

        let assigned: usize = self.set_map.values().map(Vec::len).sum();
        let set = assigned / self.per_set;

        self.attempt_ids.push(attempt_id.clone());

        let entries = self.set_map.entry(set).or_default();
        if !entries.contains(&attempt_id) {
            entries.push(attempt_id.clone());
        }
        let position = entries.len() - 1;
        let len = entries.len();

        info!(
            "Attempt {} assigned to set {} ({}/{})",
            attempt_id, set, len, self.per_set
        );

        Some(Correlation {
            attempt_id,
            set,
            position,
            first_in_set: len == 1,
            set_filled: len == self.per_set,
        })
    }

    /// Clear a set for a retry. Its ids are removed from the global list by
    /// identity, so a later re-delivery of the same id counts as new.
    pub fn retry_set(&mut self, set: usize) -> Vec<AttemptId> {
        let removed = self
            .set_map
            .get_mut(&set)
            .map(std::mem::take)
            .unwrap_or_default();

        self.attempt_ids.retain(|id| !removed.contains(id));

        info!("Cleared set {} ({} attempts) for retry", set, removed.len());
        removed
    }

    /// Global arrival-ordered id list
    pub fn attempt_ids(&self) -> &[AttemptId] {
        &self.attempt_ids
    }

    pub fn set_attempts(&self, set: usize) -> &[AttemptId] {
        self.set_map.get(&set).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_map(&self) -> &BTreeMap<usize, Vec<AttemptId>> {
        &self.set_map
    }

    /// Find the set and position holding an id, ignoring retry suffixes
    pub fn locate(&self, attempt_id: &AttemptId) -> Option<(usize, usize)> {
        self.set_map.iter().find_map(|(&set, ids)| {
            ids.iter()
                .position(|id| id.same_slot(attempt_id))
                .map(|pos| (set, pos))
        })
    }
}
