//! Ordered work queues.
//!
//! Both queues key components by their ordinal in the registry's (rank, id)
//! evaluation order, so scheduled and contingent work break ties identically.

use std::collections::BTreeSet;

use crate::time::Time;

/// Clock-driven updates ordered by (time, rank, id). At most one entry per
/// component.
#[derive(Debug, Default, Clone)]
pub(crate) struct ScheduledUpdates {
    entries: BTreeSet<(Time, usize)>,
    /// Scheduled time per ordinal.
    due: Vec<Option<Time>>,
}

impl ScheduledUpdates {
    pub(crate) fn with_capacity(components: usize) -> Self {
        Self {
            entries: BTreeSet::new(),
            due: vec![None; components],
        }
    }

    /// Schedule `ordinal` at `time`, replacing any earlier entry for it.
    pub(crate) fn insert(&mut self, ordinal: usize, time: Time) {
        self.remove(ordinal);
        if ordinal >= self.due.len() {
            self.due.resize(ordinal + 1, None);
        }
        self.entries.insert((time, ordinal));
        self.due[ordinal] = Some(time);
    }

    pub(crate) fn remove(&mut self, ordinal: usize) -> Option<Time> {
        let time = self.due.get_mut(ordinal)?.take()?;
        self.entries.remove(&(time, ordinal));
        Some(time)
    }

    pub(crate) fn peek(&self) -> Option<(Time, usize)> {
        self.entries.first().copied()
    }

    pub(crate) fn pop(&mut self) -> Option<(Time, usize)> {
        let (time, ordinal) = self.entries.pop_first()?;
        self.due[ordinal] = None;
        Some((time, ordinal))
    }

    pub(crate) fn next_time(&self) -> Option<Time> {
        self.peek().map(|(time, _)| time)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Components to re-evaluate at the current instant, ordered by (rank, id).
#[derive(Debug, Default, Clone)]
pub(crate) struct ContingentUpdates {
    entries: BTreeSet<usize>,
}

impl ContingentUpdates {
    pub(crate) fn insert(&mut self, ordinal: usize) -> bool {
        self.entries.insert(ordinal)
    }

    pub(crate) fn pop(&mut self) -> Option<usize> {
        self.entries.pop_first()
    }

    pub(crate) fn peek(&self) -> Option<usize> {
        self.entries.first().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
