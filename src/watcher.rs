//! Debounced reaction to page mutations.

use crate::page::{MutationRecord, TextSource};
use crate::rewriter::{has_engine_ancestor, is_engine_node};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Observing,
    Pending { due: Instant },
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchVerdict {
    /// The watcher is stopped; nothing was recorded.
    Inactive,
    /// The batch was caused by the engine's own edits.
    Ignored,
    Scheduled { due: Instant },
}

/// Collects nodes added by the page and hands them out once the page has
/// been quiet for the debounce window.
#[derive(Debug)]
pub struct MutationWatcher<N> {
    debounce: Duration,
    active: bool,
    due: Option<Instant>,
    queued: Vec<N>,
    in_flight: Option<Vec<N>>,
}

impl<N: Copy + PartialEq> MutationWatcher<N> {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            active: false,
            due: None,
            queued: Vec::new(),
            in_flight: None,
        }
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    /// Stops observing and drops any work not yet handed out.
    pub fn stop(&mut self) {
        self.active = false;
        self.due = None;
        self.queued.clear();
        self.in_flight = None;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> WatcherState {
        if !self.active {
            WatcherState::Idle
        } else if self.in_flight.is_some() {
            WatcherState::Processing
        } else if let Some(due) = self.due {
            WatcherState::Pending { due }
        } else {
            WatcherState::Observing
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        if self.active { self.due } else { None }
    }

    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    pub fn observe<S>(
        &mut self,
        source: &S,
        batch: &[MutationRecord<N>],
        now: Instant,
    ) -> BatchVerdict
    where
        S: TextSource<Node = N>,
    {
        if !self.active {
            return BatchVerdict::Inactive;
        }
        if batch.is_empty() {
            return BatchVerdict::Ignored;
        }
        if batch.iter().any(|record| is_engine_caused(source, record)) {
            trace!(records = batch.len(), "ignoring engine mutation batch");
            return BatchVerdict::Ignored;
        }

        for node in batch.iter().flat_map(|record| record.added.iter()) {
            if !self.queued.contains(node) {
                self.queued.push(*node);
            }
        }
        let due = now + self.debounce;
        self.due = Some(due);
        BatchVerdict::Scheduled { due }
    }

    /// Hands out the queued nodes once the debounce deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<Vec<N>> {
        if !self.active || self.in_flight.is_some() {
            return None;
        }
        let due = self.due?;
        if now < due {
            return None;
        }
        self.due = None;
        if self.queued.is_empty() {
            return None;
        }
        let nodes = std::mem::take(&mut self.queued);
        self.in_flight = Some(nodes.clone());
        Some(nodes)
    }

    /// Ends the pass started by [`MutationWatcher::take_due`]. An unsuccessful
    /// pass puts its nodes back so the next mutation retries them.
    pub fn finish(&mut self, success: bool) {
        let Some(nodes) = self.in_flight.take() else {
            return;
        };
        if success || !self.active {
            return;
        }
        debug!(nodes = nodes.len(), "requeueing nodes after failed pass");
        let mut requeued = nodes;
        for node in self.queued.drain(..) {
            if !requeued.contains(&node) {
                requeued.push(node);
            }
        }
        self.queued = requeued;
    }
}

/// A batch is the engine's own when it touches an engine node or happens
/// inside an engine subtree.
fn is_engine_caused<S: TextSource>(source: &S, record: &MutationRecord<S::Node>) -> bool {
    record
        .added
        .iter()
        .chain(record.removed.iter())
        .any(|node| is_engine_node(source, *node))
        || record
            .added
            .iter()
            .any(|node| source.is_connected(*node) && has_engine_ancestor(source, *node))
        || has_engine_ancestor(source, record.target)
}
