//! # Stage: Outcome Log
//!
//! ## Responsibility
//! Immutable records of finished exchanges ([`Outcome`]) and a bounded,
//! thread-safe FIFO of the most recent ones ([`OutcomeLog`]).
//!
//! ## Guarantees
//! - Bounded: never holds more than `capacity` outcomes; the oldest is evicted
//! - Thread-safe: concurrent `push` calls never lose entries beyond eviction
//! - Cheap reads: readers get `Arc<Outcome>` clones, not deep copies
//!
//! ## NOT Responsible For
//! - Deciding which patterns an outcome is credited to (optimizer)
//! - Persistence (state is process-lifetime only)

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::lock;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// One exchange, annotated with expected versus actually invoked tools.
#[derive(Debug, Clone)]
pub struct Outcome {
    id: Uuid,
    user_input: String,
    response: String,
    expected_tools: BTreeSet<String>,
    actual_tool_calls: BTreeSet<String>,
    was_successful: bool,
    elapsed: Duration,
}

impl Outcome {
    /// Build an outcome. Success is derived: no tools were expected, or at
    /// least one tool was actually called.
    pub fn new<E, A, S1, S2>(
        user_input: impl Into<String>,
        response: impl Into<String>,
        expected_tools: E,
        actual_tool_calls: A,
        elapsed: Duration,
    ) -> Self
    where
        E: IntoIterator<Item = S1>,
        A: IntoIterator<Item = S2>,
        S1: Into<String>,
        S2: Into<String>,
    {
        let expected_tools: BTreeSet<String> = expected_tools.into_iter().map(Into::into).collect();
        let actual_tool_calls: BTreeSet<String> =
            actual_tool_calls.into_iter().map(Into::into).collect();
        let was_successful = expected_tools.is_empty() || !actual_tool_calls.is_empty();
        Self {
            id: Uuid::new_v4(),
            user_input: user_input.into(),
            response: response.into(),
            expected_tools,
            actual_tool_calls,
            was_successful,
            elapsed,
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_input(&self) -> &str { &self.user_input }
    pub fn response(&self) -> &str { &self.response }
    pub fn expected_tools(&self) -> &BTreeSet<String> { &self.expected_tools }
    pub fn actual_tool_calls(&self) -> &BTreeSet<String> { &self.actual_tool_calls }
    pub fn was_successful(&self) -> bool { self.was_successful }
    pub fn elapsed(&self) -> Duration { self.elapsed }

    /// Tools were expected but none were called.
    pub fn is_miss(&self) -> bool {
        !self.expected_tools.is_empty() && self.actual_tool_calls.is_empty()
    }

    /// Failed while some tool was expected; these are the outcomes surfaced
    /// back into the prompt as reminders.
    pub fn is_reportable_failure(&self) -> bool {
        !self.was_successful && !self.expected_tools.is_empty()
    }
}

// ---------------------------------------------------------------------------
// OutcomeLog
// ---------------------------------------------------------------------------

/// Default number of outcomes retained.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Bounded FIFO of recent outcomes, oldest first.
#[derive(Debug)]
pub struct OutcomeLog {
    entries: Mutex<VecDeque<Arc<Outcome>>>,
    capacity: usize,
}

impl OutcomeLog {
    /// A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize { self.capacity }

    /// Append an outcome, evicting the oldest entry when full.
    pub fn push(&self, outcome: Outcome) -> Arc<Outcome> {
        let outcome = Arc::new(outcome);
        let mut entries = lock(&self.entries);
        while entries.len() >= self.capacity {
            if let Some(evicted) = entries.pop_front() {
                tracing::debug!(
                    target: "optimizer::outcome",
                    evicted = %evicted.id(),
                    "Outcome log full, evicting oldest entry"
                );
            }
        }
        entries.push_back(Arc::clone(&outcome));
        outcome
    }

    /// Number of outcomes currently held.
    pub fn count(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// All held outcomes, oldest to newest.
    pub fn snapshot(&self) -> Vec<Arc<Outcome>> {
        lock(&self.entries).iter().cloned().collect()
    }

    /// The `n` most recent outcomes matching `predicate`, oldest to newest.
    pub fn take_last<P>(&self, mut predicate: P, n: usize) -> Vec<Arc<Outcome>>
    where
        P: FnMut(&Outcome) -> bool,
    {
        let entries = lock(&self.entries);
        let mut picked: Vec<Arc<Outcome>> = entries
            .iter()
            .rev()
            .filter(|o| predicate(o.as_ref()))
            .take(n)
            .cloned()
            .collect();
        picked.reverse();
        picked
    }

    /// Fraction of held outcomes that were successful; 0 when empty.
    pub fn success_ratio(&self) -> f64 {
        let entries = lock(&self.entries);
        if entries.is_empty() {
            return 0.0;
        }
        let ok = entries.iter().filter(|o| o.was_successful()).count();
        ok as f64 / entries.len() as f64
    }
}

impl Default for OutcomeLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
