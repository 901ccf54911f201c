//! # Stage: Selector
//!
//! ## Responsibility
//! Picks one pattern per category: with probability `exploration_rate` a
//! uniform choice, otherwise a Thompson draw from each candidate's Beta
//! posterior with the highest sample winning.
//!
//! ## Guarantees
//! - Closed: the result is always one of the candidates computed for the call
//! - Stable ties: equal samples resolve to the earlier candidate
//! - Only the winner's `last_used` stamp is touched
//!
//! ## NOT Responsible For
//! - Owning or seeding the random source
//! - Updating success/failure counts (optimizer via `record_touch`)

use std::sync::Arc;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::patterns::{Pattern, PatternStore};

/// Default probability of a uniform exploratory pick.
pub const DEFAULT_EXPLORATION_RATE: f64 = 0.15;

/// Result of one selection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub pattern: Arc<Pattern>,
    /// `true` when the pick came from the ε branch.
    pub explored: bool,
}

/// Thompson-sampling bandit with ε-exploration.
#[derive(Debug, Clone, Copy)]
pub struct Selector {
    exploration_rate: f64,
}

impl Selector {
    /// `exploration_rate` is clamped to `[0, 1]`.
    pub fn new(exploration_rate: f64) -> Self {
        let exploration_rate = if exploration_rate.is_nan() { 0.0 } else { exploration_rate.clamp(0.0, 1.0) };
        Self { exploration_rate }
    }

    pub fn exploration_rate(&self) -> f64 { self.exploration_rate }

    /// Select the best pattern for `category` and stamp it as used at `now`.
    pub fn select<R: Rng + ?Sized>(
        &self,
        store: &PatternStore,
        category: &str,
        rng: &mut R,
        now: Instant,
    ) -> Selection {
        let candidates = store.lookup_by_category(category);
        let explored = rng.gen::<f64>() < self.exploration_rate;
        let picked = if explored {
            candidates.choose(rng).cloned()
        } else {
            thompson_pick(&candidates, rng)
        };
        let pattern = picked.unwrap_or_else(|| store.first());
        pattern.mark_used(now);

        tracing::debug!(
            target: "optimizer::selector",
            category,
            pattern = %pattern.id(),
            explored,
            candidates = candidates.len(),
            "Pattern selected"
        );
        Selection { pattern, explored }
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::new(DEFAULT_EXPLORATION_RATE)
    }
}

/// Argmax over one posterior sample per candidate; first wins ties.
fn thompson_pick<R: Rng + ?Sized>(candidates: &[Arc<Pattern>], rng: &mut R) -> Option<Arc<Pattern>> {
    let mut best: Option<(&Arc<Pattern>, f64)> = None;
    for candidate in candidates {
        let score = candidate.posterior().sample(rng);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((candidate, score)),
        }
    }
    best.map(|(p, _)| Arc::clone(p))
}
