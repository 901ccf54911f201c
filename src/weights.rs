//! # Stage: Weight Adapter
//!
//! ## Responsibility
//! Four scalar knobs that shape the composed instruction, and the pure update
//! rule that nudges them after every recorded outcome.
//!
//! ## Guarantees
//! - Monotone: no knob ever decreases while the process runs
//! - Bounded: each knob is capped (2.0 / 2.0 / 3.0); `context_injection` is never touched
//! - Exact thresholds: knobs live on a 1e-6 decimal grid, so three +0.1 steps land
//!   exactly on 1.3 rather than 1.3000000000000003
//!
//! ## NOT Responsible For
//! - Decay or reset (there is none)
//! - Reading the knobs (instruction composer)

use serde::{Deserialize, Serialize};

use crate::outcome::Outcome;

pub const TOOL_SYNTAX_CAP: f64 = 2.0;
pub const EXAMPLE_DENSITY_CAP: f64 = 2.0;
pub const WARNING_CAP: f64 = 3.0;

const TOOL_SYNTAX_STEP: f64 = 0.1;
const EXAMPLE_DENSITY_STEP: f64 = 0.1;
const WARNING_STEP: f64 = 0.2;

/// Current values of the tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightState {
    pub tool_syntax_emphasis: f64,
    pub example_density: f64,
    pub warning_emphasis: f64,
    /// No rule updates this knob; it is reported but otherwise inert.
    pub context_injection: f64,
}

impl Default for WeightState {
    fn default() -> Self {
        Self {
            tool_syntax_emphasis: 1.0,
            example_density: 1.0,
            warning_emphasis: 1.0,
            context_injection: 1.0,
        }
    }
}

/// Which rule fired for an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// A tool was called and the turn succeeded.
    ReinforceSyntax,
    /// Tools were expected and none were called.
    EscalateWarnings,
    Unchanged,
}

fn bump(value: f64, step: f64, cap: f64) -> f64 {
    let next = ((value + step) * 1e6).round() / 1e6;
    next.min(cap)
}

/// Pure update: `(weights, outcome) -> (weights', rule fired)`.
pub fn adapt(weights: WeightState, outcome: &Outcome) -> (WeightState, Adjustment) {
    let mut next = weights;
    if !outcome.actual_tool_calls().is_empty() && outcome.was_successful() {
        next.tool_syntax_emphasis = bump(next.tool_syntax_emphasis, TOOL_SYNTAX_STEP, TOOL_SYNTAX_CAP);
        (next, Adjustment::ReinforceSyntax)
    } else if outcome.is_miss() {
        next.warning_emphasis = bump(next.warning_emphasis, WARNING_STEP, WARNING_CAP);
        next.example_density = bump(next.example_density, EXAMPLE_DENSITY_STEP, EXAMPLE_DENSITY_CAP);
        (next, Adjustment::EscalateWarnings)
    } else {
        (next, Adjustment::Unchanged)
    }
}
