//! Online optimizer for the tool-usage instructions injected into an LLM prompt.
//!
//! The conversation loop asks [`ToolPromptOptimizer`] which tools a user
//! message should trigger and for the instruction segment of the next prompt;
//! after the reply it reports what the model actually called. Patterns that
//! lead to real tool calls get picked more often (Thompson sampling over Beta
//! posteriors), and repeated misses escalate warnings and examples.

pub mod classify;
pub mod cli;
pub mod composer;
pub mod config;
pub mod distribution;
pub mod error;
pub mod optimizer;
pub mod outcome;
pub mod patterns;
pub mod registry;
pub mod selector;
pub mod simulate;
pub mod weights;

use std::sync::{Mutex, MutexGuard};

pub use classify::{detect_expected_tools, extract_tool_calls, KNOWN_TOOLS};
pub use composer::ComposedInstruction;
pub use config::{AttributionPolicy, OptimizerConfig};
pub use error::{OptimizerError, Result};
pub use optimizer::{Statistics, ToolPromptOptimizer};
pub use outcome::{Outcome, OutcomeLog};
pub use patterns::{Category, FallbackPolicy, Pattern, PatternId, PatternStore, PatternTemplate};
pub use registry::SessionRegistry;
pub use weights::WeightState;

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every guarded value here stays consistent between statements, so a
/// poisoned lock carries no torn state.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
