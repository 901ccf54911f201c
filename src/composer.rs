//! # Stage: Instruction Composer
//!
//! ## Responsibility
//! Renders the tool-usage segment of the next prompt from the selected
//! patterns, the current knob values, the available tools and the most
//! recent reportable failures.
//!
//! ## Guarantees
//! - Pure: same inputs, same text
//! - Strict thresholds: the warning banner needs `warning_emphasis > warning_threshold`,
//!   the example block needs `example_density > example_threshold`
//!
//! ## NOT Responsible For
//! - Selecting patterns (selector) or reading the outcome log (optimizer)

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::outcome::Outcome;
use crate::patterns::{Pattern, PatternId};
use crate::weights::WeightState;

pub const WARNING_BANNER: &str = "!!! CRITICAL: YOU MUST CALL TOOLS. Questions about code, files, \
arithmetic or the web are NOT answered until the matching [TOOL:...] line has been written. !!!";

const EXAMPLES_HEADER: &str = "Example tool calls:";
const FAILURES_HEADER: &str = "Recent mistakes to avoid:";

/// Rendering thresholds and limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerSettings {
    pub warning_threshold: f64,
    pub example_threshold: f64,
    pub max_example_tools: usize,
    pub recent_failures_shown: usize,
    pub input_preview_chars: usize,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            warning_threshold: 1.5,
            example_threshold: 1.3,
            max_example_tools: 5,
            recent_failures_shown: 3,
            input_preview_chars: 50,
        }
    }
}

/// The three patterns chosen for one instruction.
#[derive(Debug, Clone)]
pub struct SelectedPatterns {
    pub syntax: Arc<Pattern>,
    pub mandatory: Arc<Pattern>,
    pub trigger: Arc<Pattern>,
}

impl SelectedPatterns {
    /// Ids in render order. The same pattern may appear twice under a
    /// singleton fallback.
    pub fn ids(&self) -> Vec<PatternId> {
        vec![
            self.syntax.id().clone(),
            self.mandatory.id().clone(),
            self.trigger.id().clone(),
        ]
    }
}

/// A rendered instruction plus the patterns it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedInstruction {
    pub text: String,
    pub patterns_used: Vec<PatternId>,
}

impl ComposedInstruction {
    pub fn has_warning_banner(&self) -> bool {
        self.text.contains(WARNING_BANNER)
    }

    pub fn has_examples(&self) -> bool {
        self.text.contains(EXAMPLES_HEADER)
    }

    pub fn has_failure_reminders(&self) -> bool {
        self.text.contains(FAILURES_HEADER)
    }
}

/// Render the instruction text.
pub fn render<S: AsRef<str>>(
    weights: &WeightState,
    selected: &SelectedPatterns,
    available_tools: &[S],
    recent_failures: &[Arc<Outcome>],
    settings: &ComposerSettings,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    if weights.warning_emphasis > settings.warning_threshold {
        sections.push(WARNING_BANNER.to_string());
    }

    sections.push(selected.syntax.template().to_string());

    if weights.example_density > settings.example_threshold && !available_tools.is_empty() {
        let mut block = String::from(EXAMPLES_HEADER);
        for tool in available_tools.iter().take(settings.max_example_tools) {
            block.push_str(&format!("\n[TOOL:{} <arguments>]", tool.as_ref()));
        }
        sections.push(block);
    }

    sections.push(selected.mandatory.template().to_string());
    sections.push(selected.trigger.template().to_string());

    // `recent_failures` is oldest first; keep the newest few.
    let reportable: Vec<&Arc<Outcome>> = recent_failures
        .iter()
        .filter(|o| o.is_reportable_failure())
        .collect();
    let start = reportable.len().saturating_sub(settings.recent_failures_shown);
    let failures = &reportable[start..];
    if !failures.is_empty() {
        let mut block = String::from(FAILURES_HEADER);
        for o in failures {
            let tools: Vec<&str> = o.expected_tools().iter().map(String::as_str).collect();
            block.push_str(&format!(
                "\n- You asked \"{}...\" but didn't call {}",
                preview(o.user_input(), settings.input_preview_chars),
                tools.join(", ")
            ));
        }
        sections.push(block);
    }

    sections.join("\n\n")
}

/// First `max_chars` characters of `s`, on a char boundary.
pub fn preview(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
