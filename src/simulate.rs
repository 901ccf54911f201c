//! Synthetic conversation driver.
//!
//! Runs the full learning loop against a scripted stand-in for the model:
//! classify, compose, fake a reply that obeys or ignores the instruction,
//! extract tool calls, record. Used by the `simulate` subcommand to watch the
//! weights and pattern statistics evolve without a live model.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::classify::KNOWN_TOOLS;
use crate::optimizer::{Statistics, ToolPromptOptimizer};

/// Scripted user messages, cycled in order.
const PROMPTS: &[&str] = &[
    "search for the WorldModel class",
    "what is 17 * 23",
    "show me the config loader",
    "hi, how are you today?",
    "edit the timeout in the client",
    "look up the latest release notes",
    "how does the selector pick patterns?",
    "thanks, that's all",
];

/// Extra compliance a warning banner buys the scripted model.
const BANNER_BONUS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    pub turns: usize,
    /// Chance the scripted model ignores an expected tool.
    pub miss_rate: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self { turns: 50, miss_rate: 0.4, seed: None }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub turns: usize,
    pub tool_turns: usize,
    pub misses: usize,
    pub statistics: Statistics,
}

/// Drive `settings.turns` synthetic turns through `optimizer`.
pub fn run(optimizer: &ToolPromptOptimizer, settings: &SimulationSettings) -> SimulationReport {
    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let miss_rate = settings.miss_rate.clamp(0.0, 1.0);
    let mut tool_turns = 0;
    let mut misses = 0;

    for turn in 0..settings.turns {
        let input = PROMPTS[turn % PROMPTS.len()];
        let expected = optimizer.detect_expected_tools(input);
        let instruction = optimizer.generate_instruction(KNOWN_TOOLS, input);

        let comply_p = if instruction.has_warning_banner() {
            (1.0 - miss_rate + BANNER_BONUS).min(1.0)
        } else {
            1.0 - miss_rate
        };
        let response = match expected.iter().next() {
            Some(tool) if rng.gen::<f64>() < comply_p => format!("On it. [TOOL:{tool} {input}]"),
            Some(_) => "I believe the answer is in there somewhere.".to_string(),
            None => "Happy to help!".to_string(),
        };

        let none: &[&str] = &[];
        let outcome = ToolPromptOptimizer::assemble_outcome(input, &response, none, Duration::from_millis(1));
        if !outcome.expected_tools().is_empty() {
            tool_turns += 1;
        }
        if outcome.is_miss() {
            misses += 1;
        }
        optimizer.record_outcome(outcome, &instruction.patterns_used);
    }

    tracing::info!(
        target: "optimizer::simulate",
        turns = settings.turns,
        tool_turns,
        misses,
        "Simulation finished"
    );
    SimulationReport {
        turns: settings.turns,
        tool_turns,
        misses,
        statistics: optimizer.get_statistics(),
    }
}
