//! # Stage: Tool Prompt Optimizer
//!
//! ## Responsibility
//! The facade the conversation loop talks to. Before a reply it classifies the
//! user message and composes the tool instruction; after the reply it records
//! the outcome, crediting patterns, appending to the log and adapting weights.
//!
//! ## Guarantees
//! - Thread-safe: every method takes `&self`; share via `Arc`
//! - Infallible hot path: composing and recording never return errors
//! - Reproducible: a configured seed fixes every random draw
//!
//! ## NOT Responsible For
//! - Calling the model or executing tools
//! - Persisting anything across restarts

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::classify;
use crate::composer::{self, ComposedInstruction, SelectedPatterns};
use crate::config::OptimizerConfig;
use crate::error::Result;
use crate::lock;
use crate::outcome::{Outcome, OutcomeLog};
use crate::patterns::{Category, Pattern, PatternId, PatternStore, PatternTemplate};
use crate::selector::{Selection, Selector};
use crate::weights::{self, Adjustment, WeightState};

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Per-pattern line of the statistics report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternStats {
    pub id: String,
    pub usage_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
    /// Mean of the Beta posterior the selector samples from.
    pub posterior_mean: f64,
}

/// Point-in-time report of the learning state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub weights: WeightState,
    pub patterns: Vec<PatternStats>,
    pub recent_success_ratio: f64,
    pub outcomes_logged: usize,
    pub log_capacity: usize,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Weights:")?;
        writeln!(f, "  tool_syntax_emphasis  {:.2}", self.weights.tool_syntax_emphasis)?;
        writeln!(f, "  example_density       {:.2}", self.weights.example_density)?;
        writeln!(f, "  warning_emphasis      {:.2}", self.weights.warning_emphasis)?;
        writeln!(f, "  context_injection     {:.2}", self.weights.context_injection)?;
        writeln!(f, "Patterns:")?;
        for p in &self.patterns {
            writeln!(
                f,
                "  {:<26} used {:>4}  success {:>5.1}%  posterior {:.3}",
                p.id,
                p.usage_count,
                p.success_rate * 100.0,
                p.posterior_mean
            )?;
        }
        write!(
            f,
            "Recent success ratio: {:.1}% ({} of max {} outcomes)",
            self.recent_success_ratio * 100.0,
            self.outcomes_logged,
            self.log_capacity
        )
    }
}

// ---------------------------------------------------------------------------
// ToolPromptOptimizer
// ---------------------------------------------------------------------------

/// Adaptive tool-instruction optimizer for one conversation session.
#[derive(Debug)]
pub struct ToolPromptOptimizer {
    config: OptimizerConfig,
    store: PatternStore,
    log: OutcomeLog,
    weights: Mutex<WeightState>,
    selector: Selector,
    rng: Mutex<StdRng>,
}

impl ToolPromptOptimizer {
    /// Optimizer over the built-in six-pattern catalogue.
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    /// Built-in catalogue over a config the caller has already validated.
    pub(crate) fn from_validated(config: OptimizerConfig) -> Self {
        let store = PatternStore::builtin(config.fallback, config.max_failed_variants);
        Self::assemble(config, store)
    }

    /// Optimizer over a custom catalogue.
    pub fn with_patterns(config: OptimizerConfig, templates: Vec<PatternTemplate>) -> Result<Self> {
        config.validate()?;
        let store = PatternStore::new(templates, config.fallback, config.max_failed_variants)?;
        Ok(Self::assemble(config, store))
    }

    fn assemble(config: OptimizerConfig, store: PatternStore) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            log: OutcomeLog::new(config.log_capacity),
            selector: Selector::new(config.exploration_rate),
            weights: Mutex::new(WeightState::default()),
            rng: Mutex::new(rng),
            store,
            config,
        }
    }

    pub fn config(&self) -> &OptimizerConfig { &self.config }
    pub fn store(&self) -> &PatternStore { &self.store }
    pub fn log(&self) -> &OutcomeLog { &self.log }

    /// Current knob values.
    pub fn weights(&self) -> WeightState {
        *lock(&self.weights)
    }

    /// Tools the user message is expected to trigger.
    pub fn detect_expected_tools(&self, user_input: &str) -> BTreeSet<String> {
        classify::detect_expected_tools(user_input)
    }

    /// Thompson/ε pick for `category`; stamps the winner as used.
    pub fn select_best_pattern(&self, category: &str) -> Selection {
        let mut rng = lock(&self.rng);
        self.selector.select(&self.store, category, &mut *rng, Instant::now())
    }

    /// Compose the tool-usage instruction for the next prompt.
    ///
    /// Keep the returned `patterns_used` and hand it to [`Self::record_outcome`]
    /// once the turn finishes.
    pub fn generate_instruction<S: AsRef<str>>(
        &self,
        available_tools: &[S],
        user_input: &str,
    ) -> ComposedInstruction {
        let selected = SelectedPatterns {
            syntax: self.select_best_pattern(Category::Syntax.as_str()).pattern,
            mandatory: self.select_best_pattern(Category::Mandatory.as_str()).pattern,
            trigger: self.select_best_pattern(Category::Trigger.as_str()).pattern,
        };
        let failures = self
            .log
            .take_last(Outcome::is_reportable_failure, self.config.composer.recent_failures_shown);
        let weights = self.weights();
        let text = composer::render(&weights, &selected, available_tools, &failures, &self.config.composer);

        tracing::debug!(
            target: "optimizer::composer",
            input_chars = user_input.chars().count(),
            patterns = ?selected.ids(),
            banner = weights.warning_emphasis > self.config.composer.warning_threshold,
            examples = weights.example_density > self.config.composer.example_threshold,
            reminders = failures.len(),
            "Instruction composed"
        );
        ComposedInstruction { text, patterns_used: selected.ids() }
    }

    /// Build an outcome from a finished exchange: expected tools come from the
    /// user message, actual calls are the reply's `[TOOL:...]` markers plus
    /// whatever the execution layer reports as invoked.
    pub fn assemble_outcome<S: AsRef<str>>(
        user_input: &str,
        response: &str,
        executed_tools: &[S],
        elapsed: Duration,
    ) -> Outcome {
        let expected = classify::detect_expected_tools(user_input);
        let mut actual: BTreeSet<String> = classify::extract_tool_calls(response).into_iter().collect();
        actual.extend(executed_tools.iter().map(|t| t.as_ref().to_string()));
        for tool in actual.iter().filter(|t| !classify::is_known_tool(t)) {
            tracing::debug!(target: "optimizer::classify", tool = %tool, "Call to tool outside the known vocabulary");
        }
        Outcome::new(user_input, response, expected, actual, elapsed)
    }

    /// Close the learning loop for one turn.
    ///
    /// Under exact-turn attribution only `patterns_used` are credited (each at
    /// most once, unknown ids ignored); under recent-window attribution the
    /// list is ignored and every pattern selected within the window is.
    pub fn record_outcome(&self, outcome: Outcome, patterns_used: &[PatternId]) -> Arc<Outcome> {
        let now = Instant::now();
        let targets = self.attribution_targets(now, patterns_used);
        for pattern in &targets {
            pattern.record_touch(&outcome);
        }

        let (before, after, adjustment) = {
            let mut w = lock(&self.weights);
            let before = *w;
            let (after, adjustment) = weights::adapt(before, &outcome);
            *w = after;
            (before, after, adjustment)
        };
        if adjustment != Adjustment::Unchanged && before != after {
            tracing::info!(
                target: "optimizer::weights",
                rule = ?adjustment,
                tool_syntax_emphasis = after.tool_syntax_emphasis,
                example_density = after.example_density,
                warning_emphasis = after.warning_emphasis,
                "Weights adapted"
            );
        }

        let outcome = self.log.push(outcome);
        tracing::debug!(
            target: "optimizer::outcome",
            id = %outcome.id(),
            success = outcome.was_successful(),
            credited = targets.len(),
            "Outcome recorded"
        );
        outcome
    }

    fn attribution_targets(&self, now: Instant, patterns_used: &[PatternId]) -> Vec<Arc<Pattern>> {
        if let Some(window) = self.config.attribution.window() {
            return self.store.touched_within(now, window);
        }
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for id in patterns_used {
            if !seen.insert(id) {
                continue;
            }
            match self.store.get(id) {
                Some(p) => targets.push(p),
                None => tracing::warn!(
                    target: "optimizer::outcome",
                    pattern = %id,
                    "Ignoring unknown pattern id"
                ),
            }
        }
        targets
    }

    /// Report of weights, per-pattern statistics and the recent success ratio.
    pub fn get_statistics(&self) -> Statistics {
        let patterns = self
            .store
            .iter()
            .map(|p| PatternStats {
                id: p.id().to_string(),
                usage_count: p.usage_count(),
                success_count: p.success_count(),
                failure_count: p.failure_count(),
                success_rate: p.success_rate(),
                posterior_mean: p.posterior().mean(),
            })
            .collect();
        Statistics {
            weights: self.weights(),
            patterns,
            recent_success_ratio: self.log.success_ratio(),
            outcomes_logged: self.log.count(),
            log_capacity: self.log.capacity(),
        }
    }
}

impl Default for ToolPromptOptimizer {
    fn default() -> Self {
        Self::from_validated(OptimizerConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
