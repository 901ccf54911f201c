//! # Stage: Pattern Store
//!
//! ## Responsibility
//! The fixed catalogue of instruction templates plus the mutable usage
//! statistics the bandit learns from. Category membership ("syntax",
//! "mandatory", "trigger") is derived from the pattern id, never stored.
//!
//! ## Guarantees
//! - Non-empty: a [`PatternStore`] always holds at least one pattern; the
//!   built-in catalogue holds six
//! - Lossless counters: usage/success/failure are atomics, so concurrent
//!   touches on the same pattern never drop increments
//! - Bounded: each pattern keeps at most `max_failed_variants` failure strings
//!
//! ## NOT Responsible For
//! - Choosing between patterns (selector)
//! - Adding or removing patterns at runtime

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::distribution::BetaPosterior;
use crate::error::{OptimizerError, Result};
use crate::lock;
use crate::outcome::Outcome;

// ---------------------------------------------------------------------------
// Identifiers and categories
// ---------------------------------------------------------------------------

/// Stable identifier of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternId(String);

impl PatternId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three slots every composed instruction fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Syntax,
    Mandatory,
    Trigger,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Syntax => "syntax",
            Category::Mandatory => "mandatory",
            Category::Trigger => "trigger",
        }
    }

    pub fn all() -> &'static [Category] {
        &[Category::Syntax, Category::Mandatory, Category::Trigger]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What [`PatternStore::lookup_by_category`] returns when nothing matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Only the first pattern in catalogue order.
    #[default]
    FirstPattern,
    /// Every pattern in the store.
    AllPatterns,
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Static definition of a pattern: id plus template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTemplate {
    pub id: PatternId,
    pub template: String,
}

impl PatternTemplate {
    pub fn new(id: impl Into<String>, template: impl Into<String>) -> Self {
        Self { id: PatternId::new(id), template: template.into() }
    }
}

/// The six built-in templates, in catalogue order.
pub fn builtin_templates() -> Vec<PatternTemplate> {
    vec![
        PatternTemplate::new(
            "explicit_syntax",
            "To use a tool, write it on its own line exactly as:\n[TOOL:tool_name arguments]\n\
             The marker must start with `[TOOL:` and the tool name must follow with no space.",
        ),
        PatternTemplate::new(
            "syntax_with_example",
            "Tool calls use bracket syntax. Example:\n[TOOL:search_my_code WorldModel]\n\
             Anything not written in this form will NOT be executed.",
        ),
        PatternTemplate::new(
            "mandatory_tool_use",
            "You MUST call a tool whenever the answer depends on code, files, arithmetic \
             or the web. Do not answer from memory when a tool can check.",
        ),
        PatternTemplate::new(
            "mandatory_no_fabrication",
            "Never describe what a file or function contains without reading it first. \
             If you have not called a tool, you do not know the answer yet.",
        ),
        PatternTemplate::new(
            "trigger_keywords",
            "Words like search, find, read, show, edit, calculate or look up mean the user \
             expects a tool call in this reply.",
        ),
        PatternTemplate::new(
            "trigger_question_forms",
            "Questions such as \"is there...\", \"how does...\" or \"what is 2 + 2\" are \
             answered by calling the matching tool first, then explaining the result.",
        ),
    ]
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// Default bound on each pattern's failed-variant history.
pub const DEFAULT_MAX_FAILED_VARIANTS: usize = 100;

/// One template plus its live statistics.
#[derive(Debug)]
pub struct Pattern {
    id: PatternId,
    template: String,
    usage: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    last_used: Mutex<Option<Instant>>,
    successful_variants: Mutex<HashSet<String>>,
    failed_variants: Mutex<VecDeque<String>>,
    max_failed_variants: usize,
}

impl Pattern {
    pub fn new(template: PatternTemplate, max_failed_variants: usize) -> Self {
        Self {
            id: template.id,
            template: template.template,
            usage: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_used: Mutex::new(None),
            successful_variants: Mutex::new(HashSet::new()),
            failed_variants: Mutex::new(VecDeque::new()),
            max_failed_variants: max_failed_variants.max(1),
        }
    }

    pub fn id(&self) -> &PatternId { &self.id }
    pub fn template(&self) -> &str { &self.template }
    pub fn usage_count(&self) -> u64 { self.usage.load(Ordering::Relaxed) }
    pub fn success_count(&self) -> u64 { self.successes.load(Ordering::Relaxed) }
    pub fn failure_count(&self) -> u64 { self.failures.load(Ordering::Relaxed) }

    /// `successes / usage`, or 0 for an untouched pattern.
    pub fn success_rate(&self) -> f64 {
        let usage = self.usage_count();
        if usage == 0 { 0.0 } else { self.success_count() as f64 / usage as f64 }
    }

    /// Case-insensitive substring match of `category` against the id.
    pub fn in_category(&self, category: &str) -> bool {
        self.id.as_str().to_lowercase().contains(&category.to_lowercase())
    }

    /// Current Beta posterior over this pattern's success probability.
    pub fn posterior(&self) -> BetaPosterior {
        BetaPosterior::from_counts(self.success_count(), self.failure_count())
    }

    /// Credit or blame this pattern for `outcome`.
    pub fn record_touch(&self, outcome: &Outcome) {
        self.usage.fetch_add(1, Ordering::Relaxed);
        if outcome.was_successful() {
            self.successes.fetch_add(1, Ordering::Relaxed);
            if !outcome.actual_tool_calls().is_empty() {
                let joined = join_tools(outcome.actual_tool_calls());
                lock(&self.successful_variants).insert(joined);
            }
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
            let variant = format!(
                "expected {} got {}",
                join_tools(outcome.expected_tools()),
                if outcome.actual_tool_calls().is_empty() {
                    "nothing".to_string()
                } else {
                    join_tools(outcome.actual_tool_calls())
                }
            );
            let mut failed = lock(&self.failed_variants);
            if failed.len() >= self.max_failed_variants {
                failed.pop_front();
            }
            failed.push_back(variant);
        }
        tracing::debug!(
            target: "optimizer::patterns",
            pattern = %self.id,
            success = outcome.was_successful(),
            usage = self.usage_count(),
            "Pattern touched"
        );
    }

    /// Stamp the last-used time. Last write wins.
    pub fn mark_used(&self, now: Instant) {
        *lock(&self.last_used) = Some(now);
    }

    pub fn last_used(&self) -> Option<Instant> {
        *lock(&self.last_used)
    }

    /// Used no earlier than `window` before `now`.
    pub fn used_within(&self, now: Instant, window: Duration) -> bool {
        match self.last_used() {
            Some(at) => now.saturating_duration_since(at) <= window,
            None => false,
        }
    }

    /// Distinct tool-call combinations that followed this pattern, sorted.
    pub fn successful_variants(&self) -> Vec<String> {
        let set = lock(&self.successful_variants);
        let mut v: Vec<String> = set.iter().cloned().collect();
        v.sort();
        v
    }

    /// "expected X got Y" strings, oldest first.
    pub fn failed_variants(&self) -> Vec<String> {
        lock(&self.failed_variants).iter().cloned().collect()
    }
}

fn join_tools(tools: &BTreeSet<String>) -> String {
    tools.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

// ---------------------------------------------------------------------------
// PatternStore
// ---------------------------------------------------------------------------

/// Ordered, fixed collection of patterns.
#[derive(Debug)]
pub struct PatternStore {
    patterns: Vec<Arc<Pattern>>,
    fallback: FallbackPolicy,
}

impl PatternStore {
    /// Build a store from `templates`.
    ///
    /// Fails on an empty list or duplicate ids.
    pub fn new(
        templates: Vec<PatternTemplate>,
        fallback: FallbackPolicy,
        max_failed_variants: usize,
    ) -> Result<Self> {
        if templates.is_empty() {
            return Err(OptimizerError::EmptyPatternStore);
        }
        let mut seen = HashSet::new();
        for t in &templates {
            if !seen.insert(t.id.clone()) {
                return Err(OptimizerError::DuplicatePattern(t.id.to_string()));
            }
        }
        Ok(Self::from_templates(templates, fallback, max_failed_variants))
    }

    /// The built-in six-pattern catalogue.
    pub fn builtin(fallback: FallbackPolicy, max_failed_variants: usize) -> Self {
        Self::from_templates(builtin_templates(), fallback, max_failed_variants)
    }

    fn from_templates(
        templates: Vec<PatternTemplate>,
        fallback: FallbackPolicy,
        max_failed_variants: usize,
    ) -> Self {
        let patterns = templates
            .into_iter()
            .map(|t| Arc::new(Pattern::new(t, max_failed_variants)))
            .collect();
        Self { patterns, fallback }
    }

    pub fn fallback(&self) -> FallbackPolicy { self.fallback }

    pub fn len(&self) -> usize { self.patterns.len() }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool { self.patterns.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Pattern>> {
        self.patterns.iter()
    }

    /// First pattern in catalogue order.
    pub fn first(&self) -> Arc<Pattern> {
        // Non-empty by construction.
        Arc::clone(&self.patterns[0])
    }

    pub fn get(&self, id: &PatternId) -> Option<Arc<Pattern>> {
        self.patterns.iter().find(|p| p.id() == id).cloned()
    }

    /// Patterns whose id contains `category` (case-insensitive), in catalogue
    /// order. When none match, the [`FallbackPolicy`] decides.
    pub fn lookup_by_category(&self, category: &str) -> Vec<Arc<Pattern>> {
        let matched: Vec<Arc<Pattern>> = self
            .patterns
            .iter()
            .filter(|p| p.in_category(category))
            .cloned()
            .collect();
        if !matched.is_empty() {
            return matched;
        }
        match self.fallback {
            FallbackPolicy::FirstPattern => self.patterns.iter().take(1).cloned().collect(),
            FallbackPolicy::AllPatterns => self.patterns.clone(),
        }
    }

    /// Patterns stamped within `window` before `now`.
    pub fn touched_within(&self, now: Instant, window: Duration) -> Vec<Arc<Pattern>> {
        self.patterns
            .iter()
            .filter(|p| p.used_within(now, window))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> PatternStore {
        PatternStore::builtin(FallbackPolicy::FirstPattern, DEFAULT_MAX_FAILED_VARIANTS)
    }

    fn miss() -> Outcome {
        Outcome::new("find x", "", ["search_my_code"], Vec::<String>::new(), Duration::ZERO)
    }

    fn hit() -> Outcome {
        Outcome::new("find x", "", ["search_my_code"], ["search_my_code"], Duration::ZERO)
    }

    // ===== Catalogue =====

    #[test]
    fn test_builtin_has_six_patterns() {
        assert_eq!(store().len(), 6);
        assert!(!store().is_empty());
    }

    #[test]
    fn test_every_category_has_two_builtins() {
        let s = store();
        for c in Category::all() {
            assert_eq!(s.lookup_by_category(c.as_str()).len(), 2, "category {c}");
        }
    }

    #[test]
    fn test_builtin_ids_unique() {
        let ids: HashSet<_> = builtin_templates().into_iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_new_rejects_empty() {
        let err = PatternStore::new(vec![], FallbackPolicy::FirstPattern, 10).unwrap_err();
        assert!(matches!(err, OptimizerError::EmptyPatternStore));
    }

    #[test]
    fn test_new_rejects_duplicate_ids() {
        let err = PatternStore::new(
            vec![PatternTemplate::new("a_syntax", "x"), PatternTemplate::new("a_syntax", "y")],
            FallbackPolicy::FirstPattern,
            10,
        )
        .unwrap_err();
        assert!(matches!(err, OptimizerError::DuplicatePattern(id) if id == "a_syntax"));
    }

    // ===== Lookup =====

    #[test]
    fn test_lookup_is_case_insensitive() {
        let s = store();
        assert_eq!(s.lookup_by_category("SYNTAX").len(), 2);
        assert_eq!(s.lookup_by_category("Trigger").len(), 2);
    }

    #[test]
    fn test_lookup_preserves_catalogue_order() {
        let found = store().lookup_by_category("syntax");
        assert_eq!(found[0].id().as_str(), "explicit_syntax");
        assert_eq!(found[1].id().as_str(), "syntax_with_example");
    }

    #[test]
    fn test_fallback_first_pattern_returns_singleton() {
        let found = store().lookup_by_category("nonexistent");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id().as_str(), "explicit_syntax");
    }

    #[test]
    fn test_fallback_all_patterns_returns_everything() {
        let s = PatternStore::builtin(FallbackPolicy::AllPatterns, 10);
        assert_eq!(s.lookup_by_category("nonexistent").len(), 6);
    }

    #[test]
    fn test_get_by_id() {
        let s = store();
        assert!(s.get(&PatternId::new("trigger_keywords")).is_some());
        assert!(s.get(&PatternId::new("nope")).is_none());
    }

    // ===== Touch / statistics =====

    #[test]
    fn test_record_touch_success() {
        let p = Pattern::new(PatternTemplate::new("x_syntax", "t"), 10);
        p.record_touch(&hit());
        assert_eq!(p.usage_count(), 1);
        assert_eq!(p.success_count(), 1);
        assert_eq!(p.failure_count(), 0);
        assert_eq!(p.successful_variants(), vec!["search_my_code".to_string()]);
        assert!((p.success_rate() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_successful_variants_are_a_set() {
        let p = Pattern::new(PatternTemplate::new("x_syntax", "t"), 10);
        p.record_touch(&hit());
        p.record_touch(&hit());
        assert_eq!(p.successful_variants().len(), 1);
    }

    #[test]
    fn test_record_touch_failure_formats_variant() {
        let p = Pattern::new(PatternTemplate::new("x_syntax", "t"), 10);
        p.record_touch(&miss());
        assert_eq!(p.failure_count(), 1);
        assert_eq!(p.failed_variants(), vec!["expected search_my_code got nothing".to_string()]);
    }

    #[test]
    fn test_chat_outcome_counts_success_without_variant() {
        let p = Pattern::new(PatternTemplate::new("x_syntax", "t"), 10);
        p.record_touch(&Outcome::new("hi", "hello", Vec::<String>::new(), Vec::<String>::new(), Duration::ZERO));
        assert_eq!(p.success_count(), 1);
        assert!(p.successful_variants().is_empty());
    }

    #[test]
    fn test_failed_variants_bounded() {
        let p = Pattern::new(PatternTemplate::new("x_syntax", "t"), 3);
        for _ in 0..10 {
            p.record_touch(&miss());
        }
        assert_eq!(p.failure_count(), 10);
        assert_eq!(p.failed_variants().len(), 3);
    }

    #[test]
    fn test_unused_pattern_success_rate_zero() {
        let p = Pattern::new(PatternTemplate::new("x", "t"), 10);
        assert_eq!(p.success_rate(), 0.0);
        assert_eq!(p.posterior(), BetaPosterior::from_counts(0, 0));
    }

    #[test]
    fn test_mark_used_and_window() {
        let p = Pattern::new(PatternTemplate::new("x", "t"), 10);
        let now = Instant::now();
        assert!(!p.used_within(now, Duration::from_secs(300)));
        p.mark_used(now);
        assert_eq!(p.last_used(), Some(now));
        assert!(p.used_within(now, Duration::from_secs(300)));
        assert!(p.used_within(now + Duration::from_secs(300), Duration::from_secs(300)));
        assert!(!p.used_within(now + Duration::from_secs(301), Duration::from_secs(300)));
    }

    #[test]
    fn test_touched_within_only_returns_stamped() {
        let s = store();
        let now = Instant::now();
        s.get(&PatternId::new("trigger_keywords")).unwrap().mark_used(now);
        let touched = s.touched_within(now, Duration::from_secs(300));
        assert_eq!(touched.len(), 1);
        assert_eq!(touched[0].id().as_str(), "trigger_keywords");
    }

    #[test]
    fn test_concurrent_touches_are_not_lost() {
        let p = Arc::new(Pattern::new(PatternTemplate::new("x", "t"), 10));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let p = Arc::clone(&p);
                std::thread::spawn(move || {
                    let o = if i % 2 == 0 { hit() } else { miss() };
                    for _ in 0..500 {
                        p.record_touch(&o);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(p.usage_count(), 4_000);
        assert_eq!(p.success_count(), 2_000);
        assert_eq!(p.failure_count(), 2_000);
    }
}
