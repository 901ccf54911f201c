//! External tests for the full learning loop: classify, compose, record,
//! and the boundary behaviour of the adaptive weights.

use std::sync::Arc;
use std::time::Duration;

use tool_prompt_optimizer::selector::Selector;
use tool_prompt_optimizer::*;

use rand::rngs::StdRng;
use rand::SeedableRng;

const TOOLS: &[&str] = &["search_my_code", "read_my_file", "modify_my_code", "calculator", "web_research"];

fn optimizer(seed: u64) -> ToolPromptOptimizer {
    ToolPromptOptimizer::new(OptimizerConfig::default().with_seed(Some(seed))).expect("default config is valid")
}

fn missed_search() -> Outcome {
    Outcome::new(
        "search for the WorldModel class",
        "The WorldModel class is probably in src.",
        ["search_my_code"],
        Vec::<String>::new(),
        Duration::from_millis(40),
    )
}

// -- End-to-end boundary --------------------------------------------------

#[test]
fn test_three_misses_banner_without_examples() {
    let opt = optimizer(11);
    for _ in 0..3 {
        opt.record_outcome(missed_search(), &[]);
    }
    let w = opt.weights();
    assert_eq!(w.warning_emphasis, 1.6);
    assert_eq!(w.example_density, 1.3);
    assert_eq!(w.tool_syntax_emphasis, 1.0);
    assert_eq!(w.context_injection, 1.0);

    let instr = opt.generate_instruction(TOOLS, "search for the WorldModel class");
    assert!(instr.has_warning_banner(), "1.6 > 1.5 must show the banner");
    assert!(!instr.has_examples(), "1.3 is not > 1.3, no example block");
    assert!(instr.text.contains("You asked \"search for the WorldModel class...\" but didn't call search_my_code"));
}

#[test]
fn test_default_instruction_is_plain() {
    let opt = optimizer(12);
    let instr = opt.generate_instruction(TOOLS, "hello");
    assert!(!instr.has_warning_banner());
    assert!(!instr.has_examples());
    assert!(!instr.has_failure_reminders());
}

// -- Full turn as the conversation loop runs it ---------------------------

#[test]
fn test_full_turn_from_raw_text() {
    let opt = optimizer(13);
    let input = "what is 2 + 2";
    let expected = opt.detect_expected_tools(input);
    assert!(expected.contains("calculator"));

    let instr = opt.generate_instruction(TOOLS, input);
    let reply = "Let me compute that. [TOOL:calculator 2+2]";
    let none: &[&str] = &[];
    let outcome = ToolPromptOptimizer::assemble_outcome(input, reply, none, Duration::from_millis(12));
    assert!(outcome.was_successful());
    let recorded = opt.record_outcome(outcome, &instr.patterns_used);
    assert_eq!(recorded.actual_tool_calls().iter().next().map(String::as_str), Some("calculator"));

    assert_eq!(opt.weights().tool_syntax_emphasis, 1.1);
    let stats = opt.get_statistics();
    assert_eq!(stats.outcomes_logged, 1);
    assert_eq!(stats.recent_success_ratio, 1.0);
    for id in &instr.patterns_used {
        let p = opt.store().get(id).unwrap();
        assert_eq!(p.success_count(), 1);
        assert_eq!(p.successful_variants(), vec!["calculator".to_string()]);
    }
}

#[test]
fn test_log_keeps_last_hundred() {
    let opt = optimizer(14);
    for i in 0..150 {
        let o = Outcome::new(format!("turn {i}"), "", Vec::<String>::new(), Vec::<String>::new(), Duration::ZERO);
        opt.record_outcome(o, &[]);
    }
    assert_eq!(opt.log().count(), 100);
    let first = opt.log().snapshot();
    assert_eq!(first[0].user_input(), "turn 50");
    assert!(opt.log().take_last(|o| o.user_input() == "turn 10", 5).is_empty());
}

// -- Selector over a custom catalogue -------------------------------------

#[test]
fn test_thompson_prefers_proven_pattern() {
    let templates = vec![
        PatternTemplate::new("proven_syntax", "A"),
        PatternTemplate::new("unproven_syntax", "B"),
    ];
    let store = PatternStore::new(templates, FallbackPolicy::FirstPattern, 10).unwrap();
    let good = Outcome::new("q", "", ["calculator"], ["calculator"], Duration::ZERO);
    let bad = Outcome::new("q", "", ["calculator"], Vec::<String>::new(), Duration::ZERO);
    let patterns: Vec<_> = store.iter().cloned().collect();
    for _ in 0..10 {
        patterns[0].record_touch(&good);
        patterns[1].record_touch(&bad);
    }

    let selector = Selector::new(0.0);
    let mut rng = StdRng::seed_from_u64(2024);
    let wins = (0..1_000)
        .filter(|_| {
            selector
                .select(&store, "syntax", &mut rng, std::time::Instant::now())
                .pattern
                .id()
                .as_str()
                == "proven_syntax"
        })
        .count();
    assert!(wins > 900, "{wins}/1000");
}

#[test]
fn test_all_patterns_fallback_policy() {
    let cfg = OptimizerConfig {
        fallback: FallbackPolicy::AllPatterns,
        exploration_rate: 1.0,
        seed: Some(15),
        ..OptimizerConfig::default()
    };
    let opt = ToolPromptOptimizer::new(cfg).unwrap();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..300 {
        seen.insert(opt.select_best_pattern("no-such-category").pattern.id().clone());
    }
    assert_eq!(seen.len(), 6);
}

#[test]
fn test_first_pattern_fallback_policy() {
    let opt = optimizer(16);
    for _ in 0..50 {
        assert_eq!(opt.select_best_pattern("no-such-category").pattern.id().as_str(), "explicit_syntax");
    }
}

// -- Concurrency ------------------------------------------------------------

#[test]
fn test_shared_optimizer_across_threads() {
    let opt = Arc::new(optimizer(17));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let opt = Arc::clone(&opt);
            std::thread::spawn(move || {
                for i in 0..60 {
                    let input = if (t + i) % 2 == 0 { "find the parser" } else { "hello" };
                    let instr = opt.generate_instruction(TOOLS, input);
                    let none: &[&str] = &[];
                    let outcome = ToolPromptOptimizer::assemble_outcome(input, "ok", none, Duration::ZERO);
                    opt.record_outcome(outcome, &instr.patterns_used);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let stats = opt.get_statistics();
    let usage: u64 = stats.patterns.iter().map(|p| p.usage_count).sum();
    assert_eq!(usage, 4 * 60 * 3);
    assert_eq!(stats.outcomes_logged, 100);
    let w = stats.weights;
    assert!(w.warning_emphasis <= 3.0 && w.example_density <= 2.0);
}

// -- Sessions ---------------------------------------------------------------

#[test]
fn test_registry_isolates_sessions() {
    let registry = SessionRegistry::new(OptimizerConfig::default().with_seed(Some(18))).unwrap();
    let a = registry.get_or_create("session-a");
    let b = registry.get_or_create("session-b");
    for _ in 0..5 {
        a.record_outcome(missed_search(), &[]);
    }
    assert_eq!(a.weights().warning_emphasis, 2.0);
    assert_eq!(b.weights(), WeightState::default());
}
