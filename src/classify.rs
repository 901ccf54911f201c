//! Keyword/regex classifiers on either side of the model call: which tools a
//! user message should trigger, and which tools a reply actually invoked.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

// ---------------------------------------------------------------------------
// Tool vocabulary
// ---------------------------------------------------------------------------

pub const SEARCH_MY_CODE: &str = "search_my_code";
pub const READ_MY_FILE: &str = "read_my_file";
pub const MODIFY_MY_CODE: &str = "modify_my_code";
pub const CALCULATOR: &str = "calculator";
pub const WEB_RESEARCH: &str = "web_research";

/// Canonical tool identifiers, matching the downstream registry.
pub const KNOWN_TOOLS: &[&str] = &[SEARCH_MY_CODE, READ_MY_FILE, MODIFY_MY_CODE, CALCULATOR, WEB_RESEARCH];

/// Independent keyword rules; any number may fire for one input.
const KEYWORD_RULES: &[(&[&str], &str)] = &[
    (&["search", "find", "is there"], SEARCH_MY_CODE),
    (&["read", "show", "cat "], READ_MY_FILE),
    (&["modify", "change", "edit", "save"], MODIFY_MY_CODE),
    (&["calculate", "math"], CALCULATOR),
    (&["web", "search online", "look up"], WEB_RESEARCH),
    (&["world model", "architecture", "how does"], SEARCH_MY_CODE),
];

static ARITHMETIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\s*[+\-*/]\s*\d+").expect("arithmetic regex is valid"));

static TOOL_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[TOOL:([^\s\]]+)").expect("tool marker regex is valid"));

// ---------------------------------------------------------------------------
// Classifiers
// ---------------------------------------------------------------------------

/// Tools the user message is expected to trigger. Empty for plain chat.
pub fn detect_expected_tools(user_input: &str) -> BTreeSet<String> {
    let lower = user_input.to_lowercase();
    let mut tools: BTreeSet<String> = KEYWORD_RULES
        .iter()
        .filter(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, tool)| (*tool).to_string())
        .collect();
    if ARITHMETIC.is_match(&lower) {
        tools.insert(CALCULATOR.to_string());
    }
    tools
}

/// Tool names following each `[TOOL:` marker, in order of appearance.
///
/// The name runs until the next whitespace or `]`. Duplicates are kept.
pub fn extract_tool_calls(response: &str) -> Vec<String> {
    TOOL_MARKER
        .captures_iter(response)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Whether `name` is one of [`KNOWN_TOOLS`].
pub fn is_known_tool(name: &str) -> bool {
    KNOWN_TOOLS.contains(&name)
}
