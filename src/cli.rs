use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tool-prompt-optimizer")]
#[command(version)]
#[command(about = "Adaptive tool-usage instructions for LLM prompts, tuned by Thompson sampling")]
pub struct Args {
    /// TOML config file (defaults apply to any missing key)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Fixed RNG seed; overrides the config file
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Log selections and weight changes to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Print the tools a user message is expected to trigger
    Detect {
        input: String,
    },
    /// Print the tool calls found in a model reply, in order
    Extract {
        response: String,
    },
    /// Print a composed tool instruction for a user message
    Instruct {
        input: String,
        /// Comma-separated available tools (defaults to the built-in five)
        #[arg(long, value_delimiter = ',')]
        tools: Vec<String>,
    },
    /// Drive synthetic turns through the learning loop and print statistics
    Simulate {
        #[arg(long, default_value = "50")]
        turns: usize,
        /// Chance the scripted model ignores an expected tool
        #[arg(long, default_value = "0.4")]
        miss_rate: f64,
        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// The available tools for `instruct`: the user's list, or the built-in vocabulary.
pub fn resolve_tools(tools: &[String]) -> Vec<String> {
    if tools.is_empty() {
        crate::classify::KNOWN_TOOLS.iter().map(|t| t.to_string()).collect()
    } else {
        tools.to_vec()
    }
}
