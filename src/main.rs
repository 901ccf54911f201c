use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use tool_prompt_optimizer::cli::{resolve_tools, Args, Command};
use tool_prompt_optimizer::simulate::{self, SimulationSettings};
use tool_prompt_optimizer::{detect_expected_tools, extract_tool_calls, OptimizerConfig, ToolPromptOptimizer};

fn init_tracing(verbose: bool) {
    let default = if verbose { "tool_prompt_optimizer=debug,optimizer=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<OptimizerConfig, Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => OptimizerConfig::load(path)?,
        None => OptimizerConfig::default(),
    };
    Ok(match args.seed {
        Some(seed) => config.with_seed(Some(seed)),
        None => config,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let config = load_config(&args)?;

    match &args.command {
        Command::Detect { input } => {
            let tools = detect_expected_tools(input);
            if tools.is_empty() {
                println!("{}", "(no tools expected)".dimmed());
            }
            for tool in tools {
                println!("{}", tool.bright_cyan());
            }
        }
        Command::Extract { response } => {
            for call in extract_tool_calls(response) {
                println!("{}", call.bright_green());
            }
        }
        Command::Instruct { input, tools } => {
            let optimizer = ToolPromptOptimizer::new(config)?;
            let instruction = optimizer.generate_instruction(&resolve_tools(tools), input);
            println!("{}", instruction.text);
            eprintln!(
                "{} {}",
                "[patterns]".bright_magenta(),
                instruction
                    .patterns_used
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Command::Simulate { turns, miss_rate, json } => {
            let settings = SimulationSettings { turns: *turns, miss_rate: *miss_rate, seed: config.seed };
            let optimizer = ToolPromptOptimizer::new(config)?;
            let report = simulate::run(&optimizer, &settings);
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} {} turns, {} expected tools, {} missed",
                    "[simulate]".bright_magenta(),
                    report.turns,
                    report.tool_turns,
                    report.misses.to_string().bright_red()
                );
                println!("{}", report.statistics);
            }
        }
    }

    Ok(())
}
