//! Crate-level error type.
//!
//! The learning loop itself never fails on valid input; errors only surface at
//! construction time (bad configuration, empty pattern catalogue) and from the
//! raw distribution entry points when handed an invalid shape parameter.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by `tool_prompt_optimizer`.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// A pattern store was built from zero templates.
    #[error("pattern store must contain at least one pattern")]
    EmptyPatternStore,

    /// Two templates share the same id.
    #[error("duplicate pattern id '{0}'")]
    DuplicatePattern(String),

    /// A Gamma/Beta parameter was not a finite positive number.
    #[error("distribution shape must be finite and > 0, got {0}")]
    InvalidShape(f64),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file was not valid TOML for [`crate::config::OptimizerConfig`].
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, OptimizerError>;
