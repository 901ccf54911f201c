//! Optimizer configuration, loadable from TOML.
//!
//! ```toml
//! exploration_rate = 0.15
//! log_capacity = 100
//! fallback = "first_pattern"
//! seed = 42
//!
//! [attribution]
//! policy = "recent_window"
//! window_secs = 300
//!
//! [composer]
//! warning_threshold = 1.5
//! example_threshold = 1.3
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::composer::ComposerSettings;
use crate::error::{OptimizerError, Result};
use crate::outcome::DEFAULT_LOG_CAPACITY;
use crate::patterns::{FallbackPolicy, DEFAULT_MAX_FAILED_VARIANTS};
use crate::selector::DEFAULT_EXPLORATION_RATE;

/// Window used by the recent-window attribution policy when none is given.
pub const DEFAULT_ATTRIBUTION_WINDOW_SECS: u64 = 300;

/// Which patterns an outcome is credited to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AttributionPolicy {
    /// Exactly the patterns that built the instruction for this turn.
    #[default]
    ExactTurn,
    /// Every pattern selected within `window_secs` of recording.
    RecentWindow {
        #[serde(default = "default_window_secs")]
        window_secs: u64,
    },
}

fn default_window_secs() -> u64 {
    DEFAULT_ATTRIBUTION_WINDOW_SECS
}

impl AttributionPolicy {
    pub fn window(&self) -> Option<Duration> {
        match self {
            AttributionPolicy::ExactTurn => None,
            AttributionPolicy::RecentWindow { window_secs } => Some(Duration::from_secs(*window_secs)),
        }
    }
}

/// Top-level configuration for [`crate::optimizer::ToolPromptOptimizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Probability of a uniform exploratory pick, in `[0, 1]`.
    pub exploration_rate: f64,
    /// Outcomes kept in the recent-history log.
    pub log_capacity: usize,
    /// Bound on each pattern's failed-variant history.
    pub max_failed_variants: usize,
    pub fallback: FallbackPolicy,
    pub attribution: AttributionPolicy,
    pub composer: ComposerSettings,
    /// Fixed RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            exploration_rate: DEFAULT_EXPLORATION_RATE,
            log_capacity: DEFAULT_LOG_CAPACITY,
            max_failed_variants: DEFAULT_MAX_FAILED_VARIANTS,
            fallback: FallbackPolicy::default(),
            attribution: AttributionPolicy::default(),
            composer: ComposerSettings::default(),
            seed: None,
        }
    }
}

impl OptimizerConfig {
    /// Parse and validate a TOML document. Missing keys take defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| OptimizerError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.exploration_rate) {
            return Err(OptimizerError::InvalidConfig(format!(
                "exploration_rate must be in [0, 1], got {}",
                self.exploration_rate
            )));
        }
        if self.log_capacity == 0 {
            return Err(OptimizerError::InvalidConfig("log_capacity must be >= 1".into()));
        }
        if self.max_failed_variants == 0 {
            return Err(OptimizerError::InvalidConfig("max_failed_variants must be >= 1".into()));
        }
        if let AttributionPolicy::RecentWindow { window_secs: 0 } = self.attribution {
            return Err(OptimizerError::InvalidConfig("attribution window_secs must be >= 1".into()));
        }
        let c = &self.composer;
        if !c.warning_threshold.is_finite() || !c.example_threshold.is_finite() {
            return Err(OptimizerError::InvalidConfig("composer thresholds must be finite".into()));
        }
        Ok(())
    }

    /// Same config with a different seed.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_validates() {
        let cfg = OptimizerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.exploration_rate, 0.15);
        assert_eq!(cfg.log_capacity, 100);
        assert_eq!(cfg.fallback, FallbackPolicy::FirstPattern);
        assert_eq!(cfg.attribution, AttributionPolicy::ExactTurn);
        assert!(cfg.seed.is_none());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(OptimizerConfig::from_toml_str("").unwrap(), OptimizerConfig::default());
    }

    #[test]
    fn test_full_toml() {
        let cfg = OptimizerConfig::from_toml_str(
            r#"
            exploration_rate = 0.0
            log_capacity = 10
            fallback = "all_patterns"
            seed = 9

            [attribution]
            policy = "recent_window"
            window_secs = 60

            [composer]
            warning_threshold = 2.0
            example_threshold = 1.5
            max_example_tools = 2
            recent_failures_shown = 1
            input_preview_chars = 20
            "#,
        )
        .unwrap();
        assert_eq!(cfg.exploration_rate, 0.0);
        assert_eq!(cfg.log_capacity, 10);
        assert_eq!(cfg.fallback, FallbackPolicy::AllPatterns);
        assert_eq!(cfg.seed, Some(9));
        assert_eq!(cfg.attribution.window(), Some(Duration::from_secs(60)));
        assert_eq!(cfg.composer.max_example_tools, 2);
    }

    #[test]
    fn test_recent_window_default_seconds() {
        let cfg = OptimizerConfig::from_toml_str("[attribution]\npolicy = \"recent_window\"\n").unwrap();
        assert_eq!(cfg.attribution.window(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_exact_turn_has_no_window() {
        assert_eq!(AttributionPolicy::ExactTurn.window(), None);
    }

    #[test]
    fn test_invalid_exploration_rate_rejected() {
        let err = OptimizerConfig::from_toml_str("exploration_rate = 1.5").unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(OptimizerConfig::from_toml_str("log_capacity = 0").is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let toml = "[attribution]\npolicy = \"recent_window\"\nwindow_secs = 0\n";
        assert!(OptimizerConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_unknown_fallback_is_parse_error() {
        let err = OptimizerConfig::from_toml_str("fallback = \"random\"").unwrap_err();
        assert!(matches!(err, OptimizerError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "exploration_rate = 0.3\nseed = 1").unwrap();
        let cfg = OptimizerConfig::load(file.path()).unwrap();
        assert_eq!(cfg.exploration_rate, 0.3);
        assert_eq!(cfg.seed, Some(1));
    }

    #[test]
    fn test_load_missing_file() {
        let err = OptimizerConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, OptimizerError::ConfigIo { .. }));
    }

    #[test]
    fn test_with_seed() {
        assert_eq!(OptimizerConfig::default().with_seed(Some(3)).seed, Some(3));
    }
}
