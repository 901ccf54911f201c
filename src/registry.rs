//! Per-session optimizers and the process-wide registry.
//!
//! Each session id gets its own [`ToolPromptOptimizer`], so learning in one
//! conversation never leaks into another. The process-wide registry is
//! installed once and lives until exit.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;

use crate::config::OptimizerConfig;
use crate::error::{OptimizerError, Result};
use crate::optimizer::ToolPromptOptimizer;

static GLOBAL: OnceCell<SessionRegistry> = OnceCell::new();

/// Session id → optimizer map sharing one configuration.
#[derive(Debug)]
pub struct SessionRegistry {
    config: OptimizerConfig,
    sessions: RwLock<HashMap<String, Arc<ToolPromptOptimizer>>>,
}

impl SessionRegistry {
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, sessions: RwLock::new(HashMap::new()) })
    }

    pub fn config(&self) -> &OptimizerConfig { &self.config }

    /// The optimizer for `session_id`, created on first use.
    pub fn get_or_create(&self, session_id: &str) -> Arc<ToolPromptOptimizer> {
        if let Some(existing) = self.get(session_id) {
            return existing;
        }
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = sessions.get(session_id) {
            return Arc::clone(existing);
        }
        let optimizer = Arc::new(self.build(session_id));
        sessions.insert(session_id.to_string(), Arc::clone(&optimizer));
        tracing::debug!(target: "optimizer::registry", session = session_id, "Session optimizer created");
        optimizer
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<ToolPromptOptimizer>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned()
    }

    /// Drop a session's state. Returns whether it existed.
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn build(&self, session_id: &str) -> ToolPromptOptimizer {
        let seed = self.config.seed.map(|s| s ^ fnv1a(session_id));
        // Validated in `new`; the seed takes no part in validation.
        ToolPromptOptimizer::from_validated(self.config.clone().with_seed(seed))
    }
}

/// 64-bit FNV-1a; stable across builds, unlike `DefaultHasher`.
fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3))
}

/// Install the process-wide registry. Fails if one is already installed.
pub fn install_global(config: OptimizerConfig) -> Result<&'static SessionRegistry> {
    let registry = SessionRegistry::new(config)?;
    GLOBAL
        .set(registry)
        .map_err(|_| OptimizerError::InvalidConfig("global session registry already installed".into()))?;
    GLOBAL
        .get()
        .ok_or_else(|| OptimizerError::InvalidConfig("global session registry missing after install".into()))
}

/// The process-wide registry, if installed.
pub fn global() -> Option<&'static SessionRegistry> {
    GLOBAL.get()
}
