use std::path::Path;

use crate::cache::store::CacheOpts;
use crate::foundation::error::{EngineError, EngineResult};
use crate::interest::pool::WorkerOpts;

/// Engine configuration. Every field has a default, so `{}` is a valid config file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Row cache settings.
    pub cache: CacheOpts,
    /// Worker pool settings.
    pub workers: WorkerOpts,
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> EngineResult<Self> {
        let cfg: Self =
            serde_json::from_str(s).map_err(|e| EngineError::config(format!("invalid JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config(format!("read '{}': {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.cache.budget_bytes == 0 {
            return Err(EngineError::config("cache.budget_bytes must be > 0"));
        }
        if self.workers.threads == Some(0) {
            return Err(EngineError::config("workers.threads must be >= 1 when set"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
