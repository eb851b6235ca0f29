//! `ensemble.toml` loading.
//!
//! The file holds a single `[orchestrator]` table whose keys mirror
//! [`OrchestratorConfig`]. Every key is optional, and so is the table.

use ensemble_core::{EnsembleError, EnsembleResult};
use ensemble_orchestrator::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parsed contents of `ensemble.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnsembleConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Read, parse and validate a TOML config file.
pub fn parse_config(path: &Path) -> EnsembleResult<EnsembleConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        EnsembleError::Config(format!("Failed to read config '{}': {e}", path.display()))
    })?;
    let config: EnsembleConfig = toml::from_str(&content).map_err(|e| {
        EnsembleError::Config(format!("Failed to parse config '{}': {e}", path.display()))
    })?;
    config.orchestrator.validate()?;
    Ok(config)
}

/// Like [`parse_config`], but a missing file yields the defaults.
pub fn load_or_default(path: &Path) -> EnsembleResult<EnsembleConfig> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "No config file, using defaults");
        return Ok(EnsembleConfig::default());
    }
    parse_config(path)
}
