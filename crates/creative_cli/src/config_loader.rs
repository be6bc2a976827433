use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use prediction_service::EngineConfig;

pub const CONFIG_PATH_ENV: &str = "CREATIVE_SIGNALS_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "configs/engine.toml";

/// Clap folds [`CONFIG_PATH_ENV`] into `cli_path`; without either the repo
/// default applies.
pub fn engine_config_path(cli_path: Option<&Path>) -> PathBuf {
    cli_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// A missing file means built-in defaults; a present but invalid file is an error.
pub async fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(EngineConfig::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read config {}", path.display()));
        }
    };
    let cfg = EngineConfig::from_toml_str(&raw)
        .with_context(|| format!("parse config {}", path.display()))?;
    tracing::info!(path = %path.display(), "engine config loaded");
    Ok(cfg)
}
