//! Engine configuration loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use assessor_core::engine::EngineConfig;

/// Top-level assessor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessorConfig {
    /// Max assessments evaluated at once in a batch.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Scales with more factors than this are scored concurrently.
    #[serde(default = "default_concurrent_threshold")]
    pub concurrent_threshold: usize,
    /// Answer-scoring workers; 0 sizes the pool from the task count.
    #[serde(default)]
    pub scoring_workers: usize,
    /// Factor-interpretation workers; 0 sizes the pool from the task count.
    #[serde(default)]
    pub interpret_workers: usize,
    /// Cancel a batch after this many milliseconds. `None` never times out.
    #[serde(default)]
    pub batch_timeout_ms: Option<u64>,
}

fn default_parallelism() -> usize {
    4
}
fn default_concurrent_threshold() -> usize {
    10
}

impl Default for AssessorConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            concurrent_threshold: default_concurrent_threshold(),
            scoring_workers: 0,
            interpret_workers: 0,
            batch_timeout_ms: None,
        }
    }
}

impl AssessorConfig {
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            scoring_workers: self.scoring_workers,
            interpret_workers: self.interpret_workers,
            batch_parallelism: self.parallelism.max(1),
            concurrent_threshold: self.concurrent_threshold,
        }
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `assessor.toml` in the current directory
/// 2. `~/.config/assessor/config.toml`
///
/// Environment variable overrides: `ASSESSOR_PARALLELISM`,
/// `ASSESSOR_CONCURRENT_THRESHOLD`.
pub fn load_config() -> Result<AssessorConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AssessorConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("assessor.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => parse_config(&path)?,
        None => AssessorConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

fn parse_config(path: &Path) -> Result<AssessorConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let config = toml::from_str::<AssessorConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))?;
    tracing::debug!("loaded config from {}", path.display());
    Ok(config)
}

fn apply_env_overrides(
    config: &mut AssessorConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(value) = lookup("ASSESSOR_PARALLELISM") {
        config.parallelism = value
            .trim()
            .parse()
            .with_context(|| format!("invalid ASSESSOR_PARALLELISM: {value}"))?;
    }
    if let Some(value) = lookup("ASSESSOR_CONCURRENT_THRESHOLD") {
        config.concurrent_threshold = value
            .trim()
            .parse()
            .with_context(|| format!("invalid ASSESSOR_CONCURRENT_THRESHOLD: {value}"))?;
    }
    Ok(())
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("assessor"))
}
