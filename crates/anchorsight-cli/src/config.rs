//! Session configuration – reads/writes `~/.anchorsight/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anchorsight_kernel::BindFailurePolicy;
use anchorsight_types::SightError;
use serde::{Deserialize, Serialize};

/// Persisted user configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQLite file holding durable world anchors.
    #[serde(default = "default_anchor_db_path")]
    pub anchor_db_path: PathBuf,

    /// Maximum number of world anchors the device accepts.
    #[serde(default = "default_anchor_capacity")]
    pub anchor_capacity: usize,

    /// What happens to an object whose anchor could not be created.
    #[serde(default)]
    pub bind_failure_policy: BindFailurePolicy,

    /// How long the demo session runs before shutting down on its own.
    #[serde(default = "default_session_seconds")]
    pub session_seconds: u64,

    /// Duration of one full left-right head sweep.
    #[serde(default = "default_sweep_period_seconds")]
    pub sweep_period_seconds: f32,
}

fn default_anchor_db_path() -> PathBuf {
    anchorsight_dir(&home_dir()).join("anchors.db")
}
fn default_anchor_capacity() -> usize {
    5
}
fn default_session_seconds() -> u64 {
    10
}
fn default_sweep_period_seconds() -> f32 {
    4.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            anchor_db_path: default_anchor_db_path(),
            anchor_capacity: default_anchor_capacity(),
            bind_failure_policy: BindFailurePolicy::default(),
            session_seconds: default_session_seconds(),
            sweep_period_seconds: default_sweep_period_seconds(),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn anchorsight_dir(home: &str) -> PathBuf {
    PathBuf::from(home).join(".anchorsight")
}

/// Return the path to `~/.anchorsight/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    anchorsight_dir(home).join("config.toml")
}

/// Load the config from disk and apply `ANCHORSIGHT_*` overrides.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load() -> Result<Option<Config>, SightError> {
    let Some(mut cfg) = load_from(&config_path())? else {
        return Ok(None);
    };
    apply_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(Some(cfg))
}

/// Defaults plus `ANCHORSIGHT_*` overrides, for runs without a config file.
pub fn defaults_with_env() -> Result<Config, SightError> {
    let mut cfg = Config::default();
    apply_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, SightError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| SightError::Config(format!("Failed to read config at {}: {e}", path.display())))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| SightError::Config(format!("Failed to parse config: {e}")))?;
    Ok(Some(cfg))
}

/// Apply overrides looked up through `var`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ANCHORSIGHT_ANCHOR_DB` | `anchor_db_path` |
/// | `ANCHORSIGHT_ANCHOR_CAPACITY` | `anchor_capacity` |
/// | `ANCHORSIGHT_BIND_FAILURE_POLICY` | `bind_failure_policy` |
/// | `ANCHORSIGHT_SESSION_SECONDS` | `session_seconds` |
/// | `ANCHORSIGHT_SWEEP_PERIOD` | `sweep_period_seconds` |
///
/// Unparsable numbers are ignored; an unknown policy is an error.
pub fn apply_overrides(cfg: &mut Config, var: impl Fn(&str) -> Option<String>) -> Result<(), SightError> {
    if let Some(v) = var("ANCHORSIGHT_ANCHOR_DB") {
        cfg.anchor_db_path = PathBuf::from(v);
    }
    if let Some(v) = var("ANCHORSIGHT_ANCHOR_CAPACITY")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.anchor_capacity = n;
    }
    if let Some(v) = var("ANCHORSIGHT_BIND_FAILURE_POLICY") {
        cfg.bind_failure_policy = v.parse()?;
    }
    if let Some(v) = var("ANCHORSIGHT_SESSION_SECONDS")
        && let Ok(n) = v.parse::<u64>()
    {
        cfg.session_seconds = n;
    }
    if let Some(v) = var("ANCHORSIGHT_SWEEP_PERIOD")
        && let Ok(p) = v.parse::<f32>()
        && p > 0.0
    {
        cfg.sweep_period_seconds = p;
    }
    Ok(())
}

/// Save the config to disk, creating `~/.anchorsight/` if necessary.
pub fn save(cfg: &Config) -> Result<(), SightError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), SightError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SightError::Config(format!("Failed to create config directory: {e}")))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| SightError::Config(format!("Failed to serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| SightError::Config(format!("Failed to write config at {}: {e}", path.display())))
}
