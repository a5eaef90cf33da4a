use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable naming a config file to load.
pub const CONFIG_ENV: &str = "KILN_CONFIG";

/// Largest delta a single frame may report, in seconds.
pub const DEFAULT_MAX_DELTA_SECONDS: f64 = 0.05;

/// Shell configuration loaded from `kiln.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellConfig {
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Frame clock tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClockConfig {
    /// Upper clamp on the per-frame delta, so a stalled or backgrounded host
    /// never hands a huge catch-up step to consumers.
    #[serde(default = "default_max_delta")]
    pub max_delta_seconds: f64,
    /// Catch and log a panicking tick callback instead of unwinding out of
    /// the frame.
    #[serde(default = "default_true")]
    pub isolate_faults: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            max_delta_seconds: DEFAULT_MAX_DELTA_SECONDS,
            isolate_faults: true,
        }
    }
}

/// Logging subsystem settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when neither `KILN_LOG` nor `RUST_LOG`
    /// is set.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Overrides the platform log directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Rolled log files older than this are removed at startup.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    /// Capacity of the in-memory ring buffer handed to the host.
    #[serde(default = "default_console_lines")]
    pub console_lines: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            directory: None,
            retention_days: default_retention_days(),
            console_lines: default_console_lines(),
        }
    }
}

fn default_max_delta() -> f64 {
    DEFAULT_MAX_DELTA_SECONDS
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "info".to_string()
}

fn default_retention_days() -> u64 {
    7
}

fn default_console_lines() -> usize {
    1000
}

impl ShellConfig {
    /// Parse and validate config TOML.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse shell config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read shell config at {}", path.display()))?;

        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid shell config at {}", path.display()))
    }

    /// Load from the path in `KILN_CONFIG`, or fall back to defaults.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::from_path(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    /// Validate semantic constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let max = self.clock.max_delta_seconds;
        if !max.is_finite() || max <= 0.0 {
            bail!("clock.max_delta_seconds must be a positive number, got {max}");
        }
        if self.logging.filter.trim().is_empty() {
            bail!("logging.filter must not be empty");
        }
        if self.logging.console_lines == 0 {
            bail!("logging.console_lines must be at least 1");
        }
        Ok(())
    }
}
