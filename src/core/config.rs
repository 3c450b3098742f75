//! Configuration system: TOML file + env var overrides + fixture defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{FixtureError, Result};
use crate::driver::quirks::QuirkConfig;

/// Full fixture configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub fixture: FixtureConfig,
    pub timing: TimingConfig,
    pub quirks: QuirkConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    /// Where this config was loaded from (not serialized back out).
    #[serde(skip)]
    pub config_file: PathBuf,
}

/// Fixture tree location and optional pre/post-run directory handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FixtureConfig {
    /// Parent of the `"<job> - Start"`, `"- Pass"`, `"- Fail"`, `"- None"` subtrees.
    pub test_root: PathBuf,
    /// Delete and recreate the staging directory before setup.
    pub reset_staging: bool,
    /// When set, the staging directory is copied to `<archive_dir>/<job>` after completion.
    pub archive_dir: Option<PathBuf>,
}

/// Deliberate synchronous pauses that simulate the tool's processing latency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub setup_delay_ms: u64,
    pub step_delay_ms: u64,
    pub result_delay_min_ms: u64,
    pub result_delay_max_ms: u64,
}

/// Socket tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Size of the per-read buffer; one read is treated as one message.
    pub read_buffer_bytes: usize,
}

/// Activity log and console echo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub activity_log: PathBuf,
    pub console: bool,
    pub channel_capacity: usize,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            test_root: data_dir().join("test"),
            reset_staging: false,
            archive_dir: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            setup_delay_ms: 5_000,
            step_delay_ms: 1_000,
            result_delay_min_ms: 2_000,
            result_delay_max_ms: 12_000,
        }
    }
}

impl TimingConfig {
    /// All delays zeroed.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            setup_delay_ms: 0,
            step_delay_ms: 0,
            result_delay_min_ms: 0,
            result_delay_max_ms: 0,
        }
    }

    #[must_use]
    pub fn setup_delay(&self) -> Duration {
        Duration::from_millis(self.setup_delay_ms)
    }

    #[must_use]
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_buffer_bytes: 256,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            activity_log: data_dir().join("activity.jsonl"),
            console: true,
            channel_capacity: 1024,
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[MDL-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn data_dir() -> PathBuf {
    home_dir()
        .join(".local")
        .join("share")
        .join("modeler-fixture")
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        home_dir()
            .join(".config")
            .join("modeler-fixture")
            .join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| FixtureError::Io {
                path: path_buf.clone(),
                source,
            })?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(FixtureError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic FNV-1a hash of the effective config, logged at startup.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("MDLR_TEST_ROOT") {
            self.fixture.test_root = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("MDLR_RESET_STAGING") {
            self.fixture.reset_staging = parse_env_bool("MDLR_RESET_STAGING", &raw)?;
        }

        for (name, slot) in [
            ("MDLR_SETUP_DELAY_MS", &mut self.timing.setup_delay_ms),
            ("MDLR_STEP_DELAY_MS", &mut self.timing.step_delay_ms),
            ("MDLR_RESULT_DELAY_MIN_MS", &mut self.timing.result_delay_min_ms),
            ("MDLR_RESULT_DELAY_MAX_MS", &mut self.timing.result_delay_max_ms),
        ] {
            if let Some(raw) = lookup(name) {
                *slot = parse_env_u64(name, &raw)?;
            }
        }

        for (name, slot) in [
            ("MDLR_SKIP_SEND_ONE_IN", &mut self.quirks.skip_send_one_in),
            (
                "MDLR_COMBINED_MESSAGE_ONE_IN",
                &mut self.quirks.combined_message_one_in,
            ),
            ("MDLR_OMIT_RESULT_ONE_IN", &mut self.quirks.omit_result_one_in),
            ("MDLR_FAIL_RESULT_ONE_IN", &mut self.quirks.fail_result_one_in),
        ] {
            if let Some(raw) = lookup(name) {
                *slot = parse_env_u32(name, &raw)?;
            }
        }
        if let Some(raw) = lookup("MDLR_QUIRK_SEED") {
            self.quirks.seed = Some(parse_env_u64("MDLR_QUIRK_SEED", &raw)?);
        }

        if let Some(raw) = lookup("MDLR_ACTIVITY_LOG") {
            self.logging.activity_log = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("MDLR_CONSOLE") {
            self.logging.console = parse_env_bool("MDLR_CONSOLE", &raw)?;
        }

        Ok(())
    }

    /// Check cross-field invariants. Called by `load`; callers that mutate a
    /// loaded config (CLI overrides) should call it again.
    pub fn validate(&self) -> Result<()> {
        self.quirks.validate()?;

        if self.timing.result_delay_min_ms > self.timing.result_delay_max_ms {
            return Err(FixtureError::InvalidConfig {
                details: format!(
                    "timing.result_delay_min_ms ({}) must be <= timing.result_delay_max_ms ({})",
                    self.timing.result_delay_min_ms, self.timing.result_delay_max_ms
                ),
            });
        }

        if !(16..=65_536).contains(&self.server.read_buffer_bytes) {
            return Err(FixtureError::InvalidConfig {
                details: format!(
                    "server.read_buffer_bytes must be in [16, 65536], got {}",
                    self.server.read_buffer_bytes
                ),
            });
        }

        if self.logging.channel_capacity == 0 {
            return Err(FixtureError::InvalidConfig {
                details: "logging.channel_capacity must be >= 1".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(FixtureError::InvalidConfig {
            details: format!("{name} must be a boolean, got {raw:?}"),
        }),
    }
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| FixtureError::InvalidConfig {
            details: format!("{name} must be an unsigned integer, got {raw:?}: {e}"),
        })
}

fn parse_env_u32(name: &str, raw: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|e| FixtureError::InvalidConfig {
            details: format!("{name} must be an unsigned integer, got {raw:?}: {e}"),
        })
}
