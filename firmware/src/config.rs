//! Station configuration.
//!
//! Every value has a default matching the shipped board. Values can be
//! overridden from a JSON file or from `TAGDISPLAY_*` environment variables.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::leds::BlinkPattern;
use crate::nfc::{DEFAULT_KEY_A, DEFAULT_KEY_B, MifareKey};
use crate::station::RestartPolicy;

pub const ENV_POLL_INTERVAL_MS: &str = "TAGDISPLAY_POLL_INTERVAL_MS";
pub const ENV_BACKOFF_MS: &str = "TAGDISPLAY_BACKOFF_MS";
pub const ENV_RESTART_POLICY: &str = "TAGDISPLAY_RESTART_POLICY";
pub const ENV_KEY_A: &str = "TAGDISPLAY_KEY_A";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Sleep between poll cycles
    pub poll_interval_ms: u64,
    /// Wait before retrying a task start on a busy secondary core
    pub executor_backoff_ms: u64,
    pub key_a: MifareKey,
    /// Carried for completeness; reads only ever authenticate with key A.
    pub key_b: MifareKey,
    pub error_blink: BlinkPattern,
    pub success_blink: BlinkPattern,
    /// Step of the power-on LED sequence
    pub self_test_step_ms: u64,
    pub restart_policy: RestartPolicy,
    pub display: DisplayConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            executor_backoff_ms: 1000,
            key_a: DEFAULT_KEY_A,
            key_b: DEFAULT_KEY_B,
            error_blink: BlinkPattern::default(),
            success_blink: BlinkPattern::default(),
            self_test_step_ms: 50,
            restart_policy: RestartPolicy::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl StationConfig {
    /// Defaults, overridden by the `TAGDISPLAY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, ENV_POLL_INTERVAL_MS)? {
            config.poll_interval_ms = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_BACKOFF_MS)? {
            config.executor_backoff_ms = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_RESTART_POLICY)? {
            config.restart_policy = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_KEY_A)? {
            config.key_a = v;
        }

        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn executor_backoff(&self) -> Duration {
        Duration::from_millis(self.executor_backoff_ms)
    }

    pub fn self_test_step(&self) -> Duration {
        Duration::from_millis(self.self_test_step_ms)
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
    }
}

/// Character LCD geometry and timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Characters per line
    pub width: usize,
    /// Time each scroll window stays on screen
    pub scroll_step_ms: u64,
    /// Time text that fits stays on screen
    pub static_hold_ms: u64,
    /// How many times long text scrolls through
    pub scroll_passes: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 16,
            scroll_step_ms: 500,
            static_hold_ms: 2000,
            scroll_passes: 1,
        }
    }
}

impl DisplayConfig {
    pub fn scroll_step(&self) -> Duration {
        Duration::from_millis(self.scroll_step_ms)
    }

    pub fn static_hold(&self) -> Duration {
        Duration::from_millis(self.static_hold_ms)
    }
}
