//! Engine configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DIRECTORY_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_TICK_MS: u64 = 16;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base URL of the session directory.
    pub directory_url: String,
    /// Broadcast tick period.
    pub tick_period: Duration,
    /// Longest wait for the handshake frame after connecting.
    pub handshake_timeout: Duration,
    /// Draw an overlay for this client's own member record.
    pub draw_self: bool,
    /// Where rejoin tokens are persisted; `None` keeps them in memory.
    pub state_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            directory_url: DEFAULT_DIRECTORY_URL.to_owned(),
            tick_period: Duration::from_millis(DEFAULT_TICK_MS),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            draw_self: false,
            state_file: None,
        }
    }
}

impl EngineConfig {
    /// Build config from the process environment.
    ///
    /// Optional:
    /// - `COBROWSE_DIRECTORY_URL`: default `http://127.0.0.1:3000`
    /// - `COBROWSE_TICK_MS`: default 16, must be positive
    /// - `COBROWSE_HANDSHAKE_TIMEOUT_MS`: default 10000, must be positive
    /// - `COBROWSE_DRAW_SELF`: `true`/`false`/`1`/`0`, default false
    /// - `COBROWSE_STATE_FILE`: path of the persisted state file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for values that do not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| match std::env::var(key) {
            Ok(value) => Some(value),
            Err(_) => None,
        })
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for values that do not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let directory_url = lookup("COBROWSE_DIRECTORY_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.directory_url);
        let tick_ms = positive_millis(&lookup, "COBROWSE_TICK_MS", DEFAULT_TICK_MS)?;
        let handshake_ms = positive_millis(&lookup, "COBROWSE_HANDSHAKE_TIMEOUT_MS", DEFAULT_HANDSHAKE_TIMEOUT_MS)?;
        let draw_self = match lookup("COBROWSE_DRAW_SELF") {
            None => defaults.draw_self,
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid { key: "COBROWSE_DRAW_SELF", value: raw })?,
        };
        let state_file = lookup("COBROWSE_STATE_FILE").filter(|v| !v.is_empty()).map(PathBuf::from);

        Ok(Self {
            directory_url,
            tick_period: Duration::from_millis(tick_ms),
            handshake_timeout: Duration::from_millis(handshake_ms),
            draw_self,
            state_file,
        })
    }
}

fn env_parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn positive_millis(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let value = env_parse(lookup, key, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid { key, value: value.to_string() });
    }
    Ok(value)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
