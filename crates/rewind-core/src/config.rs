// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

/// Default upper bound on invocation cycles a driver performs.
pub const DEFAULT_MAX_INVOCATIONS: u32 = 1000;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// SQLite URL or file path for the checkpoint store; `None` keeps the log in memory
    pub database_url: Option<String>,
    /// Drop DurableLogger calls made while replaying
    pub suppress_replay_logs: bool,
    /// Invocation cycles a driver performs before giving up
    pub max_invocations: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            suppress_replay_logs: true,
            max_invocations: DEFAULT_MAX_INVOCATIONS,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `REWIND_DATABASE_URL`: SQLite URL or path (default: in-memory store)
    /// - `REWIND_SUPPRESS_REPLAY_LOGS`: `true`/`false`/`1`/`0` (default: true)
    /// - `REWIND_MAX_INVOCATIONS`: positive integer (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("REWIND_DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let suppress_replay_logs = match std::env::var("REWIND_SUPPRESS_REPLAY_LOGS") {
            Ok(value) => parse_bool(&value).ok_or(ConfigError::Invalid(
                "REWIND_SUPPRESS_REPLAY_LOGS",
                "must be true, false, 1 or 0",
            ))?,
            Err(_) => true,
        };

        let max_invocations: u32 = std::env::var("REWIND_MAX_INVOCATIONS")
            .unwrap_or_else(|_| DEFAULT_MAX_INVOCATIONS.to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "REWIND_MAX_INVOCATIONS",
                "must be a positive integer",
            ))?;

        Ok(Self {
            database_url,
            suppress_replay_logs,
            max_invocations,
        })
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_replay_log_suppression(mut self, enabled: bool) -> Self {
        self.suppress_replay_logs = enabled;
        self
    }

    pub fn with_max_invocations(mut self, max_invocations: u32) -> Self {
        self.max_invocations = max_invocations;
        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
