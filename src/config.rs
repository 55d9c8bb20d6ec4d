//! Host configuration parsed from environment variables.

use std::time::Duration;

use crate::panel::{PanelOptions, PanelProps};
use crate::state::scroll::DEFAULT_SCROLL_DURATION_MS;

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_TERMINAL_WIDTH: usize = 80;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required env var {var}")]
    Missing { var: &'static str },
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub props: PanelProps,
    pub options: PanelOptions,
    pub terminal_width: usize,
}

impl HostConfig {
    /// Build typed host config from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`
    /// - `CHAT_ROOM_ID`, `CHAT_USER_ID`, `CHAT_OWNER_ID`
    ///
    /// Optional:
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `CHAT_SCROLL_DURATION_MS`: default 200
    /// - `CHAT_WIDTH`: terminal columns, default 80
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for missing required vars or unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing { var })
        };

        let database_url = required("DATABASE_URL")?;
        let props = PanelProps {
            owner_id: required("CHAT_OWNER_ID")?,
            room_id: required("CHAT_ROOM_ID")?,
            user_id: required("CHAT_USER_ID")?,
        };

        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;
        let scroll_ms = parse_or(&lookup, "CHAT_SCROLL_DURATION_MS", DEFAULT_SCROLL_DURATION_MS)?;
        let terminal_width = parse_or(&lookup, "CHAT_WIDTH", DEFAULT_TERMINAL_WIDTH)?;

        Ok(Self {
            database_url,
            db_max_connections,
            props,
            options: PanelOptions { scroll_duration: Duration::from_millis(scroll_ms) },
            terminal_width,
        })
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
