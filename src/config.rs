//! Engine Configuration
//!
//! Defaults match production tuning; every knob can be overridden from the
//! environment (`BINGO_*`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Per-session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum seated players.
    pub capacity: usize,
    /// Players needed to start the countdown.
    pub min_players: usize,
    /// Countdown before the first call.
    pub countdown: Duration,
    /// Shortest gap between calls.
    pub call_interval_min: Duration,
    /// Longest gap between calls.
    pub call_interval_max: Duration,
    /// Delay between a game finishing and its replacement opening.
    pub cooldown: Duration,
    /// Broadcast channel depth per session.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: crate::DEFAULT_CAPACITY,
            min_players: crate::DEFAULT_MIN_PLAYERS,
            countdown: Duration::from_secs(30),
            call_interval_min: Duration::from_secs(3),
            call_interval_max: Duration::from_secs(5),
            cooldown: Duration::from_secs(10),
            event_buffer: 256,
        }
    }
}

impl SessionConfig {
    /// Reject settings that would make sessions unplayable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_players == 0 {
            return Err(ConfigError::Invalid("min_players must be at least 1".into()));
        }
        if self.min_players > self.capacity {
            return Err(ConfigError::Invalid(format!(
                "min_players ({}) exceeds capacity ({})",
                self.min_players, self.capacity
            )));
        }
        if self.call_interval_min > self.call_interval_max {
            return Err(ConfigError::Invalid(
                "call_interval_min exceeds call_interval_max".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid("event_buffer must be positive".into()));
        }
        Ok(())
    }
}

/// Transport adapter settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Append finished games here as JSON lines. In-memory when unset.
    pub results_path: Option<PathBuf>,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            results_path: None,
            version: crate::VERSION.to_string(),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Session tuning.
    pub session: SessionConfig,
    /// Transport settings.
    pub server: ServerConfig,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Variable present but unparsable.
    #[error("invalid value for {var}: {value:?}")]
    Parse {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// Values parse but conflict.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl EngineConfig {
    /// Load from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = EngineConfig::default();

        if let Some(addr) = parse_var(&lookup, "BINGO_BIND_ADDR")? {
            config.server.bind_addr = addr;
        }
        if let Some(max) = parse_var(&lookup, "BINGO_MAX_CONNECTIONS")? {
            config.server.max_connections = max;
        }
        config.server.results_path = lookup("BINGO_RESULTS_PATH").map(PathBuf::from);

        let session = &mut config.session;
        if let Some(capacity) = parse_var(&lookup, "BINGO_CAPACITY")? {
            session.capacity = capacity;
        }
        if let Some(min) = parse_var(&lookup, "BINGO_MIN_PLAYERS")? {
            session.min_players = min;
        }
        if let Some(secs) = parse_var(&lookup, "BINGO_COUNTDOWN_SECS")? {
            session.countdown = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var(&lookup, "BINGO_CALL_INTERVAL_MIN_MS")? {
            session.call_interval_min = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "BINGO_CALL_INTERVAL_MAX_MS")? {
            session.call_interval_max = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var(&lookup, "BINGO_COOLDOWN_SECS")? {
            session.cooldown = Duration::from_secs(secs);
        }

        config.session.validate()?;
        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Parse { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.session.capacity, 50);
        assert_eq!(config.session.min_players, 3);
        assert_eq!(config.session.countdown, Duration::from_secs(30));
        assert_eq!(config.session.cooldown, Duration::from_secs(10));
        assert_eq!(config.server.max_connections, 1000);
        assert!(config.server.results_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("BINGO_CAPACITY", "10"),
            ("BINGO_MIN_PLAYERS", "2"),
            ("BINGO_CALL_INTERVAL_MIN_MS", "100"),
            ("BINGO_CALL_INTERVAL_MAX_MS", "200"),
            ("BINGO_BIND_ADDR", "127.0.0.1:9000"),
            ("BINGO_RESULTS_PATH", "/tmp/results.jsonl"),
        ]))
        .unwrap();
        assert_eq!(config.session.capacity, 10);
        assert_eq!(config.session.min_players, 2);
        assert_eq!(config.session.call_interval_max, Duration::from_millis(200));
        assert_eq!(config.server.bind_addr.port(), 9000);
        assert_eq!(config.server.results_path, Some(PathBuf::from("/tmp/results.jsonl")));
    }

    #[test]
    fn test_parse_error_names_variable() {
        let err = EngineConfig::from_lookup(lookup(&[("BINGO_CAPACITY", "lots")])).unwrap_err();
        assert!(err.to_string().contains("BINGO_CAPACITY"));
    }

    #[test]
    fn test_conflicting_values() {
        let err = EngineConfig::from_lookup(lookup(&[
            ("BINGO_CAPACITY", "2"),
            ("BINGO_MIN_PLAYERS", "3"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config = SessionConfig {
            call_interval_min: Duration::from_secs(6),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
