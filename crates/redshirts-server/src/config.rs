//! Server configuration loaded from environment variables.
//!
//! Everything except the retention pair has a default suitable for local
//! development. `MESSAGE_RETENTION_SECS` and `SCAVENGE_INTERVAL_SECS` must be
//! set explicitly; startup fails without them.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:1204`
    pub http_addr: SocketAddr,

    /// Path of the SQLite message database.
    /// Env: `DATABASE_PATH`
    /// Default: `./messages.db`
    pub database_path: PathBuf,

    /// Base URL of the lobby membership service.
    /// Env: `LOBBY_SERVICE_URL`
    /// Default: `http://theredshirts-lobby:1203`
    pub lobby_service_url: String,

    /// Timeout for a single call to the lobby service.
    /// Env: `LOBBY_TIMEOUT_SECS`
    /// Default: 5 seconds.
    pub lobby_timeout: Duration,

    /// Bearer token that identifies the lobby service as the system
    /// principal. `None` disables system-only endpoints.
    /// Env: `SERVICE_TOKEN`
    pub service_token: Option<String>,

    /// Messages older than this are purged by the scavenger.
    /// Env: `MESSAGE_RETENTION_SECS` (required)
    pub retention: Duration,

    /// Interval between two scavenger sweeps.
    /// Env: `SCAVENGE_INTERVAL_SECS` (required)
    pub scavenge_interval: Duration,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("lobby_service_url", &self.lobby_service_url)
            .field("lobby_timeout", &self.lobby_timeout)
            .field("service_token", &self.service_token.as_ref().map(|_| "<redacted>"))
            .field("retention", &self.retention)
            .field("scavenge_interval", &self.scavenge_interval)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut http_addr: SocketAddr = ([0, 0, 0, 0], 1204).into();
        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        let database_path = lookup("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./messages.db"));

        let lobby_service_url = lookup("LOBBY_SERVICE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "http://theredshirts-lobby:1203".to_string());

        let mut lobby_timeout = Duration::from_secs(5);
        if let Some(val) = lookup("LOBBY_TIMEOUT_SECS") {
            match parse_secs("LOBBY_TIMEOUT_SECS", &val) {
                Ok(timeout) => lobby_timeout = timeout,
                Err(e) => tracing::warn!(error = %e, "Invalid LOBBY_TIMEOUT_SECS, using default"),
            }
        }

        let service_token = lookup("SERVICE_TOKEN").filter(|token| !token.is_empty());

        let retention = required_secs(&lookup, "MESSAGE_RETENTION_SECS")?;
        let scavenge_interval = required_secs(&lookup, "SCAVENGE_INTERVAL_SECS")?;

        Ok(Self {
            http_addr,
            database_path,
            lobby_service_url,
            lobby_timeout,
            service_token,
            retention,
            scavenge_interval,
        })
    }
}

fn required_secs<F>(lookup: &F, name: &'static str) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name).ok_or(ConfigError::Missing(name))?;
    parse_secs(name, &value)
}

/// Parse a strictly positive number of seconds, at most `u32::MAX` so that
/// the value always fits a timestamp offset.
fn parse_secs(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason,
    };

    let secs = value
        .trim()
        .parse::<u32>()
        .map_err(|e| invalid(e.to_string()))?;
    if secs == 0 {
        return Err(invalid("must be greater than zero".to_string()));
    }
    Ok(Duration::from_secs(u64::from(secs)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    const RETENTION: [(&str, &str); 2] = [
        ("MESSAGE_RETENTION_SECS", "30"),
        ("SCAVENGE_INTERVAL_SECS", "60"),
    ];

    #[test]
    fn test_defaults_with_required_values() {
        let config = ServerConfig::from_lookup(lookup(&RETENTION)).unwrap();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 1204).into());
        assert_eq!(config.database_path, PathBuf::from("./messages.db"));
        assert_eq!(config.lobby_service_url, "http://theredshirts-lobby:1203");
        assert_eq!(config.lobby_timeout, Duration::from_secs(5));
        assert!(config.service_token.is_none());
        assert_eq!(config.retention, Duration::from_secs(30));
        assert_eq!(config.scavenge_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_retention_fails() {
        let err = ServerConfig::from_lookup(lookup(&[("SCAVENGE_INTERVAL_SECS", "60")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing("MESSAGE_RETENTION_SECS"));
    }

    #[test]
    fn test_zero_interval_fails() {
        let err = ServerConfig::from_lookup(lookup(&[
            ("MESSAGE_RETENTION_SECS", "30"),
            ("SCAVENGE_INTERVAL_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "SCAVENGE_INTERVAL_SECS",
                ..
            }
        ));
    }

    #[test]
    fn test_oversized_retention_fails() {
        let err = ServerConfig::from_lookup(lookup(&[
            ("MESSAGE_RETENTION_SECS", "18446744073709551615"),
            ("SCAVENGE_INTERVAL_SECS", "60"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "MESSAGE_RETENTION_SECS",
                ..
            }
        ));
    }

    #[test]
    fn test_overrides() {
        let mut vars = RETENTION.to_vec();
        vars.extend([
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("LOBBY_SERVICE_URL", "http://lobby.local/"),
            ("LOBBY_TIMEOUT_SECS", "2"),
            ("SERVICE_TOKEN", "secret"),
        ]);
        let config = ServerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.lobby_service_url, "http://lobby.local");
        assert_eq!(config.lobby_timeout, Duration::from_secs(2));
        assert_eq!(config.service_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_optional_values_fall_back() {
        let mut vars = RETENTION.to_vec();
        vars.extend([("HTTP_ADDR", "nope"), ("LOBBY_TIMEOUT_SECS", "soon")]);
        let config = ServerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 1204).into());
        assert_eq!(config.lobby_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_debug_redacts_token() {
        let mut vars = RETENTION.to_vec();
        vars.push(("SERVICE_TOKEN", "secret"));
        let config = ServerConfig::from_lookup(lookup(&vars)).unwrap();
        assert!(!format!("{config:?}").contains("secret"));
    }
}
