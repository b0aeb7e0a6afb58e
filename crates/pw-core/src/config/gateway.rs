//! Gateway daemon configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};
use crate::error::ConfigError;

/// Default number of concurrent streams per session
pub const DEFAULT_MAX_STREAMS: usize = 64;

/// Configuration for the gateway daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address to accept user connections on
    pub bind_address: String,

    /// How long a new connection has to send its `select` instruction
    #[serde(with = "duration_secs")]
    pub select_timeout: Duration,

    /// How often attached users' input loops wake to check session state
    #[serde(with = "duration_millis")]
    pub user_poll_interval: Duration,

    /// Queue depth of each backend's control channel
    pub control_channel_capacity: usize,

    /// Optional PID file written while the daemon runs
    pub pid_file: Option<PathBuf>,

    /// Per-session resource limits
    pub session: SessionLimits,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:4822".to_string(),
            select_timeout: Duration::from_secs(15),
            user_poll_interval: Duration::from_millis(1000),
            control_channel_capacity: 32,
            pid_file: None,
            session: SessionLimits::default(),
        }
    }
}

impl GatewayConfig {
    /// Check values that would make the daemon unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.select_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "select_timeout must be greater than zero".to_string(),
            ));
        }
        if self.user_poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "user_poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.control_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "control_channel_capacity must be greater than zero".to_string(),
            ));
        }
        self.session.validate()
    }
}

/// Resource limits applied to every client session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    /// Size of the fixed stream tables
    pub max_streams: usize,

    /// Maximum simultaneously allocated layers (unbounded if unset)
    pub max_layers: Option<usize>,

    /// Maximum simultaneously allocated buffers (unbounded if unset)
    pub max_buffers: Option<usize>,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_streams: DEFAULT_MAX_STREAMS,
            max_layers: None,
            max_buffers: None,
        }
    }
}

impl SessionLimits {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_streams == 0 {
            return Err(ConfigError::Invalid(
                "session.max_streams must be greater than zero".to_string(),
            ));
        }
        if self.max_layers == Some(0) || self.max_buffers == Some(0) {
            return Err(ConfigError::Invalid(
                "session layer and buffer limits must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.select_timeout, Duration::from_micros(15_000_000));
        assert_eq!(config.session.max_streams, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            select_timeout = 5

            [session]
            max_layers = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.select_timeout, Duration::from_secs(5));
        assert_eq!(config.session.max_layers, Some(10));
        assert_eq!(config.session.max_streams, DEFAULT_MAX_STREAMS);
        assert_eq!(config.bind_address, "127.0.0.1:4822");
    }

    #[test]
    fn test_validate_rejects_zero_streams() {
        let mut config = GatewayConfig::default();
        config.session.max_streams = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = GatewayConfig {
            select_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
