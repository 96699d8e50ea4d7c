//! Environment-derived service configuration.
//!
//! Values are read through a lookup function so that tests can supply a
//! fixed environment instead of mutating the process environment. Empty
//! values are treated as unset.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::logging::{LoggerKind, LoggingConfig};
use crate::network::config::NetworkConfig;

/// Configuration errors. All of them abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable not set: {var}")]
    NotSet { var: String },

    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Environment variable names.
pub mod vars {
    pub const PORT: &str = "PORT";
    pub const HOST: &str = "HOST";
    pub const LOGGER_TYPE: &str = "LOGGER_TYPE";
    pub const PROJECT_ID: &str = "PROJECT_ID";
    pub const RUST_LOG: &str = "RUST_LOG";
    pub const SHUTDOWN_GRACE_SECS: &str = "SHUTDOWN_GRACE_SECS";
    pub const REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";
}

/// Everything a [`ServiceInstance`](crate::network::ServiceInstance) needs at construction.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service name, attached to every log line as `app`.
    pub service_name: String,
    /// Service version, announced at startup.
    pub version: String,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Builds a configuration with defaults and console logging.
    #[must_use]
    pub fn new(service_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            version: version.into(),
            network: NetworkConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a value cannot be parsed or if `GCP`
    /// logging is selected without `PROJECT_ID`.
    pub fn from_env(
        service_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::from_lookup(service_name, version, |var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`ServiceConfig::from_env`].
    pub fn from_lookup<F>(
        service_name: impl Into<String>,
        version: impl Into<String>,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.is_empty());
        let mut config = Self::new(service_name, version);

        if let Some(host) = get(vars::HOST) {
            config.network.host = host;
        }
        if let Some(port) = parse_var::<u16>(vars::PORT, get(vars::PORT))? {
            config.network.port = port;
        }
        if let Some(secs) = parse_var::<u64>(vars::SHUTDOWN_GRACE_SECS, get(vars::SHUTDOWN_GRACE_SECS))? {
            config.network.shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(vars::REQUEST_TIMEOUT_SECS, get(vars::REQUEST_TIMEOUT_SECS))? {
            config.network.request_timeout = Duration::from_secs(secs);
        }

        if let Some(kind) = parse_var::<LoggerKind>(vars::LOGGER_TYPE, get(vars::LOGGER_TYPE))? {
            config.logging.kind = kind;
        }
        config.logging.project_id = get(vars::PROJECT_ID);
        if let Some(filter) = get(vars::RUST_LOG) {
            config.logging.filter = filter;
        }
        if config.logging.kind == LoggerKind::Gcp && config.logging.project_id.is_none() {
            return Err(ConfigError::NotSet {
                var: vars::PROJECT_ID.to_string(),
            });
        }

        Ok(config)
    }
}

fn parse_var<T>(var: &str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|err| ConfigError::InvalidValue {
                var: var.to_string(),
                message: format!("{raw:?}: {err}"),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var: &str| env.get(var).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = ServiceConfig::from_lookup("app", "1", lookup(&[])).unwrap();
        assert_eq!(config.service_name, "app");
        assert_eq!(config.network.port, 8080);
        assert_eq!(config.network.shutdown_grace, Duration::from_secs(10));
        assert_eq!(config.logging.kind, LoggerKind::Console);
        assert!(config.logging.project_id.is_none());
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config =
            ServiceConfig::from_lookup("app", "1", lookup(&[("PORT", ""), ("LOGGER_TYPE", "")]))
                .unwrap();
        assert_eq!(config.network.port, 8080);
        assert_eq!(config.logging.kind, LoggerKind::Console);
    }

    #[test]
    fn reads_port_and_timeouts() {
        let config = ServiceConfig::from_lookup(
            "app",
            "1",
            lookup(&[
                ("PORT", "9090"),
                ("HOST", "127.0.0.1"),
                ("SHUTDOWN_GRACE_SECS", "3"),
                ("REQUEST_TIMEOUT_SECS", "7"),
            ]),
        )
        .unwrap();
        assert_eq!(config.network.bind_addr(), "127.0.0.1:9090");
        assert_eq!(config.network.shutdown_grace, Duration::from_secs(3));
        assert_eq!(config.network.request_timeout, Duration::from_secs(7));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = ServiceConfig::from_lookup("app", "1", lookup(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "PORT"));
    }

    #[test]
    fn gcp_logging_reads_project_id() {
        let config = ServiceConfig::from_lookup(
            "app",
            "1",
            lookup(&[("LOGGER_TYPE", "GCP"), ("PROJECT_ID", "demo-project")]),
        )
        .unwrap();
        assert_eq!(config.logging.kind, LoggerKind::Gcp);
        assert_eq!(config.logging.project_id.as_deref(), Some("demo-project"));
    }

    #[test]
    fn gcp_logging_without_project_is_fatal() {
        let err = ServiceConfig::from_lookup("app", "1", lookup(&[("LOGGER_TYPE", "GCP")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotSet { ref var } if var == "PROJECT_ID"));
    }

    #[test]
    fn unknown_logger_type_is_rejected() {
        let err = ServiceConfig::from_lookup("app", "1", lookup(&[("LOGGER_TYPE", "syslog")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "LOGGER_TYPE"));
    }
}
