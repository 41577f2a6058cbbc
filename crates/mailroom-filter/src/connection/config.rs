//! Connection configuration types.

use std::time::Duration;

use crate::command::FilterParams;

/// Default filter service port.
pub const DEFAULT_PORT: u16 = 5555;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plain TCP. The protocol itself is plaintext; this is the common
    /// mode for a filter service on a private network.
    #[default]
    None,
    /// TLS from the start, for deployments that front the service with a
    /// TLS terminator.
    Tls,
}

/// Filter service connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Service hostname.
    pub host: String,
    /// Service port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Bloom parameters sent as the handshake line.
    pub params: FilterParams,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Per-command response timeout.
    pub command_timeout: Duration,
    /// How long to listen for a handshake rejection before reporting the
    /// connection ready. The service is silent on an accepted
    /// configuration.
    pub handshake_grace: Duration,
}

impl Config {
    /// Creates a configuration with default port and timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>, params: FilterParams) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            security: Security::None,
            params,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(5),
            handshake_grace: Duration::from_millis(250),
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>, params: FilterParams) -> ConfigBuilder {
        ConfigBuilder::new(host, params)
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname and bloom parameters.
    #[must_use]
    pub fn new(host: impl Into<String>, params: FilterParams) -> Self {
        Self {
            config: Config::new(host, params),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.config.security = security;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the per-command response timeout.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Sets the handshake rejection grace window.
    #[must_use]
    pub const fn handshake_grace(mut self, grace: Duration) -> Self {
        self.config.handshake_grace = grace;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new_defaults() {
        let params = FilterParams::new(1024, vec![3, 5]).unwrap();
        let config = Config::new("filter.internal", params);
        assert_eq!(config.host, "filter.internal");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.security, Security::None);
        assert_eq!(config.command_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_config_builder() {
        let params = FilterParams::new(8, vec![1, 2]).unwrap();
        let config = Config::builder("localhost", params)
            .port(9000)
            .security(Security::Tls)
            .connect_timeout(Duration::from_secs(3))
            .command_timeout(Duration::from_secs(4))
            .handshake_grace(Duration::from_millis(100))
            .build();

        assert_eq!(config.port, 9000);
        assert_eq!(config.security, Security::Tls);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.command_timeout, Duration::from_secs(4));
        assert_eq!(config.handshake_grace, Duration::from_millis(100));
        assert_eq!(config.params.handshake_line(), b"8 1 2\n");
    }
}
