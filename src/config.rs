//! Startup configuration, read once from a TOML file and shared read-only by
//! every transaction for the lifetime of the process.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Where the relay listens for inbound submissions.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// The upstream server every accepted transaction is replayed to.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub smtp_auth: bool,
    #[serde(default)]
    pub smtp_auth_user: Option<String>,
    #[serde(default)]
    pub smtp_auth_password: Option<String>,
    /// TLS from the first byte of the connection.
    #[serde(default)]
    pub use_ssl: bool,
    /// Upgrade a plain connection with STARTTLS after the greeting.
    #[serde(default)]
    pub starttls: bool,
}

/// Bounds on the outbound exchange. The upstream server is not under our
/// control, so every connect and command round-trip gets a deadline.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
    #[serde(default = "default_command_secs")]
    pub command_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    25
}

const fn default_connect_secs() -> u64 {
    30
}

const fn default_command_secs() -> u64 {
    300
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            command_secs: default_command_secs(),
        }
    }
}

impl Config {
    /// Loads and validates the configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file is absent, unreadable, not valid
    /// TOML, or internally inconsistent. Every case is fatal to startup.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let config: Self = toml::from_str(&std::fs::read_to_string(path)?)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.smtp_auth {
            if self.remote.smtp_auth_user.is_none() {
                return Err(ConfigError::MissingField("remote.smtp_auth_user"));
            }
            if self.remote.smtp_auth_password.is_none() {
                return Err(ConfigError::MissingField("remote.smtp_auth_password"));
            }
        }

        if self.remote.use_ssl && self.remote.starttls {
            return Err(ConfigError::InvalidConfiguration {
                field: "remote.starttls",
                reason: "STARTTLS cannot be issued over an implicit TLS connection",
            });
        }

        Ok(())
    }
}

impl LocalConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl RemoteConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The credentials to authenticate with, when authentication is enabled.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if !self.smtp_auth {
            return None;
        }

        match (&self.smtp_auth_user, &self.smtp_auth_password) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        }
    }
}
