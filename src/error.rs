//! Error types shared across the relay.

use std::io;

use thiserror::Error;

/// Errors raised while loading or validating the configuration file.
///
/// All of these are fatal: the process reports them and exits before the
/// listener is ever bound.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// The configuration file could not be read.
    #[error("Unable to read config file: {0}")]
    Io(#[from] io::Error),

    /// The configuration file is not valid TOML.
    #[error("Unable to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required setting is missing.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A setting has a value that can never work.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration {
        field: &'static str,
        reason: &'static str,
    },
}

/// Errors that can occur during an inbound session.
///
/// Protocol mistakes by the client are not errors here; they get an SMTP
/// reply (500/501/503) and the session carries on.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connection error occurred.
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),
}

/// Errors that can occur in the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to socket address.
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },
}
