//! Error types for the filter protocol client.

use std::time::Duration;

use thiserror::Error;

use crate::response::StatusCode;

/// Errors that can occur while talking to the blacklist filter service.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// The bloom parameters cannot form a valid configuration line.
    #[error("Invalid filter parameters: {0}")]
    InvalidParams(String),

    /// The service rejected the configuration line during the handshake.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// A URL failed client-side validation before being written.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Another command is still in flight on this connection.
    #[error("a command is already in flight on this connection")]
    Busy,

    /// The connection was closed while a response was outstanding.
    #[error("connection closed by the filter service")]
    Closed,

    /// No response arrived within the command timeout.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with a status the command does not allow.
    #[error("Unexpected status: {0}")]
    UnexpectedStatus(StatusCode),

    /// Malformed response or other protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
