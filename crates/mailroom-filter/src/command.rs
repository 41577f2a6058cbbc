//! Commands understood by the blacklist filter service.
//!
//! The wire format is a single line per command: an HTTP-style verb, one
//! space, the URL, and a line feed. URLs are validated here before they
//! reach the socket so a stray space or newline can never corrupt the
//! line framing.

use crate::{Error, Result};

/// A single filter service command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `GET <url>`, probing the filter for membership.
    Check(String),
    /// `POST <url>`, inserting the URL into the filter and its exact set.
    Add(String),
    /// `DELETE <url>`, removing the URL from the exact set.
    Remove(String),
}

impl Command {
    /// Returns the wire verb for this command.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Check(_) => "GET",
            Self::Add(_) => "POST",
            Self::Remove(_) => "DELETE",
        }
    }

    /// Returns the URL this command names.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Check(url) | Self::Add(url) | Self::Remove(url) => url,
        }
    }

    /// Returns true if the response carries a membership body line.
    ///
    /// Only probes do; the mutating commands answer with a bare status
    /// line.
    #[must_use]
    pub const fn expects_body(&self) -> bool {
        matches!(self, Self::Check(_))
    }

    /// Serializes the command into its wire line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the URL is empty or contains
    /// whitespace or control bytes.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let url = self.url();
        validate_url(url)?;

        let verb = self.verb();
        let mut line = Vec::with_capacity(verb.len() + url.len() + 2);
        line.extend_from_slice(verb.as_bytes());
        line.push(b' ');
        line.extend_from_slice(url.as_bytes());
        line.push(b'\n');
        Ok(line)
    }
}

/// Validates that a URL is a single non-empty token safe to put on a line.
fn validate_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(Error::InvalidUrl("empty URL".to_string()));
    }
    if url
        .bytes()
        .any(|b| b.is_ascii_whitespace() || b.is_ascii_control())
    {
        return Err(Error::InvalidUrl(format!(
            "URL contains whitespace or control bytes: {url:?}"
        )));
    }
    Ok(())
}

/// Bloom filter parameters announced during the connection handshake.
///
/// The first line written after connecting configures the remote filter:
/// the bit array size followed by one iteration count per hash function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterParams {
    bits: u64,
    rounds: Vec<u32>,
}

impl FilterParams {
    /// Creates filter parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParams`] if the bit array size is zero, no
    /// hash functions are given, or any iteration count is zero.
    pub fn new(bits: u64, rounds: impl Into<Vec<u32>>) -> Result<Self> {
        let rounds = rounds.into();
        if bits == 0 {
            return Err(Error::InvalidParams(
                "bit array size must be positive".to_string(),
            ));
        }
        if rounds.is_empty() {
            return Err(Error::InvalidParams(
                "at least one hash function is required".to_string(),
            ));
        }
        if rounds.contains(&0) {
            return Err(Error::InvalidParams(
                "hash iteration counts must be positive".to_string(),
            ));
        }
        Ok(Self { bits, rounds })
    }

    /// Returns the bit array size.
    #[must_use]
    pub const fn bits(&self) -> u64 {
        self.bits
    }

    /// Returns the per-hash iteration counts.
    #[must_use]
    pub fn rounds(&self) -> &[u32] {
        &self.rounds
    }

    /// Serializes the parameters into the handshake line.
    #[must_use]
    pub fn handshake_line(&self) -> Vec<u8> {
        let mut line = self.bits.to_string();
        for rounds in &self.rounds {
            line.push(' ');
            line.push_str(&rounds.to_string());
        }
        line.push('\n');
        line.into_bytes()
    }
}
