//! Blacklist data models and URL canonicalization.

use chrono::{DateTime, Utc};

use crate::links;
use crate::{Error, Result};

/// A blacklisted URL in the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlacklistEntry {
    /// Canonical URL.
    pub url: String,
    /// When the URL was first blacklisted.
    pub created_at: DateTime<Utc>,
}

/// Reduces a raw URL to the canonical form used everywhere: storage,
/// filter traffic, and comparisons.
///
/// Surrounding whitespace is trimmed, copy-pasted text around the first
/// link-like substring is stripped, and the result is lowercased. Input
/// without a link-like substring passes through as long as it is a
/// single token.
///
/// # Errors
///
/// Returns [`Error::Validation`] for empty input or input that cannot
/// be reduced to one token.
pub fn canonicalize(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("URL must not be empty".to_string()));
    }

    let canonical = match links::first(trimmed) {
        Some(link) => link,
        None => {
            if trimmed.chars().any(char::is_whitespace) {
                return Err(Error::Validation(format!(
                    "not a canonicalizable URL: {trimmed:?}"
                )));
            }
            trimmed.to_string()
        }
    };

    Ok(canonical.to_lowercase())
}
