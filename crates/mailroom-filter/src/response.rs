//! Response parsing and framing for the filter protocol.
//!
//! Responses are short LF-terminated text frames. Mutating commands are
//! answered with a bare status line. A probe is answered with a status
//! line, a blank separator line, and one membership line:
//!
//! ```text
//! 200 Ok\n
//! \n
//! true true\n
//! ```
//!
//! Framing is decided by [`frame_end`] before any parsing happens, so a
//! slow or fragmented response is never misread at a line boundary.

use std::fmt;

use crate::{Error, Result};

/// Status codes the filter service can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// `200 Ok`, answering a probe.
    Ok,
    /// `201 Created`, the URL was inserted.
    Created,
    /// `204 No Content`, the URL was removed.
    NoContent,
    /// `400 Bad Request`, a malformed command or rejected configuration.
    BadRequest,
    /// `404 Not Found`, the URL was not in the exact set.
    NotFound,
}

impl StatusCode {
    /// Returns the numeric code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::NoContent => 204,
            Self::BadRequest => 400,
            Self::NotFound => 404,
        }
    }

    /// Returns the reason phrase as the service spells it.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::Created => "Created",
            Self::NoContent => "No Content",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
        }
    }

    /// Looks up a status by numeric code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            200 => Some(Self::Ok),
            201 => Some(Self::Created),
            204 => Some(Self::NoContent),
            400 => Some(Self::BadRequest),
            404 => Some(Self::NotFound),
            _ => None,
        }
    }

    /// Parses a status line such as `204 No Content`.
    ///
    /// Only the leading three-digit code is significant; the reason phrase
    /// is not checked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the line does not start with a known
    /// three-digit code.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches('\r');
        let digits = line.get(..3).ok_or_else(|| {
            Error::Protocol(format!("status line too short: {line:?}"))
        })?;
        if !matches!(line.as_bytes().get(3), None | Some(b' ')) {
            return Err(Error::Protocol(format!("malformed status line: {line:?}")));
        }
        let code: u16 = digits
            .parse()
            .map_err(|_| Error::Protocol(format!("malformed status line: {line:?}")))?;
        Self::from_code(code)
            .ok_or_else(|| Error::Protocol(format!("unknown status code: {line:?}")))
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// Outcome of a membership probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// The filter ruled the URL out. This answer is definitive.
    Absent,
    /// The filter matched the URL, which may be a false positive.
    Maybe {
        /// Whether the service's own exact set also contains the URL.
        listed: bool,
    },
}

impl Membership {
    /// Returns true if the filter matched the URL.
    #[must_use]
    pub const fn is_maybe(self) -> bool {
        matches!(self, Self::Maybe { .. })
    }
}

/// A parsed filter service response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// A bare status line (mutating commands and errors).
    Status(StatusCode),
    /// A probe answer: `200 Ok` plus a membership body.
    Membership(Membership),
}

impl Response {
    /// Returns the status line of this response.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Status(status) => status,
            Self::Membership(_) => StatusCode::Ok,
        }
    }

    /// Parses one complete frame as returned by framed reading.
    ///
    /// `expects_body` must match the command the frame answers: probes
    /// carry a membership body after a `200`, everything else is a bare
    /// status line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for non-UTF-8 frames, unknown status
    /// lines, or malformed membership bodies.
    pub fn parse(frame: &[u8], expects_body: bool) -> Result<Self> {
        let text = std::str::from_utf8(frame)
            .map_err(|_| Error::Protocol("response is not valid UTF-8".to_string()))?;
        let mut lines = text.split('\n');
        let status = StatusCode::parse(lines.next().unwrap_or_default())?;

        if !expects_body || status != StatusCode::Ok {
            return Ok(Self::Status(status));
        }

        let separator = lines
            .next()
            .ok_or_else(|| Error::Protocol("probe response missing separator line".to_string()))?;
        if !separator.trim_end_matches('\r').is_empty() {
            return Err(Error::Protocol(format!(
                "expected blank separator line, got {separator:?}"
            )));
        }

        let body = lines
            .next()
            .ok_or_else(|| Error::Protocol("probe response missing membership line".to_string()))?;
        let membership = match body.trim_end_matches('\r') {
            "false" => Membership::Absent,
            "true false" => Membership::Maybe { listed: false },
            "true true" => Membership::Maybe { listed: true },
            other => {
                return Err(Error::Protocol(format!(
                    "unrecognized membership line: {other:?}"
                )));
            }
        };
        Ok(Self::Membership(membership))
    }
}

/// Returns the length of the first complete frame in `buf`, if any.
///
/// A bare status frame is one LF-terminated line. A probe answered `200`
/// is three lines: status, blank separator, membership body. Probe
/// rejections (any non-`200` first line) are a single line, so a `400`
/// never leaves the reader waiting for a body that will not come.
#[must_use]
pub fn frame_end(buf: &[u8], expects_body: bool) -> Option<usize> {
    let line_end = find_lf(buf)?;
    let first = &buf[..line_end];
    if !expects_body || !first.starts_with(b"200") {
        return Some(line_end + 1);
    }

    let rest = &buf[line_end + 1..];
    let separator_end = find_lf(rest)?;
    let body = &rest[separator_end + 1..];
    let body_end = find_lf(body)?;
    Some(line_end + 1 + separator_end + 1 + body_end + 1)
}

fn find_lf(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}
