//! Filter service client with a single-slot command pipeline.
//!
//! The service answers commands strictly in order on one connection, so
//! the client keeps at most one command in flight. A second call while a
//! response is owed fails fast with [`Error::Busy`] instead of queueing.
//! A call that times out leaves a marker behind; the next call settles
//! the late response first so the framing never slips by one frame.

#![allow(clippy::missing_errors_doc)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::config::Config;
use super::framed::FramedStream;
use super::stream::FilterStream;
use crate::command::Command;
use crate::response::{Membership, Response, StatusCode};
use crate::{Error, Result};

/// Framing shape of a response still owed on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owed {
    /// A bare status line.
    Status,
    /// A probe response with a membership body.
    Probe,
}

struct Inner<S> {
    stream: FramedStream<S>,
    /// Set from command write until the matching response is consumed.
    pending: Option<Owed>,
    closed: bool,
}

/// Asynchronous client for the blacklist filter service.
///
/// Cloning is cheap; clones share the underlying connection and its
/// single command slot.
pub struct FilterClient<S = FilterStream> {
    inner: Arc<Mutex<Inner<S>>>,
    command_timeout: Duration,
}

impl<S> Clone for FilterClient<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            command_timeout: self.command_timeout,
        }
    }
}

impl<S> std::fmt::Debug for FilterClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterClient")
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl FilterClient {
    /// Connects to the filter service and performs the configuration
    /// handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the connection does not come up
    /// within the connect timeout and [`Error::Handshake`] if the service
    /// rejects the configuration line.
    pub async fn connect(config: &Config) -> Result<Self> {
        let connecting = FilterStream::connect(&config.host, config.port, config.security);
        let stream = timeout(config.connect_timeout, connecting)
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout))??;
        debug!(host = %config.host, port = config.port, "connected to filter service");

        Self::from_stream(stream, config).await
    }
}

impl<S> FilterClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Performs the handshake over an already-connected stream.
    ///
    /// The host and port in `config` are ignored; tests use this to drive
    /// the client over an in-memory transport.
    pub async fn from_stream(stream: S, config: &Config) -> Result<Self> {
        let mut framed = FramedStream::new(stream);
        framed
            .write_command(&config.params.handshake_line())
            .await?;

        // The service says nothing on an accepted configuration and
        // answers 400 before closing on a rejected one. Listen for a
        // rejection briefly, then report ready.
        match timeout(config.handshake_grace, framed.read_response(false)).await {
            Err(_) => {}
            Ok(Ok(frame)) => {
                let status = Response::parse(&frame, false)?.status();
                return Err(Error::Handshake(format!(
                    "service answered {status} to the configuration line"
                )));
            }
            Ok(Err(Error::Closed)) => {
                return Err(Error::Handshake(
                    "service closed the connection during configuration".to_string(),
                ));
            }
            Ok(Err(e)) => return Err(e),
        }

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                stream: framed,
                pending: None,
                closed: false,
            })),
            command_timeout: config.command_timeout,
        })
    }

    /// Sends one command and waits for its response.
    ///
    /// At most one command may be in flight per connection; a call made
    /// while another holds the slot fails immediately with
    /// [`Error::Busy`] rather than queueing. Dropping the returned
    /// future while the command is being written closes the
    /// connection, since a half-written line cannot be recalled.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if no response frames within the command
    /// timeout, [`Error::Closed`] once the connection is gone, and
    /// [`Error::InvalidUrl`] for URLs that cannot sit on a wire line.
    pub async fn send(&self, command: &Command) -> Result<Response> {
        // Validate before taking the slot so a bad URL cannot wedge it.
        let line = command.serialize()?;
        let owed = if command.expects_body() {
            Owed::Probe
        } else {
            Owed::Status
        };

        let Ok(mut inner) = self.inner.try_lock() else {
            return Err(Error::Busy);
        };
        if inner.closed {
            return Err(Error::Closed);
        }

        self.settle_abandoned(&mut inner).await?;

        // Poison the slot across the write: if this future is dropped
        // partway through, unknown bytes sit on the wire and the
        // connection cannot be trusted again.
        inner.closed = true;
        inner.stream.write_command(&line).await?;
        inner.closed = false;
        inner.pending = Some(owed);

        let expects_body = owed == Owed::Probe;
        match timeout(self.command_timeout, inner.stream.read_response(expects_body)).await {
            Ok(Ok(frame)) => {
                inner.pending = None;
                Response::parse(&frame, expects_body)
            }
            Ok(Err(e)) => {
                inner.closed = true;
                Err(e)
            }
            Err(_) => {
                // Keep `pending` set: the response may still arrive and
                // must be consumed before the next command's.
                warn!(command = command.verb(), "filter command timed out");
                Err(Error::Timeout(self.command_timeout))
            }
        }
    }

    /// Consumes a response left over by a timed-out or dropped call.
    async fn settle_abandoned(&self, inner: &mut Inner<S>) -> Result<()> {
        let Some(owed) = inner.pending else {
            return Ok(());
        };
        debug!("settling abandoned response before next command");
        let read = inner.stream.read_response(owed == Owed::Probe);
        match timeout(self.command_timeout, read).await {
            Ok(Ok(_)) => {
                inner.pending = None;
                Ok(())
            }
            Ok(Err(e)) => {
                inner.closed = true;
                Err(e)
            }
            Err(_) => {
                inner.closed = true;
                Err(Error::Timeout(self.command_timeout))
            }
        }
    }

    /// Probes the filter for a URL.
    ///
    /// [`Membership::Absent`] is definitive. A [`Membership::Maybe`] may
    /// be a bloom false positive; its `listed` flag reports the service's
    /// own exact-set check.
    pub async fn check(&self, url: impl Into<String>) -> Result<Membership> {
        match self.send(&Command::Check(url.into())).await? {
            Response::Membership(membership) => Ok(membership),
            Response::Status(status) => Err(Error::UnexpectedStatus(status)),
        }
    }

    /// Inserts a URL into the filter and its exact set.
    pub async fn insert(&self, url: impl Into<String>) -> Result<()> {
        let response = self.send(&Command::Add(url.into())).await?;
        match response.status() {
            StatusCode::Created => Ok(()),
            status => Err(Error::UnexpectedStatus(status)),
        }
    }

    /// Removes a URL from the exact set.
    ///
    /// Returns `false` when the service reports the URL was not listed.
    /// Bits stay set in the bloom filter either way; later probes answer
    /// `true false` for such URLs.
    pub async fn remove(&self, url: impl Into<String>) -> Result<bool> {
        let response = self.send(&Command::Remove(url.into())).await?;
        match response.status() {
            StatusCode::NoContent => Ok(true),
            StatusCode::NotFound => Ok(false),
            status => Err(Error::UnexpectedStatus(status)),
        }
    }

    /// Closes the connection.
    ///
    /// Waits for an in-flight command to settle first. Later commands on
    /// this client fail with [`Error::Closed`].
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if !inner.closed {
            inner.closed = true;
            if let Err(e) = inner.stream.get_mut().shutdown().await {
                debug!(error = %e, "error shutting down filter connection");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_test::io::Builder;

    use super::*;
    use crate::command::FilterParams;

    fn test_config() -> Config {
        let params = FilterParams::new(1024, vec![3, 5]).unwrap();
        Config::builder("test.invalid", params)
            .command_timeout(Duration::from_secs(5))
            .handshake_grace(Duration::from_millis(250))
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_silence_means_ready() {
        let mock = Builder::new()
            .write(b"1024 3 5\n")
            .write(b"GET example.com\n")
            .read(b"200 Ok\n\nfalse\n")
            .build();

        let client = FilterClient::from_stream(mock, &test_config()).await.unwrap();
        let membership = client.check("example.com").await.unwrap();
        assert_eq!(membership, Membership::Absent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_rejection() {
        let mock = Builder::new().write(b"1024 3 5\n").read(b"400 Bad Request\n").build();

        let result = FilterClient::from_stream(mock, &test_config()).await;
        assert!(matches!(result, Err(Error::Handshake(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_closed_connection() {
        let mock = Builder::new().write(b"1024 3 5\n").build();

        let result = FilterClient::from_stream(mock, &test_config()).await;
        assert!(matches!(result, Err(Error::Handshake(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_and_remove() {
        let mock = Builder::new()
            .write(b"1024 3 5\n")
            .write(b"POST bad.example.com\n")
            .read(b"201 Created\n")
            .write(b"DELETE bad.example.com\n")
            .read(b"204 No Content\n")
            .write(b"DELETE bad.example.com\n")
            .read(b"404 Not Found\n")
            .build();

        let client = FilterClient::from_stream(mock, &test_config()).await.unwrap();
        client.insert("bad.example.com").await.unwrap();
        assert!(client.remove("bad.example.com").await.unwrap());
        assert!(!client.remove("bad.example.com").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_status_surfaces() {
        let mock = Builder::new()
            .write(b"1024 3 5\n")
            .write(b"POST bad.example.com\n")
            .read(b"404 Not Found\n")
            .build();

        let client = FilterClient::from_stream(mock, &test_config()).await.unwrap();
        let result = client.insert("bad.example.com").await;
        assert!(matches!(
            result,
            Err(Error::UnexpectedStatus(StatusCode::NotFound))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_response_settles() {
        let mock = Builder::new()
            .write(b"1024 3 5\n")
            .write(b"GET slow.example.com\n")
            .wait(Duration::from_secs(8))
            .read(b"200 Ok\n\ntrue false\n")
            .write(b"GET fast.example.com\n")
            .read(b"200 Ok\n\nfalse\n")
            .build();

        let client = FilterClient::from_stream(mock, &test_config()).await.unwrap();

        let result = client.check("slow.example.com").await;
        assert!(matches!(result, Err(Error::Timeout(_))));

        // The next call settles the late response, then runs normally.
        let membership = client.check("fast.example.com").await.unwrap();
        assert_eq!(membership, Membership::Absent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_close_fails_pending_command() {
        let mock = Builder::new()
            .write(b"1024 3 5\n")
            .write(b"POST bad.example.com\n")
            .build();

        let client = FilterClient::from_stream(mock, &test_config()).await.unwrap();

        let result = client.insert("bad.example.com").await;
        assert!(matches!(result, Err(Error::Closed)));

        // The connection is gone for good.
        let result = client.insert("other.example.com").await;
        assert!(matches!(result, Err(Error::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_dropped_mid_write_closes_the_connection() {
        let mock = Builder::new().write(b"1024 3 5\n").wait(Duration::from_secs(60)).build();

        let client = FilterClient::from_stream(mock, &test_config()).await.unwrap();

        // The transport stalls the write and the caller gives up on it.
        let result = timeout(Duration::from_millis(50), client.insert("bad.example.com")).await;
        assert!(result.is_err());

        // Half a command may be on the wire, so the connection is done.
        let result = client.check("other.example.com").await;
        assert!(matches!(result, Err(Error::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_url_rejected_without_touching_the_wire() {
        let mock = Builder::new().write(b"1024 3 5\n").wait(Duration::from_secs(60)).build();

        let client = FilterClient::from_stream(mock, &test_config()).await.unwrap();

        let result = client.check("two words").await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }
}
