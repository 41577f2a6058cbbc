//! Transport for filter service connections.
//!
//! The protocol itself is plaintext; [`FilterStream`] optionally wraps
//! the TCP connection in TLS for deployments that terminate it in front
//! of the service. The rest of the crate sees one stream type either
//! way.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::config::Security;
use crate::Result;

/// A connection to the filter service, with or without TLS.
pub enum FilterStream {
    /// Bare TCP.
    Plain(TcpStream),
    /// TCP under TLS. Boxed, the TLS session state is large.
    Tls(Box<TlsStream<TcpStream>>),
}

impl FilterStream {
    /// Opens a connection to the service, wrapping it in TLS when the
    /// security mode asks for it.
    ///
    /// # Errors
    ///
    /// Returns an error when the TCP connect fails, the host is not a
    /// valid server name, or the TLS handshake fails.
    pub async fn connect(host: &str, port: u16, security: Security) -> Result<Self> {
        let tcp = TcpStream::connect((host, port)).await?;
        match security {
            Security::None => Ok(Self::Plain(tcp)),
            Security::Tls => {
                let name = ServerName::try_from(host.to_string())?;
                let tls = tls_connector().connect(name, tcp).await?;
                Ok(Self::Tls(Box::new(tls)))
            }
        }
    }

    /// Whether the connection is TLS-wrapped.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

/// Connector trusting the bundled webpki roots, no client auth.
fn tls_connector() -> TlsConnector {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

macro_rules! with_stream {
    ($self:ident, $s:ident => $call:expr) => {
        match $self.get_mut() {
            Self::Plain($s) => $call,
            Self::Tls($s) => $call,
        }
    };
}

impl AsyncRead for FilterStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        with_stream!(self, s => Pin::new(s).poll_read(cx, buf))
    }
}

impl AsyncWrite for FilterStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        with_stream!(self, s => Pin::new(s).poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        with_stream!(self, s => Pin::new(s).poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        with_stream!(self, s => Pin::new(s).poll_shutdown(cx))
    }
}
