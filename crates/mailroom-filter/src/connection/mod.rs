//! Filter service connection management.
//!
//! This module provides connection handling for the blacklist filter
//! service, including:
//! - Configuration (host, port, security mode, bloom parameters, timeouts)
//! - TLS/plaintext stream abstraction
//! - Exact response framing over buffered I/O
//! - The single-slot command client

mod client;
mod config;
mod framed;
mod stream;

pub use client::FilterClient;
pub use config::{Config, ConfigBuilder, DEFAULT_PORT, Security};
pub use framed::FramedStream;
pub use stream::FilterStream;
