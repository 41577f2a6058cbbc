//! # mailroom-filter
//!
//! Async client for the blacklist filter service's line-oriented wire
//! protocol.
//!
//! The service fronts a bloom filter backed by an exact URL set. One
//! connection carries one command at a time; commands are HTTP-shaped
//! single lines and responses are short status frames.
//!
//! ## Protocol
//!
//! ```text
//! client: 1024 3 5\n                 (handshake: bit array size + hash rounds)
//! server:                            (silence = accepted, 400 = rejected)
//!
//! client: POST spam.example.com\n
//! server: 201 Created\n
//!
//! client: GET spam.example.com\n
//! server: 200 Ok\n\ntrue true\n      (filter hit, exact set hit)
//!
//! client: DELETE spam.example.com\n
//! server: 204 No Content\n
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//!
//! use mailroom_filter::{Config, FilterClient, FilterParams, Membership};
//!
//! #[tokio::main]
//! async fn main() -> mailroom_filter::Result<()> {
//!     let params = FilterParams::new(1024, vec![3, 5])?;
//!     let config = Config::builder("filter.internal", params)
//!         .command_timeout(Duration::from_secs(5))
//!         .build();
//!
//!     let client = FilterClient::connect(&config).await?;
//!
//!     client.insert("spam.example.com").await?;
//!     match client.check("spam.example.com").await? {
//!         Membership::Maybe { listed: true } => println!("listed"),
//!         Membership::Maybe { listed: false } => println!("filter hit only"),
//!         Membership::Absent => println!("definitely not listed"),
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: commands and handshake parameters
//! - [`connection`]: configuration, streams, framing, and the client
//! - [`response`]: status codes, membership answers, and frame boundaries

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod response;

pub use command::{Command, FilterParams};
pub use connection::{
    Config, ConfigBuilder, DEFAULT_PORT, FilterClient, FilterStream, FramedStream, Security,
};
pub use error::{Error, Result};
pub use response::{Membership, Response, StatusCode};
