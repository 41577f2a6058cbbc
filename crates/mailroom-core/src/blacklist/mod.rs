//! URL blacklisting: a remote bloom filter in front of an
//! authoritative local store.
//!
//! This module provides:
//! - **Canonicalization** - one normal form for every URL that crosses
//!   a tier boundary
//! - **`BlacklistStore`** - the exact, durable set of blacklisted URLs
//! - **`BlacklistService`** - membership decisions that combine both
//!   tiers and degrade gracefully when one is unreachable
//!
//! The filter accelerates the common case (a URL nobody blacklisted)
//! down to one network probe. Because bloom filters cannot answer a
//! definite "yes", every filter hit is confirmed against the store
//! before a caller sees `true`.

mod model;
mod repository;
mod service;

pub use model::{BlacklistEntry, canonicalize};
pub use repository::BlacklistStore;
pub use service::{BlacklistService, UrlFilter};
