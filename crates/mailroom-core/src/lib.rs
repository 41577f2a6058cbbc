//! # mailroom-core
//!
//! Core business logic for the Mailroom webmail backend.
//!
//! This crate provides:
//! - Mail lifecycle (drafts, sending, per-party deletion, search)
//! - Per-user labels with the built-in system set
//! - **URL Blacklist** - two-tier spam-link lookup backed by a remote
//!   bloom filter and a local `SQLite` store
//! - Link extraction from mail text
//!
//! Authentication and transport live in the layers above; every
//! operation here takes an already-verified [`UserId`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod blacklist;
mod error;
pub mod label;
pub mod links;
pub mod mail;
pub mod storage;
mod user;

pub use blacklist::{BlacklistEntry, BlacklistService, BlacklistStore, UrlFilter, canonicalize};
pub use error::{Error, Result};
pub use label::{Label, LabelDirectory, LabelId, LabelStore, SystemLabel};
pub use mail::{
    ComposeRequest, LabelView, Mail, MailId, MailPatch, MailService, MailStore, MailView,
};
pub use user::UserId;
