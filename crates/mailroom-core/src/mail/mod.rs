//! Mail lifecycle - drafts, sending, visibility, and spam handling.
//!
//! This module provides:
//! - **Composition**: Drafts stay private to their author until sent
//! - **Visibility**: Sender and recipient each keep their own copy, hidden independently
//! - **Spam handling**: Outgoing text is checked against the URL blacklist, and manual
//!   spam labeling feeds the same blacklist back
//!
//! # Example
//!
//! ```ignore
//! use mailroom_core::mail::{ComposeRequest, MailService};
//!
//! let mail = service
//!     .create_mail(
//!         sender,
//!         ComposeRequest {
//!             from: "ann@example.com".into(),
//!             to: Some("bob@example.com".into()),
//!             receiver_id: Some(recipient),
//!             subject: "hello".into(),
//!             content: "see you at nine".into(),
//!             label_names: Vec::new(),
//!         },
//!     )
//!     .await?;
//!
//! if mail.is_spam {
//!     // delivered, but flagged for both parties
//! }
//! ```

mod model;
mod repository;
mod service;

pub use model::{ComposeRequest, LabelView, Mail, MailId, MailPatch, MailView};
pub use repository::MailStore;
pub use service::MailService;
