//! User-scoped mail labels.
//!
//! Every account starts with six system labels (inbox, sent, starred,
//! important, drafts, spam) whose names the lifecycle rules match
//! case-insensitively. Users can add their own labels on top.

mod directory;
mod model;
mod repository;

pub use directory::LabelDirectory;
pub use model::{Label, LabelId, SystemLabel};
pub use repository::LabelStore;
