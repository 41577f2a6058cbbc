//! Label data models.

use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// Unique identifier for a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelId(pub i64);

impl LabelId {
    /// Create a new label ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for LabelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user-scoped mail label.
///
/// Names are unique per owner and compared case-insensitively, so one
/// user cannot own both "Work" and "work".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    /// Label ID.
    pub id: LabelId,
    /// Owning user.
    pub owner_id: UserId,
    /// Display name.
    pub name: String,
}

impl Label {
    /// Returns the system label this label's name matches, if any.
    #[must_use]
    pub fn system(&self) -> Option<SystemLabel> {
        SystemLabel::from_name(&self.name)
    }
}

/// The labels every account starts with.
///
/// Mail lifecycle rules key off these names: a mail is a draft while it
/// carries its sender's drafts label, the spam label drives the URL
/// blacklist, and inbox/sent/drafts cannot be detached from a mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemLabel {
    /// Received mail.
    Inbox,
    /// Sent mail.
    Sent,
    /// Starred mail.
    Starred,
    /// Important mail.
    Important,
    /// Unsent drafts.
    Drafts,
    /// Spam-flagged mail.
    Spam,
}

impl SystemLabel {
    /// All system labels, in seed order.
    pub const ALL: [Self; 6] = [
        Self::Inbox,
        Self::Sent,
        Self::Starred,
        Self::Important,
        Self::Drafts,
        Self::Spam,
    ];

    /// Canonical display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Inbox => "Inbox",
            Self::Sent => "Sent",
            Self::Starred => "Starred",
            Self::Important => "Important",
            Self::Drafts => "Drafts",
            Self::Spam => "Spam",
        }
    }

    /// Detects a system label from a name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|label| label.name().eq_ignore_ascii_case(name))
    }

    /// Whether a mail keeps this label for life: inbox, sent, and
    /// drafts record where a mail sits in its lifecycle and cannot be
    /// detached by hand.
    #[must_use]
    pub const fn is_protected(self) -> bool {
        matches!(self, Self::Inbox | Self::Sent | Self::Drafts)
    }
}

impl std::fmt::Display for SystemLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
