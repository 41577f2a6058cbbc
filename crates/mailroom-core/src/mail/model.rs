//! Mail data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::label::{Label, LabelId};
use crate::user::UserId;

/// Unique identifier for a mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailId(pub i64);

impl MailId {
    /// Create a new mail ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A mail record.
///
/// The same record serves both parties. Which labels each party sees,
/// and whether they see the mail at all, is decided per requester by
/// the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    /// Mail ID, from the durable sequence.
    pub id: MailId,
    /// Sender address.
    pub from: String,
    /// Recipient address. Drafts may not have one yet.
    pub to: Option<String>,
    /// Sender user ID.
    pub sender_id: UserId,
    /// Recipient user ID. Drafts may not have one yet.
    pub receiver_id: Option<UserId>,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub content: String,
    /// Attached labels in attach order. Ids are owner-scoped and may
    /// belong to either party.
    pub label_ids: Vec<LabelId>,
    /// When the mail was sent. `None` while it is a draft.
    pub date_sent: Option<DateTime<Utc>>,
    /// Users who soft-deleted this mail from their own view.
    pub hidden_from: Vec<UserId>,
    /// Whether the mail is flagged as spam.
    pub is_spam: bool,
    /// Optimistic concurrency stamp, bumped by every mutation.
    pub version: i64,
}

impl Mail {
    /// Whether the user is the sender or the recipient.
    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.sender_id == user || self.receiver_id == Some(user)
    }

    /// Whether the user has soft-deleted this mail.
    #[must_use]
    pub fn hidden_for(&self, user: UserId) -> bool {
        self.hidden_from.contains(&user)
    }
}

/// A request to create a mail, draft or sent.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    /// Sender address.
    pub from: String,
    /// Recipient address, if already chosen.
    pub to: Option<String>,
    /// Recipient user ID. Required for sending, optional for drafts.
    pub receiver_id: Option<UserId>,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub content: String,
    /// Names of labels to attach, resolved against the sender's own
    /// labels. Including the drafts label, in any casing, makes this a
    /// draft.
    pub label_names: Vec<String>,
}

/// A partial update to a draft. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct MailPatch {
    /// New recipient address.
    pub to: Option<String>,
    /// New recipient user ID.
    pub receiver_id: Option<UserId>,
    /// New subject line.
    pub subject: Option<String>,
    /// New body text.
    pub content: Option<String>,
    /// Replacement label set, by name, resolved against the sender.
    pub label_names: Option<Vec<String>>,
}

impl MailPatch {
    /// Whether the patch carries no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to.is_none()
            && self.receiver_id.is_none()
            && self.subject.is_none()
            && self.content.is_none()
            && self.label_names.is_none()
    }
}

/// Wire-shaped view of an attached label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelView {
    /// Label ID.
    pub id: LabelId,
    /// Display name.
    pub name: String,
}

impl From<&Label> for LabelView {
    fn from(label: &Label) -> Self {
        Self {
            id: label.id,
            name: label.name.clone(),
        }
    }
}

/// Wire-shaped view of a mail, as the HTTP boundary serializes it.
///
/// Assembled per requester: only labels the requester owns appear.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailView {
    /// Mail ID.
    pub id: MailId,
    /// Sender address.
    pub from: String,
    /// Recipient address, if any.
    pub to: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub content: String,
    /// Send time; `null` for drafts.
    pub date_sent: Option<DateTime<Utc>>,
    /// The requester's labels on this mail.
    pub labels: Vec<LabelView>,
    /// Whether the mail is flagged as spam.
    pub is_spam: bool,
}
