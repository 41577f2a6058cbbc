//! Mail lifecycle rules.
//!
//! All the policy lives here: who sees a mail, what makes a draft, how
//! spam is detected at send time, and how manual spam labeling and
//! automatic detection converge on the same marking path. The
//! repositories below this layer only store and query.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use super::model::{ComposeRequest, LabelView, Mail, MailId, MailPatch, MailView};
use super::repository::MailStore;
use crate::blacklist::{BlacklistService, UrlFilter, canonicalize};
use crate::label::{Label, LabelDirectory, LabelId, SystemLabel};
use crate::links;
use crate::user::UserId;
use crate::{Error, Result};

/// Attempts before a concurrent-modification conflict is reported.
const CAS_ATTEMPTS: u32 = 3;

/// Pause between optimistic-concurrency retries.
const CAS_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Mail lifecycle service: creation, visibility, editing, deletion,
/// search, and labeling, including spam detection.
pub struct MailService<D, F> {
    store: MailStore,
    directory: D,
    blacklist: BlacklistService<F>,
}

impl<D, F> MailService<D, F>
where
    D: LabelDirectory,
    F: UrlFilter,
{
    /// Create a service over a mail store, a label directory, and the
    /// blacklist.
    pub fn new(store: MailStore, directory: D, blacklist: BlacklistService<F>) -> Self {
        Self {
            store,
            directory,
            blacklist,
        }
    }

    /// Create a mail on behalf of `sender`, as a draft or sent.
    ///
    /// Including the drafts label (any casing) in the request makes it
    /// a draft; a draft must carry a recipient, a subject, or some
    /// content. Anything else is sent immediately: the recipient
    /// becomes mandatory, the sender's sent label and the recipient's
    /// inbox label are attached, and the text is scanned for
    /// blacklisted links. A scan hit flags the mail as spam for both
    /// parties and blacklists every link it carries; a scan failure
    /// delivers the mail unflagged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty draft, a missing
    /// recipient on send, or an unresolvable label name.
    pub async fn create_mail(&self, sender: UserId, request: ComposeRequest) -> Result<Mail> {
        let is_draft = request
            .label_names
            .iter()
            .any(|name| SystemLabel::from_name(name) == Some(SystemLabel::Drafts));

        let mut label_ids = Vec::new();
        for name in &request.label_names {
            let label = self
                .directory
                .resolve_by_name(sender, name)
                .await?
                .ok_or_else(|| Error::Validation(format!("unknown label: {name}")))?;
            if !label_ids.contains(&label.id) {
                label_ids.push(label.id);
            }
        }

        let mut mail = Mail {
            id: self.store.next_mail_id().await?,
            from: request.from,
            to: request.to,
            sender_id: sender,
            receiver_id: request.receiver_id,
            subject: request.subject,
            content: request.content,
            label_ids,
            date_sent: None,
            hidden_from: Vec::new(),
            is_spam: false,
            version: 0,
        };

        if is_draft {
            let has_substance = mail.to.as_deref().is_some_and(|to| !to.trim().is_empty())
                || !mail.subject.trim().is_empty()
                || !mail.content.trim().is_empty();
            if !has_substance {
                return Err(Error::Validation(
                    "a draft needs a recipient, a subject, or some content".to_string(),
                ));
            }
        } else {
            self.dispatch(&mut mail).await?;
        }

        self.store.insert_mail(&mail).await?;
        debug!(mail = %mail.id, draft = is_draft, spam = mail.is_spam, "mail created");
        Ok(mail)
    }

    /// Fetch a mail as seen by `requester`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the mail does not exist, the
    /// requester is not a party, or the requester has deleted it, and
    /// [`Error::Forbidden`] when it is still someone else's draft.
    pub async fn get_mail(&self, id: MailId, requester: UserId) -> Result<Mail> {
        let mail = self
            .store
            .get_mail(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("mail {id}")))?;

        if !mail.involves(requester) || mail.hidden_for(requester) {
            return Err(Error::NotFound(format!("mail {id}")));
        }
        if mail.sender_id != requester && self.is_draft(&mail).await? {
            return Err(Error::Forbidden("mail is still a draft".to_string()));
        }

        Ok(mail)
    }

    /// Apply a partial edit to a draft.
    ///
    /// Only the sender may edit, and only while the mail is a draft.
    /// A patched label set that drops the drafts label sends the mail:
    /// the recipient becomes mandatory, the lifecycle labels are
    /// attached, and the final text goes through the same spam scan a
    /// direct send does. While the mail stays a draft, changed text is
    /// re-scanned and an edit that introduces a blacklisted link is
    /// rejected outright.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] when the patch changes nothing or
    /// the draft keeps changing concurrently, [`Error::Forbidden`] for
    /// wrong requester or non-draft, and [`Error::Validation`] for bad
    /// patch contents or a send without a recipient.
    pub async fn update_mail(
        &self,
        id: MailId,
        requester: UserId,
        patch: MailPatch,
    ) -> Result<Mail> {
        if patch.is_empty() {
            return Err(Error::Conflict("nothing to update".to_string()));
        }

        for attempt in 0..CAS_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(CAS_RETRY_DELAY).await;
            }

            let mail = self.get_mail(id, requester).await?;
            if mail.sender_id != requester {
                return Err(Error::Forbidden(
                    "only the sender may edit a mail".to_string(),
                ));
            }
            if !self.is_draft(&mail).await? {
                return Err(Error::Forbidden("only drafts can be edited".to_string()));
            }

            let mut updated = mail.clone();

            if let Some(to) = &patch.to {
                updated.to = Some(to.clone());
            }
            if let Some(receiver) = patch.receiver_id {
                updated.receiver_id = Some(receiver);
            }
            if let Some(subject) = &patch.subject {
                updated.subject = subject.clone();
            }
            if let Some(content) = &patch.content {
                updated.content = content.clone();
            }
            let mut sending = false;
            if let Some(names) = &patch.label_names {
                let mut label_ids = Vec::new();
                for name in names {
                    let label = self
                        .directory
                        .resolve_by_name(requester, name)
                        .await?
                        .ok_or_else(|| Error::Validation(format!("unknown label: {name}")))?;
                    if !label_ids.contains(&label.id) {
                        label_ids.push(label.id);
                    }
                }
                let drafts = self.system_label(requester, SystemLabel::Drafts).await?;
                sending = !label_ids.contains(&drafts.id);
                updated.label_ids = label_ids;
            }

            if updated == mail {
                return Err(Error::Conflict("nothing to update".to_string()));
            }

            if sending {
                self.dispatch(&mut updated).await?;
            } else if updated.subject != mail.subject || updated.content != mail.content {
                match self
                    .scan_for_blacklisted(&updated.subject, &updated.content)
                    .await
                {
                    Ok(true) => {
                        return Err(Error::Validation(
                            "the edit contains a blacklisted link".to_string(),
                        ));
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(error = %e, mail = %id, "blacklist check unavailable during edit");
                    }
                }
            }

            if self.store.update_mail(&updated).await? {
                updated.version += 1;
                return Ok(updated);
            }
        }

        Err(Error::Conflict("mail was modified concurrently".to_string()))
    }

    /// Delete a mail from the requester's point of view.
    ///
    /// A draft is destroyed outright, sender only. A sent mail is only
    /// hidden from the requester; the other party keeps their copy, and
    /// the record itself stays.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the requester cannot see the
    /// mail and [`Error::Forbidden`] when a non-sender tries to delete
    /// a draft.
    pub async fn delete_mail(&self, id: MailId, requester: UserId) -> Result<()> {
        let mail = self
            .store
            .get_mail(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("mail {id}")))?;

        if !mail.involves(requester) || mail.hidden_for(requester) {
            return Err(Error::NotFound(format!("mail {id}")));
        }

        if self.is_draft(&mail).await? {
            if mail.sender_id != requester {
                return Err(Error::Forbidden("mail is still a draft".to_string()));
            }
            self.store.delete_mail(id).await?;
            debug!(mail = %id, "draft destroyed");
        } else {
            self.store.hide_from(id, requester).await?;
            debug!(mail = %id, user = %requester, "mail hidden");
        }

        Ok(())
    }

    /// Case-insensitive substring search over everything the requester
    /// can see: subject, content, addresses, and their own label names.
    /// A blank query matches nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn search_mails(&self, query: &str, requester: UserId) -> Result<Vec<Mail>> {
        let needle = query.trim();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        self.store.search(needle, requester).await
    }

    /// The newest mails visible to the requester.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    pub async fn list_recent(&self, requester: UserId) -> Result<Vec<Mail>> {
        self.store.list_recent(requester).await
    }

    /// The newest visible mails carrying one of the requester's labels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the label is not the
    /// requester's.
    pub async fn list_by_label(&self, label_id: LabelId, requester: UserId) -> Result<Vec<Mail>> {
        let label = self
            .directory
            .resolve_by_id(requester, label_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("label {label_id}")))?;

        self.store.list_by_label(label.id, requester).await
    }

    /// Attach one of the requester's labels to a mail. Attaching a
    /// label that is already present changes nothing and succeeds.
    ///
    /// Attaching the spam label runs the full spam-marking path, the
    /// same one automatic detection uses: every link in the mail is
    /// blacklisted and both parties get their spam label attached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a label the requester does not
    /// own or a mail they cannot see, and [`Error::Conflict`] when the
    /// mail keeps changing concurrently.
    pub async fn add_label(
        &self,
        id: MailId,
        label_id: LabelId,
        requester: UserId,
    ) -> Result<Mail> {
        let label = self
            .directory
            .resolve_by_id(requester, label_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("label {label_id}")))?;

        for attempt in 0..CAS_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(CAS_RETRY_DELAY).await;
            }

            let mail = self.get_mail(id, requester).await?;
            if mail.label_ids.contains(&label.id) {
                return Ok(mail);
            }

            let applied = if label.system() == Some(SystemLabel::Spam) {
                self.mark_spam(&mail).await?
            } else {
                self.store.attach_label(mail.id, label.id, mail.version).await?
            };

            if applied {
                return self.get_mail(id, requester).await;
            }
        }

        Err(Error::Conflict("mail was modified concurrently".to_string()))
    }

    /// Detach one of the requester's labels from a mail. Removing a
    /// label that is not present changes nothing and succeeds.
    ///
    /// The lifecycle labels (inbox, sent, drafts) cannot be removed.
    /// Removing the spam label reverses a spam verdict: the mail's
    /// links leave the authoritative blacklist, the flag is cleared,
    /// and both parties lose their spam label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] for a protected label,
    /// [`Error::NotFound`] for a foreign label or invisible mail, and
    /// [`Error::Conflict`] when the mail keeps changing concurrently.
    pub async fn remove_label(
        &self,
        id: MailId,
        label_id: LabelId,
        requester: UserId,
    ) -> Result<Mail> {
        let label = self
            .directory
            .resolve_by_id(requester, label_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("label {label_id}")))?;

        if label.system().is_some_and(SystemLabel::is_protected) {
            return Err(Error::Forbidden(format!(
                "the {} label cannot be removed",
                label.name
            )));
        }

        for attempt in 0..CAS_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(CAS_RETRY_DELAY).await;
            }

            let mail = self.get_mail(id, requester).await?;
            if !mail.label_ids.contains(&label.id) {
                return Ok(mail);
            }

            let applied = if label.system() == Some(SystemLabel::Spam) {
                self.unmark_spam(&mail).await?
            } else {
                self.store.detach_label(mail.id, label.id, mail.version).await?
            };

            if applied {
                return self.get_mail(id, requester).await;
            }
        }

        Err(Error::Conflict("mail was modified concurrently".to_string()))
    }

    /// Shape a mail for the requester: only labels the requester owns
    /// are resolved, the other party's stay invisible.
    ///
    /// The mail must already have passed a visibility check.
    ///
    /// # Errors
    ///
    /// Returns an error if label resolution fails.
    pub async fn view_of(&self, mail: &Mail, requester: UserId) -> Result<MailView> {
        let mut labels = Vec::new();
        for label_id in &mail.label_ids {
            if let Some(label) = self.directory.resolve_by_id(requester, *label_id).await? {
                labels.push(LabelView::from(&label));
            }
        }

        Ok(MailView {
            id: mail.id,
            from: mail.from.clone(),
            to: mail.to.clone(),
            subject: mail.subject.clone(),
            content: mail.content.clone(),
            date_sent: mail.date_sent,
            labels,
            is_spam: mail.is_spam,
        })
    }

    /// Send-time finishing, shared by direct sends and drafts promoted
    /// by an edit: requires a recipient, attaches the sender's sent
    /// label and the recipient's inbox label, stamps the send time, and
    /// scans the text. A scan hit flags the mail as spam for both
    /// parties and blacklists every link it carries; a scan failure
    /// lets the mail go out unflagged.
    async fn dispatch(&self, mail: &mut Mail) -> Result<()> {
        if mail.to.as_deref().is_none_or(|to| to.trim().is_empty()) {
            return Err(Error::Validation(
                "a recipient address is required to send".to_string(),
            ));
        }
        let receiver = mail
            .receiver_id
            .ok_or_else(|| Error::Validation("a recipient is required to send".to_string()))?;

        let sent = self.system_label(mail.sender_id, SystemLabel::Sent).await?;
        if !mail.label_ids.contains(&sent.id) {
            mail.label_ids.push(sent.id);
        }
        let inbox = self.system_label(receiver, SystemLabel::Inbox).await?;
        if !mail.label_ids.contains(&inbox.id) {
            mail.label_ids.push(inbox.id);
        }
        mail.date_sent = Some(Utc::now());

        match self.scan_for_blacklisted(&mail.subject, &mail.content).await {
            Ok(true) => {
                if let Err(e) = self.blacklist_links(&mail.subject, &mail.content).await {
                    warn!(
                        error = %e,
                        mail = %mail.id,
                        "could not blacklist every link of a spam mail"
                    );
                }
                mail.is_spam = true;
                for label in self.spam_label_ids(mail.sender_id, mail.receiver_id).await? {
                    if !mail.label_ids.contains(&label) {
                        mail.label_ids.push(label);
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(
                    error = %e,
                    mail = %mail.id,
                    "blacklist check unavailable, delivering unflagged"
                );
            }
        }

        Ok(())
    }

    /// A mail is a draft while it carries its sender's drafts label.
    async fn is_draft(&self, mail: &Mail) -> Result<bool> {
        let Some(drafts) = self
            .directory
            .resolve_by_name(mail.sender_id, SystemLabel::Drafts.name())
            .await?
        else {
            return Ok(false);
        };

        Ok(mail.label_ids.contains(&drafts.id))
    }

    /// Resolve a system label that seeding guarantees to exist.
    async fn system_label(&self, owner: UserId, label: SystemLabel) -> Result<Label> {
        self.directory
            .resolve_by_name(owner, label.name())
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {owner} has no {label} label")))
    }

    /// The spam label ids of everyone involved in a mail.
    async fn spam_label_ids(
        &self,
        sender: UserId,
        receiver: Option<UserId>,
    ) -> Result<Vec<LabelId>> {
        let mut ids = vec![self.system_label(sender, SystemLabel::Spam).await?.id];
        if let Some(receiver) = receiver {
            let id = self.system_label(receiver, SystemLabel::Spam).await?.id;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Whether any link in the text is blacklisted. The first hit
    /// decides.
    async fn scan_for_blacklisted(&self, subject: &str, content: &str) -> Result<bool> {
        let text = format!("{subject} {content}");
        for link in links::extract(&text) {
            if self.blacklist.is_blacklisted(&link).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Blacklist every distinct link in the text.
    async fn blacklist_links(&self, subject: &str, content: &str) -> Result<()> {
        let text = format!("{subject} {content}");
        let mut seen = Vec::new();
        for link in links::extract(&text) {
            let canonical = canonicalize(&link)?;
            if seen.contains(&canonical) {
                continue;
            }
            self.blacklist.add_url(&canonical).await?;
            seen.push(canonical);
        }
        Ok(())
    }

    /// The spam verdict both marking paths converge on: blacklist the
    /// mail's links, set the flag, attach both parties' spam labels.
    async fn mark_spam(&self, mail: &Mail) -> Result<bool> {
        self.blacklist_links(&mail.subject, &mail.content).await?;

        let spam_labels = self.spam_label_ids(mail.sender_id, mail.receiver_id).await?;
        self.store.set_spam(mail.id, true, &spam_labels, mail.version).await
    }

    /// Reverse a spam verdict: remove the mail's links from the
    /// blacklist, clear the flag, detach both parties' spam labels.
    async fn unmark_spam(&self, mail: &Mail) -> Result<bool> {
        let text = format!("{} {}", mail.subject, mail.content);
        let mut seen = Vec::new();
        for link in links::extract(&text) {
            let canonical = canonicalize(&link)?;
            if seen.contains(&canonical) {
                continue;
            }
            self.blacklist.delete_url(&canonical).await?;
            seen.push(canonical);
        }

        let spam_labels = self.spam_label_ids(mail.sender_id, mail.receiver_id).await?;
        self.store.set_spam(mail.id, false, &spam_labels, mail.version).await
    }
}
