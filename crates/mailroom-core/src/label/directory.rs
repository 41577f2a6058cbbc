//! Label lookup capability.

use std::future::Future;

use super::model::{Label, LabelId};
use crate::Result;
use crate::user::UserId;

/// Capability to resolve labels scoped to their owner.
///
/// The mail service goes through this seam instead of a concrete store,
/// so tests can substitute a stub directory. Name lookups ignore case.
pub trait LabelDirectory: Send + Sync {
    /// Resolves one of the owner's labels by id.
    fn resolve_by_id(
        &self,
        owner: UserId,
        id: LabelId,
    ) -> impl Future<Output = Result<Option<Label>>> + Send;

    /// Resolves one of the owner's labels by name, ignoring case.
    fn resolve_by_name(
        &self,
        owner: UserId,
        name: &str,
    ) -> impl Future<Output = Result<Option<Label>>> + Send;
}
