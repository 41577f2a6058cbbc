//! Two-tier blacklist membership service.
//!
//! The remote bloom filter can only answer "definitely not" or "maybe";
//! the local store is exact. A check asks the filter first and confirms
//! a "maybe" against the store, so callers never see a bloom false
//! positive while the common clean URL costs one probe and no store
//! query.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use mailroom_filter::{FilterClient, Membership};

use super::model::canonicalize;
use super::repository::BlacklistStore;
use crate::Result;

/// Capability to talk to the probabilistic URL filter.
///
/// [`FilterClient`] implements this; tests substitute stubs.
pub trait UrlFilter: Send + Sync {
    /// Probes the filter for a canonical URL.
    fn query(
        &self,
        url: &str,
    ) -> impl Future<Output = mailroom_filter::Result<Membership>> + Send;

    /// Adds a canonical URL to the filter.
    fn add(&self, url: &str) -> impl Future<Output = mailroom_filter::Result<()>> + Send;

    /// Removes a canonical URL from the filter's exact set, reporting
    /// whether it was known. Bloom bits stay set.
    fn delete(&self, url: &str) -> impl Future<Output = mailroom_filter::Result<bool>> + Send;
}

impl<S> UrlFilter for FilterClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn query(&self, url: &str) -> mailroom_filter::Result<Membership> {
        self.check(url).await
    }

    async fn add(&self, url: &str) -> mailroom_filter::Result<()> {
        self.insert(url).await
    }

    async fn delete(&self, url: &str) -> mailroom_filter::Result<bool> {
        self.remove(url).await
    }
}

/// Blacklist decisions backed by the filter and the store together.
pub struct BlacklistService<F> {
    store: BlacklistStore,
    filter: F,
    degraded_checks: AtomicU64,
}

impl<F: UrlFilter> BlacklistService<F> {
    /// Create a service over an authoritative store and a filter.
    pub fn new(store: BlacklistStore, filter: F) -> Self {
        Self {
            store,
            filter,
            degraded_checks: AtomicU64::new(0),
        }
    }

    /// Number of checks so far that could not use both tiers.
    pub fn degraded_checks(&self) -> u64 {
        self.degraded_checks.load(Ordering::Relaxed)
    }

    /// Decides whether a URL is blacklisted.
    ///
    /// A definitive "absent" from the filter skips the store entirely;
    /// a "maybe" is confirmed against the store.
    ///
    /// With the filter unreachable the store alone decides. With the
    /// store unreachable after a filter hit, the URL is treated as
    /// blacklisted. Both degraded paths are logged and counted.
    ///
    /// # Errors
    ///
    /// Returns an error only when no tier could answer.
    pub async fn is_blacklisted(&self, url: &str) -> Result<bool> {
        let canonical = canonicalize(url)?;

        let membership = match self.filter.query(&canonical).await {
            Ok(membership) => membership,
            Err(e) => {
                self.degraded_checks.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %e,
                    url = %canonical,
                    "filter probe failed, deciding from the store alone"
                );
                return self.store.contains(&canonical).await;
            }
        };

        if !membership.is_maybe() {
            return Ok(false);
        }

        match self.store.contains(&canonical).await {
            Ok(listed) => Ok(listed),
            Err(e) => {
                // The filter matched and the truth is unreachable;
                // fail toward blocking.
                self.degraded_checks.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %e,
                    url = %canonical,
                    "store lookup failed after a filter hit, treating as blacklisted"
                );
                Ok(true)
            }
        }
    }

    /// Blacklists a URL, returning the canonical form that was stored.
    ///
    /// The store is written first. The filter is advised afterwards and
    /// a failure there is tolerated: until the filter learns the URL,
    /// probes answer "absent" and checks miss it, but the store keeps
    /// the truth.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for uncanonicalizable input
    /// and an error if the store write fails.
    pub async fn add_url(&self, url: &str) -> Result<String> {
        let canonical = canonicalize(url)?;
        self.store.insert(&canonical).await?;

        if let Err(e) = self.filter.add(&canonical).await {
            warn!(
                error = %e,
                url = %canonical,
                "filter insert failed, checks will miss this URL until it recovers"
            );
        }

        Ok(canonical)
    }

    /// Removes a URL from the blacklist.
    ///
    /// The store delete is authoritative. The filter delete only trims
    /// its exact set, shared bloom bits cannot be unset, so failures
    /// there are tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for uncanonicalizable input
    /// and an error if the store delete fails.
    pub async fn delete_url(&self, url: &str) -> Result<()> {
        let canonical = canonicalize(url)?;

        if !self.store.remove(&canonical).await? {
            debug!(url = %canonical, "delete for a URL that was not blacklisted");
        }

        if let Err(e) = self.filter.delete(&canonical).await {
            warn!(
                error = %e,
                url = %canonical,
                "filter delete failed, it may keep answering maybe"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{Error, storage};

    /// Scripted filter double with shared interior state.
    #[derive(Clone, Default)]
    struct StubFilter {
        state: Arc<StubState>,
    }

    #[derive(Default)]
    struct StubState {
        matching: Mutex<Vec<String>>,
        added: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
        probed: Mutex<Vec<String>>,
        down: AtomicBool,
    }

    impl StubFilter {
        fn matching(self, urls: &[&str]) -> Self {
            *self.state.matching.lock().unwrap() = urls.iter().map(ToString::to_string).collect();
            self
        }

        fn go_down(&self) {
            self.state.down.store(true, Ordering::Relaxed);
        }

        fn added(&self) -> Vec<String> {
            self.state.added.lock().unwrap().clone()
        }

        fn deleted(&self) -> Vec<String> {
            self.state.deleted.lock().unwrap().clone()
        }

        fn probed(&self) -> Vec<String> {
            self.state.probed.lock().unwrap().clone()
        }
    }

    impl UrlFilter for StubFilter {
        async fn query(&self, url: &str) -> mailroom_filter::Result<Membership> {
            if self.state.down.load(Ordering::Relaxed) {
                return Err(mailroom_filter::Error::Closed);
            }
            self.state.probed.lock().unwrap().push(url.to_string());

            let matching = self.state.matching.lock().unwrap();
            let added = self.state.added.lock().unwrap();
            if matching.iter().any(|u| u == url) || added.iter().any(|u| u == url) {
                Ok(Membership::Maybe {
                    listed: added.iter().any(|u| u == url),
                })
            } else {
                Ok(Membership::Absent)
            }
        }

        async fn add(&self, url: &str) -> mailroom_filter::Result<()> {
            if self.state.down.load(Ordering::Relaxed) {
                return Err(mailroom_filter::Error::Closed);
            }
            self.state.added.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn delete(&self, url: &str) -> mailroom_filter::Result<bool> {
            if self.state.down.load(Ordering::Relaxed) {
                return Err(mailroom_filter::Error::Closed);
            }
            self.state.deleted.lock().unwrap().push(url.to_string());
            let mut added = self.state.added.lock().unwrap();
            let before = added.len();
            added.retain(|u| u != url);
            Ok(added.len() < before)
        }
    }

    async fn service_with(filter: StubFilter) -> BlacklistService<StubFilter> {
        let store = BlacklistStore::in_memory().await.unwrap();
        BlacklistService::new(store, filter)
    }

    #[tokio::test]
    async fn absent_filter_answer_is_final() {
        let filter = StubFilter::default();
        let service = service_with(filter.clone()).await;

        // even a listed URL is invisible while the filter misses it
        service.store.insert("evil.com").await.unwrap();

        assert!(!service.is_blacklisted("evil.com").await.unwrap());
        assert_eq!(filter.probed(), vec!["evil.com"]);
        assert_eq!(service.degraded_checks(), 0);
    }

    #[tokio::test]
    async fn filter_hit_is_confirmed_against_the_store() {
        let filter = StubFilter::default().matching(&["evil.com"]);
        let service = service_with(filter).await;
        service.store.insert("evil.com").await.unwrap();

        assert!(service.is_blacklisted("evil.com").await.unwrap());
    }

    #[tokio::test]
    async fn bloom_false_positives_never_escape() {
        let filter = StubFilter::default().matching(&["innocent.example"]);
        let service = service_with(filter).await;

        assert!(!service.is_blacklisted("innocent.example").await.unwrap());
    }

    #[tokio::test]
    async fn store_decides_alone_when_the_filter_is_down() {
        let filter = StubFilter::default();
        let service = service_with(filter.clone()).await;
        service.store.insert("evil.com").await.unwrap();
        filter.go_down();

        assert!(service.is_blacklisted("evil.com").await.unwrap());
        assert!(!service.is_blacklisted("clean.example").await.unwrap());
        assert_eq!(service.degraded_checks(), 2);
    }

    #[tokio::test]
    async fn filter_hit_blocks_when_the_store_is_down() {
        let filter = StubFilter::default().matching(&["evil.com"]);
        let pool = storage::connect_in_memory().await.unwrap();
        let store = BlacklistStore::from_pool(pool.clone()).await.unwrap();
        let service = BlacklistService::new(store, filter);
        pool.close().await;

        assert!(service.is_blacklisted("evil.com").await.unwrap());
        assert_eq!(service.degraded_checks(), 1);
    }

    #[tokio::test]
    async fn both_tiers_down_is_an_error() {
        let filter = StubFilter::default();
        let pool = storage::connect_in_memory().await.unwrap();
        let store = BlacklistStore::from_pool(pool.clone()).await.unwrap();
        let service = BlacklistService::new(store, filter.clone());
        pool.close().await;
        filter.go_down();

        let err = service.is_blacklisted("evil.com").await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[tokio::test]
    async fn add_url_canonicalizes_and_feeds_both_tiers() {
        let filter = StubFilter::default();
        let service = service_with(filter.clone()).await;

        let canonical = service
            .add_url("  Visit HTTPS://Evil.COM/Login now  ")
            .await
            .unwrap();
        assert_eq!(canonical, "https://evil.com/login");
        assert!(service.store.contains("https://evil.com/login").await.unwrap());
        assert_eq!(filter.added(), vec!["https://evil.com/login"]);

        assert!(service.is_blacklisted("https://EVIL.com/login").await.unwrap());
    }

    #[tokio::test]
    async fn add_url_survives_a_filter_outage() {
        let filter = StubFilter::default();
        let service = service_with(filter.clone()).await;
        filter.go_down();

        service.add_url("evil.com").await.unwrap();
        assert!(service.store.contains("evil.com").await.unwrap());
        assert!(filter.added().is_empty());
    }

    #[tokio::test]
    async fn delete_url_clears_the_store_and_advises_the_filter() {
        let filter = StubFilter::default();
        let service = service_with(filter.clone()).await;

        service.add_url("evil.com").await.unwrap();
        service.delete_url("EVIL.com").await.unwrap();

        assert!(!service.store.contains("evil.com").await.unwrap());
        assert_eq!(filter.deleted(), vec!["evil.com"]);

        // deleting again is a quiet no-op
        service.delete_url("evil.com").await.unwrap();
    }

    #[tokio::test]
    async fn unusable_input_is_rejected_up_front() {
        let filter = StubFilter::default();
        let service = service_with(filter.clone()).await;

        assert!(matches!(
            service.is_blacklisted("   ").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            service.add_url("several plain words").await,
            Err(Error::Validation(_))
        ));
        assert!(filter.probed().is_empty());
    }
}
