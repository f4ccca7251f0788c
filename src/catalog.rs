//! Catalog pages served through the stale-while-revalidate cache.
//!
//! A page is identified by user, list, and page number. Building one is expensive (several
//! upstream calls), so every read goes through [`CatalogService::page`], which bounds each
//! build with the upstream timeout and lets the cache decide whether to build at all.

// self
use crate::{
	_prelude::*,
	auth::{ListId, UserId},
	cache::{Swr, SwrCache},
	clock::{Clock, SystemClock},
	config::SyncConfig,
};

/// Boxed future returned by [`CatalogSource::build_page`].
pub type CatalogFuture<'a, V> = Pin<Box<dyn Future<Output = Result<V, CatalogError>> + 'a + Send>>;

/// One user-configured list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRecord {
	/// List identifier.
	pub id: ListId,
	/// Disabled lists are configured but hidden from the catalog.
	pub enabled: bool,
}
impl ListRecord {
	/// Creates a list record.
	pub fn new(id: ListId, enabled: bool) -> Self {
		Self { id, enabled }
	}
}

/// Identity of one catalog page.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogKey {
	/// Owner of the list.
	pub user: UserId,
	/// List the page belongs to.
	pub list: ListId,
	/// Page number, starting at 1.
	pub page: u32,
}
impl CatalogKey {
	/// Creates a key.
	pub fn new(user: UserId, list: ListId, page: u32) -> Self {
		Self { user, list, page }
	}

	/// Cache key in the `catalog:{user}:{list}:{page}` form.
	pub fn cache_key(&self) -> String {
		format!("{}{}:{}", Self::user_prefix(&self.user), self.list, self.page)
	}

	/// Prefix shared by every cache key of `user`.
	pub fn user_prefix(user: &UserId) -> String {
		format!("catalog:{user}:")
	}
}
impl Display for CatalogKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.cache_key())
	}
}

/// Failures raised while building a catalog page.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CatalogError {
	/// Upstream API call failed.
	#[error("Upstream catalog request failed: {message}.")]
	Upstream {
		/// Human-readable error payload.
		message: String,
	},
	/// Building the page exceeded the upstream timeout.
	#[error("Catalog page build timed out after {after:?}.")]
	Timeout {
		/// Timeout that elapsed.
		after: StdDuration,
	},
}

/// Builds catalog pages from the upstream API.
pub trait CatalogSource<V>
where
	Self: Send + Sync,
{
	/// Builds the page identified by `key`.
	fn build_page<'a>(&'a self, key: &'a CatalogKey) -> CatalogFuture<'a, V>;
}

/// Cache-fronted access to catalog pages.
pub struct CatalogService<V>
where
	V: Clone + Send + Sync + 'static,
{
	cache: SwrCache<V>,
	source: Arc<dyn CatalogSource<V>>,
	max_age: Duration,
	stale_window: Duration,
	timeout: StdDuration,
}
impl<V> CatalogService<V>
where
	V: Clone + Send + Sync + 'static,
{
	/// Creates a service with the default freshness windows and upstream timeout.
	pub fn new(source: Arc<dyn CatalogSource<V>>) -> Self {
		Self {
			cache: SwrCache::new(Arc::new(SystemClock)),
			source,
			max_age: SyncConfig::DEFAULT_CACHE_MAX_AGE,
			stale_window: SyncConfig::DEFAULT_CACHE_STALE_WINDOW,
			timeout: SyncConfig::DEFAULT_UPSTREAM_TIMEOUT,
		}
	}

	/// Creates a service using the windows and timeout from `config`.
	pub fn from_config(source: Arc<dyn CatalogSource<V>>, config: &SyncConfig) -> Self {
		Self::new(source)
			.with_windows(config.cache_max_age, config.cache_stale_window)
			.with_timeout(config.upstream_timeout)
	}

	/// Replaces the clock used to age cache entries.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.cache = SwrCache::new(clock);

		self
	}

	/// Overrides the fresh and stale windows.
	pub fn with_windows(mut self, max_age: Duration, stale_window: Duration) -> Self {
		self.max_age = max_age;
		self.stale_window = stale_window;

		self
	}

	/// Overrides the bound on a single page build.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Underlying cache, for inspection.
	pub fn cache(&self) -> &SwrCache<V> {
		&self.cache
	}

	/// Returns the page for `key`, building it upstream only on a miss.
	pub async fn page(&self, key: CatalogKey) -> Result<Swr<V>, CatalogError> {
		let cache_key = key.cache_key();
		let source = self.source.clone();
		let timeout = self.timeout;

		self.cache
			.get_with_swr(&cache_key, self.max_age, self.stale_window, move || async move {
				tokio::time::timeout(timeout, source.build_page(&key))
					.await
					.map_err(|_| CatalogError::Timeout { after: timeout })?
			})
			.await
	}

	/// Drops every cached page of `user`, e.g. after their list settings change.
	pub fn invalidate_user(&self, user: &UserId) -> usize {
		self.cache.invalidate_prefix(&CatalogKey::user_prefix(user))
	}
}
impl<V> Debug for CatalogService<V>
where
	V: Clone + Send + Sync + 'static,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CatalogService")
			.field("max_age", &self.max_age)
			.field("stale_window", &self.stale_window)
			.field("timeout", &self.timeout)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::cache::ServedFrom;

	struct SlowSource(AtomicUsize);
	impl CatalogSource<String> for SlowSource {
		fn build_page<'a>(&'a self, key: &'a CatalogKey) -> CatalogFuture<'a, String> {
			Box::pin(async move {
				self.0.fetch_add(1, Ordering::SeqCst);

				if key.page > 1 {
					tokio::time::sleep(StdDuration::from_secs(60)).await;
				}

				Ok(format!("items for {key}"))
			})
		}
	}

	fn key(page: u32) -> CatalogKey {
		CatalogKey::new(
			UserId::new("alice").expect("User fixture should be valid."),
			ListId::new("watchlist").expect("List fixture should be valid."),
			page,
		)
	}

	#[test]
	fn cache_key_layout() {
		assert_eq!(key(1).cache_key(), "catalog:alice:watchlist:1");
		assert!(key(3).cache_key().starts_with(&CatalogKey::user_prefix(&key(3).user)));
	}

	#[tokio::test]
	async fn second_read_is_served_from_cache() {
		let source = Arc::new(SlowSource(AtomicUsize::new(0)));
		let service: CatalogService<String> = CatalogService::new(source.clone());
		let first = service.page(key(1)).await.expect("First build should succeed.");
		let second = service.page(key(1)).await.expect("Cached read should succeed.");

		assert_eq!(first.served_from, ServedFrom::Network);
		assert_eq!(second.served_from, ServedFrom::Fresh);
		assert_eq!(second.value, "items for catalog:alice:watchlist:1");
		assert_eq!(source.0.load(Ordering::SeqCst), 1);
		assert_eq!(service.invalidate_user(&key(1).user), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn slow_builds_time_out() {
		let source = Arc::new(SlowSource(AtomicUsize::new(0)));
		let service: CatalogService<String> =
			CatalogService::new(source).with_timeout(StdDuration::from_secs(15));
		let err = service.page(key(2)).await.expect_err("Slow build must time out.");

		assert_eq!(err, CatalogError::Timeout { after: StdDuration::from_secs(15) });
		assert!(service.cache().peek(&key(2).cache_key()).is_none());
	}
}
