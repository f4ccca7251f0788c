//! Scheduled catalog prewarming.
//!
//! Each pass touches the first few enabled lists of every user through the normal cache read
//! path, so the first real request after a quiet period finds a fresh or stale entry instead
//! of a miss.

// self
use crate::{
	_prelude::*,
	auth::UserId,
	catalog::{CatalogKey, CatalogService},
	clock::{Clock, SystemClock},
	config::SyncConfig,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{ListStore, TokenStore},
};

/// Tally of one [`Prewarmer::prewarm_popular_catalogs`] pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrewarmSummary {
	/// Users visited.
	pub users: usize,
	/// Pages read successfully (from cache or upstream).
	pub warmed: usize,
	/// Pages whose read failed.
	pub failed: usize,
}

/// Populates catalog pages ahead of user traffic.
pub struct Prewarmer<V>
where
	V: Clone + Send + Sync + 'static,
{
	users: Arc<dyn TokenStore>,
	lists: Arc<dyn ListStore>,
	catalog: Arc<CatalogService<V>>,
	lists_per_user: usize,
	page: u32,
	clock: Arc<dyn Clock>,
	last_warmed: Mutex<Option<OffsetDateTime>>,
}
impl<V> Prewarmer<V>
where
	V: Clone + Send + Sync + 'static,
{
	/// Creates a prewarmer that visits every user known to `users`.
	pub fn new(
		users: Arc<dyn TokenStore>,
		lists: Arc<dyn ListStore>,
		catalog: Arc<CatalogService<V>>,
	) -> Self {
		Self {
			users,
			lists,
			catalog,
			lists_per_user: SyncConfig::DEFAULT_LISTS_PER_USER,
			page: 1,
			clock: Arc::new(SystemClock),
			last_warmed: Mutex::new(None),
		}
	}

	/// Creates a prewarmer using the per-user list limit and page from `config`.
	pub fn from_config(
		users: Arc<dyn TokenStore>,
		lists: Arc<dyn ListStore>,
		catalog: Arc<CatalogService<V>>,
		config: &SyncConfig,
	) -> Self {
		Self::new(users, lists, catalog)
			.with_lists_per_user(config.prewarm_lists_per_user)
			.with_page(config.prewarm_page)
	}

	/// Overrides how many enabled lists per user are touched.
	pub fn with_lists_per_user(mut self, lists_per_user: usize) -> Self {
		self.lists_per_user = lists_per_user;

		self
	}

	/// Overrides the page number that is populated.
	pub fn with_page(mut self, page: u32) -> Self {
		self.page = page;

		self
	}

	/// Replaces the clock that stamps [`Prewarmer::last_warmed`].
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Instant at which the last pass completed, for health checks.
	pub fn last_warmed(&self) -> Option<OffsetDateTime> {
		*self.last_warmed.lock()
	}

	/// Reads the first enabled lists of every user through the catalog cache.
	///
	/// Failures are logged per list and never stop the pass.
	pub async fn prewarm_popular_catalogs(&self) -> PrewarmSummary {
		const KIND: FlowKind = FlowKind::Prewarm;

		let span = FlowSpan::new(KIND, "prewarm_popular_catalogs");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let summary = span
			.instrument(async move {
				let mut summary = PrewarmSummary::default();
				let users = match self.users.list_users().await {
					Ok(users) => users,
					Err(err) => {
						obs::store_unavailable(&err);

						return summary;
					},
				};

				for user in users {
					summary.users += 1;

					self.prewarm_user(&user, &mut summary).await;
				}

				summary
			})
			.await;

		*self.last_warmed.lock() = Some(self.clock.now());

		obs::prewarm_pass_finished(&summary);
		obs::record_flow_outcome(
			KIND,
			if summary.failed == 0 { FlowOutcome::Success } else { FlowOutcome::Failure },
		);

		summary
	}

	async fn prewarm_user(&self, user: &UserId, summary: &mut PrewarmSummary) {
		let lists = match self.lists.lists(user).await {
			Ok(lists) => lists,
			Err(err) => {
				obs::store_unavailable(&err);

				summary.failed += 1;

				return;
			},
		};

		for list in lists.into_iter().filter(|list| list.enabled).take(self.lists_per_user) {
			let key = CatalogKey::new(user.clone(), list.id.clone(), self.page);

			match self.catalog.page(key).await {
				Ok(_) => summary.warmed += 1,
				Err(err) => {
					obs::prewarm_failed(user, &list.id, &err);

					summary.failed += 1;
				},
			}
		}
	}
}
impl<V> Debug for Prewarmer<V>
where
	V: Clone + Send + Sync + 'static,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Prewarmer")
			.field("lists_per_user", &self.lists_per_user)
			.field("page", &self.page)
			.field("last_warmed", &self.last_warmed())
			.finish_non_exhaustive()
	}
}
