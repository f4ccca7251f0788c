// std
use std::sync::Arc;
// crates.io
use parking_lot::Mutex;
use time::macros;
// self
use trakt_sync::{
	auth::{ListId, TokenRecord, UserId},
	cache::ServedFrom,
	catalog::{CatalogError, CatalogFuture, CatalogKey, CatalogService, CatalogSource, ListRecord},
	clock::ManualClock,
	config::SyncConfig,
	prewarm::{PrewarmSummary, Prewarmer},
	store::{ListStore, MemoryStore, TokenStore},
};

#[derive(Default)]
struct RecordingSource {
	calls: Mutex<Vec<String>>,
	failing: Option<&'static str>,
}
impl CatalogSource<String> for RecordingSource {
	fn build_page<'a>(&'a self, key: &'a CatalogKey) -> CatalogFuture<'a, String> {
		Box::pin(async move {
			self.calls.lock().push(key.cache_key());

			if self.failing == Some(key.list.as_ref()) {
				return Err(CatalogError::Upstream { message: "list not found".into() });
			}

			Ok(format!("page {key}"))
		})
	}
}

fn user(value: &str) -> UserId {
	UserId::new(value).expect("User fixture should be valid.")
}

fn list(value: &str, enabled: bool) -> ListRecord {
	ListRecord::new(ListId::new(value).expect("List fixture should be valid."), enabled)
}

async fn seed_user(store: &MemoryStore, id: &str, lists: Vec<ListRecord>) {
	let record = TokenRecord::builder(user(id))
		.access_token("access")
		.refresh_token("refresh")
		.build()
		.expect("Token record fixture should build.");

	store.upsert(record).await.expect("Failed to seed token record.");
	store.set_lists(user(id), lists);
}

fn prewarmer(
	store: &Arc<MemoryStore>,
	source: &Arc<RecordingSource>,
	clock: &ManualClock,
) -> (Prewarmer<String>, Arc<CatalogService<String>>) {
	let users: Arc<dyn TokenStore> = store.clone();
	let lists: Arc<dyn ListStore> = store.clone();
	let catalog = Arc::new(
		CatalogService::new(source.clone() as Arc<dyn CatalogSource<String>>)
			.with_clock(Arc::new(clock.clone())),
	);
	let prewarmer =
		Prewarmer::new(users, lists, catalog.clone()).with_clock(Arc::new(clock.clone()));

	(prewarmer, catalog)
}

#[tokio::test]
async fn warms_first_enabled_lists_in_order() {
	let store = Arc::new(MemoryStore::default());
	let source = Arc::new(RecordingSource::default());
	let clock = ManualClock::new(macros::datetime!(2025-01-01 06:00 UTC));

	seed_user(
		&store,
		"alice",
		vec![
			list("disabled", false),
			list("watchlist", true),
			list("trending", true),
			list("favorites", true),
		],
	)
	.await;

	let (prewarmer, catalog) = prewarmer(&store, &source, &clock);

	assert_eq!(prewarmer.last_warmed(), None);

	let summary = prewarmer.prewarm_popular_catalogs().await;

	assert_eq!(summary, PrewarmSummary { users: 1, warmed: 2, failed: 0 });
	assert_eq!(
		*source.calls.lock(),
		vec!["catalog:alice:watchlist:1".to_owned(), "catalog:alice:trending:1".to_owned()]
	);
	assert_eq!(prewarmer.last_warmed(), Some(macros::datetime!(2025-01-01 06:00 UTC)));

	let key = CatalogKey::new(
		user("alice"),
		ListId::new("watchlist").expect("List fixture should be valid."),
		1,
	);
	let read = catalog.page(key).await.expect("Prewarmed page should be cached.");

	assert_eq!(read.served_from, ServedFrom::Fresh);
	assert_eq!(source.calls.lock().len(), 2);
}

#[tokio::test]
async fn failing_list_does_not_stop_the_pass() {
	let store = Arc::new(MemoryStore::default());
	let source = Arc::new(RecordingSource { failing: Some("broken"), ..Default::default() });
	let clock = ManualClock::new(macros::datetime!(2025-01-01 06:00 UTC));

	seed_user(&store, "alice", vec![list("broken", true), list("watchlist", true)]).await;
	seed_user(&store, "bob", vec![list("trending", true)]).await;
	seed_user(&store, "carol", Vec::new()).await;

	let (prewarmer, _) = prewarmer(&store, &source, &clock);
	let summary = prewarmer.prewarm_popular_catalogs().await;

	assert_eq!(summary, PrewarmSummary { users: 3, warmed: 2, failed: 1 });
	assert_eq!(source.calls.lock().len(), 3);
	assert!(prewarmer.last_warmed().is_some());
}

#[tokio::test]
async fn per_user_limit_and_page_are_configurable() {
	let store = Arc::new(MemoryStore::default());
	let source = Arc::new(RecordingSource::default());
	let clock = ManualClock::new(macros::datetime!(2025-01-01 06:00 UTC));

	seed_user(&store, "alice", vec![list("a", true), list("b", true), list("c", true)]).await;

	let (prewarmer, _) = prewarmer(&store, &source, &clock);
	let prewarmer = prewarmer.with_lists_per_user(1).with_page(2);

	prewarmer.prewarm_popular_catalogs().await;

	assert_eq!(*source.calls.lock(), vec!["catalog:alice:a:2".to_owned()]);
}

#[tokio::test]
async fn limit_and_page_follow_the_environment() {
	let store = Arc::new(MemoryStore::default());
	let source = Arc::new(RecordingSource::default());
	let config = SyncConfig::from_lookup(|key| match key {
		"PREWARM_LISTS_PER_USER" => Some("1".to_owned()),
		"PREWARM_PAGE" => Some("4".to_owned()),
		_ => None,
	})
	.expect("Prewarm settings should validate.");

	seed_user(&store, "alice", vec![list("a", true), list("b", true)]).await;

	let users: Arc<dyn TokenStore> = store.clone();
	let lists: Arc<dyn ListStore> = store.clone();
	let catalog = Arc::new(CatalogService::from_config(
		source.clone() as Arc<dyn CatalogSource<String>>,
		&config,
	));
	let prewarmer = Prewarmer::from_config(users, lists, catalog, &config);
	let summary = prewarmer.prewarm_popular_catalogs().await;

	assert_eq!(summary, PrewarmSummary { users: 1, warmed: 1, failed: 0 });
	assert_eq!(*source.calls.lock(), vec!["catalog:alice:a:4".to_owned()]);
}

#[tokio::test]
async fn second_pass_within_fresh_window_reuses_cache() {
	let store = Arc::new(MemoryStore::default());
	let source = Arc::new(RecordingSource::default());
	let clock = ManualClock::new(macros::datetime!(2025-01-01 06:00 UTC));

	seed_user(&store, "alice", vec![list("watchlist", true)]).await;

	let (prewarmer, _) = prewarmer(&store, &source, &clock);

	prewarmer.prewarm_popular_catalogs().await;
	clock.advance(time::Duration::minutes(10));
	prewarmer.prewarm_popular_catalogs().await;

	assert_eq!(source.calls.lock().len(), 1);
	assert_eq!(prewarmer.last_warmed(), Some(macros::datetime!(2025-01-01 06:10 UTC)));
}
