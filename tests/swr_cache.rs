// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use time::{Duration, macros};
use tokio::sync::Notify;
// self
use trakt_sync::{
	cache::{ServedFrom, SwrCache},
	clock::ManualClock,
};

const KEY: &str = "catalog:alice:watchlist:1";
const MAX_AGE: Duration = Duration::seconds(60);
const STALE_WINDOW: Duration = Duration::seconds(300);

fn cache() -> (SwrCache<String>, ManualClock) {
	let clock = ManualClock::new(macros::datetime!(2025-01-01 00:00 UTC));

	(SwrCache::new(Arc::new(clock.clone())), clock)
}

async fn settle() {
	for _ in 0..20 {
		tokio::task::yield_now().await;
	}
}

fn counting_fetch(
	calls: &Arc<AtomicUsize>,
	value: &'static str,
) -> impl 'static + Send + FnOnce() -> std::future::Ready<Result<String, String>> {
	let calls = calls.clone();

	move || {
		calls.fetch_add(1, Ordering::SeqCst);

		std::future::ready(Ok(value.to_owned()))
	}
}

async fn crashing_fetch() -> Result<String, String> {
	panic!("catalog builder crashed")
}

#[tokio::test]
async fn entries_age_from_fresh_to_stale_to_miss() {
	let (cache, clock) = cache();
	let calls = Arc::new(AtomicUsize::new(0));

	cache.insert(KEY, "v1".into());
	clock.advance(Duration::seconds(30));

	let fresh = cache
		.get_with_swr(KEY, MAX_AGE, STALE_WINDOW, counting_fetch(&calls, "unused"))
		.await
		.expect("Fresh read should succeed.");

	assert_eq!(fresh.served_from, ServedFrom::Fresh);
	assert_eq!(fresh.value, "v1");
	assert_eq!(calls.load(Ordering::SeqCst), 0);

	clock.advance(Duration::seconds(60));

	let stale = cache
		.get_with_swr(KEY, MAX_AGE, STALE_WINDOW, counting_fetch(&calls, "v2"))
		.await
		.expect("Stale read should succeed.");

	assert_eq!(stale.served_from, ServedFrom::Stale);
	assert_eq!(stale.value, "v1");

	settle().await;

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(cache.peek(KEY).as_deref(), Some("v2"));
	assert!(!cache.is_revalidating(KEY));

	// The revalidated entry restarts its fresh window.
	let refreshed = cache
		.get_with_swr(KEY, MAX_AGE, STALE_WINDOW, counting_fetch(&calls, "unused"))
		.await
		.expect("Fresh read should succeed.");

	assert_eq!(refreshed.served_from, ServedFrom::Fresh);

	clock.advance(MAX_AGE + STALE_WINDOW + Duration::seconds(1));

	let miss = cache
		.get_with_swr(KEY, MAX_AGE, STALE_WINDOW, counting_fetch(&calls, "v3"))
		.await
		.expect("Expired read should fetch.");

	assert_eq!(miss.served_from, ServedFrom::Network);
	assert_eq!(miss.value, "v3");
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn one_revalidation_per_stale_entry() {
	let (cache, clock) = cache();
	let calls = Arc::new(AtomicUsize::new(0));
	let release = Arc::new(Notify::new());

	cache.insert(KEY, "v1".into());
	clock.advance(Duration::seconds(90));

	for _ in 0..10 {
		let calls = calls.clone();
		let release = release.clone();
		let read = cache
			.get_with_swr(KEY, MAX_AGE, STALE_WINDOW, move || async move {
				calls.fetch_add(1, Ordering::SeqCst);
				release.notified().await;

				Ok::<_, String>("v2".to_owned())
			})
			.await
			.expect("Stale read should succeed.");

		assert_eq!(read.served_from, ServedFrom::Stale);
		assert_eq!(read.value, "v1");
	}

	settle().await;

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert!(cache.is_revalidating(KEY));

	release.notify_one();
	settle().await;

	assert_eq!(cache.peek(KEY).as_deref(), Some("v2"));
	assert!(!cache.is_revalidating(KEY));
}

#[tokio::test]
async fn stale_reads_do_not_wait_for_revalidation() {
	let (cache, clock) = cache();

	cache.insert(KEY, "v1".into());
	clock.advance(Duration::seconds(120));

	let read = tokio::time::timeout(
		std::time::Duration::from_millis(100),
		cache.get_with_swr(KEY, MAX_AGE, STALE_WINDOW, || async {
			std::future::pending::<()>().await;

			Ok::<_, String>("never".to_owned())
		}),
	)
	.await
	.expect("Stale read must return without waiting on the upstream.")
	.expect("Stale read should succeed.");

	assert_eq!(read.served_from, ServedFrom::Stale);
	assert_eq!(read.value, "v1");
}

#[tokio::test]
async fn failed_revalidation_keeps_stale_value() {
	let (cache, clock) = cache();
	let calls = Arc::new(AtomicUsize::new(0));

	cache.insert(KEY, "v1".into());
	clock.advance(Duration::seconds(90));

	let first_calls = calls.clone();
	let read = cache
		.get_with_swr(KEY, MAX_AGE, STALE_WINDOW, move || async move {
			first_calls.fetch_add(1, Ordering::SeqCst);

			Err::<String, _>("upstream 503".to_owned())
		})
		.await
		.expect("Stale read should succeed even if revalidation will fail.");

	assert_eq!(read.value, "v1");

	settle().await;

	assert_eq!(cache.peek(KEY).as_deref(), Some("v1"));
	assert!(!cache.is_revalidating(KEY));

	// The flag was cleared, so the next stale read retries.
	let retry = cache
		.get_with_swr(KEY, MAX_AGE, STALE_WINDOW, counting_fetch(&calls, "v2"))
		.await
		.expect("Stale read should succeed.");

	assert_eq!(retry.served_from, ServedFrom::Stale);

	settle().await;

	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(cache.peek(KEY).as_deref(), Some("v2"));
}

#[tokio::test]
async fn panicking_revalidation_lets_the_next_read_retry() {
	let (cache, clock) = cache();
	let calls = Arc::new(AtomicUsize::new(0));

	cache.insert(KEY, "v1".into());
	clock.advance(Duration::seconds(90));

	let read = cache
		.get_with_swr(KEY, MAX_AGE, STALE_WINDOW, crashing_fetch)
		.await
		.expect("Stale read should succeed even if revalidation panics.");

	assert_eq!(read.value, "v1");

	settle().await;

	assert_eq!(cache.peek(KEY).as_deref(), Some("v1"));
	assert!(!cache.is_revalidating(KEY));

	let retry = cache
		.get_with_swr(KEY, MAX_AGE, STALE_WINDOW, counting_fetch(&calls, "v2"))
		.await
		.expect("Stale read should succeed.");

	assert_eq!(retry.served_from, ServedFrom::Stale);

	settle().await;

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(cache.peek(KEY).as_deref(), Some("v2"));
}

#[tokio::test]
async fn failed_miss_stores_nothing() {
	let (cache, _) = cache();
	let err = cache
		.get_with_swr(KEY, MAX_AGE, STALE_WINDOW, || async { Err::<String, _>("boom".to_owned()) })
		.await
		.expect_err("A failed miss fetch is surfaced to the caller.");

	assert_eq!(err, "boom");
	assert!(cache.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_one_fetch() {
	let (cache, _) = cache();
	let calls = Arc::new(AtomicUsize::new(0));
	let mut reads = Vec::new();

	for _ in 0..8 {
		let cache = cache.clone();
		let calls = calls.clone();

		reads.push(tokio::spawn(async move {
			cache
				.get_with_swr(KEY, MAX_AGE, STALE_WINDOW, move || async move {
					calls.fetch_add(1, Ordering::SeqCst);
					tokio::time::sleep(std::time::Duration::from_millis(50)).await;

					Ok::<_, String>("built".to_owned())
				})
				.await
		}));
	}

	let mut network = 0;

	for read in reads {
		let read = read.await.expect("Read task should not panic.").expect("Read should succeed.");

		assert_eq!(read.value, "built");

		if read.served_from == ServedFrom::Network {
			network += 1;
		}
	}

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(network, 1);
}

#[tokio::test]
async fn revalidated_value_is_fresh_on_the_next_read() {
	let (cache, clock) = cache();
	let calls = Arc::new(AtomicUsize::new(0));
	let max_age = Duration::seconds(60);
	let stale_window = Duration::seconds(120);

	cache.insert(KEY, "A".into());
	clock.advance(Duration::seconds(30));

	let read = cache
		.get_with_swr(KEY, max_age, stale_window, counting_fetch(&calls, "B"))
		.await
		.expect("Read should succeed.");

	assert_eq!((read.value.as_str(), read.served_from), ("A", ServedFrom::Fresh));

	clock.advance(Duration::seconds(60));

	let read = cache
		.get_with_swr(KEY, max_age, stale_window, counting_fetch(&calls, "B"))
		.await
		.expect("Read should succeed.");

	assert_eq!((read.value.as_str(), read.served_from), ("A", ServedFrom::Stale));

	clock.advance(Duration::seconds(1));
	settle().await;

	assert_eq!(cache.peek(KEY).as_deref(), Some("B"));

	clock.advance(Duration::seconds(4));

	let read = cache
		.get_with_swr(KEY, max_age, stale_window, counting_fetch(&calls, "C"))
		.await
		.expect("Read should succeed.");

	assert_eq!((read.value.as_str(), read.served_from), ("B", ServedFrom::Fresh));
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}
