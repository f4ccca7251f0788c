//! Per-user mutual exclusion for token mutations.
//!
//! Every code path that reads a token record with the intent to rewrite it runs inside
//! [`UserLocks::with_user_lock`]. The guard is an async mutex owned for the duration of the
//! closure's future and released on drop, so it is also released when the work fails or the
//! surrounding task is cancelled.

// self
use crate::{_prelude::*, auth::UserId};

/// Registry of lazily created per-user async mutexes.
///
/// Entries are never removed; the registry grows with the number of distinct users, which is
/// bounded by the token store.
#[derive(Debug, Default)]
pub struct UserLocks(Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>);
impl UserLocks {
	/// Runs `f` while holding the exclusive lock for `user`.
	///
	/// Work for different users proceeds in parallel; work for the same user is serialized in
	/// acquisition order.
	pub async fn with_user_lock<F, Fut, T>(&self, user: &UserId, f: F) -> T
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		let guard = self.guard_for(user);
		let _held = guard.lock().await;

		f().await
	}

	/// Number of users that have acquired a lock at least once.
	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	/// Returns `true` when no user has acquired a lock yet.
	pub fn is_empty(&self) -> bool {
		self.0.lock().is_empty()
	}

	fn guard_for(&self, user: &UserId) -> Arc<AsyncMutex<()>> {
		let mut guards = self.0.lock();

		guards.entry(user.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
	// crates.io
	use tokio::time;
	// self
	use super::*;

	fn user(value: &str) -> UserId {
		UserId::new(value).expect("User fixture should be valid.")
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn same_user_work_never_overlaps() {
		let locks = Arc::new(UserLocks::default());
		let busy = Arc::new(AtomicBool::new(false));
		let overlaps = Arc::new(AtomicUsize::new(0));
		let mut tasks = Vec::new();

		for _ in 0..16 {
			let locks = locks.clone();
			let busy = busy.clone();
			let overlaps = overlaps.clone();

			tasks.push(tokio::spawn(async move {
				locks
					.with_user_lock(&user("alice"), || async {
						if busy.swap(true, Ordering::SeqCst) {
							overlaps.fetch_add(1, Ordering::SeqCst);
						}

						time::sleep(StdDuration::from_millis(2)).await;
						busy.store(false, Ordering::SeqCst);
					})
					.await;
			}));
		}

		for task in tasks {
			task.await.expect("Lock task should not panic.");
		}

		assert_eq!(overlaps.load(Ordering::SeqCst), 0);
		assert_eq!(locks.len(), 1);
	}

	#[tokio::test]
	async fn lock_is_released_after_failure() {
		let locks = UserLocks::default();
		let failed: Result<(), &str> =
			locks.with_user_lock(&user("alice"), || async { Err("boom") }).await;

		assert!(failed.is_err());

		let next = time::timeout(
			StdDuration::from_secs(1),
			locks.with_user_lock(&user("alice"), || async { 7 }),
		)
		.await
		.expect("Lock must be free after a failed holder.");

		assert_eq!(next, 7);
	}

	#[tokio::test]
	async fn lock_is_released_after_cancellation() {
		let locks = UserLocks::default();
		let cancelled = time::timeout(
			StdDuration::from_millis(20),
			locks.with_user_lock(&user("alice"), || time::sleep(StdDuration::from_secs(60))),
		)
		.await;

		assert!(cancelled.is_err());

		let next = time::timeout(
			StdDuration::from_secs(1),
			locks.with_user_lock(&user("alice"), || async { "ok" }),
		)
		.await
		.expect("Lock must be free after a cancelled holder.");

		assert_eq!(next, "ok");
	}

	#[tokio::test]
	async fn different_users_do_not_block_each_other() {
		let locks = Arc::new(UserLocks::default());
		let inner = locks.clone();
		let result = locks
			.with_user_lock(&user("alice"), || async move {
				time::timeout(
					StdDuration::from_secs(1),
					inner.with_user_lock(&user("bob"), || async { 1 }),
				)
				.await
			})
			.await;

		assert_eq!(result.expect("Bob's lock must be independent of Alice's."), 1);
		assert!(!locks.is_empty());
	}
}
