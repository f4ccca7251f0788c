//! Keyed stale-while-revalidate cache.
//!
//! An entry younger than `max_age` is served as is. Up to `max_age + stale_window` it is still
//! served, and the first reader to see it stale spawns one background revalidation; later
//! readers keep getting the stale value without starting another. Past that horizon the entry
//! counts as a miss and the caller waits for a fetch, with concurrent misses on the same key
//! collapsed onto a single fetch.
//!
//! Every stored value carries a generation number. A background revalidation only writes if
//! the generation it started from is still current, so an entry that was invalidated (or
//! replaced by a miss fetch) while the revalidation ran is never overwritten with its result.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	clock::Clock,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

type EntryMap<V> = Arc<RwLock<HashMap<String, CacheEntry<V>>>>;

/// Where a cached read was answered from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServedFrom {
	/// Entry was within its fresh window.
	Fresh,
	/// Entry was stale; a background revalidation may be running.
	Stale,
	/// Entry was missing or expired and was fetched for this call.
	Network,
}
impl ServedFrom {
	/// Returns a stable label suitable for metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ServedFrom::Fresh => "fresh",
			ServedFrom::Stale => "stale",
			ServedFrom::Network => "network",
		}
	}
}
impl Display for ServedFrom {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Value returned by [`SwrCache::get_with_swr`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Swr<V> {
	/// Cached or freshly fetched value.
	pub value: V,
	/// Freshness of `value`.
	pub served_from: ServedFrom,
}

#[derive(Debug)]
struct CacheEntry<V> {
	value: V,
	stored_at: OffsetDateTime,
	generation: u64,
	revalidating: bool,
}

enum Lookup<V> {
	Fresh(V),
	/// `claim` is the entry generation when this caller must start the revalidation.
	Stale { value: V, claim: Option<u64> },
	Miss,
}

/// Stale-while-revalidate cache keyed by string.
pub struct SwrCache<V> {
	entries: EntryMap<V>,
	miss_guards: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
	generation: Arc<AtomicU64>,
	clock: Arc<dyn Clock>,
}
impl<V> SwrCache<V>
where
	V: Clone + Send + Sync + 'static,
{
	/// Creates an empty cache that ages entries with `clock`.
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self {
			entries: Default::default(),
			miss_guards: Default::default(),
			generation: Default::default(),
			clock,
		}
	}

	/// Returns the value for `key`, fetching it with `revalidate` when needed.
	///
	/// A fresh hit never calls `revalidate`. A stale hit returns immediately and may hand
	/// `revalidate` to a background task. A miss awaits `revalidate` and stores the result;
	/// on failure nothing is stored and the error is returned.
	pub async fn get_with_swr<F, Fut, E>(
		&self,
		key: &str,
		max_age: Duration,
		stale_window: Duration,
		revalidate: F,
	) -> Result<Swr<V>, E>
	where
		F: 'static + Send + FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = Result<V, E>>,
		E: 'static + Send + Display,
	{
		let revalidate = match self.serve_cached(key, max_age, stale_window, revalidate) {
			Ok(hit) => return Ok(hit),
			Err(revalidate) => revalidate,
		};
		let guard = self.miss_guard(key);
		let _held = guard.lock().await;
		// Another caller may have filled the entry while this one waited.
		let revalidate = match self.serve_cached(key, max_age, stale_window, revalidate) {
			Ok(hit) => return Ok(hit),
			Err(revalidate) => revalidate,
		};
		let value = revalidate().await?;

		self.insert(key, value.clone());
		obs::record_cache_lookup(ServedFrom::Network);

		Ok(Swr { value, served_from: ServedFrom::Network })
	}

	/// Stores `value` under `key` as fresh.
	pub fn insert(&self, key: &str, value: V) {
		let entry = CacheEntry {
			value,
			stored_at: self.clock.now(),
			generation: self.generation.fetch_add(1, Ordering::Relaxed),
			revalidating: false,
		};

		self.entries.write().insert(key.to_owned(), entry);
	}

	/// Returns the stored value regardless of age, without triggering any fetch.
	pub fn peek(&self, key: &str) -> Option<V> {
		self.entries.read().get(key).map(|entry| entry.value.clone())
	}

	/// Returns `true` while a background revalidation for `key` is in flight.
	pub fn is_revalidating(&self, key: &str) -> bool {
		self.entries.read().get(key).is_some_and(|entry| entry.revalidating)
	}

	/// Removes `key`; an in-flight revalidation for it will not write it back.
	pub fn invalidate(&self, key: &str) -> bool {
		self.miss_guards.lock().remove(key);

		self.entries.write().remove(key).is_some()
	}

	/// Removes every key starting with `prefix` and returns how many were dropped.
	pub fn invalidate_prefix(&self, prefix: &str) -> usize {
		self.miss_guards.lock().retain(|key, _| !key.starts_with(prefix));

		let mut entries = self.entries.write();
		let before = entries.len();

		entries.retain(|key, _| !key.starts_with(prefix));

		before - entries.len()
	}

	/// Number of stored entries, including expired ones not yet replaced.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Serves a fresh or stale hit, handing `revalidate` back on a miss.
	fn serve_cached<F, Fut, E>(
		&self,
		key: &str,
		max_age: Duration,
		stale_window: Duration,
		revalidate: F,
	) -> Result<Swr<V>, F>
	where
		F: 'static + Send + FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = Result<V, E>>,
		E: 'static + Send + Display,
	{
		match self.lookup(key, max_age, stale_window) {
			Lookup::Fresh(value) => {
				obs::record_cache_lookup(ServedFrom::Fresh);

				Ok(Swr { value, served_from: ServedFrom::Fresh })
			},
			Lookup::Stale { value, claim } => {
				if let Some(generation) = claim {
					self.spawn_revalidation(key.to_owned(), generation, revalidate);
				}

				obs::record_cache_lookup(ServedFrom::Stale);

				Ok(Swr { value, served_from: ServedFrom::Stale })
			},
			Lookup::Miss => Err(revalidate),
		}
	}

	fn lookup(&self, key: &str, max_age: Duration, stale_window: Duration) -> Lookup<V> {
		let now = self.clock.now();
		let mut entries = self.entries.write();
		let Some(entry) = entries.get_mut(key) else {
			return Lookup::Miss;
		};
		let age = now - entry.stored_at;

		if age <= max_age {
			Lookup::Fresh(entry.value.clone())
		} else if age <= max_age + stale_window {
			let claim = if entry.revalidating {
				None
			} else {
				entry.revalidating = true;

				Some(entry.generation)
			};

			Lookup::Stale { value: entry.value.clone(), claim }
		} else {
			Lookup::Miss
		}
	}

	fn spawn_revalidation<F, Fut, E>(&self, key: String, generation: u64, revalidate: F)
	where
		F: 'static + Send + FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = Result<V, E>>,
		E: 'static + Send + Display,
	{
		const KIND: FlowKind = FlowKind::Revalidate;

		let entries = self.entries.clone();
		let next_generation = self.generation.clone();
		let clock = self.clock.clone();
		let span = FlowSpan::new(KIND, "spawn_revalidation").with_key(&key);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		tokio::spawn(span.instrument(async move {
			// A panicking fetch comes back as a join error and still clears the flag.
			let result = tokio::spawn(revalidate()).await;
			let mut entries = entries.write();
			let current = entries.get_mut(&key).filter(|entry| entry.generation == generation);

			match (result, current) {
				(Ok(Ok(value)), Some(entry)) => {
					entry.value = value;
					entry.stored_at = clock.now();
					entry.generation = next_generation.fetch_add(1, Ordering::Relaxed);
					entry.revalidating = false;

					obs::record_flow_outcome(KIND, FlowOutcome::Success);
				},
				// Invalidated or replaced while the fetch ran; drop the result.
				(Ok(Ok(_)), None) => obs::record_flow_outcome(KIND, FlowOutcome::Skipped),
				(Ok(Err(err)), current) => {
					if let Some(entry) = current {
						entry.revalidating = false;
					}

					obs::revalidation_failed(&key, &err);
					obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				},
				(Err(err), current) => {
					if let Some(entry) = current {
						entry.revalidating = false;
					}

					obs::revalidation_failed(&key, &err);
					obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				},
			}
		}));
	}

	fn miss_guard(&self, key: &str) -> Arc<AsyncMutex<()>> {
		let mut guards = self.miss_guards.lock();

		guards.entry(key.to_owned()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl<V> Clone for SwrCache<V> {
	fn clone(&self) -> Self {
		Self {
			entries: self.entries.clone(),
			miss_guards: self.miss_guards.clone(),
			generation: self.generation.clone(),
			clock: self.clock.clone(),
		}
	}
}
impl<V> Debug for SwrCache<V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SwrCache").field("entries", &self.entries.read().len()).finish()
	}
}
