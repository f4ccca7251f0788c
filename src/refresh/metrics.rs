// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::_prelude::*;

/// Thread-safe counters for token refresh calls.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	reauth_needed: AtomicU64,
	last_refreshed_at: Mutex<Option<OffsetDateTime>>,
}
impl RefreshMetrics {
	/// Returns the number of refresh calls issued to the token endpoint.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes that rotated and persisted a token.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of transient failures.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of users found to need a fresh login.
	pub fn reauth_needed(&self) -> u64 {
		self.reauth_needed.load(Ordering::Relaxed)
	}

	/// Instant of the most recent successful refresh.
	pub fn last_refreshed_at(&self) -> Option<OffsetDateTime> {
		*self.last_refreshed_at.lock()
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self, at: OffsetDateTime) {
		self.success.fetch_add(1, Ordering::Relaxed);
		*self.last_refreshed_at.lock() = Some(at);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_reauth_needed(&self) {
		self.reauth_needed.fetch_add(1, Ordering::Relaxed);
	}
}
