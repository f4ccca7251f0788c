//! Structured log events; every helper compiles to a no-op without the `tracing` feature.

// self
use crate::{
	_prelude::*,
	auth::{ListId, UserId},
	prewarm::PrewarmSummary,
	refresh::RefreshSummary,
};

/// Warns about a failed refresh for one user.
pub fn refresh_failed(user: &UserId, error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		user = %user,
		reauth_needed = error.requires_reauth(),
		error = %error,
		"token refresh failed"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (user, error);
}

/// Warns when the provider hands back an expiry earlier than the one it replaces.
pub fn expiry_regressed(user: &UserId, previous: OffsetDateTime, next: OffsetDateTime) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		user = %user,
		previous = %previous,
		next = %next,
		"provider returned an earlier expiry than the stored one"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (user, previous, next);
}

/// Warns that the token store could not enumerate users.
pub fn store_unavailable(error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(error = %error, "token store could not list users");
	#[cfg(not(feature = "tracing"))]
	let _ = error;
}

/// Summarizes one refresh pass.
pub fn refresh_pass_finished(summary: &RefreshSummary) {
	#[cfg(feature = "tracing")]
	tracing::info!(
		refreshed = summary.refreshed,
		fresh = summary.fresh,
		failed = summary.failed,
		reauth_needed = summary.reauth_needed,
		skipped = summary.skipped,
		note = summary.note.unwrap_or_default(),
		"token refresh pass finished"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = summary;
}

/// Warns about one list that could not be prewarmed.
pub fn prewarm_failed(user: &UserId, list: &ListId, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(user = %user, list = %list, error = %error, "catalog prewarm failed");
	#[cfg(not(feature = "tracing"))]
	let _ = (user, list, error);
}

/// Summarizes one prewarm pass.
pub fn prewarm_pass_finished(summary: &PrewarmSummary) {
	#[cfg(feature = "tracing")]
	tracing::info!(
		users = summary.users,
		warmed = summary.warmed,
		failed = summary.failed,
		"catalog prewarm pass finished"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = summary;
}

/// Warns about a background revalidation that failed; the stale value stays in place.
pub fn revalidation_failed(key: &str, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(key, error = %error, "cache revalidation failed");
	#[cfg(not(feature = "tracing"))]
	let _ = (key, error);
}

/// Notes that a periodic task started.
pub fn task_started(name: &'static str, interval: StdDuration) {
	#[cfg(feature = "tracing")]
	tracing::info!(task = name, interval_secs = interval.as_secs(), "periodic task started");
	#[cfg(not(feature = "tracing"))]
	let _ = (name, interval);
}

/// Notes that a periodic task stopped.
pub fn task_stopped(name: &'static str) {
	#[cfg(feature = "tracing")]
	tracing::info!(task = name, "periodic task stopped");
	#[cfg(not(feature = "tracing"))]
	let _ = name;
}
