//! Optional observability helpers for background sync work.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `trakt_sync.flow` with the `flow` and
//!   `stage` fields, plus the per-user and per-pass events documented on each helper.
//! - Enable `metrics` to increment `trakt_sync_flow_total` (labeled by `flow` + `outcome`) and
//!   `trakt_sync_cache_total` (labeled by `served_from`).

mod events;
mod metrics;
mod tracing;

pub use events::*;
pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Background work kinds observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Token refresh for one user or a full pass.
	Refresh,
	/// Catalog prewarm pass.
	Prewarm,
	/// Background revalidation of a stale cache entry.
	Revalidate,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Refresh => "refresh",
			FlowKind::Prewarm => "prewarm",
			FlowKind::Revalidate => "revalidate",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each unit of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Work started.
	Attempt,
	/// Work completed.
	Success,
	/// Work failed and will be retried by a later pass.
	Failure,
	/// Work failed permanently; the user has to sign in again.
	ReauthNeeded,
	/// Nothing to do.
	Skipped,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::ReauthNeeded => "reauth_needed",
			FlowOutcome::Skipped => "skipped",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
