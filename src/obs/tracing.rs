//! Flow spans shared by the refresh engine, the prewarmer, and cache revalidation.

// self
use crate::{_prelude::*, auth::UserId, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span around one unit of background work.
///
/// Every span is named `trakt_sync.flow` and carries `flow` and `stage`; `user` and `key` are
/// declared empty and filled in by [`FlowSpan::with_user`] and [`FlowSpan::with_key`].
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a span tagged with the flow kind and call-site stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"trakt_sync.flow",
				flow = kind.as_str(),
				stage,
				user = tracing::field::Empty,
				key = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Records the user the work is done for.
	pub fn with_user(self, user: &UserId) -> Self {
		#[cfg(feature = "tracing")]
		self.span.record("user", tracing::field::display(user));
		#[cfg(not(feature = "tracing"))]
		let _ = user;

		self
	}

	/// Records the cache key the work targets.
	pub fn with_key(self, key: &str) -> Self {
		#[cfg(feature = "tracing")]
		self.span.record("key", key);
		#[cfg(not(feature = "tracing"))]
		let _ = key;

		self
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_passes_output_through() {
		let user = UserId::new("alice").expect("User fixture should be valid.");
		let span = FlowSpan::new(FlowKind::Refresh, "refresh_user").with_user(&user);
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);

		let span = FlowSpan::new(FlowKind::Revalidate, "spawn_revalidation")
			.with_key("catalog:alice:watchlist:1");

		assert_eq!(span.instrument(async { "done" }).await, "done");
	}
}
