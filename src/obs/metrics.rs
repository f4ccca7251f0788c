// self
use crate::{
	cache::ServedFrom,
	obs::{FlowKind, FlowOutcome},
};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"trakt_sync_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records where a cache read was served from (when enabled).
pub fn record_cache_lookup(served_from: ServedFrom) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("trakt_sync_cache_total", "served_from" => served_from.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = served_from;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_metrics() {
		record_flow_outcome(FlowKind::Prewarm, FlowOutcome::Failure);
		record_cache_lookup(ServedFrom::Stale);
	}
}
