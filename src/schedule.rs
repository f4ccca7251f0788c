//! Long-lived periodic tasks with an explicit start/stop lifecycle.
//!
//! [`spawn_periodic`] drives one job on a fixed cadence until its [`TaskHandle`] is shut down
//! or dropped. Ticks missed while a run is still in progress are skipped rather than queued,
//! so one task never runs its job concurrently with itself. Shutdown lets an in-flight run
//! finish; a token rotation is never abandoned between the provider call and the store write.

// crates.io
use tokio::{
	sync::watch,
	task::JoinHandle,
	time::{self, Instant, MissedTickBehavior},
};
// self
use crate::{
	_prelude::*,
	config::SyncConfig,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs,
	prewarm::Prewarmer,
	refresh::RefreshEngine,
};

/// Name of the token refresh task.
pub const REFRESH_TASK: &str = "token_refresh";
/// Name of the catalog prewarm task.
pub const PREWARM_TASK: &str = "catalog_prewarm";

const MIN_INTERVAL: StdDuration = StdDuration::from_secs(1);

/// Handle to a task started by [`spawn_periodic`].
///
/// Dropping the handle signals the task to stop after its current run.
#[derive(Debug)]
pub struct TaskHandle {
	name: &'static str,
	shutdown: watch::Sender<bool>,
	join: Option<JoinHandle<()>>,
}
impl TaskHandle {
	/// Task name used in log events.
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Returns `true` once the task has exited.
	pub fn is_finished(&self) -> bool {
		self.join.as_ref().is_none_or(JoinHandle::is_finished)
	}

	/// Signals the task to stop and waits for its current run to finish.
	pub async fn shutdown(mut self) {
		self.shutdown.send_replace(true);

		if let Some(join) = self.join.take() {
			// A panicking job already ended the task; nothing is left to stop.
			let _ = join.await;
		}
	}
}
impl Drop for TaskHandle {
	fn drop(&mut self) {
		self.shutdown.send_replace(true);
	}
}

/// Spawns `job` on the current Tokio runtime, repeating every `every`.
///
/// With `run_immediately` the first run starts right away; otherwise it starts after one
/// interval. Intervals shorter than one second are raised to one second.
pub fn spawn_periodic<F, Fut>(
	name: &'static str,
	every: StdDuration,
	run_immediately: bool,
	mut job: F,
) -> TaskHandle
where
	F: 'static + Send + FnMut() -> Fut,
	Fut: 'static + Send + Future<Output = ()>,
{
	let every = every.max(MIN_INTERVAL);
	let (shutdown, mut stop) = watch::channel(false);
	let join = tokio::spawn(async move {
		let start = if run_immediately { Instant::now() } else { Instant::now() + every };
		let mut ticker = time::interval_at(start, every);

		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
		obs::task_started(name, every);

		loop {
			tokio::select! {
				biased;
				_ = stop.changed() => break,
				_ = ticker.tick() => job().await,
			}
		}

		obs::task_stopped(name);
	});

	TaskHandle { name, shutdown, join: Some(join) }
}

/// Refresh and prewarm tasks running for the lifetime of the service.
#[derive(Debug)]
pub struct SyncService {
	refresh: TaskHandle,
	prewarm: TaskHandle,
}
impl SyncService {
	/// Starts both periodic passes using the intervals from `config`.
	pub fn start<C, M, V>(
		config: &SyncConfig,
		engine: Arc<RefreshEngine<C, M>>,
		prewarmer: Arc<Prewarmer<V>>,
	) -> Self
	where
		C: ?Sized + TokenHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
		V: Clone + Send + Sync + 'static,
	{
		let refresh =
			spawn_periodic(REFRESH_TASK, config.refresh_interval, config.run_on_start, move || {
				let engine = engine.clone();

				async move {
					engine.refresh_all_users().await;
				}
			});
		let prewarm =
			spawn_periodic(PREWARM_TASK, config.prewarm_interval, config.run_on_start, move || {
				let prewarmer = prewarmer.clone();

				async move {
					prewarmer.prewarm_popular_catalogs().await;
				}
			});

		Self { refresh, prewarm }
	}

	/// Stops both tasks, waiting for in-flight passes to finish.
	pub async fn shutdown(self) {
		self.refresh.shutdown().await;
		self.prewarm.shutdown().await;
	}
}
