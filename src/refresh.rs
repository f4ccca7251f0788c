//! Background token refresh engine.
//!
//! [`RefreshEngine::refresh_all_users`] walks every stored user and rotates tokens that are
//! within the skew window of expiry. Each rotation runs under the user's lock, re-reads the
//! record once the lock is held, and only then calls the token endpoint, so overlapping passes
//! (or a manual [`RefreshEngine::refresh_user`] racing the scheduler) issue at most one
//! refresh per due token.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, UserId},
	clock::{Clock, SystemClock},
	config::{ClientCredentials, SyncConfig},
	error::ConfigError,
	http::TokenHttpClient,
	lock::UserLocks,
	oauth::{OAuth2Facade, TokenFacade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{ProviderDescriptor, ProviderStrategy},
	store::TokenStore,
};
#[cfg(feature = "reqwest")]
use crate::{
	http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper, provider::TraktProviderStrategy,
};

/// Note attached to a pass that ran without upstream client credentials.
pub const NOTE_MISSING_CREDENTIALS: &str = "upstream client credentials are not configured";
/// Note attached to a pass that could not enumerate users.
pub const NOTE_STORE_UNAVAILABLE: &str = "token store could not list users";

#[cfg(feature = "reqwest")]
/// Refresh engine specialized for the crate's default reqwest transport stack.
pub type ReqwestRefreshEngine = RefreshEngine<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Why a user was left untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
	/// The store holds no record for the user.
	NoRecord,
	/// The record has no usable refresh token.
	NoRefreshToken,
}

/// Result of refreshing one user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// Token was not due; nothing was sent upstream.
	AlreadyFresh,
	/// Token was rotated and persisted.
	Refreshed {
		/// New absolute expiry.
		expires_at: OffsetDateTime,
	},
	/// User cannot be refreshed without a new login.
	Skipped(SkipReason),
}

/// Tally of one [`RefreshEngine::refresh_all_users`] pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshSummary {
	/// Users whose tokens were rotated.
	pub refreshed: usize,
	/// Users whose tokens were not yet due.
	pub fresh: usize,
	/// Users without a record or refresh token.
	pub skipped: usize,
	/// Users whose refresh failed transiently; retried next pass.
	pub failed: usize,
	/// Users whose grant was rejected; they must sign in again.
	pub reauth_needed: usize,
	/// Explanation when the pass did no work at all.
	pub note: Option<&'static str>,
}

/// Rotates OAuth tokens for every stored user ahead of expiry.
pub struct RefreshEngine<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every token endpoint call.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them.
	pub transport_mapper: Arc<M>,
	/// Token store holding every user's record.
	pub store: Arc<dyn TokenStore>,
	/// Provider endpoints.
	pub descriptor: ProviderDescriptor,
	/// Error classification for token endpoint failures.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// Upstream client credentials; passes are no-ops without them.
	pub credentials: Option<ClientCredentials>,
	/// Shared counters for refresh outcomes.
	pub metrics: Arc<RefreshMetrics>,
	skew: Duration,
	clock: Arc<dyn Clock>,
	locks: Arc<UserLocks>,
}
impl<C, M> RefreshEngine<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an engine that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<dyn TokenStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		credentials: Option<ClientCredentials>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			descriptor,
			strategy,
			credentials,
			metrics: Default::default(),
			skew: SyncConfig::DEFAULT_REFRESH_SKEW,
			clock: Arc::new(SystemClock),
			locks: Default::default(),
		}
	}

	/// Replaces the wall clock used for due checks and expiry anchoring.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Overrides the window before expiry in which a token counts as due.
	pub fn with_skew_window(mut self, skew: Duration) -> Self {
		self.skew = skew;

		self
	}

	/// Shares a lock registry with other code paths that rewrite token records.
	pub fn with_locks(mut self, locks: Arc<UserLocks>) -> Self {
		self.locks = locks;

		self
	}

	/// Lock registry guarding token records.
	pub fn locks(&self) -> &Arc<UserLocks> {
		&self.locks
	}

	/// Refreshes every stored user whose token is due, one user at a time.
	///
	/// Failures are isolated per user and never abort the pass. Without client credentials
	/// the pass returns immediately with [`RefreshSummary::note`] set.
	pub async fn refresh_all_users(&self) -> RefreshSummary {
		let span = FlowSpan::new(FlowKind::Refresh, "refresh_all_users");

		span.instrument(async move {
			let mut summary = RefreshSummary::default();

			if self.credentials.is_none() {
				summary.note = Some(NOTE_MISSING_CREDENTIALS);
				obs::refresh_pass_finished(&summary);

				return summary;
			}

			let users = match self.store.list_users().await {
				Ok(users) => users,
				Err(err) => {
					obs::store_unavailable(&err);
					summary.note = Some(NOTE_STORE_UNAVAILABLE);
					obs::refresh_pass_finished(&summary);

					return summary;
				},
			};

			for user in users {
				match self.refresh_user(&user).await {
					Ok(RefreshOutcome::Refreshed { .. }) => summary.refreshed += 1,
					Ok(RefreshOutcome::AlreadyFresh) => summary.fresh += 1,
					Ok(RefreshOutcome::Skipped(_)) => summary.skipped += 1,
					Err(err) if err.requires_reauth() => summary.reauth_needed += 1,
					Err(_) => summary.failed += 1,
				}
			}

			obs::refresh_pass_finished(&summary);

			summary
		})
		.await
	}

	/// Refreshes one user if their token is due.
	///
	/// Intended for manual triggers as well as the scheduled pass; both share the user lock.
	pub async fn refresh_user(&self, user: &UserId) -> Result<RefreshOutcome> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_user").with_user(user);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let credentials =
					self.credentials.as_ref().ok_or(ConfigError::MissingCredentials)?;

				// Unlocked pre-check; repeated under the lock before any upstream call.
				match self.store.get(user).await? {
					None => return Ok(RefreshOutcome::Skipped(SkipReason::NoRecord)),
					Some(record) if record.refresh_secret().is_none() =>
						return Ok(RefreshOutcome::Skipped(SkipReason::NoRefreshToken)),
					Some(record) if !record.needs_refresh(self.clock.now(), self.skew) =>
						return Ok(RefreshOutcome::AlreadyFresh),
					Some(_) => {},
				}

				self.locks.with_user_lock(user, || self.refresh_locked(user, credentials)).await
			})
			.await;

		match &result {
			Ok(RefreshOutcome::Refreshed { .. }) =>
				obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Skipped),
			Err(err) => {
				if err.requires_reauth() {
					self.metrics.record_reauth_needed();
					obs::record_flow_outcome(KIND, FlowOutcome::ReauthNeeded);
				} else {
					self.metrics.record_failure();
					obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				}

				obs::refresh_failed(user, err);
			},
		}

		result
	}

	async fn refresh_locked(
		&self,
		user: &UserId,
		credentials: &ClientCredentials,
	) -> Result<RefreshOutcome> {
		let now = self.clock.now();
		let Some(current) = self.store.get(user).await? else {
			return Ok(RefreshOutcome::Skipped(SkipReason::NoRecord));
		};
		let Some(refresh_secret) = current.refresh_secret() else {
			return Ok(RefreshOutcome::Skipped(SkipReason::NoRefreshToken));
		};

		// Another holder may have rotated the token while this call waited for the lock.
		if !current.needs_refresh(now, self.skew) {
			return Ok(RefreshOutcome::AlreadyFresh);
		}
		let facade = <TokenFacade<C, M>>::from_descriptor(
			&self.descriptor,
			credentials,
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)?;

		self.metrics.record_attempt();

		let tokens = facade.refresh_token(self.strategy.as_ref(), refresh_secret.expose()).await?;
		let expires_at = tokens.expires_at(now);

		if let Some(previous) = current.expires_at.filter(|previous| expires_at < *previous) {
			obs::expiry_regressed(user, previous, expires_at);
		}

		let refresh_token = tokens.refresh_token.or_else(|| current.refresh_token.clone());
		let updated = TokenRecord {
			user: current.user.clone(),
			access_token: tokens.access_token,
			refresh_token,
			expires_at: Some(expires_at),
			refreshed_at: Some(now),
		};

		self.store.upsert(updated).await?;
		self.metrics.record_success(now);

		Ok(RefreshOutcome::Refreshed { expires_at })
	}
}
#[cfg(feature = "reqwest")]
impl RefreshEngine<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates an engine with its own reqwest transport bounded by `timeout`.
	pub fn new(
		store: Arc<dyn TokenStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		credentials: Option<ClientCredentials>,
		timeout: StdDuration,
	) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(
			store,
			descriptor,
			strategy,
			credentials,
			ReqwestHttpClient::with_timeout(timeout)?,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}

	/// Creates an engine for Trakt from the service configuration.
	pub fn from_config(store: Arc<dyn TokenStore>, config: &SyncConfig) -> Result<Self, ConfigError> {
		Ok(Self::new(
			store,
			config.descriptor.clone(),
			Arc::new(TraktProviderStrategy),
			config.credentials.clone(),
			config.upstream_timeout,
		)?
		.with_skew_window(config.refresh_skew))
	}
}
impl<C, M> Debug for RefreshEngine<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshEngine")
			.field("descriptor", &self.descriptor.id)
			.field("credentials", &self.credentials)
			.field("skew", &self.skew)
			.finish_non_exhaustive()
	}
}
