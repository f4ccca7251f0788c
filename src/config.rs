//! Service configuration, read once at start and passed into every component explicitly.

// std
use std::env;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ConfigError,
	provider::ProviderDescriptor,
};

/// Redirect URI Trakt registers for out-of-band (device/PIN) clients.
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

const ENV_CLIENT_ID: &str = "TRAKT_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "TRAKT_CLIENT_SECRET";
const ENV_REDIRECT_URI: &str = "TRAKT_REDIRECT_URI";
const ENV_API_BASE: &str = "TRAKT_API_BASE";
const ENV_REFRESH_INTERVAL: &str = "SYNC_REFRESH_INTERVAL_SECS";
const ENV_PREWARM_INTERVAL: &str = "SYNC_PREWARM_INTERVAL_SECS";
const ENV_REFRESH_SKEW: &str = "SYNC_REFRESH_SKEW_SECS";
const ENV_CACHE_MAX_AGE: &str = "CATALOG_CACHE_MAX_AGE_SECS";
const ENV_CACHE_STALE: &str = "CATALOG_CACHE_STALE_SECS";
const ENV_LISTS_PER_USER: &str = "PREWARM_LISTS_PER_USER";
const ENV_PREWARM_PAGE: &str = "PREWARM_PAGE";
const ENV_UPSTREAM_TIMEOUT: &str = "UPSTREAM_TIMEOUT_SECS";

/// Upstream OAuth client credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Redirect URI sent with every refresh request.
	pub redirect_uri: String,
}
impl ClientCredentials {
	/// Creates credentials that use the out-of-band redirect URI.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: TokenSecret::new(client_secret),
			redirect_uri: OOB_REDIRECT_URI.into(),
		}
	}

	/// Replaces the redirect URI after checking that it parses.
	pub fn with_redirect_uri(mut self, redirect_uri: impl AsRef<str>) -> Result<Self, ConfigError> {
		let redirect_uri = redirect_uri.as_ref();

		Url::parse(redirect_uri).map_err(|source| ConfigError::InvalidRedirect { source })?;

		self.redirect_uri = redirect_uri.to_owned();

		Ok(self)
	}
}
impl Debug for ClientCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentials")
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("redirect_uri", &self.redirect_uri)
			.finish()
	}
}

/// Settings shared by the refresh engine, catalog cache, prewarmer, and scheduler.
#[derive(Clone, Debug)]
pub struct SyncConfig {
	/// Delay between refresh passes.
	pub refresh_interval: StdDuration,
	/// Delay between prewarm passes.
	pub prewarm_interval: StdDuration,
	/// A token is refreshed once its remaining lifetime drops to this window.
	pub refresh_skew: Duration,
	/// Age up to which a cached catalog page is served as fresh.
	pub cache_max_age: Duration,
	/// Additional age during which a cached page is served stale and revalidated.
	pub cache_stale_window: Duration,
	/// How many enabled lists per user the prewarmer touches.
	pub prewarm_lists_per_user: usize,
	/// Catalog page the prewarmer populates.
	pub prewarm_page: u32,
	/// Bound on every upstream call (token endpoint and catalog builds).
	pub upstream_timeout: StdDuration,
	/// Run both passes as soon as the scheduler starts instead of after one interval.
	pub run_on_start: bool,
	/// Upstream client credentials; refresh passes are no-ops without them.
	pub credentials: Option<ClientCredentials>,
	/// Provider endpoints.
	pub descriptor: ProviderDescriptor,
}
impl SyncConfig {
	/// Default refresh interval (15 minutes).
	pub const DEFAULT_REFRESH_INTERVAL: StdDuration = StdDuration::from_secs(15 * 60);
	/// Default prewarm interval (6 hours).
	pub const DEFAULT_PREWARM_INTERVAL: StdDuration = StdDuration::from_secs(6 * 60 * 60);
	/// Default refresh skew (10 minutes).
	pub const DEFAULT_REFRESH_SKEW: Duration = Duration::minutes(10);
	/// Default fresh window (30 minutes).
	pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::minutes(30);
	/// Default stale window (6 hours).
	pub const DEFAULT_CACHE_STALE_WINDOW: Duration = Duration::hours(6);
	/// Default lists prewarmed per user.
	pub const DEFAULT_LISTS_PER_USER: usize = 2;
	/// Default upstream timeout (15 seconds).
	pub const DEFAULT_UPSTREAM_TIMEOUT: StdDuration = StdDuration::from_secs(15);

	/// Default settings against the production Trakt API, without credentials.
	pub fn new() -> Result<Self, ConfigError> {
		Ok(Self::with_descriptor(ProviderDescriptor::trakt()?))
	}

	/// Default settings against a custom descriptor, without credentials.
	pub fn with_descriptor(descriptor: ProviderDescriptor) -> Self {
		Self {
			refresh_interval: Self::DEFAULT_REFRESH_INTERVAL,
			prewarm_interval: Self::DEFAULT_PREWARM_INTERVAL,
			refresh_skew: Self::DEFAULT_REFRESH_SKEW,
			cache_max_age: Self::DEFAULT_CACHE_MAX_AGE,
			cache_stale_window: Self::DEFAULT_CACHE_STALE_WINDOW,
			prewarm_lists_per_user: Self::DEFAULT_LISTS_PER_USER,
			prewarm_page: 1,
			upstream_timeout: Self::DEFAULT_UPSTREAM_TIMEOUT,
			run_on_start: true,
			credentials: None,
			descriptor,
		}
	}

	/// Attaches upstream client credentials.
	pub fn with_credentials(mut self, credentials: ClientCredentials) -> Self {
		self.credentials = Some(credentials);

		self
	}

	/// Reads settings from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|key| env::var(key).ok())
	}

	/// Reads settings through `lookup`, falling back to defaults for absent keys.
	///
	/// Empty values count as absent. Credentials are only configured when both the client id
	/// and secret are present.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
		let descriptor = match lookup(ENV_API_BASE) {
			Some(raw) => {
				let base = Url::parse(&raw)
					.map_err(|_| ConfigError::InvalidSetting { key: ENV_API_BASE, value: raw })?;

				ProviderDescriptor::trakt_at(&base)?
			},
			None => ProviderDescriptor::trakt()?,
		};
		let mut config = Self::with_descriptor(descriptor);

		if let Some(secs) = parse_secs(&lookup, ENV_REFRESH_INTERVAL)? {
			config.refresh_interval = StdDuration::from_secs(secs);
		}
		if let Some(secs) = parse_secs(&lookup, ENV_PREWARM_INTERVAL)? {
			config.prewarm_interval = StdDuration::from_secs(secs);
		}
		if let Some(secs) = parse_secs(&lookup, ENV_REFRESH_SKEW)? {
			config.refresh_skew = seconds(ENV_REFRESH_SKEW, secs)?;
		}
		if let Some(secs) = parse_secs(&lookup, ENV_CACHE_MAX_AGE)? {
			config.cache_max_age = seconds(ENV_CACHE_MAX_AGE, secs)?;
		}
		if let Some(secs) = parse_secs(&lookup, ENV_CACHE_STALE)? {
			config.cache_stale_window = seconds(ENV_CACHE_STALE, secs)?;
		}
		if let Some(raw) = lookup(ENV_LISTS_PER_USER) {
			config.prewarm_lists_per_user = raw
				.trim()
				.parse()
				.map_err(|_| ConfigError::InvalidSetting { key: ENV_LISTS_PER_USER, value: raw })?;
		}
		if let Some(raw) = lookup(ENV_PREWARM_PAGE) {
			config.prewarm_page = raw
				.trim()
				.parse()
				.map_err(|_| ConfigError::InvalidSetting { key: ENV_PREWARM_PAGE, value: raw })?;
		}
		if let Some(secs) = parse_secs(&lookup, ENV_UPSTREAM_TIMEOUT)? {
			config.upstream_timeout = StdDuration::from_secs(secs);
		}
		if let (Some(id), Some(secret)) = (lookup(ENV_CLIENT_ID), lookup(ENV_CLIENT_SECRET)) {
			let mut credentials = ClientCredentials::new(id, secret);

			if let Some(redirect) = lookup(ENV_REDIRECT_URI) {
				credentials = credentials.with_redirect_uri(redirect)?;
			}

			config.credentials = Some(credentials);
		}

		config.validate()?;

		Ok(config)
	}

	/// Rejects settings that would spin the scheduler or disable every upstream call.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let zero = |key: &'static str| ConfigError::InvalidSetting { key, value: "0".into() };

		if self.refresh_interval.is_zero() {
			return Err(zero(ENV_REFRESH_INTERVAL));
		}
		if self.prewarm_interval.is_zero() {
			return Err(zero(ENV_PREWARM_INTERVAL));
		}
		if self.upstream_timeout.is_zero() {
			return Err(zero(ENV_UPSTREAM_TIMEOUT));
		}
		if self.refresh_skew.is_negative() {
			return Err(ConfigError::InvalidSetting {
				key: ENV_REFRESH_SKEW,
				value: self.refresh_skew.whole_seconds().to_string(),
			});
		}
		if self.prewarm_page == 0 {
			return Err(ConfigError::InvalidSetting { key: ENV_PREWARM_PAGE, value: "0".into() });
		}

		Ok(())
	}
}

fn parse_secs<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	lookup(key)
		.map(|raw| raw.trim().parse().map_err(|_| ConfigError::InvalidSetting { key, value: raw }))
		.transpose()
}

fn seconds(key: &'static str, secs: u64) -> Result<Duration, ConfigError> {
	i64::try_from(secs)
		.map(Duration::seconds)
		.map_err(|_| ConfigError::InvalidSetting { key, value: secs.to_string() })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map = pairs
			.iter()
			.map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
			.collect::<HashMap<_, _>>();

		move |key| map.get(key).cloned()
	}

	#[test]
	fn empty_environment_yields_defaults_without_credentials() {
		let config = SyncConfig::from_lookup(lookup_from(&[])).expect("Defaults should validate.");

		assert_eq!(config.refresh_interval, StdDuration::from_secs(900));
		assert_eq!(config.prewarm_interval, StdDuration::from_secs(21_600));
		assert_eq!(config.refresh_skew, Duration::minutes(10));
		assert_eq!(config.cache_max_age, Duration::minutes(30));
		assert_eq!(config.cache_stale_window, Duration::hours(6));
		assert_eq!(config.prewarm_lists_per_user, 2);
		assert_eq!(config.prewarm_page, 1);
		assert!(config.run_on_start);
		assert!(config.credentials.is_none());
		assert_eq!(config.descriptor.endpoints.token.as_str(), "https://api.trakt.tv/oauth/token");
	}

	#[test]
	fn overrides_and_credentials_are_read() {
		let config = SyncConfig::from_lookup(lookup_from(&[
			(ENV_CLIENT_ID, "id"),
			(ENV_CLIENT_SECRET, "secret"),
			(ENV_REDIRECT_URI, "https://addon.example/callback"),
			(ENV_REFRESH_INTERVAL, "60"),
			(ENV_LISTS_PER_USER, "5"),
			(ENV_PREWARM_PAGE, "3"),
			(ENV_CACHE_STALE, "120"),
		]))
		.expect("Overrides should validate.");
		let credentials = config.credentials.expect("Credentials should be configured.");

		assert_eq!(credentials.client_id, "id");
		assert_eq!(credentials.client_secret.expose(), "secret");
		assert_eq!(credentials.redirect_uri, "https://addon.example/callback");
		assert_eq!(config.refresh_interval, StdDuration::from_secs(60));
		assert_eq!(config.prewarm_lists_per_user, 5);
		assert_eq!(config.prewarm_page, 3);
		assert_eq!(config.cache_stale_window, Duration::minutes(2));
	}

	#[test]
	fn half_configured_credentials_are_ignored() {
		let config = SyncConfig::from_lookup(lookup_from(&[(ENV_CLIENT_ID, "id")]))
			.expect("Partial credentials should not fail.");

		assert!(config.credentials.is_none());
	}

	#[test]
	fn invalid_values_are_rejected() {
		let err = SyncConfig::from_lookup(lookup_from(&[(ENV_REFRESH_INTERVAL, "soon")]))
			.expect_err("Non-numeric interval must fail.");

		assert!(matches!(err, ConfigError::InvalidSetting { key: ENV_REFRESH_INTERVAL, .. }));

		let err = SyncConfig::from_lookup(lookup_from(&[(ENV_UPSTREAM_TIMEOUT, "0")]))
			.expect_err("Zero timeout must fail.");

		assert!(matches!(err, ConfigError::InvalidSetting { key: ENV_UPSTREAM_TIMEOUT, .. }));

		let err = SyncConfig::from_lookup(lookup_from(&[(ENV_PREWARM_PAGE, "0")]))
			.expect_err("Page zero must fail.");

		assert!(matches!(err, ConfigError::InvalidSetting { key: ENV_PREWARM_PAGE, .. }));
	}

	#[test]
	fn credentials_debug_redacts_secret() {
		let rendered = format!("{:?}", ClientCredentials::new("id", "very-secret"));

		assert!(!rendered.contains("very-secret"));
		assert!(rendered.contains(OOB_REDIRECT_URI));
	}
}
