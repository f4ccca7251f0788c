//! Per-user token record, refresh-due evaluation, and builder.

// self
use crate::{
	_prelude::*,
	auth::{UserId, token::secret::TokenSecret},
};

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
}

/// OAuth tokens stored for a single user.
///
/// Records are created by the login flow and rewritten only by the refresh engine while it
/// holds the user's lock. `expires_at` never moves backward under correct operation.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenRecord {
	/// Owner of the tokens.
	pub user: UserId,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret. Records without one are skipped by the refresh engine.
	pub refresh_token: Option<TokenSecret>,
	/// Absolute expiry of the access token, if known.
	pub expires_at: Option<OffsetDateTime>,
	/// Instant of the last successful background refresh.
	#[serde(default)]
	pub refreshed_at: Option<OffsetDateTime>,
}
impl TokenRecord {
	/// Returns a builder for the provided user.
	pub fn builder(user: UserId) -> TokenRecordBuilder {
		TokenRecordBuilder::new(user)
	}

	/// Returns the usable refresh secret, treating an empty string as absent.
	pub fn refresh_secret(&self) -> Option<&TokenSecret> {
		self.refresh_token.as_ref().filter(|secret| !secret.is_empty())
	}

	/// Time left before expiry at `now`; `None` when the expiry is unknown.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Option<Duration> {
		self.expires_at.map(|expires_at| expires_at - now)
	}

	/// Returns `true` once the record has passed its expiry.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| now >= expires_at)
	}

	/// Decides whether the access token must be refreshed at `now`.
	///
	/// A record with no known expiry is always due; otherwise it is due once the remaining
	/// lifetime drops to `skew` or below.
	pub fn needs_refresh(&self, now: OffsetDateTime, skew: Duration) -> bool {
		match self.remaining_at(now) {
			None => true,
			Some(remaining) => remaining <= skew,
		}
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("user", &self.user)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.field("refreshed_at", &self.refreshed_at)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug)]
pub struct TokenRecordBuilder {
	user: UserId,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	refreshed_at: Option<OffsetDateTime>,
}
impl TokenRecordBuilder {
	fn new(user: UserId) -> Self {
		Self {
			user,
			access_token: None,
			refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
			refreshed_at: None,
		}
	}

	/// Sets the issued-at instant used with [`expires_in`](Self::expires_in).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Stamps the instant of the refresh that produced this record.
	pub fn refreshed_at(mut self, instant: OffsetDateTime) -> Self {
		self.refreshed_at = Some(instant);

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	///
	/// A relative expiry without an issued-at instant is anchored at the current UTC clock.
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) =>
				Some(self.issued_at.unwrap_or_else(OffsetDateTime::now_utc) + delta),
			(None, None) => None,
		};

		Ok(TokenRecord {
			user: self.user,
			access_token,
			refresh_token: self.refresh_token,
			expires_at,
			refreshed_at: self.refreshed_at,
		})
	}
}
