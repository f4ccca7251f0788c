//! Provider strategy hooks that classify token endpoint failures.
//!
//! The refresh engine only needs one decision from a failed refresh: is the stored grant
//! permanently dead (the user must sign in again), or should the next scheduled pass retry?
//! Strategies answer it from primitive response data so they stay independent of the HTTP
//! client in use.

// self
use crate::_prelude::*;

/// OAuth error code that marks a refresh token as permanently unusable.
pub const INVALID_GRANT: &str = "invalid_grant";

/// Strategy hook that classifies token endpoint failures.
pub trait ProviderStrategy
where
	Self: Send + Sync,
{
	/// Maps a failed refresh into the crate's error taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the refresh grant; re-authentication is required.
	InvalidGrant,
	/// Client credentials were rejected.
	InvalidClient,
	/// Failure is temporary and should be retried on the next pass.
	Transient,
}

/// Context passed to provider strategies when classifying token errors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for payloads that did not parse as an OAuth error.
	pub body_preview: Option<String>,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates an empty context.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a (truncated) body preview.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}
}

/// Classification used for Trakt.
///
/// Only the `invalid_grant` sentinel (in the OAuth fields or the raw body) yields
/// [`ProviderErrorKind::InvalidGrant`]; an HTTP status on its own never does, so a bare
/// 400 or 5xx is retried on the next pass instead of stopping the user's sync.
#[derive(Debug, Default)]
pub struct TraktProviderStrategy;
impl Display for TraktProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("trakt-provider-strategy")
	}
}
impl ProviderStrategy for TraktProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if let Some(kind) = ctx
			.oauth_error
			.as_deref()
			.and_then(match_exact_value)
			.or_else(|| ctx.error_description.as_deref().and_then(match_text))
			.or_else(|| ctx.body_preview.as_deref().and_then(match_text))
		{
			return kind;
		}

		match ctx.http_status {
			Some(401) => ProviderErrorKind::InvalidClient,
			_ => ProviderErrorKind::Transient,
		}
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	if value.eq_ignore_ascii_case(INVALID_GRANT) {
		Some(ProviderErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ProviderErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn match_text(text: &str) -> Option<ProviderErrorKind> {
	let lowered = text.to_ascii_lowercase();

	if lowered.contains(INVALID_GRANT) {
		Some(ProviderErrorKind::InvalidGrant)
	} else if lowered.contains("invalid_client") {
		Some(ProviderErrorKind::InvalidClient)
	} else {
		None
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn invalid_grant_sentinel_wins_regardless_of_source() {
		let strategy = TraktProviderStrategy;

		assert_eq!(
			strategy.classify_token_error(
				&ProviderErrorContext::new().with_http_status(400).with_oauth_error("invalid_grant")
			),
			ProviderErrorKind::InvalidGrant
		);
		assert_eq!(
			strategy.classify_token_error(
				&ProviderErrorContext::new()
					.with_http_status(401)
					.with_error_description("invalid_grant: refresh token revoked")
			),
			ProviderErrorKind::InvalidGrant
		);
		assert_eq!(
			strategy.classify_token_error(
				&ProviderErrorContext::new().with_body_preview("<html>INVALID_GRANT</html>")
			),
			ProviderErrorKind::InvalidGrant
		);
	}

	#[test]
	fn bare_statuses_stay_retryable() {
		let strategy = TraktProviderStrategy;

		for status in [400, 403, 429, 500, 502] {
			assert_eq!(
				strategy.classify_token_error(&ProviderErrorContext::new().with_http_status(status)),
				ProviderErrorKind::Transient,
				"Status {status} must not stop the user's sync."
			);
		}

		assert_eq!(
			strategy.classify_token_error(&ProviderErrorContext::new().with_http_status(401)),
			ProviderErrorKind::InvalidClient
		);
	}

	#[test]
	fn body_preview_is_truncated() {
		let ctx = ProviderErrorContext::new().with_body_preview("x".repeat(1_000));
		let preview = ctx.body_preview.expect("Preview should be stored.");

		assert_eq!(preview.chars().count(), ProviderErrorContext::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}
}
