//! Redacting wrapper for OAuth secrets.

// self
use crate::_prelude::*;

/// Access or refresh token value that never prints its contents.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Wraps `value` unless it is empty.
	///
	/// Trakt occasionally answers a refresh with `"refresh_token": ""`; such a value must not
	/// replace a working stored token.
	pub fn non_empty(value: impl Into<String>) -> Option<Self> {
		let value = value.into();

		(!value.is_empty()).then_some(Self(value))
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when the wrapped value is empty.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	// Empty secrets are shown as such so a blank stored refresh token is visible in logs.
	fn placeholder(&self) -> &'static str {
		if self.0.is_empty() { "<empty>" } else { "<redacted>" }
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&self.placeholder()).finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.placeholder())
	}
}
