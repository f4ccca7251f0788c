//! Provider descriptor data structures.

/// Builder API for assembling provider descriptors.
pub mod builder;

pub use builder::*;

// self
use crate::{_prelude::*, auth::ProviderId};

/// Base URL of the public Trakt API.
pub const TRAKT_API_BASE: &str = "https://api.trakt.tv/";

/// Client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	#[default]
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint the login flow redirects to.
	pub authorization: Url,
	/// Token endpoint used for refreshes.
	pub token: Url,
}

/// Immutable provider descriptor consumed by the refresh engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Descriptor identifier.
	pub id: ProviderId,
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Preferred client authentication mechanism.
	pub preferred_client_auth_method: ClientAuthMethod,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}

	/// Descriptor for the production Trakt API.
	pub fn trakt() -> Result<Self, ProviderDescriptorError> {
		let base = Url::parse(TRAKT_API_BASE).map_err(|source| {
			ProviderDescriptorError::InvalidUrl { url: TRAKT_API_BASE.into(), source }
		})?;

		Self::trakt_at(&base)
	}

	/// Descriptor for a Trakt-compatible API rooted at `base` (staging hosts, mocks).
	pub fn trakt_at(base: &Url) -> Result<Self, ProviderDescriptorError> {
		let join = |path: &str| {
			base.join(path).map_err(|source| ProviderDescriptorError::InvalidUrl {
				url: format!("{base}{path}"),
				source,
			})
		};
		let id = ProviderId::new("trakt")?;

		Self::builder(id)
			.authorization_endpoint(join("oauth/authorize")?)
			.token_endpoint(join("oauth/token")?)
			.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
			.build()
	}
}
