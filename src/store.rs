//! Storage contracts and built-in store implementations for user tokens and list settings.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, UserId},
	catalog::ListRecord,
};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for per-user OAuth token records.
///
/// The refresh engine is the only writer during background work and always writes while
/// holding the user's lock, so implementations only need per-call atomicity.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Fetches the record stored for `user`, if present.
	fn get<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Persists or replaces the record keyed by [`TokenRecord::user`].
	fn upsert(&self, record: TokenRecord) -> StoreFuture<'_, ()>;

	/// Lists every user with a stored record, in a stable order.
	fn list_users(&self) -> StoreFuture<'_, Vec<UserId>>;
}

/// Read-only contract for the per-user catalog list configuration.
pub trait ListStore
where
	Self: Send + Sync,
{
	/// Returns `user`'s configured lists in their configured order.
	fn lists<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Vec<ListRecord>>;
}

/// Error type produced by [`TokenStore`] and [`ListStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
