//! Thread-safe in-memory store for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, UserId},
	catalog::ListRecord,
	store::{ListStore, StoreError, StoreFuture, TokenStore},
};

type TokenMap = Arc<RwLock<BTreeMap<UserId, TokenRecord>>>;
type ListMap = Arc<RwLock<HashMap<UserId, Vec<ListRecord>>>>;

/// Keeps token records and list settings in-process.
///
/// Users are kept in a [`BTreeMap`] so [`TokenStore::list_users`] is deterministic.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	tokens: TokenMap,
	lists: ListMap,
}
impl MemoryStore {
	/// Replaces the configured lists for `user`.
	pub fn set_lists(&self, user: UserId, lists: impl IntoIterator<Item = ListRecord>) {
		self.lists.write().insert(user, lists.into_iter().collect());
	}

	/// Synchronous snapshot of the record stored for `user`.
	pub fn record(&self, user: &UserId) -> Option<TokenRecord> {
		self.tokens.read().get(user).cloned()
	}

	fn upsert_now(map: TokenMap, record: TokenRecord) -> Result<(), StoreError> {
		map.write().insert(record.user.clone(), record);

		Ok(())
	}
}
impl TokenStore for MemoryStore {
	fn get<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Option<TokenRecord>> {
		let map = self.tokens.clone();

		Box::pin(async move { Ok(map.read().get(user).cloned()) })
	}

	fn upsert(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		let map = self.tokens.clone();

		Box::pin(async move { Self::upsert_now(map, record) })
	}

	fn list_users(&self) -> StoreFuture<'_, Vec<UserId>> {
		let map = self.tokens.clone();

		Box::pin(async move { Ok(map.read().keys().cloned().collect()) })
	}
}
impl ListStore for MemoryStore {
	fn lists<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Vec<ListRecord>> {
		let map = self.lists.clone();

		Box::pin(async move { Ok(map.read().get(user).cloned().unwrap_or_default()) })
	}
}
