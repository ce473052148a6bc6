//! Thread-safe in-memory [`KeyValueStore`] for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreError, StoreFuture, StoredEntry},
};

type StoreMap = Arc<RwLock<HashMap<String, StoredEntry>>>;

/// Storage backend that keeps entries in-process.
///
/// Expired entries are dropped when read and swept on every write, so keys that are never read
/// again (abandoned nonces, unredeemed handoffs) do not accumulate.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of entries currently held, including ones that expired but were not yet purged.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no entries are held.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn get_now(map: &StoreMap, key: &str) -> Option<String> {
		let now = OffsetDateTime::now_utc();
		{
			let guard = map.read();

			match guard.get(key) {
				Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
				Some(_) => {},
				None => return None,
			}
		}

		map.write().remove(key);

		None
	}

	fn take_now(map: &StoreMap, key: &str) -> Option<String> {
		let now = OffsetDateTime::now_utc();

		map.write().remove(key).filter(|entry| !entry.is_expired_at(now)).map(|entry| entry.value)
	}
}
impl KeyValueStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::get_now(&map, key)) })
	}

	fn put<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			if !ttl.is_positive() {
				return Err(StoreError::Backend {
					message: format!("Refusing to store {key} with a non-positive TTL"),
				});
			}

			let now = OffsetDateTime::now_utc();
			let mut guard = map.write();

			guard.retain(|_, entry| !entry.is_expired_at(now));
			guard.insert(key.to_owned(), StoredEntry::new(value, ttl, now));

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(key);

			Ok(())
		})
	}

	fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::take_now(&map, key)) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn expired_entries_read_as_absent() {
		let store = MemoryStore::default();

		store.0.write().insert(
			"stale".into(),
			StoredEntry {
				value: "old".into(),
				expires_at: OffsetDateTime::now_utc() - Duration::seconds(1),
			},
		);

		assert_eq!(store.get("stale").await.expect("Get should succeed."), None);
		assert!(store.is_empty(), "Expired entry should be purged on read.");
	}

	#[tokio::test]
	async fn writes_sweep_expired_entries_that_are_never_read() {
		let store = MemoryStore::default();

		for key in ["handoff:a", "handoff:b", "approval-state:c"] {
			store
				.put(key, "v".into(), Duration::milliseconds(1))
				.await
				.expect("Put should succeed.");
		}

		tokio::time::sleep(std::time::Duration::from_millis(20)).await;

		assert_eq!(store.len(), 3);

		store.put("fresh", "v".into(), Duration::minutes(10)).await.expect("Put should succeed.");

		assert_eq!(store.len(), 1);
		assert_eq!(store.get("fresh").await.expect("Get should succeed."), Some("v".into()));
	}

	#[tokio::test]
	async fn take_is_single_use() {
		let store = MemoryStore::default();

		store.put("nonce", "owner".into(), Duration::minutes(10)).await.expect("Put should succeed.");

		assert_eq!(store.take("nonce").await.expect("Take should succeed."), Some("owner".into()));
		assert_eq!(store.take("nonce").await.expect("Take should succeed."), None);
	}

	#[tokio::test]
	async fn rejects_non_positive_ttl() {
		let store = MemoryStore::default();
		let err = store
			.put("k", "v".into(), Duration::ZERO)
			.await
			.expect_err("Zero TTL should be rejected.");

		assert!(matches!(err, StoreError::Backend { .. }));
	}
}
