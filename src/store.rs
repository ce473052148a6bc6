//! Durable keyed store contracts and built-in backends.
//!
//! Every entry carries an explicit TTL. Keys are namespaced per concern (see [`keys`]) so
//! unrelated attempts never contend on the same entry.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Boxed future returned by [`KeyValueStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract shared by pending state, token records, and handoffs.
pub trait KeyValueStore
where
	Self: Send + Sync,
{
	/// Returns the live value for `key`, if any. Expired entries read as absent.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Inserts or replaces `key` with a value that expires after `ttl`.
	fn put<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> StoreFuture<'a, ()>;

	/// Removes `key`; missing keys are not an error.
	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

	/// Reads and removes `key`.
	///
	/// Backends should make this atomic when they can; the default composes [`get`] and
	/// [`delete`], which is best-effort single-use across concurrent readers.
	///
	/// [`get`]: KeyValueStore::get
	/// [`delete`]: KeyValueStore::delete
	fn take<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move {
			let value = self.get(key).await?;

			if value.is_some() {
				self.delete(key).await?;
			}

			Ok(value)
		})
	}
}

/// Error type produced by [`KeyValueStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend or typed wrappers.
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

/// Stored value plus its absolute expiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
	/// Serialized payload.
	pub value: String,
	/// Instant after which the entry reads as absent.
	pub expires_at: OffsetDateTime,
}
impl StoredEntry {
	/// Creates an entry that expires `ttl` after `now`.
	pub fn new(value: String, ttl: Duration, now: OffsetDateTime) -> Self {
		Self { value, expires_at: now + ttl }
	}

	/// Returns `true` once `now` reaches the expiry instant.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}
}

/// Key builders for every persisted namespace.
pub mod keys {
	/// `approval-state:{nonce}` → pending secondary-provider state.
	pub fn approval_state(nonce: &str) -> String {
		format!("approval-state:{nonce}")
	}

	/// `token-record:{provider}:{owner}` → token record for a linked provider.
	pub fn token_record(provider: &str, owner: &str) -> String {
		format!("token-record:{provider}:{owner}")
	}

	/// `handoff:{code}` → completion payload awaiting pickup by the session issuer.
	pub fn handoff(code: &str) -> String {
		format!("handoff:{code}")
	}
}

/// Serializes `value` as JSON and stores it under `key`.
pub async fn put_json<T>(
	store: &dyn KeyValueStore,
	key: &str,
	value: &T,
	ttl: Duration,
) -> Result<(), StoreError>
where
	T: Serialize,
{
	let payload = serde_json::to_string(value)
		.map_err(|e| StoreError::Serialization { message: format!("Failed to encode {key}: {e}") })?;

	store.put(key, payload, ttl).await
}

/// Parses a JSON payload read from `key`.
pub fn parse_json<T>(key: &str, payload: Option<String>) -> Result<Option<T>, StoreError>
where
	T: for<'de> Deserialize<'de>,
{
	payload
		.map(|raw| {
			serde_json::from_str(&raw).map_err(|e| StoreError::Serialization {
				message: format!("Failed to decode {key}: {e}"),
			})
		})
		.transpose()
}
