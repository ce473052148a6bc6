//! Server-side correlation for secondary-provider attempts.
//!
//! A pending record binds a random nonce to the owner who started linking. It lives for ten
//! minutes and is consumed with [`KeyValueStore::take`], so a nonce is honored at most once on
//! a best-effort basis.

// self
use crate::{
	_prelude::*,
	auth::OwnerId,
	flows::common,
	store::{self, KeyValueStore, keys},
};

/// Length of generated nonces.
pub const NONCE_LEN: usize = 32;
/// Lifetime of a pending record.
pub const PENDING_TTL: Duration = Duration::minutes(10);

/// Pending secondary-provider attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOAuthState {
	/// Owner the secondary tokens will be linked to.
	pub owner: OwnerId,
	/// When the attempt started.
	pub created_at: OffsetDateTime,
}

/// Creates and consumes [`PendingOAuthState`] records.
#[derive(Clone)]
pub struct PendingStates {
	store: Arc<dyn KeyValueStore>,
	ttl: Duration,
}
impl PendingStates {
	/// Uses `store` with the default ten-minute TTL.
	pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
		Self { store, ttl: PENDING_TTL }
	}

	/// Overrides the TTL.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Persists a pending record for `owner` and returns its nonce.
	pub async fn create(&self, owner: &OwnerId) -> Result<String> {
		let nonce = common::random_string(NONCE_LEN);
		let record = PendingOAuthState { owner: owner.clone(), created_at: OffsetDateTime::now_utc() };

		store::put_json(self.store.as_ref(), &keys::approval_state(&nonce), &record, self.ttl).await?;

		Ok(nonce)
	}

	/// Reads and deletes the record for `nonce`.
	///
	/// Malformed nonces never reach the store and read as absent.
	pub async fn consume(&self, nonce: &str) -> Result<Option<PendingOAuthState>> {
		if !is_well_formed(nonce) {
			return Ok(None);
		}

		let key = keys::approval_state(nonce);
		let payload = self.store.take(&key).await?;

		Ok(store::parse_json(&key, payload)?)
	}
}
impl Debug for PendingStates {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingStates").field("ttl", &self.ttl).finish()
	}
}

fn is_well_formed(nonce: &str) -> bool {
	nonce.len() == NONCE_LEN && nonce.bytes().all(|b| b.is_ascii_alphanumeric())
}
