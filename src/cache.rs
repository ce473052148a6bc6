//! Per-owner token records with proactive refresh.
//!
//! [`TokenCache::get_fresh`] guarantees at least [`REFRESH_MARGIN`] of remaining validity when a
//! refresh token is available. Refreshes are single-flight per owner: callers serialize on an
//! in-process guard and re-read the record after acquiring it, so a refresh finished by another
//! caller is reused instead of repeated. A failed refresh is logged and the stale record is
//! returned.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{OwnerId, ProviderId, TokenRecord},
	error::ConfigError,
	oauth::TokenExchange,
	obs::{self, FlowKind},
	store::{self, KeyValueStore, keys},
};

/// Minimum remaining validity guaranteed by [`TokenCache::get_fresh`].
pub const REFRESH_MARGIN: Duration = Duration::minutes(5);
/// Lifetime of persisted token records.
pub const TOKEN_RECORD_TTL: Duration = Duration::days(90);

/// Token records for one provider, keyed by owner.
pub struct TokenCache {
	provider: ProviderId,
	store: Arc<dyn KeyValueStore>,
	refresher: Arc<dyn TokenExchange>,
	margin: Duration,
	record_ttl: Duration,
	metrics: Arc<RefreshMetrics>,
	guards: Mutex<HashMap<OwnerId, Arc<AsyncMutex<()>>>>,
}
impl TokenCache {
	/// Creates a cache for `provider` that refreshes through `refresher`.
	pub fn new(
		provider: ProviderId,
		store: Arc<dyn KeyValueStore>,
		refresher: Arc<dyn TokenExchange>,
	) -> Self {
		Self {
			provider,
			store,
			refresher,
			margin: REFRESH_MARGIN,
			record_ttl: TOKEN_RECORD_TTL,
			metrics: Default::default(),
			guards: Default::default(),
		}
	}

	/// Overrides the refresh safety margin.
	pub fn with_margin(mut self, margin: Duration) -> Self {
		self.margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Provider whose records this cache holds.
	pub fn provider(&self) -> &ProviderId {
		&self.provider
	}

	/// Refresh counters.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Returns the stored record for `owner`, if any.
	pub async fn get(&self, owner: &OwnerId) -> Result<Option<TokenRecord>> {
		let key = self.key(owner);
		let payload = self.store.get(&key).await?;

		Ok(store::parse_json(&key, payload)?)
	}

	/// Persists `record` for `owner` with `ttl`.
	pub async fn put(&self, owner: &OwnerId, record: &TokenRecord, ttl: Duration) -> Result<()> {
		if &record.owner != owner || record.provider != self.provider {
			return Err(ConfigError::invalid(
				"token_record",
				"record does not belong to this owner and provider",
			)
			.into());
		}

		store::put_json(self.store.as_ref(), &self.key(owner), record, ttl).await?;

		Ok(())
	}

	/// Persists `record` with the default 90-day TTL.
	pub async fn save(&self, record: &TokenRecord) -> Result<()> {
		self.put(&record.owner, record, self.record_ttl).await
	}

	/// Returns a record valid for at least the safety margin when a refresh token allows it.
	///
	/// Absent records read as `None`. Records inside the margin without a refresh token, or whose
	/// refresh fails at any step after the first read, are returned as-is.
	pub async fn get_fresh(&self, owner: &OwnerId) -> Result<Option<TokenRecord>> {
		let Some(current) = self.get(owner).await? else {
			return Ok(None);
		};
		let now = OffsetDateTime::now_utc();

		if !current.expires_within(self.margin, now) {
			return Ok(Some(current));
		}
		if current.refresh_token.is_none() {
			tracing::debug!(
				provider = %self.provider,
				owner = %owner,
				"Record is near expiry without a refresh token."
			);

			return Ok(Some(current));
		}

		obs::observe(FlowKind::Refresh, "get_fresh", self.refresh_guarded(owner, current))
			.await
			.map(Some)
	}

	async fn refresh_guarded(&self, owner: &OwnerId, stale: TokenRecord) -> Result<TokenRecord> {
		let guard = self.guard(owner);
		let _singleflight = guard.lock().await;
		// Another caller may have refreshed while this one waited.
		let current = match self.get(owner).await {
			Ok(found) => found.unwrap_or(stale),
			Err(e) => {
				tracing::warn!(
					provider = %self.provider,
					owner = %owner,
					error = %e,
					"Record re-read failed; serving the cached record."
				);

				return Ok(stale);
			},
		};
		let now = OffsetDateTime::now_utc();

		if !current.expires_within(self.margin, now) {
			return Ok(current);
		}

		let Some(refresh_token) = current.refresh_token.clone() else {
			return Ok(current);
		};

		self.metrics.record_attempt();

		let grant = match self.refresher.refresh(&refresh_token).await {
			Ok(grant) => grant,
			Err(e) => {
				self.metrics.record_failure();

				let err = Error::Refresh { reason: e.to_string() };

				tracing::warn!(
					provider = %self.provider,
					owner = %owner,
					refresh_token = %refresh_token.fingerprint(),
					error = %err,
					"Refresh failed; serving the cached record."
				);

				return Ok(current);
			},
		};
		let refreshed = match TokenRecord::builder(owner.clone(), self.provider.clone())
			.access_token(grant.access_token.expose())
			.refresh_token(grant.refresh_token.or(Some(refresh_token)))
			.issued_at(now)
			.expires_in(grant.expires_in)
			.profile(current.profile.clone())
			.build()
		{
			Ok(record) => record,
			Err(e) => {
				self.metrics.record_failure();

				tracing::warn!(
					provider = %self.provider,
					owner = %owner,
					error = %e,
					"Refreshed grant is unusable; serving the cached record."
				);

				return Ok(current);
			},
		};

		self.metrics.record_success();

		if let Err(e) = self.save(&refreshed).await {
			tracing::warn!(
				provider = %self.provider,
				owner = %owner,
				error = %e,
				"Refreshed record could not be persisted."
			);
		}

		Ok(refreshed)
	}

	fn guard(&self, owner: &OwnerId) -> Arc<AsyncMutex<()>> {
		let mut guards = self.guards.lock();

		guards.entry(owner.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	fn key(&self, owner: &OwnerId) -> String {
		keys::token_record(self.provider.as_str(), owner.as_str())
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache")
			.field("provider", &self.provider)
			.field("margin", &self.margin)
			.field("record_ttl", &self.record_ttl)
			.field("metrics", &self.metrics)
			.finish()
	}
}
