mod common;

// std
use std::{sync::Arc, time::Duration as StdDuration};
// crates.io
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
// self
use common::*;
use oauth2_consent_broker::{
	auth::{OwnerId, ProviderId, TokenRecord, TokenSecret},
	cache::TokenCache,
	http::ReqwestHttpClient,
	oauth::TokenExchanger,
	provider::ProviderRole,
	store::MemoryStore,
};

const REFRESHED_BODY: &str = r#"{"access_token":"fresh","token_type":"bearer","expires_in":3600}"#;

fn owner() -> OwnerId {
	OwnerId::new(OWNER).expect("Owner fixture should be valid.")
}

fn cache(server: &MockServer) -> TokenCache {
	let registration = registration(server, SECONDARY, ProviderRole::Secondary);
	let http =
		ReqwestHttpClient::with_timeout(StdDuration::from_secs(2)).expect("HTTP client should build.");
	let exchanger: TokenExchanger = TokenExchanger::from_registration(
		&registration,
		http,
		oauth2_consent_broker::oauth::ReqwestTransportErrorMapper,
	)
	.expect("Exchanger should build.");

	TokenCache::new(
		registration.id().clone(),
		Arc::new(MemoryStore::default()),
		Arc::new(exchanger),
	)
}

fn record(expires_in: Duration, refresh: Option<&str>) -> TokenRecord {
	let now = OffsetDateTime::now_utc();

	TokenRecord::builder(
		owner(),
		ProviderId::new(SECONDARY).expect("Provider fixture should be valid."),
	)
	.access_token("stale")
	.refresh_token(refresh.map(TokenSecret::new))
	.issued_at(now - Duration::hours(1))
	.expires_at(now + expires_in)
	.build()
	.expect("Record fixture should build.")
}

#[tokio::test]
async fn fresh_records_skip_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/slack/token");
			then.status(200).header("content-type", "application/json").body(REFRESHED_BODY);
		})
		.await;
	let cache = cache(&server);

	cache.save(&record(Duration::hours(1), Some("r-1"))).await.expect("Seed should persist.");

	let served = cache
		.get_fresh(&owner())
		.await
		.expect("get_fresh should succeed.")
		.expect("Record should exist.");

	token.assert_calls_async(0).await;

	assert_eq!(served.access_token.expose(), "stale");
}

#[tokio::test]
async fn near_expiry_records_refresh_once_and_keep_the_refresh_token() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/slack/token")
				.body_includes("grant_type=refresh_token")
				.body_includes("refresh_token=r-1");
			then.status(200).header("content-type", "application/json").body(REFRESHED_BODY);
		})
		.await;
	let cache = cache(&server);
	let seed = record(Duration::minutes(2), Some("r-1"));

	cache.save(&seed).await.expect("Seed should persist.");

	let served = cache
		.get_fresh(&owner())
		.await
		.expect("get_fresh should succeed.")
		.expect("Record should exist.");

	token.assert_calls_async(1).await;

	assert_eq!(served.access_token.expose(), "fresh");
	assert_eq!(served.refresh_token.as_ref().map(TokenSecret::expose), Some("r-1"));
	assert!(served.expires_at > seed.expires_at);

	let stored =
		cache.get(&owner()).await.expect("Get should succeed.").expect("Record should exist.");

	assert_eq!(stored.access_token.expose(), "fresh");
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/slack/token");
			then.status(200)
				.delay(StdDuration::from_millis(200))
				.header("content-type", "application/json")
				.body(REFRESHED_BODY);
		})
		.await;
	let cache = Arc::new(cache(&server));

	cache.save(&record(Duration::minutes(1), Some("r-1"))).await.expect("Seed should persist.");

	let handles = (0..8)
		.map(|_| {
			let cache = cache.clone();

			tokio::spawn(async move { cache.get_fresh(&owner()).await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let served = handle
			.await
			.expect("Task should not panic.")
			.expect("get_fresh should succeed.")
			.expect("Record should exist.");

		assert_eq!(served.access_token.expose(), "fresh");
	}

	token.assert_calls_async(1).await;

	assert_eq!(cache.metrics().attempts(), 1);
}

#[tokio::test]
async fn failed_refresh_serves_the_stale_record() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/slack/token");
			then.status(400)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_grant"}"#);
		})
		.await;
	let cache = cache(&server);

	cache.save(&record(Duration::minutes(1), Some("r-1"))).await.expect("Seed should persist.");

	let served = cache
		.get_fresh(&owner())
		.await
		.expect("Refresh failures must not surface.")
		.expect("Record should exist.");

	token.assert_calls_async(1).await;

	assert_eq!(served.access_token.expose(), "stale");
	assert_eq!(cache.metrics().failures(), 1);
}
