mod common;

// std
use std::time::Duration as StdDuration;
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use httpmock::prelude::*;
// self
use common::*;
use oauth2_consent_broker::{
	auth::TokenSecret,
	error::{Error, TransportError},
	http::ReqwestHttpClient,
	oauth::{TokenExchange, TokenExchanger},
	provider::{ClientAuthMethod, ProviderRegistration, ProviderRole},
};

fn exchanger(registration: &ProviderRegistration, timeout: StdDuration) -> TokenExchanger {
	let http = ReqwestHttpClient::with_timeout(timeout).expect("HTTP client should build.");
	let exchanger: TokenExchanger = TokenExchanger::from_registration(
		registration,
		http,
		oauth2_consent_broker::oauth::ReqwestTransportErrorMapper,
	)
	.expect("Exchanger should build.");

	exchanger
}

#[tokio::test]
async fn basic_auth_exchange_applies_default_lifetime() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let mut registration = registration(&server, PRIMARY, ProviderRole::Primary);

	registration.descriptor.quirks.default_expires_in_secs = 7_200;

	let credentials = STANDARD.encode("github-broker:github-client-secret");
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/github/token")
				.header("authorization", format!("Basic {credentials}"))
				.body_includes("grant_type=authorization_code")
				.body_includes("code=c-1");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"tok1","token_type":"bearer","scope":"read:user repo"}"#);
		})
		.await;
	let exchanger = exchanger(&registration, StdDuration::from_secs(2));
	let grant = exchanger.exchange_code("c-1", &registration.redirect_uri).await?;

	token.assert_calls_async(1).await;

	assert_eq!(grant.access_token.expose(), "tok1");
	assert!(grant.refresh_token.is_none());
	assert_eq!(grant.expires_in.whole_seconds(), 7_200);
	assert_eq!(grant.scope, Some(vec!["read:user".to_owned(), "repo".to_owned()]));

	Ok(())
}

#[tokio::test]
async fn post_auth_sends_credentials_in_the_body() {
	let server = MockServer::start_async().await;
	let mut registration = registration(&server, SECONDARY, ProviderRole::Secondary);

	registration.descriptor.client_auth_method = ClientAuthMethod::ClientSecretPost;

	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/slack/token")
				.body_includes("client_id=slack-broker")
				.body_includes("client_secret=slack-client-secret")
				.body_includes("grant_type=refresh_token")
				.body_includes("refresh_token=r-1");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"tok2","token_type":"bearer","expires_in":60}"#);
		})
		.await;
	let grant = exchanger(&registration, StdDuration::from_secs(2))
		.refresh(&TokenSecret::new("r-1"))
		.await
		.expect("Refresh grant should succeed.");

	token.assert_calls_async(1).await;

	assert_eq!(grant.access_token.expose(), "tok2");
	assert_eq!(grant.expires_in.whole_seconds(), 60);
}

#[tokio::test]
async fn oauth_error_bodies_keep_only_error_fields() {
	let server = MockServer::start_async().await;
	let registration = registration(&server, PRIMARY, ProviderRole::Primary);
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/github/token");
			then.status(401).header("content-type", "application/json").body(concat!(
				r#"{"error":"invalid_client","error_description":"Bad credentials","#,
				r#""client_secret":"github-client-secret"}"#,
			));
		})
		.await;
	let err = exchanger(&registration, StdDuration::from_secs(2))
		.exchange_code("c-1", &registration.redirect_uri)
		.await
		.expect_err("Rejected exchange should fail.");
	let Error::UpstreamExchange { status, body } = err else {
		panic!("Unexpected error variant: {err:?}.");
	};

	assert_eq!(status, 401);
	assert!(body.contains("invalid_client"));
	assert!(body.contains("Bad credentials"));
	assert!(!body.contains("github-client-secret"));
}

#[tokio::test]
async fn text_error_bodies_are_scrubbed() {
	let server = MockServer::start_async().await;
	let registration = registration(&server, PRIMARY, ProviderRole::Primary);
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/github/token");
			then.status(500).body("proxy echoed code=leaky-code secret=github-client-secret");
		})
		.await;
	let err = exchanger(&registration, StdDuration::from_secs(2))
		.exchange_code("leaky-code", &registration.redirect_uri)
		.await
		.expect_err("Failed exchange should surface an error.");
	let Error::UpstreamExchange { status, body } = err else {
		panic!("Unexpected error variant: {err:?}.");
	};

	assert_eq!(status, 500);
	assert!(!body.contains("leaky-code"));
	assert!(!body.contains("github-client-secret"));
	assert!(body.contains("<redacted>"));
}

#[tokio::test]
async fn slow_token_endpoint_times_out() {
	let server = MockServer::start_async().await;
	let registration = registration(&server, PRIMARY, ProviderRole::Primary);
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/github/token");
			then.status(200)
				.delay(StdDuration::from_secs(2))
				.header("content-type", "application/json")
				.body(r#"{"access_token":"late","token_type":"bearer"}"#);
		})
		.await;
	let err = exchanger(&registration, StdDuration::from_millis(200))
		.exchange_code("c-1", &registration.redirect_uri)
		.await
		.expect_err("Slow exchange should time out.");

	assert!(
		matches!(err, Error::Transport(TransportError::Timeout { .. })),
		"Unexpected error: {err:?}."
	);
}

#[tokio::test]
async fn error_document_with_success_status_is_a_bad_gateway() {
	let server = MockServer::start_async().await;
	let registration = registration(&server, PRIMARY, ProviderRole::Primary);
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/github/token");
			then.status(200).header("content-type", "application/json").body(
				r#"{"error":"bad_verification_code","error_description":"The code is incorrect."}"#,
			);
		})
		.await;
	let err = exchanger(&registration, StdDuration::from_secs(2))
		.exchange_code("c-1", &registration.redirect_uri)
		.await
		.expect_err("Error document should not read as tokens.");

	assert!(!err.to_string().contains("status 200"), "{err}");

	let Error::UpstreamExchange { status, body } = err else {
		panic!("Unexpected error variant: {err:?}.");
	};

	assert_eq!(status, 502);
	assert!(body.contains("bad_verification_code"));
}
