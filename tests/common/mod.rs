//! Shared fixtures: one mock server plays every upstream provider.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use axum::{
	Router,
	body::{Body, to_bytes},
	http::{Request, Response},
};
use httpmock::prelude::*;
use tower::ServiceExt;
// self
use oauth2_consent_broker::{
	approval::{ApprovalCookieConfig, ApprovalSigner},
	auth::{AuthorizationRequest, ProviderId, TokenSecret},
	clients::{RegisteredClient, StaticClientRegistry},
	flows::{Gateway, ProviderRuntime, StoreHandoffIssuer},
	http::ReqwestHttpClient,
	policy::AllowListPolicy,
	provider::{ProviderDescriptor, ProviderQuirks, ProviderRegistration, ProviderRole},
	server,
	store::{KeyValueStore, MemoryStore},
	url::Url,
};

pub const CLIENT_ID: &str = "abc123";
pub const CLIENT_REDIRECT: &str = "https://client.example.com/cb";
pub const PRIMARY: &str = "github";
pub const SECONDARY: &str = "slack";
pub const OWNER: &str = "583231";
pub const COOKIE_SECRET: &[u8] = b"integration-cookie-secret";

pub fn url(value: &str) -> Url {
	Url::parse(value).expect("Fixture URL should parse.")
}

pub fn registration(server: &MockServer, id: &str, role: ProviderRole) -> ProviderRegistration {
	let (callback, scopes, owner_claim) = match role {
		ProviderRole::Primary => ("/callback".to_owned(), vec!["read:user".to_owned()], "id"),
		ProviderRole::Secondary =>
			(format!("/{id}/callback"), vec!["chat:write".to_owned(), "users:read".to_owned()], "sub"),
	};
	let descriptor = ProviderDescriptor::builder(
		ProviderId::new(id).expect("Provider fixture id should be valid."),
	)
	.authorization_endpoint(url(&server.url(format!("/{id}/authorize"))))
	.token_endpoint(url(&server.url(format!("/{id}/token"))))
	.userinfo_endpoint(url(&server.url(format!("/{id}/userinfo"))))
	.quirks(ProviderQuirks { owner_claim: owner_claim.into(), ..Default::default() })
	.build()
	.expect("Provider fixture descriptor should build.");

	ProviderRegistration {
		descriptor,
		role,
		display_name: id.to_owned(),
		client_id: format!("{id}-broker"),
		client_secret: TokenSecret::new(format!("{id}-client-secret")),
		redirect_uri: url(&format!("https://broker.example.com{callback}")),
		scopes,
	}
}

pub fn client_request() -> AuthorizationRequest {
	AuthorizationRequest::new(CLIENT_ID, CLIENT_REDIRECT).with_scope("read").with_state("xyz")
}

pub struct Harness {
	pub server: MockServer,
	pub store: Arc<MemoryStore>,
	pub issuer: Arc<StoreHandoffIssuer>,
	pub signer: ApprovalSigner,
	pub gateway: Arc<Gateway>,
}
impl Harness {
	pub async fn start() -> Self {
		let server = MockServer::start_async().await;
		let store = Arc::new(MemoryStore::default());
		let shared: Arc<dyn KeyValueStore> = store.clone();
		let http = ReqwestHttpClient::with_timeout(std::time::Duration::from_secs(2))
			.expect("HTTP client should build.");
		let signer = ApprovalSigner::new(ApprovalCookieConfig::default(), COOKIE_SECRET)
			.expect("Signer should build.");
		let issuer = Arc::new(StoreHandoffIssuer::new(shared.clone()));
		let primary = ProviderRuntime::with_reqwest(
			registration(&server, PRIMARY, ProviderRole::Primary),
			http.clone(),
			shared.clone(),
		)
		.expect("Primary runtime should build.");
		let secondary = ProviderRuntime::with_reqwest(
			registration(&server, SECONDARY, ProviderRole::Secondary),
			http,
			shared.clone(),
		)
		.expect("Secondary runtime should build.");
		let clients = StaticClientRegistry::new([RegisteredClient {
			id: CLIENT_ID.parse().expect("Client fixture id should be valid."),
			name: "Example App".into(),
			redirect_uris: vec![url(CLIENT_REDIRECT)],
		}]);
		let gateway = Gateway::builder(primary, signer.clone(), shared)
			.secondary(secondary)
			.clients(Arc::new(clients))
			.policy(Arc::new(AllowListPolicy::new(["octocat"])))
			.issuer(issuer.clone())
			.build()
			.expect("Gateway should build.");

		Self { server, store, issuer, signer, gateway: Arc::new(gateway) }
	}

	pub fn router(&self) -> Router {
		server::router(self.gateway.clone())
	}

	/// `Cookie` header value approving `request`.
	pub fn approval_cookie(&self, request: &AuthorizationRequest) -> String {
		let set_cookie = self
			.signer
			.sign(&request.client_id, &oauth2_consent_broker::approval::approval_digest(request));

		cookie_pair(&set_cookie)
	}

	pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
		let mut request = Request::builder().uri(uri);

		if let Some(cookie) = cookie {
			request = request.header("cookie", cookie);
		}

		self.send(request.body(Body::empty()).expect("Request should build.")).await
	}

	pub async fn post_form(&self, uri: &str, form: &[(&str, &str)]) -> Response<Body> {
		let body = form
			.iter()
			.map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
			.collect::<Vec<_>>()
			.join("&");
		let request = Request::builder()
			.method("POST")
			.uri(uri)
			.header("content-type", "application/x-www-form-urlencoded")
			.body(Body::from(body))
			.expect("Request should build.");

		self.send(request).await
	}

	async fn send(&self, request: Request<Body>) -> Response<Body> {
		self.router().oneshot(request).await.expect("Router should answer.")
	}
}

/// `name=value` part of a `Set-Cookie` header.
pub fn cookie_pair(set_cookie: &str) -> String {
	set_cookie.split(';').next().unwrap_or_default().trim().to_owned()
}

pub fn location(response: &Response<Body>) -> Url {
	let raw = response
		.headers()
		.get("location")
		.expect("Response should redirect.")
		.to_str()
		.expect("Location should be ASCII.");

	url(raw)
}

pub fn query(url: &Url, key: &str) -> Option<String> {
	url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
}

pub async fn body_text(response: Response<Body>) -> String {
	let bytes = to_bytes(response.into_body(), 1 << 20).await.expect("Body should be readable.");

	String::from_utf8(bytes.to_vec()).expect("Body should be UTF-8.")
}

/// Builds a query string with percent-encoded values.
pub fn query_string(pairs: &[(&str, &str)]) -> String {
	pairs
		.iter()
		.map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
		.collect::<Vec<_>>()
		.join("&")
}
