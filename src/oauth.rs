//! Token endpoint facade built on the `oauth2` crate.
//!
//! [`TokenExchanger`] turns a [`ProviderRegistration`] into authorization-code and refresh grants.
//! Upstream failures are reduced to [`Error::UpstreamExchange`] with a sanitized body: only the
//! OAuth `error`, `error_description`, and `error_uri` fields survive, or a short text preview
//! with the broker's secrets scrubbed.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, RedirectUrl, RefreshToken, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
};
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	auth::{OwnerId, Profile, TokenRecord, TokenSecret},
	error::{ConfigError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{ClientAuthMethod, ProviderRegistration},
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeTokenResponse = oauth2::basic::BasicTokenResponse;

/// Boxed future returned by [`TokenExchange`] operations.
pub type ExchangeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

const PREVIEW_LIMIT: usize = 256;
const TOKEN_ENDPOINT: &str = "token";

/// Tokens returned by a successful grant.
#[derive(Clone, Debug)]
pub struct TokenGrant {
	/// Issued access token.
	pub access_token: TokenSecret,
	/// Issued refresh token, when the provider sent one.
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime of the access token; always positive.
	pub expires_in: Duration,
	/// Scopes the provider reports as granted.
	pub scope: Option<Vec<String>>,
}
impl TokenGrant {
	/// Converts the grant into a persisted record issued at `issued_at`.
	pub fn into_record(
		self,
		registration: &ProviderRegistration,
		owner: OwnerId,
		issued_at: OffsetDateTime,
		profile: Option<Profile>,
	) -> Result<TokenRecord> {
		TokenRecord::builder(owner, registration.id().clone())
			.access_token(self.access_token.expose())
			.refresh_token(self.refresh_token)
			.issued_at(issued_at)
			.expires_in(self.expires_in)
			.profile(profile)
			.build()
			.map_err(|e| ConfigError::from(e).into())
	}
}

/// Grant operations against one provider's token endpoint.
pub trait TokenExchange
where
	Self: Send + Sync,
{
	/// Exchanges an authorization code for tokens.
	fn exchange_code<'a>(
		&'a self,
		code: &'a str,
		redirect_uri: &'a Url,
	) -> ExchangeFuture<'a, TokenGrant>;

	/// Redeems a refresh token for a new access token.
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> ExchangeFuture<'a, TokenGrant>;
}

/// Maps HTTP transport failures into broker [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a broker error.
	fn map_transport_error(
		&self,
		endpoint: &'static str,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		endpoint: &'static str,
		_metadata: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() => ConfigError::from(*inner).into(),
			HttpClientError::Reqwest(inner) => TransportError::from_reqwest(endpoint, *inner).into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) =>
				TransportError::network(endpoint, std::io::Error::other(message)).into(),
			_ => TransportError::network(endpoint, std::io::Error::other("unknown transport error"))
				.into(),
		}
	}
}

/// `oauth2`-backed [`TokenExchange`] for a single provider registration.
pub struct TokenExchanger<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	default_expires_in: Duration,
	client_secret: TokenSecret,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> TokenExchanger<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds the exchanger from a registration, honoring its client authentication method.
	pub fn from_registration(
		registration: &ProviderRegistration,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let descriptor = &registration.descriptor;
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let redirect_url = RedirectUrl::new(registration.redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(registration.client_id.clone()))
			.set_client_secret(ClientSecret::new(registration.client_secret.expose().to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url);

		if matches!(descriptor.client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self {
			oauth_client,
			default_expires_in: descriptor.default_expires_in(),
			client_secret: registration.client_secret.clone(),
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}

	fn map_request_error(
		&self,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
		scrub: &[&str],
	) -> Error {
		let status = meta.as_ref().and_then(|m| m.status);
		let mut secrets = vec![self.client_secret.expose()];

		secrets.extend_from_slice(scrub);

		match err {
			RequestTokenError::ServerResponse(response) => Error::UpstreamExchange {
				status: status.unwrap_or(400),
				body: oauth_error_body(&response),
			},
			RequestTokenError::Request(error) =>
				self.error_mapper.map_transport_error(TOKEN_ENDPOINT, meta.as_ref(), error),
			RequestTokenError::Parse(_, body) => Error::UpstreamExchange {
				status: failure_status(status),
				body: sanitize_body(&body, &secrets),
			},
			RequestTokenError::Other(message) => Error::UpstreamExchange {
				status: failure_status(status),
				body: sanitize_body(message.as_bytes(), &secrets),
			},
		}
	}

	fn map_token_response(&self, response: FacadeTokenResponse) -> Result<TokenGrant> {
		let expires_in = match response.expires_in() {
			Some(duration) => {
				let secs = i64::try_from(duration.as_secs())
					.map_err(|_| ConfigError::ExpiresInOutOfRange)?;

				if secs <= 0 {
					return Err(ConfigError::NonPositiveExpiresIn.into());
				}

				Duration::seconds(secs)
			},
			None => self.default_expires_in,
		};
		let access_token = TokenSecret::new(response.access_token().secret().to_owned());
		let refresh_token =
			response.refresh_token().map(|token| TokenSecret::new(token.secret().to_owned()));
		let scope = response
			.scopes()
			.map(|scopes| scopes.iter().map(|scope| scope.as_ref().to_owned()).collect());

		tracing::debug!(
			access_token = %access_token.fingerprint(),
			refresh_issued = refresh_token.is_some(),
			expires_in_secs = expires_in.whole_seconds(),
			"Token endpoint issued tokens."
		);

		Ok(TokenGrant { access_token, refresh_token, expires_in, scope })
	}
}
impl<C, M> TokenExchange for TokenExchanger<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_code<'a>(
		&'a self,
		code: &'a str,
		redirect_uri: &'a Url,
	) -> ExchangeFuture<'a, TokenGrant> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let redirect_url = RedirectUrl::new(redirect_uri.to_string())
				.map_err(|source| ConfigError::InvalidDescriptor { source })?;
			let response = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_redirect_uri(Cow::Owned(redirect_url))
				.request_async(&instrumented)
				.await
				.map_err(|err| self.map_request_error(meta.take(), err, &[code]))?;

			self.map_token_response(response)
		})
	}

	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> ExchangeFuture<'a, TokenGrant> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let secret = RefreshToken::new(refresh_token.expose().to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&secret)
				.request_async(&instrumented)
				.await
				.map_err(|err| {
					self.map_request_error(meta.take(), err, &[refresh_token.expose()])
				})?;

			self.map_token_response(response)
		})
	}
}
impl<C, M> Debug for TokenExchanger<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenExchanger")
			.field("token_url", &self.oauth_client.token_uri().as_str())
			.field("default_expires_in", &self.default_expires_in)
			.finish()
	}
}

/// Status reported for an unusable token response; a 2xx carrying garbage is a bad gateway.
fn failure_status(status: Option<u16>) -> u16 {
	status.filter(|code| !(200..300).contains(code)).unwrap_or(502)
}

fn oauth_error_body(response: &BasicErrorResponse) -> String {
	let mut object = Map::new();

	object.insert("error".into(), Value::String(response.error().as_ref().to_owned()));

	if let Some(description) = response.error_description() {
		object.insert("error_description".into(), Value::String(description.clone()));
	}
	if let Some(uri) = response.error_uri() {
		object.insert("error_uri".into(), Value::String(uri.clone()));
	}

	Value::Object(object).to_string()
}

/// Reduces an upstream body to caller-safe text.
///
/// JSON objects keep only the OAuth error fields; anything else becomes a truncated preview
/// with each of `secrets` replaced by `<redacted>`.
pub fn sanitize_body(body: &[u8], secrets: &[&str]) -> String {
	if let Ok(Value::Object(object)) = serde_json::from_slice::<Value>(body) {
		let kept = ["error", "error_description", "error_uri"]
			.into_iter()
			.filter_map(|key| object.get(key).map(|value| (key.to_owned(), value.clone())))
			.collect::<Map<_, _>>();

		return Value::Object(kept).to_string();
	}

	let mut text = String::from_utf8_lossy(body).into_owned();

	for secret in secrets.iter().filter(|s| !s.is_empty()) {
		text = text.replace(secret, "<redacted>");
	}

	truncate_preview(text.trim())
}

fn truncate_preview(text: &str) -> String {
	if text.chars().count() <= PREVIEW_LIMIT {
		return text.to_owned();
	}

	let mut preview = text.chars().take(PREVIEW_LIMIT).collect::<String>();

	preview.push('…');

	preview
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::ProviderId,
		provider::{ProviderDescriptor, ProviderRole},
	};

	fn registration(method: ClientAuthMethod) -> ProviderRegistration {
		let descriptor = ProviderDescriptor::builder(
			ProviderId::new("test-provider").expect("Failed to construct provider identifier."),
		)
		.authorization_endpoint(
			Url::parse("https://example.com/oauth2/authorize")
				.expect("Failed to parse authorization endpoint URL."),
		)
		.token_endpoint(
			Url::parse("https://example.com/oauth2/token")
				.expect("Failed to parse token endpoint URL."),
		)
		.userinfo_endpoint(
			Url::parse("https://example.com/userinfo").expect("Failed to parse userinfo URL."),
		)
		.client_auth_method(method)
		.build()
		.expect("Failed to build provider descriptor.");

		ProviderRegistration {
			descriptor,
			role: ProviderRole::Primary,
			display_name: "Test".into(),
			client_id: "client-id".into(),
			client_secret: TokenSecret::new("secret"),
			redirect_uri: Url::parse("https://broker.example.com/callback")
				.expect("Failed to parse redirect URI."),
			scopes: Vec::new(),
		}
	}

	#[test]
	fn builds_for_both_auth_methods() {
		for method in [ClientAuthMethod::ClientSecretBasic, ClientAuthMethod::ClientSecretPost] {
			let http = ReqwestHttpClient::with_timeout(crate::http::DEFAULT_TIMEOUT)
				.expect("HTTP client should build.");
			let exchanger =
				<TokenExchanger<ReqwestHttpClient, ReqwestTransportErrorMapper>>::from_registration(
					&registration(method),
					Arc::new(http),
					Arc::new(ReqwestTransportErrorMapper),
				)
				.expect("Exchanger should build.");

			assert!(format!("{exchanger:?}").contains("https://example.com/oauth2/token"));
		}
	}

	#[test]
	fn successful_status_with_unusable_body_reads_as_bad_gateway() {
		assert_eq!(failure_status(Some(200)), 502);
		assert_eq!(failure_status(Some(204)), 502);
		assert_eq!(failure_status(None), 502);
		assert_eq!(failure_status(Some(401)), 401);
	}

	#[test]
	fn sanitize_keeps_only_oauth_error_fields() {
		let body = br#"{"error":"invalid_grant","error_description":"bad code","client_secret":"secret","trace":"x"}"#;
		let sanitized = sanitize_body(body, &["secret"]);
		let value: Value = serde_json::from_str(&sanitized).expect("Sanitized body should be JSON.");

		assert_eq!(value["error"], "invalid_grant");
		assert_eq!(value["error_description"], "bad code");
		assert!(value.get("client_secret").is_none());
		assert!(value.get("trace").is_none());
	}

	#[test]
	fn sanitize_scrubs_and_truncates_text() {
		let body = format!("upstream echoed client_secret=hunter2 and code=abc {}", "x".repeat(400));
		let sanitized = sanitize_body(body.as_bytes(), &["hunter2", "abc", ""]);

		assert!(!sanitized.contains("hunter2"));
		assert!(!sanitized.contains("code=abc"));
		assert!(sanitized.contains("<redacted>"));
		assert_eq!(sanitized.chars().count(), PREVIEW_LIMIT + 1);
	}

	#[test]
	fn grants_become_records() {
		let registration = registration(ClientAuthMethod::ClientSecretBasic);
		let issued = OffsetDateTime::now_utc();
		let grant = TokenGrant {
			access_token: TokenSecret::new("tok1"),
			refresh_token: None,
			expires_in: Duration::seconds(3_600),
			scope: None,
		};
		let record = grant
			.into_record(
				&registration,
				OwnerId::new("42").expect("Owner fixture should be valid."),
				issued,
				None,
			)
			.expect("Grant should convert into a record.");

		assert_eq!(record.expires_at - record.issued_at, Duration::seconds(3_600));
		assert_eq!(record.provider.as_str(), "test-provider");
	}
}
