//! Userinfo retrieval after a successful code exchange.

// crates.io
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{Profile, TokenSecret},
	error::TransportError,
	http::ReqwestHttpClient,
	oauth::sanitize_body,
	provider::ProviderDescriptor,
};

/// Boxed future returned by [`IdentityFetch`].
pub type IdentityFuture<'a> = Pin<Box<dyn Future<Output = Result<Profile>> + 'a + Send>>;

const USERINFO_ENDPOINT: &str = "userinfo";

/// Looks up the profile behind an access token.
pub trait IdentityFetch
where
	Self: Send + Sync,
{
	/// Fetches the profile for `access_token`.
	fn fetch_profile<'a>(&'a self, access_token: &'a TokenSecret) -> IdentityFuture<'a>;
}

/// Bearer-authenticated `GET` against a provider's userinfo endpoint.
#[derive(Clone, Debug)]
pub struct UserinfoClient {
	http: ReqwestHttpClient,
	endpoint: Url,
	owner_claim: String,
}
impl UserinfoClient {
	/// Creates a client for the descriptor's userinfo endpoint and owner claim.
	pub fn new(http: ReqwestHttpClient, descriptor: &ProviderDescriptor) -> Self {
		Self {
			http,
			endpoint: descriptor.endpoints.userinfo.clone(),
			owner_claim: descriptor.quirks.owner_claim.clone(),
		}
	}
}
impl IdentityFetch for UserinfoClient {
	fn fetch_profile<'a>(&'a self, access_token: &'a TokenSecret) -> IdentityFuture<'a> {
		Box::pin(async move {
			let response = self
				.http
				.get(self.endpoint.clone())
				.header(AUTHORIZATION, format!("Bearer {}", access_token.expose()))
				.header(ACCEPT, "application/json")
				.send()
				.await
				.map_err(|e| TransportError::from_reqwest(USERINFO_ENDPOINT, e))?;
			let status = response.status();
			let body = response
				.bytes()
				.await
				.map_err(|e| TransportError::from_reqwest(USERINFO_ENDPOINT, e))?;

			if !status.is_success() {
				return Err(Error::UpstreamProfile {
					status: Some(status.as_u16()),
					message: sanitize_body(&body, &[access_token.expose()]),
				});
			}

			let raw = serde_json::from_slice::<Value>(&body).map_err(|e| Error::UpstreamProfile {
				status: Some(status.as_u16()),
				message: format!("userinfo response is not JSON: {e}"),
			})?;

			Profile::from_userinfo(raw, &self.owner_claim).map_err(|e| Error::UpstreamProfile {
				status: Some(status.as_u16()),
				message: e.to_string(),
			})
		})
	}
}
