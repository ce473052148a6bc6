//! Provider authorize URL construction.

// self
use crate::_prelude::*;

/// Inputs for [`build_authorize_url`].
#[derive(Clone, Debug)]
pub struct AuthorizeUrlParams<'a> {
	/// Provider authorization endpoint; existing query pairs are preserved.
	pub endpoint: &'a Url,
	/// Broker's client identifier at the provider.
	pub client_id: &'a str,
	/// Broker callback registered with the provider.
	pub redirect_uri: &'a Url,
	/// Scopes to request; empty entries are skipped.
	pub scope: &'a [String],
	/// Delimiter the provider expects between scopes.
	pub scope_delimiter: char,
	/// Opaque state value.
	pub state: &'a str,
	/// Additional provider-specific parameters.
	pub extra: &'a [(String, String)],
}

/// Builds the provider authorize URL with `response_type=code`.
///
/// Pure; performs no I/O.
pub fn build_authorize_url(params: &AuthorizeUrlParams) -> Url {
	let mut url = params.endpoint.clone();

	{
		let mut pairs = url.query_pairs_mut();

		pairs.append_pair("response_type", "code");
		pairs.append_pair("client_id", params.client_id);
		pairs.append_pair("redirect_uri", params.redirect_uri.as_str());

		if let Some(scope) = format_scope(params.scope, params.scope_delimiter) {
			pairs.append_pair("scope", &scope);
		}

		pairs.append_pair("state", params.state);

		for (key, value) in params.extra {
			pairs.append_pair(key, value);
		}
	}

	url
}

fn format_scope(scope: &[String], delimiter: char) -> Option<String> {
	let mut parts = scope.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).peekable();

	parts.peek()?;

	let mut joined = String::new();

	for (idx, part) in parts.enumerate() {
		if idx > 0 {
			joined.push(delimiter);
		}

		joined.push_str(part);
	}

	Some(joined)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn query(url: &Url) -> BTreeMap<String, String> {
		url.query_pairs().into_owned().collect()
	}

	#[test]
	fn builds_code_request_with_state_and_scope() {
		let endpoint = Url::parse("https://github.com/login/oauth/authorize?allow_signup=false")
			.expect("Endpoint fixture should parse.");
		let redirect =
			Url::parse("https://broker.example.com/callback").expect("Redirect fixture should parse.");
		let scope = ["read:user".to_owned(), " ".to_owned(), "user:email".to_owned()];
		let url = build_authorize_url(&AuthorizeUrlParams {
			endpoint: &endpoint,
			client_id: "abc123",
			redirect_uri: &redirect,
			scope: &scope,
			scope_delimiter: ' ',
			state: "eyJ+/=",
			extra: &[("prompt".into(), "consent".into())],
		});
		let pairs = query(&url);

		assert_eq!(url.host_str(), Some("github.com"));
		assert_eq!(pairs["allow_signup"], "false");
		assert_eq!(pairs["response_type"], "code");
		assert_eq!(pairs["client_id"], "abc123");
		assert_eq!(pairs["redirect_uri"], "https://broker.example.com/callback");
		assert_eq!(pairs["scope"], "read:user user:email");
		assert_eq!(pairs["state"], "eyJ+/=");
		assert_eq!(pairs["prompt"], "consent");
	}

	#[test]
	fn honors_custom_delimiter_and_omits_empty_scope() {
		let endpoint = Url::parse("https://id.example.com/authorize").expect("Endpoint should parse.");
		let redirect = Url::parse("https://broker.example.com/cb").expect("Redirect should parse.");
		let mut params = AuthorizeUrlParams {
			endpoint: &endpoint,
			client_id: "c",
			redirect_uri: &redirect,
			scope: &[],
			scope_delimiter: ',',
			state: "s",
			extra: &[],
		};

		assert!(!query(&build_authorize_url(&params)).contains_key("scope"));

		let scope = ["a".to_owned(), "b".to_owned()];

		params.scope = &scope;

		assert_eq!(query(&build_authorize_url(&params))["scope"], "a,b");
	}
}
