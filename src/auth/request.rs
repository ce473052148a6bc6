//! Downstream authorization requests carried through the consent flow.

// self
use crate::{_prelude::*, auth::ClientId};

/// Authorization request received from a downstream client on `GET /authorize`.
///
/// The record is transient: it is serialized into the opaque state at flow start and decoded
/// exactly once at callback. Unknown query parameters (PKCE challenge, nonce, prompt, …) are kept
/// in [`extra`](Self::extra) so they survive the round trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
	/// OAuth `response_type`; only `code` is accepted.
	#[serde(default = "default_response_type", alias = "responseType")]
	pub response_type: String,
	/// Downstream client identifier.
	#[serde(default, alias = "clientId")]
	pub client_id: String,
	/// Where the client expects to be redirected once the flow completes.
	#[serde(default, alias = "redirectUri")]
	pub redirect_uri: String,
	/// Space-delimited scope string as sent by the client.
	#[serde(default)]
	pub scope: String,
	/// Client-supplied opaque state echoed back on completion.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
	/// Remaining parameters, preserved verbatim; never holds a [`Self::RESERVED_PARAMS`] key.
	#[serde(flatten)]
	pub extra: BTreeMap<String, String>,
}
impl AuthorizationRequest {
	/// Parameter names, aliases included, that map to named fields and so cannot be extras.
	pub const RESERVED_PARAMS: [&'static str; 8] = [
		"response_type",
		"responseType",
		"client_id",
		"clientId",
		"redirect_uri",
		"redirectUri",
		"scope",
		"state",
	];

	/// Creates a `code` request with no scope or extras.
	pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
		Self {
			response_type: default_response_type(),
			client_id: client_id.into(),
			redirect_uri: redirect_uri.into(),
			scope: String::new(),
			state: None,
			extra: BTreeMap::new(),
		}
	}

	/// Sets the space-delimited scope string.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = scope.into();

		self
	}

	/// Sets the client's opaque state.
	pub fn with_state(mut self, state: impl Into<String>) -> Self {
		self.state = Some(state.into());

		self
	}

	/// Adds an extra parameter; reserved names are ignored.
	pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		let key = key.into();

		if !Self::RESERVED_PARAMS.contains(&key.as_str()) {
			self.extra.insert(key, value.into());
		}

		self
	}

	/// Individual scope entries, in request order.
	pub fn scopes(&self) -> impl Iterator<Item = &str> {
		self.scope.split_whitespace()
	}

	/// Scopes deduplicated and sorted; used for consent digests.
	pub fn normalized_scope(&self) -> String {
		self.scopes().collect::<BTreeSet<_>>().into_iter().collect::<Vec<_>>().join(" ")
	}

	/// Returns `true` when the identifying client field is present.
	pub fn has_client_id(&self) -> bool {
		!self.client_id.trim().is_empty()
	}

	/// Validates the request and returns the typed client identifier plus parsed redirect.
	pub fn validate(&self) -> Result<(ClientId, Url)> {
		if self.response_type != "code" {
			return Err(Error::InvalidRequest {
				reason: format!("unsupported response_type `{}`", self.response_type),
			});
		}

		let client_id = ClientId::new(&self.client_id)
			.map_err(|e| Error::InvalidRequest { reason: e.to_string() })?;
		let redirect = Url::parse(&self.redirect_uri)
			.map_err(|e| Error::InvalidRequest { reason: format!("redirect_uri is invalid: {e}") })?;

		Ok((client_id, redirect))
	}
}

fn default_response_type() -> String {
	"code".into()
}
