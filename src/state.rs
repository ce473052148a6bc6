//! Self-describing opaque state carried across the provider redirect.
//!
//! The encoder emits exactly one format: standard base64 over the JSON envelope. Intermediate
//! redirects may add a layer of percent-encoding (`+`, `/`, `=` become `%2B`, `%2F`, `%3D`), so the
//! decoder tries the value as received and then once more after reversing a single
//! percent-decoding pass.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
// self
use crate::{_prelude::*, auth::AuthorizationRequest};

const MAX_STATE_LEN: usize = 16 * 1024;

/// Reasons an opaque state value cannot be trusted.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DecodeError {
	/// No state value was supplied.
	#[error("State parameter is missing.")]
	Missing,
	/// The value exceeds the accepted size.
	#[error("State parameter exceeds {max} bytes.")]
	TooLong {
		/// Maximum accepted length.
		max: usize,
	},
	/// The value is not valid base64 in either encoding layer.
	#[error("State parameter is not valid base64: {message}.")]
	Encoding {
		/// Decoder diagnostic.
		message: String,
	},
	/// The decoded bytes do not describe an authorization request.
	#[error("State parameter has an invalid structure at `{path}`: {message}.")]
	Structure {
		/// JSON path of the offending field.
		path: String,
		/// Parser diagnostic.
		message: String,
	},
	/// The decoded request carries no client identifier.
	#[error("State parameter does not identify a client.")]
	MissingClientId,
}

/// Opaque state payload: the originating request plus flow-specific extras.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEnvelope {
	/// Downstream authorization request being correlated.
	pub request: AuthorizationRequest,
	/// Flow-specific correlation values (for example, the pending nonce and linking owner).
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub extras: BTreeMap<String, String>,
}
impl StateEnvelope {
	/// Well-known extra carrying the pending secondary-flow nonce.
	pub const NONCE: &'static str = "nonce";
	/// Well-known extra carrying the linking owner identity.
	pub const OWNER: &'static str = "owner";

	/// Wraps a request with no extras.
	pub fn new(request: AuthorizationRequest) -> Self {
		Self { request, extras: BTreeMap::new() }
	}

	/// Adds an extra value.
	pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.extras.insert(key.into(), value.into());

		self
	}

	/// Looks up an extra value.
	pub fn extra(&self, key: &str) -> Option<&str> {
		self.extras.get(key).map(String::as_str)
	}
}

/// Encodes an envelope into its opaque string form.
pub fn encode(envelope: &StateEnvelope) -> String {
	// Serializing string-keyed maps and strings cannot fail.
	let json = serde_json::to_vec(envelope).unwrap_or_default();

	STANDARD.encode(json)
}

/// Decodes an opaque state string, tolerating one extra layer of percent-encoding.
///
/// Succeeds only when the decoded request carries a non-empty client identifier.
pub fn decode(raw: &str) -> Result<StateEnvelope, DecodeError> {
	let raw = raw.trim();

	if raw.is_empty() {
		return Err(DecodeError::Missing);
	}
	if raw.len() > MAX_STATE_LEN {
		return Err(DecodeError::TooLong { max: MAX_STATE_LEN });
	}

	match decode_layer(raw) {
		Ok(envelope) => Ok(envelope),
		Err(first) => match urlencoding::decode(raw) {
			Ok(unescaped) if unescaped != raw => decode_layer(&unescaped),
			_ => Err(first),
		},
	}
}

fn decode_layer(raw: &str) -> Result<StateEnvelope, DecodeError> {
	let bytes = STANDARD.decode(raw).map_err(|e| DecodeError::Encoding { message: e.to_string() })?;
	let de = &mut serde_json::Deserializer::from_slice(&bytes);
	let envelope: StateEnvelope = serde_path_to_error::deserialize(de).map_err(|e| {
		DecodeError::Structure { path: e.path().to_string(), message: e.inner().to_string() }
	})?;

	if !envelope.request.has_client_id() {
		return Err(DecodeError::MissingClientId);
	}

	Ok(envelope)
}
