//! Broker-level error types shared across flows, providers, stores, and the HTTP surface.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Opaque state could not be decoded.
	#[error(transparent)]
	Decode(#[from] crate::state::DecodeError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The user declined the consent dialog.
	#[error("The authorization request was denied.")]
	ApprovalDenied,
	/// Token endpoint answered with a non-success response.
	#[error("Token endpoint rejected the request with status {status}.")]
	UpstreamExchange {
		/// Upstream HTTP status code.
		status: u16,
		/// Sanitized response body; never contains secrets.
		body: String,
	},
	/// Identity lookup failed after a successful exchange.
	#[error("Identity lookup failed: {message}.")]
	UpstreamProfile {
		/// Upstream HTTP status code, when a response was received.
		status: Option<u16>,
		/// Human-readable failure summary.
		message: String,
	},
	/// Refresh grant failed; callers fall back to the cached record.
	#[error("Refresh grant failed: {reason}.")]
	Refresh {
		/// Summary of the underlying failure.
		reason: String,
	},
	/// Inbound request is missing parameters or carries invalid values.
	#[error("Invalid request: {reason}.")]
	InvalidRequest {
		/// Caller-facing reason string.
		reason: String,
	},
	/// The provider reported an error on the redirect back to the broker.
	#[error("Provider returned an error: {error}.")]
	ProviderCallback {
		/// OAuth `error` parameter.
		error: String,
		/// OAuth `error_description` parameter, when supplied.
		description: Option<String>,
	},
	/// The client identifier is not registered.
	#[error("Client `{client_id}` is not registered.")]
	UnknownClient {
		/// Rejected client identifier.
		client_id: String,
	},
	/// The secondary provider segment does not match any configured provider.
	#[error("Provider `{provider}` is not configured.")]
	UnknownProvider {
		/// Rejected provider segment.
		provider: String,
	},
	/// The pending correlation record is unknown, expired, or already consumed.
	#[error("The authorization attempt has expired or was already completed.")]
	PendingStateMissing,
	/// An attempt was driven through an illegal stage transition.
	#[error(transparent)]
	Stage(#[from] crate::flows::StageError),
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required secret is missing or empty.
	#[error("Required secret `{name}` is missing.")]
	MissingSecret {
		/// Configuration key of the missing secret.
		name: String,
	},
	/// A configuration value is present but unusable.
	#[error("Configuration value `{name}` is invalid: {reason}.")]
	InvalidValue {
		/// Configuration key.
		name: String,
		/// Why the value was rejected.
		reason: String,
	},
	/// Configuration sources could not be loaded or deserialized.
	#[error("Configuration could not be loaded.")]
	Load(#[from] config::ConfigError),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Shorthand for [`ConfigError::InvalidValue`].
	pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::InvalidValue { name: name.into(), reason: reason.into() }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {endpoint}.")]
	Network {
		/// Which upstream endpoint was being called.
		endpoint: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The upstream call exceeded its deadline.
	#[error("Timed out while calling {endpoint}.")]
	Timeout {
		/// Which upstream endpoint was being called.
		endpoint: &'static str,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling an upstream endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}

	/// Classifies a reqwest failure, separating deadline overruns from other network errors.
	pub fn from_reqwest(endpoint: &'static str, e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout { endpoint } } else { Self::network(endpoint, e) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn store_error_converts_into_broker_error_with_source() {
		let store_error = StoreError::Backend { message: "disk unavailable".into() };
		let broker_error: Error = store_error.clone().into();

		assert!(matches!(broker_error, Error::Storage(_)));
		assert!(broker_error.to_string().contains("disk unavailable"));

		let source = StdError::source(&broker_error)
			.expect("Broker error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn upstream_exchange_message_omits_body() {
		let err = Error::UpstreamExchange { status: 401, body: "{\"error\":\"x\"}".into() };

		assert_eq!(err.to_string(), "Token endpoint rejected the request with status 401.");
	}
}
