//! Token secret wrapper that keeps credential material out of logs.

// crates.io
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Redacted secret wrapper used for access tokens, refresh tokens, and client secrets.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Short, non-reversible digest prefix that is safe to log for correlation.
	pub fn fingerprint(&self) -> String {
		let digest = Sha256::digest(self.0.as_bytes());

		digest[..4].iter().map(|b| format!("{b:02x}")).collect()
	}

	/// Returns `true` when the wrapped value is empty.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
	}

	#[test]
	fn fingerprints_are_stable_and_opaque() {
		let a = TokenSecret::new("tok1");
		let b = TokenSecret::new("tok2");

		assert_eq!(a.fingerprint().len(), 8);
		assert_eq!(a.fingerprint(), TokenSecret::new("tok1").fingerprint());
		assert_ne!(a.fingerprint(), b.fingerprint());
		assert!(!a.fingerprint().contains("tok1"));
	}

	#[test]
	fn serializes_as_plain_string() {
		let json = serde_json::to_string(&TokenSecret::new("abc")).expect("Secret should serialize.");

		assert_eq!(json, "\"abc\"");
	}
}
