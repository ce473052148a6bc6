//! Signed approval cookies that let a returning user skip the consent screen.
//!
//! The cookie value is `base64url(payload).base64url(mac)` where `payload` is the canonical string
//! `v1\n{client_id}\n{approved_digest}\n{issued_at_unix}` and `mac` is HMAC-SHA256 over it. Every
//! verification failure reads as "not pre-approved"; nothing here returns an error to the caller.
//!
//! Each client gets its own cookie, named `{name}.{suffix}` where `suffix` is derived from the
//! client id, so approving one client never evicts another client's approval.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::AuthorizationRequest, error::ConfigError};

type HmacSha256 = Hmac<Sha256>;

const PAYLOAD_VERSION: &str = "v1";
const CLOCK_SKEW: Duration = Duration::seconds(60);
const NAME_SUFFIX_LEN: usize = 16;

/// `SameSite` attribute emitted on the approval cookie.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
	/// `SameSite=Strict`.
	Strict,
	/// `SameSite=Lax`.
	#[default]
	Lax,
	/// `SameSite=None`; browsers require `Secure` alongside it.
	None,
}
impl SameSite {
	fn as_str(self) -> &'static str {
		match self {
			SameSite::Strict => "Strict",
			SameSite::Lax => "Lax",
			SameSite::None => "None",
		}
	}
}

/// Attributes of the approval cookie.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalCookieConfig {
	/// Cookie name prefix; each client's cookie is `{name}.{suffix}`.
	pub name: String,
	/// Explicit `Domain` attribute; host-only when unset.
	pub domain: Option<String>,
	/// `Path` attribute.
	pub path: String,
	/// Maximum age in seconds, applied both to `Max-Age` and to verification.
	pub max_age_secs: u32,
	/// Emits `Secure`.
	pub secure: bool,
	/// Emits `HttpOnly`.
	pub http_only: bool,
	/// `SameSite` policy.
	pub same_site: SameSite,
}
impl ApprovalCookieConfig {
	/// Maximum age as a duration.
	pub fn max_age(&self) -> Duration {
		Duration::seconds(self.max_age_secs.into())
	}
}
impl Default for ApprovalCookieConfig {
	fn default() -> Self {
		Self {
			name: "consent_approved".into(),
			domain: None,
			path: "/".into(),
			max_age_secs: 30 * 24 * 60 * 60,
			secure: true,
			http_only: true,
			same_site: SameSite::Lax,
		}
	}
}

/// Claims carried by a verified approval cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalClaims {
	/// Client the user approved.
	pub client_id: String,
	/// Digest of the approved scope and redirect.
	pub approved_digest: String,
	/// When the approval was recorded.
	pub issued_at: OffsetDateTime,
}

/// Signs and verifies approval cookies with a single HMAC secret.
#[derive(Clone)]
pub struct ApprovalSigner {
	config: ApprovalCookieConfig,
	mac: HmacSha256,
}
impl ApprovalSigner {
	/// Creates a signer bound to `secret`.
	///
	/// An empty secret is a boot-time configuration error.
	pub fn new(config: ApprovalCookieConfig, secret: &[u8]) -> Result<Self, ConfigError> {
		if secret.is_empty() {
			return Err(ConfigError::MissingSecret { name: "cookie_secret".into() });
		}
		if config.name.is_empty() || config.name.contains([';', '=', ' ']) {
			return Err(ConfigError::invalid("approval_cookie.name", "must be a plain token"));
		}

		let mac = HmacSha256::new_from_slice(secret)
			.map_err(|e| ConfigError::invalid("cookie_secret", e.to_string()))?;

		Ok(Self { config, mac })
	}

	/// Cookie attributes in effect.
	pub fn config(&self) -> &ApprovalCookieConfig {
		&self.config
	}

	/// Produces a `Set-Cookie` header value approving `client_id` for `approved_digest`.
	pub fn sign(&self, client_id: &str, approved_digest: &str) -> String {
		self.sign_at(client_id, approved_digest, OffsetDateTime::now_utc())
	}

	/// Same as [`sign`](Self::sign) with an explicit issuance instant.
	pub fn sign_at(&self, client_id: &str, approved_digest: &str, now: OffsetDateTime) -> String {
		let payload = canonical_payload(client_id, approved_digest, now.unix_timestamp());
		let tag = self.tag(payload.as_bytes());
		let value =
			format!("{}.{}", URL_SAFE_NO_PAD.encode(payload.as_bytes()), URL_SAFE_NO_PAD.encode(tag));

		self.set_cookie(client_id, &value, self.config.max_age_secs)
	}

	/// `Set-Cookie` header value that clears the approval cookie of `client_id`.
	pub fn clear(&self, client_id: &str) -> String {
		self.set_cookie(client_id, "", 0)
	}

	/// Name of the cookie carrying the approval of `client_id`.
	pub fn cookie_name(&self, client_id: &str) -> String {
		let digest = URL_SAFE_NO_PAD.encode(Sha256::digest(client_id.as_bytes()));

		format!("{}.{}", self.config.name, &digest[..NAME_SUFFIX_LEN])
	}

	/// Returns `true` when `cookie_header` carries a valid, unexpired approval for `client_id`.
	pub fn verify(&self, cookie_header: Option<&str>, client_id: &str) -> bool {
		self.verify_claims(cookie_header, client_id, OffsetDateTime::now_utc()).is_some()
	}

	/// Returns the verified claims for `client_id`, or `None` when no cookie passes.
	///
	/// Only cookies named with the configured prefix are considered; the first valid one wins.
	pub fn verify_claims(
		&self,
		cookie_header: Option<&str>,
		client_id: &str,
		now: OffsetDateTime,
	) -> Option<ApprovalClaims> {
		cookie_values(cookie_header?, &self.config.name)
			.find_map(|value| self.verify_value(value, client_id, now))
	}

	fn verify_value(
		&self,
		value: &str,
		client_id: &str,
		now: OffsetDateTime,
	) -> Option<ApprovalClaims> {
		let (payload_b64, tag_b64) = value.split_once('.')?;
		let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
		let tag = URL_SAFE_NO_PAD.decode(tag_b64).ok()?;
		let mut mac = self.mac.clone();

		mac.update(&payload);
		mac.verify_slice(&tag).ok()?;

		let payload = String::from_utf8(payload).ok()?;
		let mut parts = payload.split('\n');

		if parts.next()? != PAYLOAD_VERSION {
			return None;
		}

		let embedded_client = parts.next()?;
		let approved_digest = parts.next()?;
		let issued_at = parts.next()?.parse::<i64>().ok()?;

		if parts.next().is_some() || embedded_client != client_id {
			return None;
		}

		let issued_at = OffsetDateTime::from_unix_timestamp(issued_at).ok()?;

		if issued_at + self.config.max_age() < now || issued_at > now + CLOCK_SKEW {
			return None;
		}

		Some(ApprovalClaims {
			client_id: embedded_client.to_owned(),
			approved_digest: approved_digest.to_owned(),
			issued_at,
		})
	}

	fn tag(&self, payload: &[u8]) -> Vec<u8> {
		let mut mac = self.mac.clone();

		mac.update(payload);

		mac.finalize().into_bytes().to_vec()
	}

	fn set_cookie(&self, client_id: &str, value: &str, max_age_secs: u32) -> String {
		let config = &self.config;
		let mut cookie = format!(
			"{}={value}; Path={}; Max-Age={max_age_secs}",
			self.cookie_name(client_id),
			config.path
		);

		if let Some(domain) = &config.domain {
			cookie.push_str("; Domain=");
			cookie.push_str(domain);
		}
		if config.http_only {
			cookie.push_str("; HttpOnly");
		}
		if config.secure {
			cookie.push_str("; Secure");
		}

		cookie.push_str("; SameSite=");
		cookie.push_str(config.same_site.as_str());

		cookie
	}
}
impl Debug for ApprovalSigner {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApprovalSigner")
			.field("config", &self.config)
			.field("mac", &"<redacted>")
			.finish()
	}
}

/// Digest binding an approval to the request's normalized scope and redirect URI.
///
/// A change in either forces the consent screen again.
pub fn approval_digest(request: &AuthorizationRequest) -> String {
	let mut hasher = Sha256::new();

	hasher.update(request.normalized_scope().as_bytes());
	hasher.update(b"\n");
	hasher.update(request.redirect_uri.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn canonical_payload(client_id: &str, approved_digest: &str, issued_at: i64) -> String {
	format!("{PAYLOAD_VERSION}\n{client_id}\n{approved_digest}\n{issued_at}")
}

fn cookie_values<'a>(header: &'a str, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
	header.split(';').filter_map(move |pair| {
		let (key, value) = pair.trim().split_once('=')?;
		let key = key.trim();
		let is_approval = key == prefix
			|| key.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('.'));

		is_approval.then(|| value.trim().trim_matches('"'))
	})
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn signer(secret: &[u8]) -> ApprovalSigner {
		ApprovalSigner::new(ApprovalCookieConfig::default(), secret)
			.expect("Signer fixture should be valid.")
	}

	fn cookie_pair(set_cookie: &str) -> &str {
		set_cookie.split(';').next().expect("Set-Cookie always starts with the pair.")
	}

	#[test]
	fn signed_cookie_verifies_for_same_client() {
		let signer = signer(b"s1");
		let now = macros::datetime!(2025-03-01 12:00 UTC);
		let header = signer.sign_at("abc123", "digest", now);
		let claims = signer
			.verify_claims(Some(cookie_pair(&header)), "abc123", now + Duration::hours(1))
			.expect("Fresh cookie should verify.");

		assert_eq!(claims.approved_digest, "digest");
		assert_eq!(claims.issued_at, now);
		assert!(signer.verify_claims(Some(cookie_pair(&header)), "other", now).is_none());
	}

	#[test]
	fn cookies_never_verify_under_another_secret() {
		let now = OffsetDateTime::now_utc();
		let header = signer(b"s1").sign_at("abc123", "digest", now);

		assert!(signer(b"s2").verify_claims(Some(cookie_pair(&header)), "abc123", now).is_none());
	}

	#[test]
	fn expired_and_future_cookies_are_rejected() {
		let signer = signer(b"s1");
		let issued = macros::datetime!(2025-03-01 12:00 UTC);
		let pair = signer.sign_at("abc123", "d", issued);
		let pair = cookie_pair(&pair);
		let max_age = signer.config().max_age();

		assert!(signer.verify_claims(Some(pair), "abc123", issued + max_age).is_some());
		assert!(
			signer
				.verify_claims(Some(pair), "abc123", issued + max_age + Duration::seconds(1))
				.is_none()
		);
		assert!(signer.verify_claims(Some(pair), "abc123", issued - Duration::minutes(5)).is_none());
	}

	#[test]
	fn tampered_or_garbage_cookies_are_rejected() {
		let signer = signer(b"s1");
		let now = OffsetDateTime::now_utc();
		let header = signer.sign_at("abc123", "d", now);
		let (name, value) =
			cookie_pair(&header).split_once('=').expect("Cookie pair should contain `=`.");
		let (payload, tag) = value.split_once('.').expect("Cookie value should contain a tag.");
		let forged_payload = URL_SAFE_NO_PAD.encode(canonical_payload("evil", "d", now.unix_timestamp()));

		for candidate in [
			format!("{name}={forged_payload}.{tag}"),
			format!("{name}={payload}"),
			format!("{name}=not-base64!.???"),
			format!("{name}="),
			"unrelated=1".to_owned(),
		] {
			assert!(signer.verify_claims(Some(&candidate), "abc123", now).is_none(), "{candidate}");
			assert!(signer.verify_claims(Some(&candidate), "evil", now).is_none(), "{candidate}");
		}

		assert!(!signer.verify(None, "abc123"));
	}

	#[test]
	fn finds_cookie_among_others() {
		let signer = signer(b"s1");
		let header = signer.sign("abc123", "d");
		let request_cookies = format!("theme=dark; {}; other=x", cookie_pair(&header));

		assert!(signer.verify(Some(&request_cookies), "abc123"));
	}

	#[test]
	fn set_cookie_carries_configured_attributes() {
		let config = ApprovalCookieConfig {
			domain: Some("auth.example.com".into()),
			same_site: SameSite::Strict,
			max_age_secs: 600,
			..Default::default()
		};
		let signer = ApprovalSigner::new(config, b"s1").expect("Signer should build.");
		let header = signer.sign("abc123", "d");

		assert!(header.starts_with(&format!("{}=", signer.cookie_name("abc123"))));
		assert!(header.contains("; Path=/"));
		assert!(header.contains("; Max-Age=600"));
		assert!(header.contains("; Domain=auth.example.com"));
		assert!(header.contains("; HttpOnly"));
		assert!(header.contains("; Secure"));
		assert!(header.ends_with("; SameSite=Strict"));
		assert!(signer.clear("abc123").contains("Max-Age=0"));
	}

	#[test]
	fn approvals_for_different_clients_use_distinct_cookies() {
		let signer = signer(b"s1");
		let primary = signer.sign("abc123", "d1");
		let link = signer.sign("link:slack", "d2");
		let primary_name = signer.cookie_name("abc123");

		assert_ne!(primary_name, signer.cookie_name("link:slack"));
		assert!(primary_name.starts_with("consent_approved."));
		assert_eq!(primary_name.len(), "consent_approved.".len() + NAME_SUFFIX_LEN);

		let jar = format!("{}; {}", cookie_pair(&primary), cookie_pair(&link));

		assert!(signer.verify(Some(&jar), "abc123"));
		assert!(signer.verify(Some(&jar), "link:slack"));

		let lookalike = cookie_pair(&primary).replacen("consent_approved.", "consent_approvedx.", 1);

		assert!(!signer.verify(Some(&lookalike), "abc123"));
	}

	#[test]
	fn empty_secret_is_a_configuration_error() {
		assert!(matches!(
			ApprovalSigner::new(ApprovalCookieConfig::default(), b""),
			Err(ConfigError::MissingSecret { .. })
		));
	}

	#[test]
	fn digest_tracks_scope_and_redirect() {
		let base = AuthorizationRequest::new("abc123", "https://client.example.com/cb")
			.with_scope("read write");
		let reordered = base.clone().with_scope("write read");
		let widened = base.clone().with_scope("read write admin");
		let mut moved = base.clone();

		moved.redirect_uri = "https://client.example.com/other".into();

		assert_eq!(approval_digest(&base), approval_digest(&reordered));
		assert_ne!(approval_digest(&base), approval_digest(&widened));
		assert_ne!(approval_digest(&base), approval_digest(&moved));
	}
}
