//! Token records persisted per provider and owner, plus their builder.

// self
use crate::{
	_prelude::*,
	auth::{OwnerId, Profile, ProviderId, token::secret::TokenSecret},
};

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the expiry does not fall strictly after issuance.
	#[error("Token expiry must be later than its issuance instant.")]
	NonIncreasingExpiry,
}

/// Access/refresh token pair plus expiry bookkeeping for one owner at one provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Owner the tokens were issued for.
	pub owner: OwnerId,
	/// Provider that issued the tokens.
	pub provider: ProviderId,
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the provider response was received.
	pub issued_at: OffsetDateTime,
	/// Absolute expiry, always strictly after `issued_at`.
	pub expires_at: OffsetDateTime,
	/// Identity snapshot captured at exchange time.
	pub profile: Option<Profile>,
}
impl TokenRecord {
	/// Returns a builder for the given owner and provider.
	pub fn builder(owner: OwnerId, provider: ProviderId) -> TokenRecordBuilder {
		TokenRecordBuilder::new(owner, provider)
	}

	/// Returns `true` if the record has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns `true` if the record expires within `margin` of `instant`.
	pub fn expires_within(&self, margin: Duration, instant: OffsetDateTime) -> bool {
		self.expires_at <= instant + margin
	}

	/// Remaining lifetime at `instant`, clamped to zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		(self.expires_at - instant).max(Duration::ZERO)
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("owner", &self.owner)
			.field("provider", &self.provider)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("profile", &self.profile.as_ref().map(|p| p.owner.as_str()))
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug)]
pub struct TokenRecordBuilder {
	owner: OwnerId,
	provider: ProviderId,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	profile: Option<Profile>,
}
impl TokenRecordBuilder {
	fn new(owner: OwnerId, provider: ProviderId) -> Self {
		Self {
			owner,
			provider,
			access_token: None,
			refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
			profile: None,
		}
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value, if any.
	pub fn refresh_token(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token;

		self
	}

	/// Attaches the identity snapshot.
	pub fn profile(mut self, profile: Option<Profile>) -> Self {
		self.profile = profile;

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(TokenRecordBuilderError::MissingExpiry),
		};

		if expires_at <= issued_at {
			return Err(TokenRecordBuilderError::NonIncreasingExpiry);
		}

		Ok(TokenRecord {
			owner: self.owner,
			provider: self.provider,
			access_token,
			refresh_token: self.refresh_token,
			issued_at,
			expires_at,
			profile: self.profile,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn ids() -> (OwnerId, ProviderId) {
		(
			OwnerId::new("42").expect("Owner fixture should be valid."),
			ProviderId::new("github").expect("Provider fixture should be valid."),
		)
	}

	#[test]
	fn builder_handles_relative_expiry() {
		let (owner, provider) = ids();
		let record = TokenRecord::builder(owner, provider)
			.access_token("secret")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::minutes(30))
			.build()
			.expect("Token record builder should support relative expiry calculations.");

		assert_eq!(record.expires_at, macros::datetime!(2025-01-01 00:30 UTC));
		assert!(record.refresh_token.is_none());
	}

	#[test]
	fn builder_rejects_non_increasing_expiry() {
		let (owner, provider) = ids();
		let issued = macros::datetime!(2025-01-01 00:00 UTC);

		assert_eq!(
			TokenRecord::builder(owner.clone(), provider.clone())
				.access_token("secret")
				.issued_at(issued)
				.expires_at(issued)
				.build()
				.err(),
			Some(TokenRecordBuilderError::NonIncreasingExpiry)
		);
		assert_eq!(
			TokenRecord::builder(owner, provider).issued_at(issued).build().err(),
			Some(TokenRecordBuilderError::MissingAccessToken)
		);
	}

	#[test]
	fn margin_helpers_match_expiry() {
		let (owner, provider) = ids();
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let record = TokenRecord::builder(owner, provider)
			.access_token("a")
			.refresh_token(Some(TokenSecret::new("r")))
			.issued_at(now - Duration::hours(1))
			.expires_at(now + Duration::minutes(4))
			.build()
			.expect("Near-expiry record should build.");

		assert!(record.expires_within(Duration::minutes(5), now));
		assert!(!record.expires_within(Duration::minutes(3), now));
		assert!(!record.is_expired_at(now));
		assert!(record.is_expired_at(now + Duration::minutes(4)));
		assert_eq!(record.remaining_at(now + Duration::hours(1)), Duration::ZERO);
	}

	#[test]
	fn debug_redacts_secrets() {
		let (owner, provider) = ids();
		let record = TokenRecord::builder(owner, provider)
			.access_token("tok1")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Record should build.");
		let rendered = format!("{record:?}");

		assert!(!rendered.contains("tok1"));
		assert!(rendered.contains("<redacted>"));
	}
}
