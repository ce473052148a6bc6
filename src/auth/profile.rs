//! Identity snapshots returned by a provider's userinfo endpoint.

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, auth::OwnerId};

/// Errors raised while interpreting a userinfo document.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ProfileError {
	/// The document is not a JSON object.
	#[error("Userinfo response is not a JSON object.")]
	NotAnObject,
	/// The configured owner claim is absent or null.
	#[error("Userinfo response is missing the `{claim}` claim.")]
	MissingClaim {
		/// Claim that was expected to carry the owner identity.
		claim: String,
	},
	/// The owner claim is present but not a usable identifier.
	#[error("Userinfo claim `{claim}` is not a valid owner identifier.")]
	InvalidOwner {
		/// Claim that carried the value.
		claim: String,
	},
}

/// Snapshot of the authenticated user, stored alongside token records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
	/// Stable owner identity extracted from the configured claim.
	pub owner: OwnerId,
	/// Login/username, when the provider exposes one.
	pub login: Option<String>,
	/// Display name.
	pub name: Option<String>,
	/// Primary e-mail address.
	pub email: Option<String>,
	/// Full userinfo document.
	pub raw: Value,
}
impl Profile {
	/// Builds a profile from a userinfo document, reading the owner from `owner_claim`.
	///
	/// String and integer claims are accepted; GitHub, for instance, reports a numeric `id`.
	pub fn from_userinfo(raw: Value, owner_claim: &str) -> Result<Self, ProfileError> {
		let object = raw.as_object().ok_or(ProfileError::NotAnObject)?;
		let owner_raw = match object.get(owner_claim) {
			Some(Value::String(value)) => value.clone(),
			Some(Value::Number(value)) => value.to_string(),
			Some(Value::Null) | None =>
				return Err(ProfileError::MissingClaim { claim: owner_claim.into() }),
			Some(_) => return Err(ProfileError::InvalidOwner { claim: owner_claim.into() }),
		};
		let owner = OwnerId::new(owner_raw)
			.map_err(|_| ProfileError::InvalidOwner { claim: owner_claim.into() })?;
		let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_owned);
		let login = text("login").or_else(|| text("preferred_username"));
		let name = text("name");
		let email = text("email");

		Ok(Self { owner, login, name, email, raw })
	}

	/// Human-facing label: name, then login, then owner id.
	pub fn label(&self) -> &str {
		self.name.as_deref().or(self.login.as_deref()).unwrap_or(self.owner.as_str())
	}
}
