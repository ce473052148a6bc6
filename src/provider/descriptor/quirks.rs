// self
use crate::_prelude::*;

/// Provider-specific quirks that influence how flows talk to a provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Character used to join scopes when constructing `scope` parameters.
	pub scope_delimiter: char,
	/// Userinfo claim carrying the stable owner identity (`id` for GitHub, `sub` for OIDC).
	pub owner_claim: String,
	/// Lifetime in seconds assumed when the token response omits `expires_in`.
	pub default_expires_in_secs: u32,
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self { scope_delimiter: ' ', owner_claim: "sub".into(), default_expires_in_secs: 3_600 }
	}
}
