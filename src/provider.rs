//! Upstream provider metadata and the broker's registration with each provider.
//!
//! `descriptor` holds validated, credential-free metadata (endpoints, client authentication
//! preference, quirks). [`ProviderRegistration`] pairs a descriptor with the broker's own client
//! credentials, callback URL, and requested scopes.

pub mod descriptor;

pub use descriptor::*;

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Whether a provider authenticates the user or is linked to an existing owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
	/// Establishes the owner identity for downstream clients.
	Primary,
	/// Links additional tokens to an owner established by the primary provider.
	Secondary,
}

/// A provider descriptor bound to the broker's credentials at that provider.
#[derive(Clone)]
pub struct ProviderRegistration {
	/// Validated provider metadata.
	pub descriptor: ProviderDescriptor,
	/// Role this provider plays in the broker.
	pub role: ProviderRole,
	/// Human-facing name shown on consent and confirmation pages.
	pub display_name: String,
	/// Broker's client identifier at the provider.
	pub client_id: String,
	/// Broker's client secret at the provider.
	pub client_secret: TokenSecret,
	/// Broker callback registered with the provider.
	pub redirect_uri: Url,
	/// Scopes requested on every authorization.
	pub scopes: Vec<String>,
}
impl ProviderRegistration {
	/// Provider identifier shortcut.
	pub fn id(&self) -> &crate::auth::ProviderId {
		&self.descriptor.id
	}
}
impl Debug for ProviderRegistration {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderRegistration")
			.field("descriptor", &self.descriptor)
			.field("role", &self.role)
			.field("display_name", &self.display_name)
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("redirect_uri", &self.redirect_uri)
			.field("scopes", &self.scopes)
			.finish()
	}
}
