//! Shared inputs and outcomes for the primary and secondary flows.

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::_prelude::*;

/// Result of an authorize request.
#[derive(Clone, Debug)]
pub enum AuthorizeOutcome {
	/// The user must confirm before the broker contacts the provider.
	Consent(ConsentPrompt),
	/// A valid approval cookie was presented; go straight to the provider.
	Redirect {
		/// Provider authorize URL.
		location: Url,
	},
}

/// Everything the consent page needs to render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsentPrompt {
	/// Display name of the requesting client.
	pub client_name: String,
	/// Display name of the provider the user will be sent to.
	pub provider_name: String,
	/// Scopes the client asked for.
	pub scopes: Vec<String>,
	/// Redirect the client registered for this request.
	pub redirect_uri: String,
	/// Encoded state to post back with the decision.
	pub state: String,
	/// Path the consent form posts to.
	pub action: String,
}

/// Consent decision posted from the consent page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
	/// The user approved.
	Approve,
	/// The user declined.
	Deny,
}

/// Redirect issued after an approved consent.
#[derive(Clone, Debug)]
pub struct ApprovalRedirect {
	/// Provider authorize URL.
	pub location: Url,
	/// `Set-Cookie` value recording the approval.
	pub set_cookie: String,
}

/// Query parameters a provider sends back to a callback.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackParams {
	/// Authorization code.
	pub code: Option<String>,
	/// Opaque state issued at authorize time.
	pub state: Option<String>,
	/// OAuth error code, when the provider refused.
	pub error: Option<String>,
	/// Human-readable error detail.
	pub error_description: Option<String>,
}
impl CallbackParams {
	/// Returns the provider error, if one was reported.
	pub fn provider_error(&self) -> Option<Error> {
		let error = self.error.as_deref().filter(|e| !e.is_empty())?;

		Some(Error::ProviderCallback {
			error: error.to_owned(),
			description: self.error_description.clone(),
		})
	}

	/// Returns the state value or [`DecodeError::Missing`](crate::state::DecodeError::Missing).
	pub fn require_state(&self) -> Result<&str> {
		self.state
			.as_deref()
			.filter(|s| !s.trim().is_empty())
			.ok_or_else(|| crate::state::DecodeError::Missing.into())
	}

	/// Returns the authorization code or an invalid-request error.
	pub fn require_code(&self) -> Result<&str> {
		self.code.as_deref().filter(|c| !c.is_empty()).ok_or_else(|| Error::InvalidRequest {
			reason: "callback is missing the `code` parameter".into(),
		})
	}
}

pub(crate) fn random_string(len: usize) -> String {
	rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}
