//! Registered downstream clients.

// self
use crate::{_prelude::*, auth::ClientId};

/// A downstream client allowed to start authorization flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClient {
	/// Client identifier.
	pub id: ClientId,
	/// Name shown on the consent page.
	pub name: String,
	/// Exact redirect URIs the client may use.
	pub redirect_uris: Vec<Url>,
}
impl RegisteredClient {
	/// Returns `true` when `redirect` exactly matches a registered URI.
	pub fn allows_redirect(&self, redirect: &Url) -> bool {
		self.redirect_uris.iter().any(|allowed| allowed == redirect)
	}
}

/// Client lookup used by the authorization flows.
pub trait ClientRegistry
where
	Self: Send + Sync,
{
	/// Returns the client registered under `id`.
	fn find(&self, id: &ClientId) -> Option<RegisteredClient>;
}

/// In-memory registry built from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticClientRegistry {
	clients: HashMap<ClientId, RegisteredClient>,
}
impl StaticClientRegistry {
	/// Builds a registry from `clients`; later duplicates replace earlier entries.
	pub fn new(clients: impl IntoIterator<Item = RegisteredClient>) -> Self {
		Self { clients: clients.into_iter().map(|c| (c.id.clone(), c)).collect() }
	}

	/// Number of registered clients.
	pub fn len(&self) -> usize {
		self.clients.len()
	}

	/// Returns `true` when no clients are registered.
	pub fn is_empty(&self) -> bool {
		self.clients.is_empty()
	}
}
impl ClientRegistry for StaticClientRegistry {
	fn find(&self, id: &ClientId) -> Option<RegisteredClient> {
		self.clients.get(id).cloned()
	}
}

/// Resolves the client and checks the redirect URI against its registration.
pub fn resolve_client(
	registry: &dyn ClientRegistry,
	id: &ClientId,
	redirect: &Url,
) -> Result<RegisteredClient> {
	let client =
		registry.find(id).ok_or_else(|| Error::UnknownClient { client_id: id.to_string() })?;

	if !client.allows_redirect(redirect) {
		return Err(Error::InvalidRequest {
			reason: format!("redirect_uri is not registered for client `{id}`"),
		});
	}

	Ok(client)
}
