//! Flow orchestration behind the HTTP surface.
//!
//! [`Gateway`] owns the provider runtimes, approval signer, pending-state store, client
//! registry, access policy, and session issuer. Handlers in [`crate::server`] translate HTTP
//! requests into the calls below and render whatever comes back.

pub mod common;
pub mod completion;
pub mod stage;

mod primary;
mod secondary;

pub use common::*;
pub use completion::*;
pub use secondary::*;
pub use stage::*;

// self
use crate::{
	_prelude::*,
	approval::{self, ApprovalSigner},
	auth::{AuthorizationRequest, ProviderId},
	cache::TokenCache,
	clients::{ClientRegistry, StaticClientRegistry},
	error::ConfigError,
	http::ReqwestHttpClient,
	identity::{IdentityFetch, UserinfoClient},
	oauth::{ReqwestTransportErrorMapper, TokenExchange, TokenExchanger},
	pending::PendingStates,
	policy::{AccessPolicy, AllowListPolicy},
	provider::{ProviderRegistration, ProviderRole},
	redirect::{self, AuthorizeUrlParams},
	store::KeyValueStore,
};

/// One configured provider plus the collaborators that talk to it.
pub struct ProviderRuntime {
	/// Descriptor and broker credentials.
	pub registration: ProviderRegistration,
	/// Token endpoint client.
	pub exchanger: Arc<dyn TokenExchange>,
	/// Userinfo client.
	pub identity: Arc<dyn IdentityFetch>,
	/// Token records for this provider.
	pub cache: Arc<TokenCache>,
}
impl ProviderRuntime {
	/// Assembles a runtime from explicit collaborators.
	pub fn new(
		registration: ProviderRegistration,
		exchanger: Arc<dyn TokenExchange>,
		identity: Arc<dyn IdentityFetch>,
		store: Arc<dyn KeyValueStore>,
	) -> Self {
		let cache = Arc::new(TokenCache::new(registration.id().clone(), store, exchanger.clone()));

		Self { registration, exchanger, identity, cache }
	}

	/// Assembles a runtime that talks to the provider through `http`.
	pub fn with_reqwest(
		registration: ProviderRegistration,
		http: ReqwestHttpClient,
		store: Arc<dyn KeyValueStore>,
	) -> Result<Self> {
		let exchanger: TokenExchanger =
			TokenExchanger::from_registration(&registration, http.clone(), ReqwestTransportErrorMapper)?;
		let identity = UserinfoClient::new(http, &registration.descriptor);

		Ok(Self::new(registration, Arc::new(exchanger), Arc::new(identity), store))
	}

	/// Provider identifier.
	pub fn id(&self) -> &ProviderId {
		self.registration.id()
	}

	/// Provider authorize URL carrying `state`.
	pub fn authorize_url(&self, state: &str) -> Url {
		let registration = &self.registration;

		redirect::build_authorize_url(&AuthorizeUrlParams {
			endpoint: &registration.descriptor.endpoints.authorization,
			client_id: &registration.client_id,
			redirect_uri: &registration.redirect_uri,
			scope: &registration.scopes,
			scope_delimiter: registration.descriptor.quirks.scope_delimiter,
			state,
			extra: &[],
		})
	}
}
impl Debug for ProviderRuntime {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderRuntime").field("registration", &self.registration).finish()
	}
}

/// Coordinates the consent, callback, and linking flows.
pub struct Gateway {
	primary: ProviderRuntime,
	secondaries: BTreeMap<ProviderId, ProviderRuntime>,
	clients: Arc<dyn ClientRegistry>,
	signer: ApprovalSigner,
	pending: PendingStates,
	policy: Arc<dyn AccessPolicy>,
	issuer: Arc<dyn SessionIssuer>,
}
impl Gateway {
	/// Starts a builder around the primary provider.
	pub fn builder(
		primary: ProviderRuntime,
		signer: ApprovalSigner,
		store: Arc<dyn KeyValueStore>,
	) -> GatewayBuilder {
		GatewayBuilder::new(primary, signer, store)
	}

	/// Primary provider runtime.
	pub fn primary(&self) -> &ProviderRuntime {
		&self.primary
	}

	/// Secondary provider runtime for a path segment.
	pub fn secondary(&self, segment: &str) -> Result<&ProviderRuntime> {
		ProviderId::new(segment)
			.ok()
			.and_then(|id| self.secondaries.get(&id))
			.ok_or_else(|| Error::UnknownProvider { provider: segment.to_owned() })
	}

	/// All secondary provider runtimes, ordered by id.
	pub fn secondaries(&self) -> impl Iterator<Item = &ProviderRuntime> {
		self.secondaries.values()
	}

	/// Approval cookie signer.
	pub fn signer(&self) -> &ApprovalSigner {
		&self.signer
	}

	pub(crate) fn is_pre_approved(
		&self,
		cookie_header: Option<&str>,
		request: &AuthorizationRequest,
	) -> bool {
		let digest = approval::approval_digest(request);

		self.signer
			.verify_claims(cookie_header, &request.client_id, OffsetDateTime::now_utc())
			.is_some_and(|claims| claims.approved_digest == digest)
	}
}
impl Debug for Gateway {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("primary", &self.primary.id())
			.field("secondaries", &self.secondaries.keys().collect::<Vec<_>>())
			.field("pending", &self.pending)
			.finish()
	}
}

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
	primary: ProviderRuntime,
	signer: ApprovalSigner,
	store: Arc<dyn KeyValueStore>,
	secondaries: Vec<ProviderRuntime>,
	clients: Option<Arc<dyn ClientRegistry>>,
	policy: Option<Arc<dyn AccessPolicy>>,
	issuer: Option<Arc<dyn SessionIssuer>>,
}
impl GatewayBuilder {
	fn new(primary: ProviderRuntime, signer: ApprovalSigner, store: Arc<dyn KeyValueStore>) -> Self {
		Self {
			primary,
			signer,
			store,
			secondaries: Vec::new(),
			clients: None,
			policy: None,
			issuer: None,
		}
	}

	/// Adds a secondary provider.
	pub fn secondary(mut self, runtime: ProviderRuntime) -> Self {
		self.secondaries.push(runtime);

		self
	}

	/// Sets the client registry; defaults to an empty registry.
	pub fn clients(mut self, clients: Arc<dyn ClientRegistry>) -> Self {
		self.clients = Some(clients);

		self
	}

	/// Sets the access policy; defaults to nobody privileged.
	pub fn policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
		self.policy = Some(policy);

		self
	}

	/// Sets the session issuer; defaults to [`StoreHandoffIssuer`] over the gateway store.
	pub fn issuer(mut self, issuer: Arc<dyn SessionIssuer>) -> Self {
		self.issuer = Some(issuer);

		self
	}

	/// Validates provider roles and ids, then builds the gateway.
	pub fn build(self) -> Result<Gateway, ConfigError> {
		if self.primary.registration.role != ProviderRole::Primary {
			return Err(ConfigError::invalid(
				"primary",
				format!("provider `{}` is not configured as primary", self.primary.id()),
			));
		}

		let mut secondaries = BTreeMap::new();

		for runtime in self.secondaries {
			let id = runtime.id().clone();

			if runtime.registration.role != ProviderRole::Secondary {
				return Err(ConfigError::invalid(
					"secondary",
					format!("provider `{id}` is not configured as secondary"),
				));
			}
			if &id == self.primary.id() || secondaries.contains_key(&id) {
				return Err(ConfigError::invalid("secondary", format!("duplicate provider `{id}`")));
			}

			secondaries.insert(id, runtime);
		}

		let issuer = self
			.issuer
			.unwrap_or_else(|| Arc::new(StoreHandoffIssuer::new(self.store.clone())));

		Ok(Gateway {
			primary: self.primary,
			secondaries,
			clients: self.clients.unwrap_or_else(|| Arc::new(StaticClientRegistry::default())),
			signer: self.signer,
			pending: PendingStates::new(self.store),
			policy: self.policy.unwrap_or_else(|| Arc::new(AllowListPolicy::default())),
			issuer,
		})
	}
}
