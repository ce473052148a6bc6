//! Boot configuration.
//!
//! Sources are layered with the `config` crate: built-in defaults, then an optional file
//! (YAML/TOML/JSON by extension), then environment variables prefixed with `CONSENT_BROKER__` and
//! split on `__` (for example `CONSENT_BROKER__PRIMARY__CLIENT_SECRET`).

// std
use std::path::{Path, PathBuf};
// crates.io
use ::config::{Config, Environment, File};
// self
use crate::{
	_prelude::*,
	approval::{ApprovalCookieConfig, ApprovalSigner},
	auth::{ClientId, ProviderId, TokenSecret},
	clients::{RegisteredClient, StaticClientRegistry},
	error::ConfigError,
	flows::{Gateway, ProviderRuntime},
	http::{DEFAULT_TIMEOUT, ReqwestHttpClient},
	policy::AllowListPolicy,
	provider::{
		ClientAuthMethod, ProviderDescriptor, ProviderQuirks, ProviderRegistration, ProviderRole,
	},
	store::{FileStore, KeyValueStore, MemoryStore},
};

const ENV_PREFIX: &str = "CONSENT_BROKER";
const ENV_SEPARATOR: &str = "__";

/// Top-level broker configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
	/// Listener settings.
	pub server: ServerSettings,
	/// HMAC secret for approval cookies; required.
	pub cookie_secret: String,
	/// Approval cookie attributes.
	pub approval_cookie: ApprovalCookieConfig,
	/// Provider that authenticates owners; required.
	pub primary: Option<ProviderSettings>,
	/// Providers linked to existing owners.
	pub secondary: Vec<ProviderSettings>,
	/// Downstream clients allowed to start flows.
	pub clients: Vec<ClientSettings>,
	/// Privileged-user policy.
	pub policy: PolicySettings,
	/// Persistence backend.
	pub store: StoreSettings,
	/// Log filter.
	pub logging: LoggingSettings,
	/// Outbound HTTP settings.
	pub http: HttpSettings,
}
impl BrokerConfig {
	/// Loads defaults, then `path` when given, then the environment.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

		if let Some(path) = path {
			builder = builder.add_source(File::from(path).required(true));
		}

		builder = builder.add_source(
			Environment::with_prefix(ENV_PREFIX)
				.prefix_separator(ENV_SEPARATOR)
				.separator(ENV_SEPARATOR)
				.try_parsing(true)
				.list_separator(",")
				.with_list_parse_key("policy.privileged_logins"),
		);

		Ok(builder.build()?.try_deserialize()?)
	}

	/// Rejects configurations the broker cannot start with.
	///
	/// Runs before the listener is bound; every error here is fatal.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.cookie_secret.trim().is_empty() {
			return Err(ConfigError::MissingSecret { name: "cookie_secret".into() });
		}

		let primary = self
			.primary
			.as_ref()
			.ok_or_else(|| ConfigError::invalid("primary", "a primary provider is required"))?;

		for provider in std::iter::once(primary).chain(&self.secondary) {
			if provider.client_secret.is_empty() {
				return Err(ConfigError::MissingSecret {
					name: format!("{}.client_secret", provider.id),
				});
			}
		}

		if self.http.timeout_secs == 0 {
			return Err(ConfigError::invalid("http.timeout_secs", "must be positive"));
		}
		if self.store.backend == StoreBackend::File && self.store.path.is_none() {
			return Err(ConfigError::invalid("store.path", "required for the file backend"));
		}

		Ok(())
	}

	/// Builds the gateway with reqwest transports and the configured store.
	pub fn build_gateway(&self) -> Result<Gateway> {
		self.validate()?;

		let primary = self
			.primary
			.as_ref()
			.ok_or_else(|| ConfigError::invalid("primary", "a primary provider is required"))?;
		let http = ReqwestHttpClient::with_timeout(self.http.timeout())?;
		let store = self.store.open()?;
		let signer = ApprovalSigner::new(self.approval_cookie.clone(), self.cookie_secret.as_bytes())?;
		let clients =
			self.clients.iter().map(ClientSettings::registered).collect::<Result<Vec<_>, _>>()?;
		let mut builder = Gateway::builder(
			ProviderRuntime::with_reqwest(
				primary.registration(ProviderRole::Primary)?,
				http.clone(),
				store.clone(),
			)?,
			signer,
			store.clone(),
		)
		.clients(Arc::new(StaticClientRegistry::new(clients)))
		.policy(Arc::new(AllowListPolicy::new(&self.policy.privileged_logins)));

		for settings in &self.secondary {
			builder = builder.secondary(ProviderRuntime::with_reqwest(
				settings.registration(ProviderRole::Secondary)?,
				http.clone(),
				store.clone(),
			)?);
		}

		Ok(builder.build()?)
	}
}

/// Listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
	/// Socket address to bind.
	pub listen: String,
}
impl Default for ServerSettings {
	fn default() -> Self {
		Self { listen: "127.0.0.1:8080".into() }
	}
}

/// One upstream provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
	/// Provider id; secondary ids double as route segments.
	pub id: String,
	/// Name shown to users; defaults to the id.
	#[serde(default)]
	pub display_name: Option<String>,
	/// Authorization endpoint.
	pub authorization_endpoint: Url,
	/// Token endpoint.
	pub token_endpoint: Url,
	/// Userinfo endpoint.
	pub userinfo_endpoint: Url,
	/// Broker's client id at the provider.
	pub client_id: String,
	/// Broker's client secret at the provider.
	#[serde(default)]
	pub client_secret: String,
	/// Broker callback registered at the provider.
	pub redirect_uri: Url,
	/// Scopes requested on every authorization.
	#[serde(default)]
	pub scopes: Vec<String>,
	/// Token endpoint client authentication.
	#[serde(default)]
	pub client_auth_method: ClientAuthMethod,
	/// Provider quirks.
	#[serde(default)]
	pub quirks: ProviderQuirks,
}
impl ProviderSettings {
	/// Validates the settings into a registration with `role`.
	pub fn registration(&self, role: ProviderRole) -> Result<ProviderRegistration, ConfigError> {
		let id = ProviderId::new(&self.id)
			.map_err(|e| ConfigError::invalid(format!("{}.id", self.id), e.to_string()))?;
		let descriptor = ProviderDescriptor::builder(id)
			.authorization_endpoint(self.authorization_endpoint.clone())
			.token_endpoint(self.token_endpoint.clone())
			.userinfo_endpoint(self.userinfo_endpoint.clone())
			.client_auth_method(self.client_auth_method)
			.quirks(self.quirks.clone())
			.build()?;

		Ok(ProviderRegistration {
			descriptor,
			role,
			display_name: self.display_name.clone().unwrap_or_else(|| self.id.clone()),
			client_id: self.client_id.clone(),
			client_secret: TokenSecret::new(self.client_secret.clone()),
			redirect_uri: self.redirect_uri.clone(),
			scopes: self.scopes.clone(),
		})
	}
}
impl Debug for ProviderSettings {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderSettings")
			.field("id", &self.id)
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("redirect_uri", &self.redirect_uri.as_str())
			.finish()
	}
}

/// One downstream client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientSettings {
	/// Client id.
	pub id: String,
	/// Name shown on the consent page; defaults to the id.
	#[serde(default)]
	pub name: Option<String>,
	/// Exact redirect URIs.
	#[serde(default)]
	pub redirect_uris: Vec<Url>,
}
impl ClientSettings {
	fn registered(&self) -> Result<RegisteredClient, ConfigError> {
		let id = ClientId::new(&self.id)
			.map_err(|e| ConfigError::invalid(format!("clients.{}", self.id), e.to_string()))?;

		Ok(RegisteredClient {
			id,
			name: self.name.clone().unwrap_or_else(|| self.id.clone()),
			redirect_uris: self.redirect_uris.clone(),
		})
	}
}

/// Privileged-user policy settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
	/// Logins (or owner ids) granted the `privileged` claim.
	pub privileged_logins: Vec<String>,
}

/// Persistence backend kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
	/// Process-local map; lost on restart.
	#[default]
	Memory,
	/// JSON snapshot on disk.
	File,
}

/// Persistence settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
	/// Backend kind.
	pub backend: StoreBackend,
	/// Snapshot path for the file backend.
	pub path: Option<PathBuf>,
}
impl StoreSettings {
	/// Opens the configured backend.
	pub fn open(&self) -> Result<Arc<dyn KeyValueStore>> {
		let store: Arc<dyn KeyValueStore> = match (self.backend, &self.path) {
			(StoreBackend::Memory, _) => Arc::new(MemoryStore::default()),
			(StoreBackend::File, Some(path)) => Arc::new(FileStore::open(path)?),
			(StoreBackend::File, None) =>
				return Err(ConfigError::invalid("store.path", "required for the file backend").into()),
		};

		Ok(store)
	}
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
	/// Default `EnvFilter` directive; `RUST_LOG` wins when set.
	pub level: String,
}
impl Default for LoggingSettings {
	fn default() -> Self {
		Self { level: "info".into() }
	}
}

/// Outbound HTTP settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
	/// Per-request timeout for provider calls, in seconds.
	pub timeout_secs: u64,
}
impl HttpSettings {
	/// Timeout as a std duration.
	pub fn timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.timeout_secs)
	}
}
impl Default for HttpSettings {
	fn default() -> Self {
		Self { timeout_secs: DEFAULT_TIMEOUT.as_secs() }
	}
}
