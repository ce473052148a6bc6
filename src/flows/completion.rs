//! Bridge from a finished provider callback to a downstream session.
//!
//! The broker does not mint client sessions itself. It assembles a [`CompletionPayload`] (owner
//! claims, privilege flag, linked secondary tokens) and hands it to a [`SessionIssuer`]. The
//! default [`StoreHandoffIssuer`] parks the payload under `handoff:{code}` and redirects the
//! client with that one-time code.

// self
use crate::{
	_prelude::*,
	auth::{AuthorizationRequest, OwnerId, ProviderId, TokenRecord, TokenSecret},
	flows::{Gateway, common},
	store::{self, KeyValueStore, keys},
};

/// Boxed future returned by [`SessionIssuer::issue`].
pub type IssueFuture<'a> = Pin<Box<dyn Future<Output = Result<Handoff>> + 'a + Send>>;

/// Lifetime of a parked handoff payload.
pub const HANDOFF_TTL: Duration = Duration::minutes(10);

const HANDOFF_CODE_LEN: usize = 40;

/// Mints the downstream session for a completed authorization.
pub trait SessionIssuer
where
	Self: Send + Sync,
{
	/// Issues a session for `payload` and returns where to send the user agent.
	fn issue<'a>(&'a self, payload: CompletionPayload) -> IssueFuture<'a>;
}

/// Facts about the exchange that produced the bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMetadata {
	/// Provider that authenticated the owner.
	pub provider: ProviderId,
	/// When the broker finished the exchange.
	pub completed_at: OffsetDateTime,
	/// Scopes the provider reported as granted.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub granted_scope: Option<Vec<String>>,
}

/// Tokens available for the owner at completion time.
#[derive(Clone, Debug)]
pub struct TokenBundle {
	/// Record minted by the primary exchange.
	pub primary: TokenRecord,
	/// Fresh records for secondary providers the owner linked earlier.
	pub linked: Vec<TokenRecord>,
}

/// Secondary-provider token exposed to the session issuer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedToken {
	/// Access token for the secondary provider.
	pub access_token: TokenSecret,
	/// Expiry of `access_token`.
	pub expires_at: OffsetDateTime,
}

/// Claims describing the authenticated owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionClaims {
	/// Stable owner identity.
	pub owner: OwnerId,
	/// Login at the primary provider.
	pub login: Option<String>,
	/// Display name.
	pub name: Option<String>,
	/// E-mail address.
	pub email: Option<String>,
	/// Set by the configured access policy.
	pub privileged: bool,
	/// Linked secondary tokens keyed by provider id.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub linked: BTreeMap<String, LinkedToken>,
}

/// Everything a [`SessionIssuer`] needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionPayload {
	/// Requesting client.
	pub client_id: String,
	/// Client redirect to return to.
	pub redirect_uri: String,
	/// Scope the client asked for.
	pub scope: String,
	/// Client state to echo back.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
	/// Owner claims.
	pub claims: CompletionClaims,
	/// Exchange facts.
	pub metadata: CompletionMetadata,
}

/// Where to send the user agent once a session has been issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handoff {
	/// Client redirect carrying the handoff code and the client's state.
	pub redirect: Url,
	/// One-time code identifying the parked payload.
	pub code: String,
}

/// Parks payloads in the key-value store for one-time pickup.
#[derive(Clone)]
pub struct StoreHandoffIssuer {
	store: Arc<dyn KeyValueStore>,
	ttl: Duration,
}
impl StoreHandoffIssuer {
	/// Uses `store` with the default ten-minute TTL.
	pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
		Self { store, ttl: HANDOFF_TTL }
	}

	/// Takes the payload parked under `code`; a second redemption reads `None`.
	pub async fn redeem(&self, code: &str) -> Result<Option<CompletionPayload>> {
		let key = keys::handoff(code);
		let payload = self.store.take(&key).await?;

		Ok(store::parse_json(&key, payload)?)
	}
}
impl Debug for StoreHandoffIssuer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StoreHandoffIssuer").field("ttl", &self.ttl).finish()
	}
}
impl SessionIssuer for StoreHandoffIssuer {
	fn issue<'a>(&'a self, payload: CompletionPayload) -> IssueFuture<'a> {
		Box::pin(async move {
			let mut redirect = Url::parse(&payload.redirect_uri).map_err(|e| {
				Error::InvalidRequest { reason: format!("redirect_uri is invalid: {e}") }
			})?;
			let code = common::random_string(HANDOFF_CODE_LEN);

			store::put_json(self.store.as_ref(), &keys::handoff(&code), &payload, self.ttl).await?;

			{
				let mut pairs = redirect.query_pairs_mut();

				pairs.append_pair("code", &code);

				if let Some(state) = &payload.state {
					pairs.append_pair("state", state);
				}
			}

			Ok(Handoff { redirect, code })
		})
	}
}

impl Gateway {
	/// Assembles claims for `owner` and delegates session minting to the configured issuer.
	///
	/// The privilege flag comes from the access policy; profile fields come from the primary
	/// record's snapshot.
	pub async fn complete_authorization(
		&self,
		owner: &OwnerId,
		request: &AuthorizationRequest,
		metadata: CompletionMetadata,
		bundle: TokenBundle,
	) -> Result<Handoff> {
		let profile = bundle.primary.profile.as_ref();
		let privileged = profile.is_some_and(|p| self.policy.is_privileged(p));
		let linked = bundle
			.linked
			.into_iter()
			.filter(|record| &record.owner == owner)
			.map(|record| {
				(record.provider.as_str().to_owned(), LinkedToken {
					access_token: record.access_token,
					expires_at: record.expires_at,
				})
			})
			.collect();
		let claims = CompletionClaims {
			owner: owner.clone(),
			login: profile.and_then(|p| p.login.clone()),
			name: profile.and_then(|p| p.name.clone()),
			email: profile.and_then(|p| p.email.clone()),
			privileged,
			linked,
		};
		let payload = CompletionPayload {
			client_id: request.client_id.clone(),
			redirect_uri: request.redirect_uri.clone(),
			scope: request.scope.clone(),
			state: request.state.clone(),
			claims,
			metadata,
		};

		tracing::info!(
			owner = %owner,
			client_id = %request.client_id,
			privileged,
			linked = payload.claims.linked.len(),
			"Authorization completed."
		);

		self.issuer.issue(payload).await
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::MemoryStore;

	fn payload(redirect: &str, state: Option<&str>) -> CompletionPayload {
		CompletionPayload {
			client_id: "abc123".into(),
			redirect_uri: redirect.into(),
			scope: "read".into(),
			state: state.map(str::to_owned),
			claims: CompletionClaims {
				owner: OwnerId::new("583231").expect("Owner fixture should be valid."),
				login: Some("octocat".into()),
				name: None,
				email: None,
				privileged: false,
				linked: BTreeMap::new(),
			},
			metadata: CompletionMetadata {
				provider: ProviderId::new("github").expect("Provider fixture should be valid."),
				completed_at: OffsetDateTime::UNIX_EPOCH,
				granted_scope: None,
			},
		}
	}

	#[tokio::test]
	async fn handoff_redirect_carries_code_and_state_and_redeems_once() {
		let issuer = StoreHandoffIssuer::new(Arc::new(MemoryStore::default()));
		let handoff = issuer
			.issue(payload("https://client.example.com/cb?keep=1", Some("xyz")))
			.await
			.expect("Issuing a handoff should succeed.");
		let query = handoff.redirect.query_pairs().into_owned().collect::<BTreeMap<_, _>>();

		assert_eq!(handoff.redirect.path(), "/cb");
		assert_eq!(query["keep"], "1");
		assert_eq!(query["state"], "xyz");
		assert_eq!(query["code"], handoff.code);

		let redeemed = issuer.redeem(&handoff.code).await.expect("Redeem should succeed.");

		assert_eq!(redeemed.map(|p| p.claims.login), Some(Some("octocat".into())));
		assert!(issuer.redeem(&handoff.code).await.expect("Redeem should succeed.").is_none());
	}

	#[tokio::test]
	async fn invalid_client_redirect_is_rejected() {
		let issuer = StoreHandoffIssuer::new(Arc::new(MemoryStore::default()));
		let err = issuer.issue(payload("not a url", None)).await.expect_err("Issue should fail.");

		assert!(matches!(err, Error::InvalidRequest { .. }));
	}
}
