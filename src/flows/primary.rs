//! Consent and callback handling for downstream clients of the primary provider.

// self
use crate::{
	_prelude::*,
	approval,
	auth::{AuthorizationRequest, OwnerId, TokenRecord},
	clients::{self, RegisteredClient},
	flows::{
		ApprovalRedirect, Attempt, AuthorizeOutcome, CallbackParams, CompletionMetadata,
		ConsentPrompt, Decision, Gateway, Handoff, Stage, TokenBundle,
	},
	obs::{self, FlowKind},
	state::{self, StateEnvelope},
};

const CONSENT_ACTION: &str = "/authorize";

impl Gateway {
	/// Handles `GET /authorize`.
	///
	/// Returns the consent prompt unless `cookie_header` carries an approval for the same client,
	/// scope, and redirect, in which case the user agent goes straight to the provider.
	pub async fn authorize(
		&self,
		request: AuthorizationRequest,
		cookie_header: Option<&str>,
	) -> Result<AuthorizeOutcome> {
		let mut attempt = Attempt::start(FlowKind::Authorize);
		let result = obs::observe(
			FlowKind::Authorize,
			"authorize",
			self.start_primary(&mut attempt, request, cookie_header),
		)
		.await;

		result.map_err(|e| attempt.fail(e))
	}

	/// Handles `POST /authorize` with the decision from the consent page.
	pub async fn approve(&self, raw_state: &str, decision: Decision) -> Result<ApprovalRedirect> {
		let mut attempt = Attempt::resume(FlowKind::Approve, Stage::AwaitingApproval);
		let result = obs::observe(
			FlowKind::Approve,
			"approve",
			self.approve_primary(&mut attempt, raw_state, decision),
		)
		.await;

		result.map_err(|e| attempt.fail(e))
	}

	/// Handles `GET /callback`.
	///
	/// State is validated before anything is sent upstream; a missing or undecodable state never
	/// reaches the token endpoint.
	pub async fn callback(&self, params: CallbackParams) -> Result<Handoff> {
		let mut attempt = Attempt::resume(FlowKind::Callback, Stage::AwaitingCallback);
		let result =
			obs::observe(FlowKind::Callback, "callback", self.finish_primary(&mut attempt, params))
				.await;

		result.map_err(|e| attempt.fail(e))
	}

	async fn start_primary(
		&self,
		attempt: &mut Attempt,
		request: AuthorizationRequest,
		cookie_header: Option<&str>,
	) -> Result<AuthorizeOutcome> {
		let client = self.resolve(&request)?;
		let state = state::encode(&StateEnvelope::new(request.clone()));

		if self.is_pre_approved(cookie_header, &request) {
			attempt.advance(Stage::RedirectedToProvider)?;

			tracing::info!(client_id = %client.id, "Approval cookie accepted; skipping consent.");

			return Ok(AuthorizeOutcome::Redirect { location: self.primary.authorize_url(&state) });
		}

		attempt.advance(Stage::AwaitingApproval)?;

		Ok(AuthorizeOutcome::Consent(ConsentPrompt {
			client_name: client.name,
			provider_name: self.primary.registration.display_name.clone(),
			scopes: request.scopes().map(str::to_owned).collect(),
			redirect_uri: request.redirect_uri,
			state,
			action: CONSENT_ACTION.into(),
		}))
	}

	async fn approve_primary(
		&self,
		attempt: &mut Attempt,
		raw_state: &str,
		decision: Decision,
	) -> Result<ApprovalRedirect> {
		let envelope = state::decode(raw_state)?;
		let client = self.resolve(&envelope.request)?;

		if decision == Decision::Deny {
			tracing::info!(client_id = %client.id, "Consent denied.");

			return Err(Error::ApprovalDenied);
		}

		attempt.advance(Stage::RedirectedToProvider)?;

		let set_cookie = self
			.signer
			.sign(client.id.as_str(), &approval::approval_digest(&envelope.request));
		let location = self.primary.authorize_url(&state::encode(&envelope));

		Ok(ApprovalRedirect { location, set_cookie })
	}

	async fn finish_primary(&self, attempt: &mut Attempt, params: CallbackParams) -> Result<Handoff> {
		if let Some(err) = params.provider_error() {
			return Err(err);
		}

		let envelope = state::decode(params.require_state()?)?;

		self.resolve(&envelope.request)?;

		let code = params.require_code()?;

		attempt.advance(Stage::ExchangingCode)?;

		let runtime = &self.primary;
		let grant = runtime.exchanger.exchange_code(code, &runtime.registration.redirect_uri).await?;
		let profile = runtime.identity.fetch_profile(&grant.access_token).await?;
		let owner = profile.owner.clone();
		let completed_at = OffsetDateTime::now_utc();
		let granted_scope = grant.scope.clone();
		let record =
			grant.into_record(&runtime.registration, owner.clone(), completed_at, Some(profile))?;

		runtime.cache.save(&record).await?;

		tracing::info!(
			provider = %runtime.id(),
			owner = %owner,
			fingerprint = %record.access_token.fingerprint(),
			expires_at = %record.expires_at,
			"Primary tokens stored."
		);

		let linked = self.linked_records(&owner).await;
		let metadata =
			CompletionMetadata { provider: runtime.id().clone(), completed_at, granted_scope };
		let handoff = self
			.complete_authorization(&owner, &envelope.request, metadata, TokenBundle {
				primary: record,
				linked,
			})
			.await?;

		attempt.advance(Stage::Completed)?;

		Ok(handoff)
	}

	fn resolve(&self, request: &AuthorizationRequest) -> Result<RegisteredClient> {
		let (client_id, redirect) = request.validate()?;

		clients::resolve_client(self.clients.as_ref(), &client_id, &redirect)
	}

	// Linked tokens are best effort; a broken secondary must not block sign-in.
	async fn linked_records(&self, owner: &OwnerId) -> Vec<TokenRecord> {
		let mut linked = Vec::new();

		for runtime in self.secondaries() {
			match runtime.cache.get_fresh(owner).await {
				Ok(Some(record)) => linked.push(record),
				Ok(None) => (),
				Err(e) => tracing::warn!(
					provider = %runtime.id(),
					owner = %owner,
					error = %e,
					"Skipping linked provider."
				),
			}
		}

		linked
	}
}
