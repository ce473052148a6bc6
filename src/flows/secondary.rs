//! Linking a secondary provider's tokens to an owner established by the primary provider.
//!
//! The owner arrives as `userId` on `GET /{provider}/authorize`. Before redirecting, the broker
//! stores a pending record under a fresh nonce and embeds both nonce and owner in the state.
//! The callback consumes the nonce first; an unknown or expired nonce ends the attempt before
//! any upstream call and nothing is persisted.

// self
use crate::{
	_prelude::*,
	approval,
	auth::{AuthorizationRequest, OwnerId, ProviderId},
	flows::{
		ApprovalRedirect, Attempt, AuthorizeOutcome, CallbackParams, ConsentPrompt, Decision,
		Gateway, ProviderRuntime, Stage,
	},
	obs::{self, FlowKind},
	state::{self, StateEnvelope},
};

/// Successful secondary link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkConfirmation {
	/// Linked provider.
	pub provider: ProviderId,
	/// Provider display name.
	pub provider_name: String,
	/// Owner the tokens were linked to.
	pub owner: OwnerId,
	/// Account label at the secondary provider.
	pub account: String,
}

/// Failed secondary callback, with enough context to offer a retry.
#[derive(Debug, ThisError)]
#[error("Linking provider `{provider}` failed.")]
pub struct LinkFailure {
	/// Underlying failure.
	#[source]
	pub error: Error,
	/// Path segment of the provider.
	pub provider: String,
	/// Owner recovered from the state, when it could be decoded.
	pub retry_owner: Option<OwnerId>,
}
impl LinkFailure {
	/// Link that restarts linking for the same owner.
	pub fn retry_path(&self) -> Option<String> {
		self.retry_owner.as_ref().map(|owner| retry_path(&self.provider, owner))
	}
}

/// `/{provider}/authorize?userId=<owner>`.
pub fn retry_path(provider: &str, owner: &OwnerId) -> String {
	format!(
		"/{}/authorize?userId={}",
		urlencoding::encode(provider),
		urlencoding::encode(owner.as_str())
	)
}

impl Gateway {
	/// Handles `GET /{provider}/authorize?userId=…`.
	pub async fn secondary_authorize(
		&self,
		provider: &str,
		user_id: Option<&str>,
		cookie_header: Option<&str>,
	) -> Result<AuthorizeOutcome> {
		let mut attempt = Attempt::start(FlowKind::SecondaryAuthorize);
		let result = obs::observe(
			FlowKind::SecondaryAuthorize,
			"authorize",
			self.start_link(&mut attempt, provider, user_id, cookie_header),
		)
		.await;

		result.map_err(|e| attempt.fail(e))
	}

	/// Handles `POST /{provider}/authorize`.
	pub async fn secondary_approve(
		&self,
		provider: &str,
		raw_state: &str,
		decision: Decision,
	) -> Result<ApprovalRedirect> {
		let mut attempt = Attempt::resume(FlowKind::SecondaryAuthorize, Stage::AwaitingApproval);
		let result = obs::observe(
			FlowKind::SecondaryAuthorize,
			"approve",
			self.approve_link(&mut attempt, provider, raw_state, decision),
		)
		.await;

		result.map_err(|e| attempt.fail(e))
	}

	/// Handles `GET /{provider}/callback`.
	pub async fn secondary_callback(
		&self,
		provider: &str,
		params: CallbackParams,
	) -> Result<LinkConfirmation, LinkFailure> {
		let retry_owner = params
			.state
			.as_deref()
			.and_then(|raw| state::decode(raw).ok())
			.and_then(|envelope| envelope.extra(StateEnvelope::OWNER).map(OwnerId::new))
			.and_then(Result::ok);
		let mut attempt = Attempt::resume(FlowKind::SecondaryCallback, Stage::AwaitingCallback);
		let result = obs::observe(
			FlowKind::SecondaryCallback,
			"callback",
			self.finish_link(&mut attempt, provider, params),
		)
		.await;

		result.map_err(|e| LinkFailure {
			error: attempt.fail(e),
			provider: provider.to_owned(),
			retry_owner,
		})
	}

	async fn start_link(
		&self,
		attempt: &mut Attempt,
		provider: &str,
		user_id: Option<&str>,
		cookie_header: Option<&str>,
	) -> Result<AuthorizeOutcome> {
		let runtime = self.secondary(provider)?;
		let owner = user_id.map(str::trim).filter(|id| !id.is_empty()).ok_or_else(|| {
			Error::InvalidRequest { reason: "the `userId` parameter is required".into() }
		})?;
		let owner =
			OwnerId::new(owner).map_err(|e| Error::InvalidRequest { reason: e.to_string() })?;
		let request = link_request(runtime);

		if self.is_pre_approved(cookie_header, &request) {
			let nonce = self.pending.create(&owner).await?;
			let envelope = StateEnvelope::new(request)
				.with_extra(StateEnvelope::OWNER, owner.as_str())
				.with_extra(StateEnvelope::NONCE, nonce);

			attempt.advance(Stage::RedirectedToProvider)?;

			tracing::info!(provider = %runtime.id(), owner = %owner, "Link pre-approved.");

			return Ok(AuthorizeOutcome::Redirect {
				location: runtime.authorize_url(&state::encode(&envelope)),
			});
		}

		attempt.advance(Stage::AwaitingApproval)?;

		let registration = &runtime.registration;
		let envelope =
			StateEnvelope::new(request).with_extra(StateEnvelope::OWNER, owner.as_str());

		Ok(AuthorizeOutcome::Consent(ConsentPrompt {
			client_name: format!("{} account linking", registration.display_name),
			provider_name: registration.display_name.clone(),
			scopes: registration.scopes.clone(),
			redirect_uri: registration.redirect_uri.to_string(),
			state: state::encode(&envelope),
			action: format!("/{}/authorize", runtime.id()),
		}))
	}

	async fn approve_link(
		&self,
		attempt: &mut Attempt,
		provider: &str,
		raw_state: &str,
		decision: Decision,
	) -> Result<ApprovalRedirect> {
		let runtime = self.secondary(provider)?;
		let envelope = state::decode(raw_state)?;

		ensure_link_state(runtime, &envelope)?;

		let owner = envelope
			.extra(StateEnvelope::OWNER)
			.and_then(|owner| OwnerId::new(owner).ok())
			.ok_or_else(|| Error::InvalidRequest { reason: "state does not name an owner".into() })?;

		if decision == Decision::Deny {
			tracing::info!(provider = %runtime.id(), owner = %owner, "Link denied.");

			return Err(Error::ApprovalDenied);
		}

		let nonce = self.pending.create(&owner).await?;
		let set_cookie =
			self.signer.sign(&envelope.request.client_id, &approval::approval_digest(&envelope.request));
		let envelope = envelope.with_extra(StateEnvelope::NONCE, nonce);

		attempt.advance(Stage::RedirectedToProvider)?;

		Ok(ApprovalRedirect { location: runtime.authorize_url(&state::encode(&envelope)), set_cookie })
	}

	async fn finish_link(
		&self,
		attempt: &mut Attempt,
		provider: &str,
		params: CallbackParams,
	) -> Result<LinkConfirmation> {
		let runtime = self.secondary(provider)?;

		if let Some(err) = params.provider_error() {
			return Err(err);
		}

		let envelope = state::decode(params.require_state()?)?;

		ensure_link_state(runtime, &envelope)?;

		let nonce = envelope.extra(StateEnvelope::NONCE).ok_or(Error::PendingStateMissing)?;
		let pending = self.pending.consume(nonce).await?.ok_or(Error::PendingStateMissing)?;

		if envelope.extra(StateEnvelope::OWNER) != Some(pending.owner.as_str()) {
			return Err(Error::InvalidRequest {
				reason: "state owner does not match the pending attempt".into(),
			});
		}

		let code = params.require_code()?;

		attempt.advance(Stage::ExchangingCode)?;

		let grant = runtime.exchanger.exchange_code(code, &runtime.registration.redirect_uri).await?;
		let profile = runtime.identity.fetch_profile(&grant.access_token).await?;
		let account = profile.label().to_owned();
		let record = grant.into_record(
			&runtime.registration,
			pending.owner.clone(),
			OffsetDateTime::now_utc(),
			Some(profile),
		)?;

		runtime.cache.save(&record).await?;
		attempt.advance(Stage::Completed)?;

		tracing::info!(
			provider = %runtime.id(),
			owner = %pending.owner,
			fingerprint = %record.access_token.fingerprint(),
			"Secondary tokens linked."
		);

		Ok(LinkConfirmation {
			provider: runtime.id().clone(),
			provider_name: runtime.registration.display_name.clone(),
			owner: pending.owner,
			account,
		})
	}
}

fn link_client_id(runtime: &ProviderRuntime) -> String {
	format!("link:{}", runtime.id())
}

fn link_request(runtime: &ProviderRuntime) -> AuthorizationRequest {
	let registration = &runtime.registration;

	AuthorizationRequest::new(link_client_id(runtime), registration.redirect_uri.as_str())
		.with_scope(registration.scopes.join(" "))
}

fn ensure_link_state(runtime: &ProviderRuntime, envelope: &StateEnvelope) -> Result<()> {
	if envelope.request.client_id != link_client_id(runtime) {
		return Err(Error::InvalidRequest {
			reason: format!("state was not issued for provider `{}`", runtime.id()),
		});
	}

	Ok(())
}
