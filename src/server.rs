//! axum router exposing the broker flows.
//!
//! | Route | Method | Flow |
//! |---|---|---|
//! | `/health` | GET | liveness |
//! | `/authorize` | GET, POST | primary consent |
//! | `/callback` | GET | primary callback |
//! | `/{provider}/authorize` | GET, POST | secondary consent |
//! | `/{provider}/callback` | GET | secondary callback |

pub mod error;
pub mod pages;

// crates.io
use axum::{
	Form, Router,
	extract::{Path, Query, State},
	http::{
		HeaderMap, StatusCode,
		header::{COOKIE, LOCATION, SET_COOKIE},
	},
	response::{IntoResponse, Response},
	routing::get,
};
use tokio::net::TcpListener;
// self
use crate::{
	_prelude::*,
	auth::AuthorizationRequest,
	error::TransportError,
	flows::{ApprovalRedirect, AuthorizeOutcome, CallbackParams, Decision, Gateway},
};

type SharedGateway = Arc<Gateway>;

/// Body of `POST /authorize` and `POST /{provider}/authorize`.
#[derive(Clone, Debug, Deserialize)]
pub struct ApprovalForm {
	/// State echoed from the consent page.
	pub state: String,
	/// The user's decision.
	pub decision: Decision,
}

/// Query of `GET /{provider}/authorize`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct LinkQuery {
	/// Owner to link the secondary account to.
	#[serde(rename = "userId")]
	pub user_id: Option<String>,
}

/// Builds the router over `gateway`.
pub fn router(gateway: SharedGateway) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/authorize", get(authorize).post(approve))
		.route("/callback", get(callback))
		.route("/{provider}/authorize", get(secondary_authorize).post(secondary_approve))
		.route("/{provider}/callback", get(secondary_callback))
		.with_state(gateway)
}

/// Serves the router on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, gateway: SharedGateway) -> Result<()> {
	let addr = listener.local_addr().map_err(TransportError::from)?;

	tracing::info!(%addr, "Broker listening.");

	axum::serve(listener, router(gateway))
		.with_graceful_shutdown(shutdown_signal())
		.await
		.map_err(TransportError::from)?;

	tracing::info!("Broker stopped.");

	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::warn!(error = %e, "Failed to install the Ctrl-C handler.");
	}
}

async fn health() -> &'static str {
	"ok"
}

async fn authorize(
	State(gateway): State<SharedGateway>,
	Query(request): Query<AuthorizationRequest>,
	headers: HeaderMap,
) -> Result<Response> {
	let cookies = cookie_header(&headers);
	let outcome = gateway.authorize(request, cookies.as_deref()).await?;

	Ok(render_outcome(outcome))
}

async fn approve(
	State(gateway): State<SharedGateway>,
	Form(form): Form<ApprovalForm>,
) -> Result<Response> {
	approval_response(gateway.approve(&form.state, form.decision).await)
}

async fn callback(
	State(gateway): State<SharedGateway>,
	Query(params): Query<CallbackParams>,
) -> Result<Response> {
	let handoff = gateway.callback(params).await?;

	Ok(found(handoff.redirect.as_str(), None))
}

async fn secondary_authorize(
	State(gateway): State<SharedGateway>,
	Path(provider): Path<String>,
	Query(query): Query<LinkQuery>,
	headers: HeaderMap,
) -> Result<Response> {
	let cookies = cookie_header(&headers);
	let outcome = gateway
		.secondary_authorize(&provider, query.user_id.as_deref(), cookies.as_deref())
		.await?;

	Ok(render_outcome(outcome))
}

async fn secondary_approve(
	State(gateway): State<SharedGateway>,
	Path(provider): Path<String>,
	Form(form): Form<ApprovalForm>,
) -> Result<Response> {
	approval_response(gateway.secondary_approve(&provider, &form.state, form.decision).await)
}

async fn secondary_callback(
	State(gateway): State<SharedGateway>,
	Path(provider): Path<String>,
	Query(params): Query<CallbackParams>,
) -> Response {
	match gateway.secondary_callback(&provider, params).await {
		Ok(confirmation) => pages::link_confirmation(&confirmation).into_response(),
		Err(failure) => {
			let status = error::status_of(&failure.error);

			if status.is_server_error() {
				tracing::error!(provider = %failure.provider, error = ?failure.error, "Link failed.");
			}

			let retry = failure.retry_path();
			let page = pages::link_error(&error::public_message(&failure.error), retry.as_deref());

			(status, page).into_response()
		},
	}
}

fn approval_response(result: Result<ApprovalRedirect>) -> Result<Response> {
	match result {
		Ok(ApprovalRedirect { location, set_cookie }) =>
			Ok(found(location.as_str(), Some(set_cookie))),
		Err(Error::ApprovalDenied) => Ok((StatusCode::FORBIDDEN, pages::denied()).into_response()),
		Err(e) => Err(e),
	}
}

fn render_outcome(outcome: AuthorizeOutcome) -> Response {
	match outcome {
		AuthorizeOutcome::Consent(prompt) => pages::consent(&prompt).into_response(),
		AuthorizeOutcome::Redirect { location } => found(location.as_str(), None),
	}
}

fn found(location: &str, set_cookie: Option<String>) -> Response {
	let mut response = (StatusCode::FOUND, [(LOCATION, location.to_owned())]).into_response();

	if let Some(cookie) = set_cookie.and_then(|c| c.parse().ok()) {
		response.headers_mut().insert(SET_COOKIE, cookie);
	}

	response
}

// HTTP/2 clients may split cookies across several headers.
fn cookie_header(headers: &HeaderMap) -> Option<String> {
	let joined = headers
		.get_all(COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.collect::<Vec<_>>()
		.join("; ");

	(!joined.is_empty()).then_some(joined)
}
