//! Error → HTTP response mapping.
//!
//! Bodies are plain text built from the error's `Display`, which never includes token values or
//! upstream bodies. Server-side failures are logged in full and answered with a generic message.

// crates.io
use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
};
// self
use crate::{_prelude::*, error::TransportError};

/// Status code for `err`.
pub fn status_of(err: &Error) -> StatusCode {
	match err {
		Error::Decode(_)
		| Error::InvalidRequest { .. }
		| Error::PendingStateMissing
		| Error::ProviderCallback { .. }
		| Error::UnknownClient { .. } => StatusCode::BAD_REQUEST,
		Error::ApprovalDenied => StatusCode::FORBIDDEN,
		Error::UnknownProvider { .. } => StatusCode::NOT_FOUND,
		Error::Transport(TransportError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
		Error::UpstreamExchange { .. }
		| Error::UpstreamProfile { .. }
		| Error::Refresh { .. }
		| Error::Transport(_) => StatusCode::BAD_GATEWAY,
		Error::Storage(_) | Error::Config(_) | Error::Stage(_) => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

/// Caller-facing message for `err`.
pub fn public_message(err: &Error) -> String {
	match err {
		Error::Storage(_) | Error::Config(_) | Error::Stage(_) => "Internal server error.".into(),
		_ => err.to_string(),
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> Response {
		let status = status_of(&self);

		if status.is_server_error() {
			tracing::error!(status = status.as_u16(), error = ?self, "Request failed.");
		} else {
			tracing::info!(status = status.as_u16(), error = %self, "Request rejected.");
		}

		(status, public_message(&self)).into_response()
	}
}
