//! Observability helpers for broker flows.
//!
//! Every flow stage runs inside a `consent_broker.flow` span carrying `flow` and `stage`
//! fields. With the `metrics` feature, each attempt/success/failure also increments the
//! `consent_broker_flow_total` counter labeled by `flow` + `outcome`.

mod counter;
mod logging;
mod span;

pub use counter::*;
pub use logging::*;
pub use span::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// `GET /authorize`.
	Authorize,
	/// `POST /authorize`.
	Approve,
	/// `GET /callback`.
	Callback,
	/// `GET /{secondary}/authorize` and its approval.
	SecondaryAuthorize,
	/// `GET /{secondary}/callback`.
	SecondaryCallback,
	/// On-demand token refresh.
	Refresh,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Authorize => "authorize",
			FlowKind::Approve => "approve",
			FlowKind::Callback => "callback",
			FlowKind::SecondaryAuthorize => "secondary_authorize",
			FlowKind::SecondaryCallback => "secondary_callback",
			FlowKind::Refresh => "refresh",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow stage.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside a flow span and records attempt plus final outcome.
pub async fn observe<T, Fut>(kind: FlowKind, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = FlowSpan::new(kind, stage);

	record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(e) => {
			span.in_scope(|| tracing::info!(error = %e, "Flow stage failed."));
			record_flow_outcome(kind, FlowOutcome::Failure);
		},
	}

	result
}
