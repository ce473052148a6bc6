//! Per-attempt state machine.
//!
//! `Start → AwaitingApproval → RedirectedToProvider → AwaitingCallback → ExchangingCode →
//! Completed`, where pre-approved requests skip `AwaitingApproval` and any non-terminal stage may
//! move to `Failed`.
//!
//! An attempt spans several HTTP requests, so each handler resumes it at the stage implied by
//! the request it serves and advances from there.

// self
use crate::{_prelude::*, obs::FlowKind};

/// Stages of a single authorization attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	/// Request received, nothing decided yet.
	Start,
	/// Consent page shown.
	AwaitingApproval,
	/// Redirect to the provider issued.
	RedirectedToProvider,
	/// Waiting for the provider to call back.
	AwaitingCallback,
	/// Exchanging the code and fetching identity.
	ExchangingCode,
	/// Terminal success.
	Completed,
	/// Terminal failure; never retried automatically.
	Failed,
}
impl Stage {
	/// Stable label for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Stage::Start => "start",
			Stage::AwaitingApproval => "awaiting_approval",
			Stage::RedirectedToProvider => "redirected_to_provider",
			Stage::AwaitingCallback => "awaiting_callback",
			Stage::ExchangingCode => "exchanging_code",
			Stage::Completed => "completed",
			Stage::Failed => "failed",
		}
	}

	/// Returns `true` for `Completed` and `Failed`.
	pub const fn is_terminal(self) -> bool {
		matches!(self, Stage::Completed | Stage::Failed)
	}

	/// Returns `true` when `self → next` is a legal transition.
	pub fn can_advance_to(self, next: Stage) -> bool {
		use Stage::*;

		matches!(
			(self, next),
			(Start, AwaitingApproval)
				| (Start, RedirectedToProvider)
				| (AwaitingApproval, RedirectedToProvider)
				| (RedirectedToProvider, AwaitingCallback)
				| (AwaitingCallback, ExchangingCode)
				| (ExchangingCode, Completed)
		) || (!self.is_terminal() && next == Failed)
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Rejected stage transition.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Illegal attempt transition from {from} to {to}.")]
pub struct StageError {
	/// Stage the attempt was in.
	pub from: Stage,
	/// Requested stage.
	pub to: Stage,
}

/// Tracks one attempt's stage and traces each transition.
#[derive(Clone, Debug)]
pub struct Attempt {
	kind: FlowKind,
	stage: Stage,
}
impl Attempt {
	/// Starts a new attempt at [`Stage::Start`].
	pub fn start(kind: FlowKind) -> Self {
		Self { kind, stage: Stage::Start }
	}

	/// Resumes an attempt whose earlier stages ran in a previous request.
	pub fn resume(kind: FlowKind, stage: Stage) -> Self {
		Self { kind, stage }
	}

	/// Current stage.
	pub fn stage(&self) -> Stage {
		self.stage
	}

	/// Moves to `next` when legal.
	pub fn advance(&mut self, next: Stage) -> Result<(), StageError> {
		if !self.stage.can_advance_to(next) {
			return Err(StageError { from: self.stage, to: next });
		}

		tracing::debug!(flow = self.kind.as_str(), from = %self.stage, to = %next, "Attempt advanced.");

		self.stage = next;

		Ok(())
	}

	/// Marks the attempt failed and passes `err` through.
	///
	/// Terminal attempts stay where they are.
	pub fn fail(&mut self, err: Error) -> Error {
		if !self.stage.is_terminal() {
			tracing::debug!(flow = self.kind.as_str(), from = %self.stage, error = %err, "Attempt failed.");

			self.stage = Stage::Failed;
		}

		err
	}
}
