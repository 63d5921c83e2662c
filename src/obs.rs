//! Optional observability helpers and the renewal status contract.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `reauth_gate.renewal` with
//!   a `stage` (call site) field, plus one event per phase transition.
//! - Enable `metrics` to increment the `reauth_gate_renewal_total` counter for
//!   every phase transition, labeled by `phase`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Phases a renewal session moves through, in notification order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenewalPhase {
	/// A renewal operation has been started.
	Refreshing,
	/// The renewal operation produced a usable outcome.
	Success,
	/// The renewal operation rejected the attempt or missed its deadline.
	Failed,
	/// The coordinator itself failed before the session could settle.
	Error,
}
impl RenewalPhase {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RenewalPhase::Refreshing => "refreshing",
			RenewalPhase::Success => "success",
			RenewalPhase::Failed => "failed",
			RenewalPhase::Error => "error",
		}
	}
}
impl Display for RenewalPhase {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Observer notified on every phase transition of a renewal session.
///
/// The initiator calls this exactly once with [`RenewalPhase::Refreshing`] and
/// then exactly once with one of the terminal phases. An `Err` return is
/// treated as an internal coordinator failure: the session is torn down and
/// every waiting request is rejected, so a misbehaving observer can never leave
/// requests permanently unsettled.
pub trait RenewalObserver
where
	Self: 'static + Send + Sync,
{
	/// Receives one phase transition, with the underlying cause when there is one.
	fn observe(
		&self,
		phase: RenewalPhase,
		cause: Option<&(dyn StdError + 'static)>,
	) -> Result<(), BoxError>;
}

/// Default observer forwarding phase transitions to the diagnostic pipeline.
///
/// Emits one `tracing` event per transition when the `tracing` feature is
/// enabled and is silent otherwise.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiagnosticObserver;
impl RenewalObserver for DiagnosticObserver {
	fn observe(
		&self,
		phase: RenewalPhase,
		cause: Option<&(dyn StdError + 'static)>,
	) -> Result<(), BoxError> {
		emit_phase_event(phase, cause);

		Ok(())
	}
}
