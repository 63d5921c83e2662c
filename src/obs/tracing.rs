// self
use crate::{_prelude::*, obs::RenewalPhase};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedRenewal<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedRenewal<F> = F;

/// A span builder used by the renewal coordinator.
#[derive(Clone, Debug)]
pub struct RenewalSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl RenewalSpan {
	/// Creates a new span tagged with the provided stage.
	pub fn new(stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("reauth_gate.renewal", stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = stage;

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedRenewal<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits one diagnostic event for a phase transition (when tracing is enabled).
pub(crate) fn emit_phase_event(phase: RenewalPhase, cause: Option<&(dyn StdError + 'static)>) {
	#[cfg(feature = "tracing")]
	{
		match phase {
			RenewalPhase::Refreshing | RenewalPhase::Success =>
				tracing::debug!(phase = phase.as_str(), "credential renewal phase changed"),
			RenewalPhase::Failed | RenewalPhase::Error => tracing::warn!(
				phase = phase.as_str(),
				cause = cause.map(tracing::field::display),
				"credential renewal phase changed"
			),
		}
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (phase, cause);
	}
}
