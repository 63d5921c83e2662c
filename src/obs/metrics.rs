// self
use crate::obs::RenewalPhase;

/// Records a phase transition via the global metrics recorder (when enabled).
pub fn record_renewal_phase(phase: RenewalPhase) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("reauth_gate_renewal_total", "phase" => phase.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = phase;
	}
}
