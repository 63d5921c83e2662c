// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for renewal sessions.
#[derive(Debug, Default)]
pub struct RenewalMetrics {
	sessions: AtomicU64,
	settled: AtomicU64,
	failed: AtomicU64,
}
impl RenewalMetrics {
	/// Returns the total number of renewal sessions started.
	pub fn sessions(&self) -> u64 {
		self.sessions.load(Ordering::Relaxed)
	}

	/// Returns the number of sessions that settled with a usable outcome.
	pub fn settled(&self) -> u64 {
		self.settled.load(Ordering::Relaxed)
	}

	/// Returns the number of sessions that failed, timed out, or aborted.
	pub fn failed(&self) -> u64 {
		self.failed.load(Ordering::Relaxed)
	}

	pub(crate) fn record_session(&self) {
		self.sessions.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_settled(&self) {
		self.settled.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failed(&self) {
		self.failed.fetch_add(1, Ordering::Relaxed);
	}
}
