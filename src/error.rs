//! Gate-level error types shared across the classifier, coordinator, and transport.

// self
use crate::{_prelude::*, http::RequestFailure};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error type accepted at the renewal and observer boundaries.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Failure cause shared across every request waiting on the same session.
pub type SharedCause = Arc<dyn StdError + Send + Sync>;

/// Canonical gate error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Original transport failure passed through unchanged when a call is not
	/// eligible for renewal-and-retry.
	#[error(transparent)]
	Request(#[from] RequestFailure),
	/// Credential renewal rejected the attempt or missed its deadline.
	#[error("Credential renewal failed.")]
	RefreshFailed {
		/// Underlying cause, shared by every request waiting on the session.
		#[source]
		source: Arc<RenewalError>,
	},
	/// The coordinator itself failed before the session could settle.
	#[error("Interceptor raised an internal error.")]
	Interceptor {
		/// Underlying cause, shared by every request waiting on the session.
		#[source]
		source: SharedCause,
	},
}
impl Error {
	/// Returns the HTTP status attached to the original failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Request(failure) => failure.status(),
			_ => None,
		}
	}

	/// True when renewal rejected the attempt or missed its deadline.
	pub fn is_refresh_failed(&self) -> bool {
		matches!(self, Self::RefreshFailed { .. })
	}

	pub(crate) fn interceptor(source: impl 'static + Send + Sync + StdError) -> Self {
		Self::Interceptor { source: Arc::new(source) }
	}
}

/// Reasons a renewal session settles without a usable credential.
#[derive(Debug, ThisError)]
pub enum RenewalError {
	/// Renewal operation rejected the attempt.
	#[error("Renewal operation rejected the attempt.")]
	Operation(#[source] BoxError),
	/// Renewal operation failed to settle within the configured window.
	#[error("Renewal operation exceeded the {0} ms deadline.")]
	DeadlineExceeded(u64),
}
