//! Failure classification deciding renewal-and-retry eligibility.

// crates.io
use http::StatusCode;
// self
use crate::{
	_prelude::*,
	http::{RequestDescription, RequestFailure},
};

/// Predicate deciding whether a failed call should trigger credential renewal.
///
/// Classifiers must be pure: no side effects and no coordinator state access.
/// The gate evaluates the predicate once per failure, before the request is
/// admitted to a renewal session.
pub type RefreshClassifier = Arc<dyn Fn(&RequestFailure, &RequestDescription) -> bool + Send + Sync>;

/// Default eligibility policy.
///
/// Returns true iff the failure is an HTTP 401 or a transport-level
/// connectivity failure that produced no status code, and a credential is
/// currently held. Everything else (other statuses, request-construction
/// failures, signed-out clients) propagates to the caller unchanged.
pub fn default_should_refresh(failure: &RequestFailure, credential_held: bool) -> bool {
	if !credential_held {
		return false;
	}

	match failure.status() {
		Some(status) => status == StatusCode::UNAUTHORIZED.as_u16(),
		None => failure.is_connectivity(),
	}
}
