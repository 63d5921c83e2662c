//! Client-facing attachment of the renewal coordinator to a transport.
//!
//! [`AuthGate`] is the piece callers hold: it issues requests through the
//! wrapped transport and registers itself as the failure handler on the
//! response path, so successful responses pass through untouched while
//! failures are routed into [`RenewalCoordinator::on_request_failure`].

// self
use crate::{
	_prelude::*,
	auth::{CredentialRenewer, CredentialSource},
	classify::RefreshClassifier,
	coordinator::{HeaderFormatter, RenewalCoordinator},
	http::{ReplayHttpClient, ReplayResponse, RequestDescription},
	obs::RenewalObserver,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestReplayClient;

#[cfg(feature = "reqwest")]
/// Gate specialized for the crate's default reqwest transport.
pub type ReqwestAuthGate = AuthGate<ReqwestReplayClient>;

/// Transparent retry gate wrapped around one HTTP transport.
///
/// Callers of [`AuthGate::execute`] observe either a successful response,
/// possibly a transparently retried one, or an error with a stable kind; the
/// renewal machinery in between is never exposed. Clones share the
/// coordinator's session state.
pub struct AuthGate<C>
where
	C: ?Sized + ReplayHttpClient,
{
	/// Renewal coordinator owning the transport and the configuration surface.
	pub coordinator: RenewalCoordinator<C>,
}
impl<C> AuthGate<C>
where
	C: ?Sized + ReplayHttpClient,
{
	/// Creates a gate that reuses the caller-provided transport.
	pub fn with_http_client(
		http_client: impl Into<Arc<C>>,
		renewer: Arc<dyn CredentialRenewer>,
		credentials: Arc<dyn CredentialSource>,
	) -> Self {
		Self { coordinator: RenewalCoordinator::with_http_client(http_client, renewer, credentials) }
	}

	/// Overrides the eligibility classifier.
	pub fn with_classifier(mut self, classifier: RefreshClassifier) -> Self {
		self.coordinator = self.coordinator.with_classifier(classifier);

		self
	}

	/// Overrides the status observer.
	pub fn with_observer(mut self, observer: Arc<dyn RenewalObserver>) -> Self {
		self.coordinator = self.coordinator.with_observer(observer);

		self
	}

	/// Overrides the authorization header formatter.
	pub fn with_header_formatter(mut self, format_header: HeaderFormatter) -> Self {
		self.coordinator = self.coordinator.with_header_formatter(format_header);

		self
	}

	/// Overrides the renewal deadline.
	pub fn with_renewal_timeout(mut self, renewal_timeout: Duration) -> Self {
		self.coordinator = self.coordinator.with_renewal_timeout(renewal_timeout);

		self
	}

	/// Issues a request through the transport, routing failures into the
	/// renewal coordinator.
	///
	/// A request arriving without an authorization header is stamped with the
	/// currently held credential before the first issue.
	pub async fn execute(&self, mut request: RequestDescription) -> Result<ReplayResponse> {
		if request.authorization().is_none()
			&& let Some(value) = self.coordinator.current_authorization()
		{
			request.set_authorization(&value).map_err(Error::interceptor)?;
		}

		match self.coordinator.http_client.execute(request).await {
			Ok(response) => Ok(response),
			Err(failure) => self.coordinator.on_request_failure(failure).await,
		}
	}
}
#[cfg(feature = "reqwest")]
impl AuthGate<ReqwestReplayClient> {
	/// Creates a gate that provisions its own reqwest-backed transport.
	pub fn new(
		renewer: Arc<dyn CredentialRenewer>,
		credentials: Arc<dyn CredentialSource>,
	) -> Self {
		Self::with_http_client(ReqwestReplayClient::default(), renewer, credentials)
	}
}
impl<C> Clone for AuthGate<C>
where
	C: ?Sized + ReplayHttpClient,
{
	fn clone(&self) -> Self {
		Self { coordinator: self.coordinator.clone() }
	}
}
impl<C> Debug for AuthGate<C>
where
	C: ?Sized + ReplayHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthGate").field("coordinator", &self.coordinator).finish()
	}
}
