//! Single-flight renewal coordination with queued replay and timeout force-fail.
//!
//! The gate exposes [`RenewalCoordinator::on_request_failure`] so the
//! interceptor glue can route every failed call through the renewal protocol.
//! Concurrent eligible failures collapse into one session: the first arrival
//! becomes the initiator and races the renewal operation against the configured
//! deadline, later arrivals join the session's wait set and suspend on their
//! own settlement channel. At settlement the initiator drains the wait set,
//! including requests that joined while the renewal was still pending, and
//! fans out one verdict; each released request rewrites its authorization
//! header and re-issues itself through the transport.

mod metrics;

pub use metrics::RenewalMetrics;

// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{CredentialRenewer, CredentialSecret, CredentialSource, RenewedCredential},
	classify::{self, RefreshClassifier},
	error::RenewalError,
	http::{ReplayHttpClient, ReplayResponse, RequestDescription, RequestFailure},
	obs::{self, DiagnosticObserver, RenewalObserver, RenewalPhase, RenewalSpan},
};

/// Default upper bound on a renewal operation's wall-clock duration.
pub const DEFAULT_RENEWAL_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Formats a credential into an authorization header value.
pub type HeaderFormatter = Arc<dyn Fn(&CredentialSecret) -> String + Send + Sync>;

/// Settlement fanned out to every request waiting on a session.
#[derive(Clone, Debug)]
enum SessionVerdict {
	/// Renewal succeeded; replay with this credential. `None` leaves the
	/// request's headers untouched.
	Renewed(Option<CredentialSecret>),
	/// Renewal rejected the attempt or missed its deadline.
	Failed(Arc<RenewalError>),
	/// The coordinator failed before the session could settle.
	Aborted(SharedCause),
}

/// Coordination record for one in-progress renewal.
///
/// At most one session exists per coordinator at any instant; the surrounding
/// `Mutex<Option<_>>` slot doubles as the single-flight flag, so flag
/// test-and-set and wait-set append share one critical section.
struct RenewalSession {
	waiters: Vec<oneshot::Sender<SessionVerdict>>,
}

/// Marker cause used when a session is torn down before settling a waiter.
#[derive(Debug, ThisError)]
#[error("Renewal session was discarded before settling this request.")]
struct SessionDiscarded;

/// Coordinates credential renewal for one transport.
///
/// The coordinator owns the transport, the caller-supplied renewal operation
/// and credential accessor, and the configuration surface (classifier,
/// observer, header formatter, renewal deadline), all resolved once at
/// construction. Clones share the same session slot, so every handle to one
/// coordinator obeys the same single-flight guarantee; independent coordinator
/// instances never share sessions.
pub struct RenewalCoordinator<C>
where
	C: ?Sized + ReplayHttpClient,
{
	/// Transport used for the first issue and every replay.
	pub http_client: Arc<C>,
	/// Caller-supplied renewal operation.
	pub renewer: Arc<dyn CredentialRenewer>,
	/// Caller-supplied accessor for the currently held credential.
	pub credentials: Arc<dyn CredentialSource>,
	/// Shared counters for session outcomes.
	pub renewal_metrics: Arc<RenewalMetrics>,
	classifier: Option<RefreshClassifier>,
	observer: Arc<dyn RenewalObserver>,
	format_header: HeaderFormatter,
	renewal_timeout: Duration,
	session: Arc<Mutex<Option<RenewalSession>>>,
}
impl<C> RenewalCoordinator<C>
where
	C: ?Sized + ReplayHttpClient,
{
	/// Creates a coordinator around the caller-provided transport and contracts.
	pub fn with_http_client(
		http_client: impl Into<Arc<C>>,
		renewer: Arc<dyn CredentialRenewer>,
		credentials: Arc<dyn CredentialSource>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			renewer,
			credentials,
			renewal_metrics: Default::default(),
			classifier: None,
			observer: Arc::new(DiagnosticObserver),
			format_header: Arc::new(|secret| format!("Bearer {}", secret.expose())),
			renewal_timeout: DEFAULT_RENEWAL_TIMEOUT,
			session: Default::default(),
		}
	}

	/// Overrides the eligibility classifier (defaults to the policy in
	/// [`classify::default_should_refresh`]).
	pub fn with_classifier(mut self, classifier: RefreshClassifier) -> Self {
		self.classifier = Some(classifier);

		self
	}

	/// Overrides the status observer (defaults to [`DiagnosticObserver`]).
	pub fn with_observer(mut self, observer: Arc<dyn RenewalObserver>) -> Self {
		self.observer = observer;

		self
	}

	/// Overrides the authorization header formatter (defaults to
	/// `Bearer <token>`).
	pub fn with_header_formatter(mut self, format_header: HeaderFormatter) -> Self {
		self.format_header = format_header;

		self
	}

	/// Overrides the renewal deadline (defaults to
	/// [`DEFAULT_RENEWAL_TIMEOUT`]).
	pub fn with_renewal_timeout(mut self, renewal_timeout: Duration) -> Self {
		self.renewal_timeout = renewal_timeout;

		self
	}

	/// Renders the currently held credential as an authorization header value.
	pub fn current_authorization(&self) -> Option<String> {
		self.credentials.current().map(|secret| (self.format_header)(&secret))
	}

	/// Routes one failed call through the renewal protocol.
	///
	/// Non-eligible failures (no request description, classifier declined, or
	/// the request already consumed its retry) resolve immediately to
	/// [`Error::Request`] with the original failure unchanged. Eligible
	/// failures suspend until the session settles and then either replay
	/// through the transport or reject with the session's shared cause.
	pub async fn on_request_failure(&self, failure: RequestFailure) -> Result<ReplayResponse> {
		let span = RenewalSpan::new("on_request_failure");

		span.instrument(self.handle_failure(failure)).await
	}

	async fn handle_failure(&self, mut failure: RequestFailure) -> Result<ReplayResponse> {
		let eligible = match failure.request() {
			Some(request) => !request.is_retried() && self.should_refresh(&failure, request),
			None => false,
		};

		if !eligible {
			return Err(Error::Request(failure));
		}

		let Some(mut request) = failure.take_request() else {
			return Err(Error::Request(failure));
		};

		// Consume the single retry before admission so a second failure of the
		// same request can never re-enter the queue.
		request.mark_retried();

		let (settle_tx, settle_rx) = oneshot::channel();
		let initiator = {
			let mut slot = self.session.lock();

			match slot.as_mut() {
				Some(session) => {
					session.waiters.push(settle_tx);

					false
				},
				None => {
					*slot = Some(RenewalSession { waiters: vec![settle_tx] });

					true
				},
			}
		};

		if initiator {
			// Armed in the same synchronous stretch that installed the session:
			// should this future be dropped anywhere before settlement, the
			// guard clears the slot and rejects every waiter.
			let guard = SessionGuard { session: &self.session, armed: true };

			self.drive_session().await;
			guard.disarm();
		}

		let verdict = settle_rx.await.map_err(|_| Error::interceptor(SessionDiscarded))?;

		match verdict {
			SessionVerdict::Renewed(credential) => {
				if let Some(secret) = credential {
					let value = (self.format_header)(&secret);

					request.set_authorization(&value).map_err(Error::interceptor)?;
				}

				self.http_client.execute(request).await.map_err(Error::Request)
			},
			SessionVerdict::Failed(source) => Err(Error::RefreshFailed { source }),
			SessionVerdict::Aborted(source) => Err(Error::Interceptor { source }),
		}
	}

	fn should_refresh(&self, failure: &RequestFailure, request: &RequestDescription) -> bool {
		match &self.classifier {
			Some(classifier) => classifier(failure, request),
			None => classify::default_should_refresh(failure, self.credentials.current().is_some()),
		}
	}

	/// Drives the session the caller just created: runs the renewal, settles
	/// every waiter, and clears the slot.
	async fn drive_session(&self) {
		self.renewal_metrics.record_session();

		let verdict = self.run_renewal().await;

		match &verdict {
			SessionVerdict::Renewed(_) => self.renewal_metrics.record_settled(),
			SessionVerdict::Failed(_) | SessionVerdict::Aborted(_) =>
				self.renewal_metrics.record_failed(),
		}

		self.settle(verdict);
	}

	/// Races the renewal operation against the deadline.
	///
	/// Dropping the timed future on deadline expiry also drops the renewal
	/// operation, so a settlement arriving after the timeout can never touch a
	/// session that has already been cleared.
	async fn run_renewal(&self) -> SessionVerdict {
		if let Err(cause) = self.notify(RenewalPhase::Refreshing, None) {
			return self.aborted(cause);
		}

		match tokio::time::timeout(self.renewal_timeout, self.renewer.renew()).await {
			Ok(Ok(renewed)) => {
				if let Err(cause) = self.notify(RenewalPhase::Success, None) {
					return self.aborted(cause);
				}

				let credential = match renewed {
					RenewedCredential::Minted(secret) => Some(secret),
					// A renewal that intentionally minted nothing releases the
					// queue with whatever credential is on hand.
					RenewedCredential::Unchanged => self.credentials.current(),
				};

				SessionVerdict::Renewed(credential)
			},
			Ok(Err(cause)) => {
				let failure = Arc::new(RenewalError::Operation(cause));

				if let Err(cause) = self.notify(RenewalPhase::Failed, Some(failure.as_ref())) {
					return self.aborted(cause);
				}

				SessionVerdict::Failed(failure)
			},
			Err(_) => {
				let millis = u64::try_from(self.renewal_timeout.as_millis()).unwrap_or(u64::MAX);
				let failure = Arc::new(RenewalError::DeadlineExceeded(millis));

				if let Err(cause) = self.notify(RenewalPhase::Failed, Some(failure.as_ref())) {
					return self.aborted(cause);
				}

				SessionVerdict::Failed(failure)
			},
		}
	}

	fn notify(
		&self,
		phase: RenewalPhase,
		cause: Option<&(dyn StdError + 'static)>,
	) -> Result<(), BoxError> {
		obs::record_renewal_phase(phase);
		self.observer.observe(phase, cause)
	}

	fn aborted(&self, cause: BoxError) -> SessionVerdict {
		let shared: SharedCause = Arc::from(cause);

		// Best effort only: the observer already failed once on this path.
		let _ = self.notify(RenewalPhase::Error, Some(shared.as_ref()));

		SessionVerdict::Aborted(shared)
	}

	/// Clears the session slot and fans the verdict out to every waiter.
	///
	/// The wait set is read here, at settlement time, so requests that joined
	/// after the renewal started are still included. Waiters whose callers went
	/// away are skipped silently.
	fn settle(&self, verdict: SessionVerdict) {
		let waiters = {
			let mut slot = self.session.lock();

			match slot.take() {
				Some(session) => session.waiters,
				None => Vec::new(),
			}
		};

		for waiter in waiters {
			let _ = waiter.send(verdict.clone());
		}
	}
}
impl<C> Clone for RenewalCoordinator<C>
where
	C: ?Sized + ReplayHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			http_client: Arc::clone(&self.http_client),
			renewer: Arc::clone(&self.renewer),
			credentials: Arc::clone(&self.credentials),
			renewal_metrics: Arc::clone(&self.renewal_metrics),
			classifier: self.classifier.clone(),
			observer: Arc::clone(&self.observer),
			format_header: Arc::clone(&self.format_header),
			renewal_timeout: self.renewal_timeout,
			session: Arc::clone(&self.session),
		}
	}
}
impl<C> Debug for RenewalCoordinator<C>
where
	C: ?Sized + ReplayHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RenewalCoordinator")
			.field("renewal_timeout", &self.renewal_timeout)
			.field("classifier_overridden", &self.classifier.is_some())
			.field("session_active", &self.session.lock().is_some())
			.finish()
	}
}

/// Safety net for the initiator path.
///
/// If the initiator's future is dropped or unwinds between creating the
/// session and settling it, the guard clears the slot and rejects every waiter,
/// so no request can hang on a session nobody is driving.
struct SessionGuard<'a> {
	session: &'a Mutex<Option<RenewalSession>>,
	armed: bool,
}
impl SessionGuard<'_> {
	fn disarm(mut self) {
		self.armed = false;
	}
}
impl Drop for SessionGuard<'_> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		let waiters = match self.session.lock().take() {
			Some(session) => session.waiters,
			None => Vec::new(),
		};

		for waiter in waiters {
			let _ = waiter.send(SessionVerdict::Aborted(Arc::new(SessionDiscarded)));
		}
	}
}
