//! Transparent 401-retry gate: collapse concurrent credential expiries into one
//! renewal and replay every waiting request with the refreshed token.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod classify;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod intercept;
pub mod obs;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience fixtures and helpers for integration tests; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// crates.io
	use http::{Method, StatusCode};
	use tokio::sync::Notify;
	// self
	use crate::{
		auth::{CredentialRenewer, CredentialSecret, CredentialSource, RenewalOutcomeFuture, RenewedCredential},
		http::{ReplayFuture, ReplayHttpClient, ReplayResponse, RequestDescription, RequestFailure},
		intercept::AuthGate,
		obs::{RenewalObserver, RenewalPhase},
	};

	/// Credential source backed by a mutable in-memory slot.
	#[derive(Default)]
	pub struct StaticCredentials(Mutex<Option<CredentialSecret>>);
	impl StaticCredentials {
		/// Creates a source already holding the provided credential.
		pub fn holding(value: &str) -> Arc<Self> {
			Arc::new(Self(Mutex::new(Some(CredentialSecret::new(value)))))
		}

		/// Creates a signed-out source.
		pub fn empty() -> Arc<Self> {
			Arc::new(Self::default())
		}

		/// Replaces the held credential.
		pub fn set(&self, value: &str) {
			*self.0.lock() = Some(CredentialSecret::new(value));
		}

		/// Clears the held credential.
		pub fn clear(&self) {
			*self.0.lock() = None;
		}
	}
	impl CredentialSource for StaticCredentials {
		fn current(&self) -> Option<CredentialSecret> {
			self.0.lock().clone()
		}
	}

	/// One scripted outcome popped per renewal invocation.
	#[derive(Clone, Debug)]
	pub enum ScriptedRenewal {
		/// Resolve immediately with the provided value.
		Resolve(RenewedCredential),
		/// Resolve with the provided value after sleeping.
		ResolveAfter(Duration, RenewedCredential),
		/// Resolve with the provided value once [`ScriptedRenewer::release`] is called.
		ResolveWhenReleased(RenewedCredential),
		/// Reject with the provided reason.
		Reject(&'static str),
		/// Never settle; only a deadline can end the session.
		Stall,
	}

	/// Renewal stub that pops scripted outcomes and counts invocations.
	#[derive(Default)]
	pub struct ScriptedRenewer {
		outcomes: Mutex<VecDeque<ScriptedRenewal>>,
		attempts: AtomicUsize,
		release_signal: Arc<Notify>,
	}
	impl ScriptedRenewer {
		/// Creates a renewer that plays back the provided outcomes in order.
		pub fn scripted(outcomes: impl IntoIterator<Item = ScriptedRenewal>) -> Arc<Self> {
			Arc::new(Self {
				outcomes: Mutex::new(outcomes.into_iter().collect()),
				..Default::default()
			})
		}

		/// Returns how many times the renewal operation was invoked.
		pub fn attempts(&self) -> usize {
			self.attempts.load(Ordering::SeqCst)
		}

		/// Releases a pending [`ScriptedRenewal::ResolveWhenReleased`] outcome.
		pub fn release(&self) {
			self.release_signal.notify_one();
		}
	}
	impl CredentialRenewer for ScriptedRenewer {
		fn renew(&self) -> RenewalOutcomeFuture {
			self.attempts.fetch_add(1, Ordering::SeqCst);

			let outcome = self
				.outcomes
				.lock()
				.pop_front()
				.expect("Renewal stub invoked more times than scripted.");
			let release = Arc::clone(&self.release_signal);

			Box::pin(async move {
				match outcome {
					ScriptedRenewal::Resolve(renewed) => Ok(renewed),
					ScriptedRenewal::ResolveAfter(delay, renewed) => {
						tokio::time::sleep(delay).await;

						Ok(renewed)
					},
					ScriptedRenewal::ResolveWhenReleased(renewed) => {
						release.notified().await;

						Ok(renewed)
					},
					ScriptedRenewal::Reject(reason) => Err(reason.into()),
					ScriptedRenewal::Stall => std::future::pending().await,
				}
			})
		}
	}

	/// One scripted transport exchange popped per executed request.
	#[derive(Clone, Debug)]
	pub enum ScriptedExchange {
		/// Respond with the provided status and an empty body.
		Respond(u16),
		/// Fail with [`RequestFailure::Status`] carrying the provided status.
		FailStatus(u16),
		/// Fail with [`RequestFailure::Connectivity`] carrying the provided reason.
		FailConnectivity(&'static str),
	}

	/// Transport double that replays scripted exchanges and records every request.
	///
	/// Once the script runs dry, every further request succeeds with `200`,
	/// which keeps replay assertions short.
	#[derive(Default)]
	pub struct ScriptedTransport {
		exchanges: Mutex<VecDeque<ScriptedExchange>>,
		seen: Mutex<Vec<RequestDescription>>,
	}
	impl ScriptedTransport {
		/// Creates a transport that plays back the provided exchanges in order.
		pub fn scripted(exchanges: impl IntoIterator<Item = ScriptedExchange>) -> Arc<Self> {
			Arc::new(Self {
				exchanges: Mutex::new(exchanges.into_iter().collect()),
				seen: Default::default(),
			})
		}

		/// Appends further exchanges to the script.
		pub fn push(&self, exchange: ScriptedExchange) {
			self.exchanges.lock().push_back(exchange);
		}

		/// Returns every request executed so far, in arrival order.
		pub fn seen(&self) -> Vec<RequestDescription> {
			self.seen.lock().clone()
		}

		/// Returns how many requests were executed so far.
		pub fn seen_count(&self) -> usize {
			self.seen.lock().len()
		}

		/// Returns the authorization header of the `index`-th executed request.
		pub fn authorization_of(&self, index: usize) -> Option<String> {
			let seen = self.seen.lock();

			seen.get(index)
				.and_then(RequestDescription::authorization)
				.and_then(|value| value.to_str().ok())
				.map(str::to_owned)
		}
	}
	impl ReplayHttpClient for ScriptedTransport {
		fn execute(&self, request: RequestDescription) -> ReplayFuture {
			self.seen.lock().push(request.clone());

			let exchange =
				self.exchanges.lock().pop_front().unwrap_or(ScriptedExchange::Respond(200));

			Box::pin(async move {
				match exchange {
					ScriptedExchange::Respond(status) => {
						let mut response = ReplayResponse::new(Vec::new());

						*response.status_mut() = StatusCode::from_u16(status)
							.expect("Scripted status must be a valid HTTP status.");

						Ok(response)
					},
					ScriptedExchange::FailStatus(status) =>
						Err(RequestFailure::Status { status, body: Vec::new(), request: Some(request) }),
					ScriptedExchange::FailConnectivity(reason) =>
						Err(RequestFailure::connectivity(reason, Some(request))),
				}
			})
		}
	}

	/// Observer that records phase transitions and optionally fails on one.
	#[derive(Default)]
	pub struct RecordingObserver {
		phases: Mutex<Vec<RenewalPhase>>,
		fail_on: Option<RenewalPhase>,
	}
	impl RecordingObserver {
		/// Creates an observer that records every transition and accepts them all.
		pub fn recording() -> Arc<Self> {
			Arc::new(Self::default())
		}

		/// Creates an observer that fails when notified of the provided phase.
		pub fn failing_on(phase: RenewalPhase) -> Arc<Self> {
			Arc::new(Self { fail_on: Some(phase), ..Default::default() })
		}

		/// Returns the recorded phase transitions, in notification order.
		pub fn phases(&self) -> Vec<RenewalPhase> {
			self.phases.lock().clone()
		}
	}
	impl RenewalObserver for RecordingObserver {
		fn observe(
			&self,
			phase: RenewalPhase,
			_cause: Option<&(dyn StdError + 'static)>,
		) -> Result<(), BoxError> {
			self.phases.lock().push(phase);

			if self.fail_on == Some(phase) {
				return Err(format!("Observer rejected the {phase} notification.").into());
			}

			Ok(())
		}
	}

	/// Builds a gate wired to a fresh scripted transport plus the provided
	/// renewal and credential fixtures.
	pub fn build_test_gate(
		renewer: Arc<ScriptedRenewer>,
		credentials: Arc<StaticCredentials>,
	) -> (AuthGate<ScriptedTransport>, Arc<ScriptedTransport>) {
		let transport = Arc::new(ScriptedTransport::default());
		let gate = AuthGate::with_http_client(Arc::clone(&transport), renewer, credentials);

		(gate, transport)
	}

	/// Builds a GET request description against a placeholder endpoint.
	pub fn sample_request(path: &str) -> RequestDescription {
		RequestDescription::new(
			Method::GET,
			Url::parse(&format!("https://api.example.test{path}"))
				.expect("Fixture URL must parse."),
		)
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration,
	};

	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::Client as ReqwestClient;
	pub use thiserror::Error as ThisError;
	pub use url::Url;

	pub use crate::error::{BoxError, Error, Result, SharedCause};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {httpmock as _, reauth_gate as _};
