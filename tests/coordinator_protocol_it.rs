// self
use reauth_gate::{
	_preludet::*,
	auth::RenewedCredential,
	classify::RefreshClassifier,
	http::RequestFailure,
	obs::RenewalPhase,
};

#[tokio::test(start_paused = true)]
async fn concurrent_eligible_failures_share_one_renewal() {
	let renewer = ScriptedRenewer::scripted([ScriptedRenewal::ResolveAfter(
		Duration::from_millis(50),
		RenewedCredential::minted("newtok"),
	)]);
	let credentials = StaticCredentials::holding("oldtok");
	let observer = RecordingObserver::recording();
	let (gate, transport) = build_test_gate(Arc::clone(&renewer), credentials);
	let gate = gate.with_observer(observer.clone());

	for _ in 0..3 {
		transport.push(ScriptedExchange::FailStatus(401));
	}

	let (first, second, third) = tokio::join!(
		gate.execute(sample_request("/a")),
		gate.execute(sample_request("/b")),
		gate.execute(sample_request("/c")),
	);

	for outcome in [first, second, third] {
		let response = outcome.expect("Every queued request must be replayed successfully.");

		assert_eq!(response.status().as_u16(), 200);
	}

	assert_eq!(renewer.attempts(), 1);
	assert_eq!(transport.seen_count(), 6);

	for index in 3..6 {
		assert_eq!(transport.authorization_of(index), Some("Bearer newtok".into()));
	}

	assert_eq!(observer.phases(), vec![RenewalPhase::Refreshing, RenewalPhase::Success]);

	let metrics = &gate.coordinator.renewal_metrics;

	assert_eq!(metrics.sessions(), 1);
	assert_eq!(metrics.settled(), 1);
	assert_eq!(metrics.failed(), 0);
}

#[tokio::test]
async fn late_joiner_is_included_in_the_fanout() {
	let renewer = ScriptedRenewer::scripted([ScriptedRenewal::ResolveWhenReleased(
		RenewedCredential::minted("fresh"),
	)]);
	let credentials = StaticCredentials::holding("stale");
	let (gate, transport) = build_test_gate(Arc::clone(&renewer), credentials);

	transport.push(ScriptedExchange::FailStatus(401));
	transport.push(ScriptedExchange::FailStatus(401));

	let first = tokio::spawn({
		let gate = gate.clone();

		async move { gate.execute(sample_request("/first")).await }
	});

	while renewer.attempts() == 0 {
		tokio::task::yield_now().await;
	}

	// The renewal is now pending; this second failure must join the same
	// session instead of starting another renewal.
	let second = tokio::spawn({
		let gate = gate.clone();

		async move { gate.execute(sample_request("/second")).await }
	});

	while transport.seen_count() < 2 {
		tokio::task::yield_now().await;
	}

	renewer.release();

	first
		.await
		.expect("Initiator task must not panic.")
		.expect("Initiator request must be replayed successfully.");
	second
		.await
		.expect("Joiner task must not panic.")
		.expect("Late joiner must be included in the fan-out.");

	assert_eq!(renewer.attempts(), 1);
	assert_eq!(transport.seen_count(), 4);
	assert_eq!(transport.authorization_of(2), Some("Bearer fresh".into()));
	assert_eq!(transport.authorization_of(3), Some("Bearer fresh".into()));
}

#[tokio::test(start_paused = true)]
async fn timeout_rejects_waiters_with_refresh_failed() {
	let renewer = ScriptedRenewer::scripted([ScriptedRenewal::Stall]);
	let credentials = StaticCredentials::holding("stale");
	let observer = RecordingObserver::recording();
	let (gate, transport) = build_test_gate(Arc::clone(&renewer), credentials);
	let gate =
		gate.with_renewal_timeout(Duration::from_millis(100)).with_observer(observer.clone());

	transport.push(ScriptedExchange::FailStatus(401));

	let err = gate
		.execute(sample_request("/slow"))
		.await
		.expect_err("A renewal that never settles must be force-failed.");

	assert!(err.is_refresh_failed());

	let cause = err.source().expect("Refresh failures must expose their cause.");

	assert!(cause.to_string().contains("100 ms deadline"));
	assert_eq!(observer.phases(), vec![RenewalPhase::Refreshing, RenewalPhase::Failed]);
	assert_eq!(renewer.attempts(), 1);
	// The waiting request was rejected, never replayed.
	assert_eq!(transport.seen_count(), 1);
}

#[tokio::test]
async fn renewal_rejection_wraps_the_underlying_cause() {
	let renewer = ScriptedRenewer::scripted([ScriptedRenewal::Reject("provider exploded")]);
	let credentials = StaticCredentials::holding("stale");
	let observer = RecordingObserver::recording();
	let (gate, transport) = build_test_gate(renewer, credentials);
	let gate = gate.with_observer(observer.clone());

	transport.push(ScriptedExchange::FailStatus(401));

	let err = gate
		.execute(sample_request("/reject"))
		.await
		.expect_err("A rejected renewal must reject the waiting request.");

	assert!(err.is_refresh_failed());

	let renewal_cause = err.source().expect("Refresh failures must expose their cause.");
	let root = renewal_cause.source().expect("The renewal cause must chain the original error.");

	assert_eq!(root.to_string(), "provider exploded");
	assert_eq!(observer.phases(), vec![RenewalPhase::Refreshing, RenewalPhase::Failed]);
}

#[tokio::test]
async fn session_state_resets_after_each_settlement() {
	let renewer = ScriptedRenewer::scripted([
		ScriptedRenewal::Reject("transient outage"),
		ScriptedRenewal::Resolve(RenewedCredential::minted("fresh")),
	]);
	let credentials = StaticCredentials::holding("stale");
	let (gate, transport) = build_test_gate(Arc::clone(&renewer), credentials);

	transport.push(ScriptedExchange::FailStatus(401));
	transport.push(ScriptedExchange::FailStatus(401));

	gate.execute(sample_request("/one"))
		.await
		.expect_err("The first session must fail with the scripted rejection.");
	// The failed session must be fully discarded: this failure starts a
	// brand-new renewal instead of hanging on leftover state.
	gate.execute(sample_request("/two"))
		.await
		.expect("The second session must renew and replay successfully.");

	assert_eq!(renewer.attempts(), 2);

	let metrics = &gate.coordinator.renewal_metrics;

	assert_eq!(metrics.sessions(), 2);
	assert_eq!(metrics.settled(), 1);
	assert_eq!(metrics.failed(), 1);
}

#[tokio::test]
async fn renewed_credential_rewrites_the_authorization_header() {
	let renewer =
		ScriptedRenewer::scripted([ScriptedRenewal::Resolve(RenewedCredential::minted("abc"))]);
	let credentials = StaticCredentials::holding("stale");
	let (gate, transport) = build_test_gate(renewer, credentials);

	transport.push(ScriptedExchange::FailStatus(401));

	gate.execute(sample_request("/rewrite"))
		.await
		.expect("The renewed request must be replayed successfully.");

	assert_eq!(transport.authorization_of(0), Some("Bearer stale".into()));
	assert_eq!(transport.authorization_of(1), Some("Bearer abc".into()));
}

#[tokio::test]
async fn unchanged_renewal_replays_with_the_held_credential() {
	let renewer = ScriptedRenewer::scripted([ScriptedRenewal::Resolve(RenewedCredential::Unchanged)]);
	let credentials = StaticCredentials::holding("heldtok");
	let (gate, transport) = build_test_gate(renewer, credentials);

	transport.push(ScriptedExchange::FailStatus(401));

	let mut request = sample_request("/unchanged");

	request
		.set_authorization("Bearer original")
		.expect("A plain bearer value must parse as a header.");
	gate.execute(request).await.expect("The request must be replayed successfully.");

	assert_eq!(transport.authorization_of(0), Some("Bearer original".into()));
	assert_eq!(transport.authorization_of(1), Some("Bearer heldtok".into()));
}

#[tokio::test]
async fn connectivity_failure_with_held_credential_is_renewed() {
	let renewer =
		ScriptedRenewer::scripted([ScriptedRenewal::Resolve(RenewedCredential::minted("fresh"))]);
	let credentials = StaticCredentials::holding("stale");
	let (gate, transport) = build_test_gate(Arc::clone(&renewer), credentials);

	transport.push(ScriptedExchange::FailConnectivity("connection reset by peer"));

	let response = gate
		.execute(sample_request("/flaky"))
		.await
		.expect("A connectivity failure with a held credential must be retried.");

	assert_eq!(response.status().as_u16(), 200);
	assert_eq!(renewer.attempts(), 1);
	assert_eq!(transport.authorization_of(1), Some("Bearer fresh".into()));
}

#[tokio::test]
async fn failures_without_a_held_credential_pass_through() {
	let renewer = ScriptedRenewer::scripted([]);
	let credentials = StaticCredentials::empty();
	let (gate, transport) = build_test_gate(Arc::clone(&renewer), credentials);

	transport.push(ScriptedExchange::FailStatus(401));

	let err = gate
		.execute(sample_request("/signed-out"))
		.await
		.expect_err("A 401 with no held credential must propagate unchanged.");

	assert!(matches!(err, Error::Request(_)));
	assert_eq!(err.status(), Some(401));
	assert_eq!(renewer.attempts(), 0);
	assert_eq!(transport.seen_count(), 1);
}

#[tokio::test]
async fn non_auth_statuses_pass_through_unchanged() {
	let renewer = ScriptedRenewer::scripted([]);
	let credentials = StaticCredentials::holding("stale");
	let (gate, transport) = build_test_gate(Arc::clone(&renewer), credentials);

	transport.push(ScriptedExchange::FailStatus(500));

	let err = gate
		.execute(sample_request("/boom"))
		.await
		.expect_err("A plain 500 must propagate unchanged.");

	assert!(matches!(err, Error::Request(_)));
	assert_eq!(err.status(), Some(500));
	assert_eq!(renewer.attempts(), 0);
}

#[tokio::test]
async fn already_retried_requests_are_refused() {
	let renewer = ScriptedRenewer::scripted([]);
	let credentials = StaticCredentials::holding("stale");
	let (gate, _transport) = build_test_gate(Arc::clone(&renewer), credentials);
	let mut request = sample_request("/again");

	request.mark_retried();

	let failure =
		RequestFailure::Status { status: 401, body: Vec::new(), request: Some(request) };
	let err = gate
		.coordinator
		.on_request_failure(failure)
		.await
		.expect_err("A request that already consumed its retry must be refused.");

	assert!(matches!(err, Error::Request(_)));
	assert_eq!(renewer.attempts(), 0);
}

#[tokio::test]
async fn replay_failing_again_propagates_without_reentry() {
	let renewer =
		ScriptedRenewer::scripted([ScriptedRenewal::Resolve(RenewedCredential::minted("fresh"))]);
	let credentials = StaticCredentials::holding("stale");
	let (gate, transport) = build_test_gate(Arc::clone(&renewer), credentials);

	transport.push(ScriptedExchange::FailStatus(401));
	transport.push(ScriptedExchange::FailStatus(401));

	let err = gate
		.execute(sample_request("/still-expired"))
		.await
		.expect_err("A replay that fails again must propagate the failure.");

	assert!(matches!(err, Error::Request(_)));
	assert_eq!(err.status(), Some(401));
	// One renewal, two transport calls, no second session.
	assert_eq!(renewer.attempts(), 1);
	assert_eq!(transport.seen_count(), 2);
}

#[tokio::test]
async fn observer_failure_rejects_waiters_with_interceptor_error() {
	let renewer = ScriptedRenewer::scripted([]);
	let credentials = StaticCredentials::holding("stale");
	let observer = RecordingObserver::failing_on(RenewalPhase::Refreshing);
	let (gate, transport) = build_test_gate(Arc::clone(&renewer), credentials);
	let gate = gate.with_observer(observer.clone());

	transport.push(ScriptedExchange::FailStatus(401));

	let err = gate
		.execute(sample_request("/bad-observer"))
		.await
		.expect_err("An observer failure must reject the waiting request.");

	assert!(matches!(err, Error::Interceptor { .. }));
	assert_eq!(observer.phases(), vec![RenewalPhase::Refreshing, RenewalPhase::Error]);
	// The renewal operation itself was never reached.
	assert_eq!(renewer.attempts(), 0);

	let metrics = &gate.coordinator.renewal_metrics;

	assert_eq!(metrics.sessions(), 1);
	assert_eq!(metrics.failed(), 1);
}

#[tokio::test]
async fn classifier_override_controls_eligibility() {
	let renewer =
		ScriptedRenewer::scripted([ScriptedRenewal::Resolve(RenewedCredential::minted("fresh"))]);
	let credentials = StaticCredentials::holding("stale");
	let (gate, transport) = build_test_gate(Arc::clone(&renewer), credentials);
	let classifier: RefreshClassifier =
		Arc::new(|failure, _request| failure.status() == Some(418));
	let gate = gate.with_classifier(classifier);

	transport.push(ScriptedExchange::FailStatus(418));

	gate.execute(sample_request("/teapot"))
		.await
		.expect("The overridden classifier must admit a 418.");

	assert_eq!(renewer.attempts(), 1);

	// With the override in place, a 401 is no longer eligible.
	transport.push(ScriptedExchange::FailStatus(401));

	let err = gate
		.execute(sample_request("/unauthorized"))
		.await
		.expect_err("The overridden classifier must decline a 401.");

	assert!(matches!(err, Error::Request(_)));
	assert_eq!(renewer.attempts(), 1);
}
