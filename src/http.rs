//! Transport boundary for issuing and replaying authenticated requests.
//!
//! The module exposes [`ReplayHttpClient`] alongside [`RequestDescription`] and
//! [`RequestFailure`] so downstream crates can attach the gate to custom HTTP
//! stacks. A transport executes one request at a time and, on failure, hands the
//! original description back inside the failure so the coordinator can queue it
//! for replay. Successful responses are returned as [`ReplayResponse`] values
//! and are never touched by the gate.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use http::{
	HeaderMap, HeaderValue, Method,
	header::{self, HeaderName, InvalidHeaderValue},
};
// self
use crate::_prelude::*;

/// Buffered response shape produced by transports and replays.
pub type ReplayResponse = http::Response<Vec<u8>>;

/// Boxed response future returned by [`ReplayHttpClient::execute`].
pub type ReplayFuture = Pin<Box<dyn Future<Output = Result<ReplayResponse, RequestFailure>> + Send>>;

/// Abstraction over HTTP transports capable of issuing and replaying requests.
///
/// The trait is the gate's only dependency on an HTTP stack. Implementations
/// take ownership of the [`RequestDescription`], and on failure must return it
/// inside the [`RequestFailure`] so the renewal coordinator can admit the call
/// to a session and replay it later. Implementations must be
/// `Send + Sync + 'static` so one transport can serve every in-flight call.
pub trait ReplayHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Executes the request, buffering the response body.
	fn execute(&self, request: RequestDescription) -> ReplayFuture;
}

/// Mutable description of one outbound request.
///
/// The description survives a failed attempt: the coordinator rewrites its
/// authorization header in place before the request is re-issued. The `retried`
/// marker records that the single renewal retry has been consumed.
#[derive(Clone)]
pub struct RequestDescription {
	method: Method,
	url: Url,
	headers: HeaderMap,
	body: Option<Vec<u8>>,
	retried: bool,
}
impl RequestDescription {
	/// Creates a new description for the provided method and URL.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: None, retried: false }
	}

	/// Appends a header to the description.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Attaches a byte body to the description.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Returns the request method.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Returns the request URL.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Returns the request headers.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Returns the request body, if one was attached.
	pub fn body(&self) -> Option<&[u8]> {
		self.body.as_deref()
	}

	/// Returns the current authorization header value, if any.
	pub fn authorization(&self) -> Option<&HeaderValue> {
		self.headers.get(header::AUTHORIZATION)
	}

	/// Replaces the authorization header with the provided value.
	///
	/// The stored value is flagged sensitive so header dumps redact it.
	pub fn set_authorization(&mut self, value: &str) -> Result<(), InvalidHeaderValue> {
		let mut value = HeaderValue::from_str(value)?;

		value.set_sensitive(true);
		self.headers.insert(header::AUTHORIZATION, value);

		Ok(())
	}

	/// True once the request has consumed its single renewal retry.
	pub fn is_retried(&self) -> bool {
		self.retried
	}

	/// Marks the request as having consumed its single renewal retry.
	///
	/// Marked requests are refused by the coordinator, which keeps a credential
	/// that renewal cannot fix from looping forever.
	pub fn mark_retried(&mut self) {
		self.retried = true;
	}
}
impl Debug for RequestDescription {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestDescription")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("headers", &RedactedHeaders(&self.headers))
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.field("retried", &self.retried)
			.finish()
	}
}

/// Header map printer that keeps credentials out of logs.
struct RedactedHeaders<'a>(&'a HeaderMap);
impl Debug for RedactedHeaders<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let mut map = f.debug_map();

		for (name, value) in self.0 {
			if *name == header::AUTHORIZATION {
				map.entry(&name.as_str(), &"<redacted>");
			} else {
				map.entry(&name.as_str(), value);
			}
		}

		map.finish()
	}
}

/// Structured failure surfaced by a transport.
///
/// Every variant carries the original [`RequestDescription`] when one exists; a
/// failure with no originating request cannot be retried and propagates to the
/// caller immediately.
#[derive(Debug, ThisError)]
pub enum RequestFailure {
	/// Endpoint answered with a non-success HTTP status.
	#[error("Request failed with HTTP status {status}.")]
	Status {
		/// Status code returned by the endpoint.
		status: u16,
		/// Buffered response body, kept for diagnostics.
		body: Vec<u8>,
		/// Original request description, when available.
		request: Option<RequestDescription>,
	},
	/// Transport-level failure before any response arrived.
	#[error("Network error occurred before a response arrived.")]
	Connectivity {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
		/// Original request description, when available.
		request: Option<RequestDescription>,
	},
	/// The request could not be handed to the transport.
	#[error("Request could not be handed to the transport.")]
	Invalid {
		/// Underlying construction failure.
		#[source]
		source: BoxError,
		/// Original request description, when available.
		request: Option<RequestDescription>,
	},
}
impl RequestFailure {
	/// Wraps a transport-specific connectivity failure.
	pub fn connectivity(
		source: impl Into<BoxError>,
		request: Option<RequestDescription>,
	) -> Self {
		Self::Connectivity { source: source.into(), request }
	}

	/// Wraps a request-construction failure.
	pub fn invalid(source: impl Into<BoxError>, request: Option<RequestDescription>) -> Self {
		Self::Invalid { source: source.into(), request }
	}

	/// Returns the HTTP status code, when a response arrived.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status { status, .. } => Some(*status),
			_ => None,
		}
	}

	/// True for transport-level failures that produced no status code.
	pub fn is_connectivity(&self) -> bool {
		matches!(self, Self::Connectivity { .. })
	}

	/// Returns the original request description, when available.
	pub fn request(&self) -> Option<&RequestDescription> {
		match self {
			Self::Status { request, .. }
			| Self::Connectivity { request, .. }
			| Self::Invalid { request, .. } => request.as_ref(),
		}
	}

	/// Takes the original request description out of the failure.
	pub fn take_request(&mut self) -> Option<RequestDescription> {
		match self {
			Self::Status { request, .. }
			| Self::Connectivity { request, .. }
			| Self::Invalid { request, .. } => request.take(),
		}
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one
/// place. Non-success statuses surface as [`RequestFailure::Status`] so the
/// interceptor sees them as failures; redirect handling follows whatever the
/// wrapped client was configured with.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestReplayClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestReplayClient {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestReplayClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestReplayClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ReplayHttpClient for ReqwestReplayClient {
	fn execute(&self, request: RequestDescription) -> ReplayFuture {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder = client
				.request(request.method().clone(), request.url().clone())
				.headers(request.headers().clone());

			if let Some(body) = request.body() {
				builder = builder.body(body.to_vec());
			}

			let outbound = match builder.build() {
				Ok(outbound) => outbound,
				Err(err) => return Err(RequestFailure::invalid(err, Some(request))),
			};
			let response = match client.execute(outbound).await {
				Ok(response) => response,
				Err(err) => return Err(RequestFailure::connectivity(err, Some(request))),
			};
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = match response.bytes().await {
				Ok(body) => body.to_vec(),
				Err(err) => return Err(RequestFailure::connectivity(err, Some(request))),
			};

			if status.is_client_error() || status.is_server_error() {
				return Err(RequestFailure::Status {
					status: status.as_u16(),
					body,
					request: Some(request),
				});
			}

			let mut replay = ReplayResponse::new(body);

			*replay.status_mut() = status;
			*replay.headers_mut() = headers;

			Ok(replay)
		})
	}
}
