//! Credential-domain types and the caller-supplied renewal contracts.

// self
use crate::_prelude::*;

/// Boxed future returned by [`CredentialRenewer::renew`].
pub type RenewalOutcomeFuture =
	Pin<Box<dyn Future<Output = Result<RenewedCredential, BoxError>> + Send>>;

/// Redacted credential wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSecret(String);
impl CredentialSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner credential value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for CredentialSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for CredentialSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("CredentialSecret").field(&"<redacted>").finish()
	}
}
impl Display for CredentialSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Value produced by a successful renewal operation.
#[derive(Clone, Debug)]
pub enum RenewedCredential {
	/// Renewal minted a fresh credential.
	Minted(CredentialSecret),
	/// Renewal succeeded without minting a new credential (idempotent re-use).
	/// Waiting requests are replayed with the credential currently held.
	Unchanged,
}
impl RenewedCredential {
	/// Convenience constructor wrapping a plain string as a minted credential.
	pub fn minted(value: impl Into<String>) -> Self {
		Self::Minted(CredentialSecret::new(value))
	}
}

/// Caller-supplied asynchronous operation that obtains a new credential.
///
/// The gate invokes this at most once per renewal session. Persisting the
/// renewed credential (disk, keychain, in-memory slot) is the implementation's
/// own responsibility; the coordinator only forwards the returned value to the
/// requests waiting on the session.
pub trait CredentialRenewer
where
	Self: 'static + Send + Sync,
{
	/// Starts one renewal attempt.
	fn renew(&self) -> RenewalOutcomeFuture;
}

/// Caller-supplied accessor for the credential currently held.
pub trait CredentialSource
where
	Self: 'static + Send + Sync,
{
	/// Returns the currently held credential, or `None` when signed out.
	fn current(&self) -> Option<CredentialSecret>;
}

/// Adapts a closure returning a future into a [`CredentialRenewer`].
pub struct RenewWith<F>(pub F);
impl<F, Fut> CredentialRenewer for RenewWith<F>
where
	F: 'static + Send + Sync + Fn() -> Fut,
	Fut: 'static + Send + Future<Output = Result<RenewedCredential, BoxError>>,
{
	fn renew(&self) -> RenewalOutcomeFuture {
		Box::pin((self.0)())
	}
}

/// Adapts a closure into a [`CredentialSource`].
pub struct SourceWith<F>(pub F);
impl<F> CredentialSource for SourceWith<F>
where
	F: 'static + Send + Sync + Fn() -> Option<CredentialSecret>,
{
	fn current(&self) -> Option<CredentialSecret> {
		(self.0)()
	}
}
