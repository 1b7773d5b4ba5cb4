use std::fmt;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An authenticated vault token together with its lease metadata.
///
/// The token is wiped from memory when the credential is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    token: String,
    lease_id: String,
    accessor: String,
    #[zeroize(skip)]
    ttl: Duration,
    #[zeroize(skip)]
    renewable: bool,
}

impl Credential {
    /// Create a credential from a login response
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        lease_id: impl Into<String>,
        accessor: impl Into<String>,
        ttl: Duration,
        renewable: bool,
    ) -> Self {
        Self {
            token: token.into(),
            lease_id: lease_id.into(),
            accessor: accessor.into(),
            ttl,
            renewable,
        }
    }

    /// Create a credential for a token that was supplied directly.
    ///
    /// Such tokens carry no lease information and are never renewed.
    #[must_use]
    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(token, "", "", Duration::ZERO, false)
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn lease_id(&self) -> &str {
        &self.lease_id
    }

    #[must_use]
    pub fn accessor(&self) -> &str {
        &self.accessor
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn renewable(&self) -> bool {
        self.renewable
    }

    /// Record a refreshed ttl after a successful renewal
    pub fn refresh(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("lease_id", &self.lease_id)
            .field("accessor", &self.accessor)
            .field("ttl", &self.ttl)
            .field("renewable", &self.renewable)
            .finish()
    }
}
