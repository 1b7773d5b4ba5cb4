use baokit_core::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// What a vault request does, which decides whether it may be sent again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Logical reads
    Read,
    /// Token and lease renewals
    Renewal,
    /// Transit decrypt calls
    Decrypt,
    /// Logical writes; each one may mint credentials or leases
    Write,
    /// Auth logins; the credential lifecycle retries these itself
    Login,
}

impl RequestKind {
    /// Whether repeating the request cannot create anything new on the server
    pub fn is_repeatable(self) -> bool {
        matches!(self, Self::Read | Self::Renewal | Self::Decrypt)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Renewal => "renewal",
            Self::Decrypt => "decrypt",
            Self::Write => "write",
            Self::Login => "login",
        }
    }
}

/// Backoff for repeatable vault requests
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per repeatable request, the first one included
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Growth factor applied to the delay after each failed attempt
    pub multiplier: f64,
    /// Add up to 30% random delay on top of each wait
    pub jitter: bool,
}

impl RetryConfig {
    /// Two retries on 5xx answers and connection failures
    pub fn transport() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(1500),
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Attempts allowed for a request of `kind`; non-repeatable requests are sent once
    pub fn attempts_for(&self, kind: RequestKind) -> u32 {
        if kind.is_repeatable() {
            self.max_attempts.max(1)
        } else {
            1
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.multiplier.max(1.0)).min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter {
            delay + delay.mul_f64(rand::random::<f64>() * 0.3)
        } else {
            delay
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::transport()
    }
}

/// Whether a failed vault request is worth sending again.
///
/// A transport error without a status never got an answer; 5xx means the server
/// (or a proxy) failed. Everything else is the caller's problem.
pub fn is_transient(error: &Error) -> bool {
    match error {
        Error::Transport { status: None, .. } => true,
        Error::Transport {
            status: Some(code), ..
        } => *code >= 500,
        _ => false,
    }
}

/// Run `request` with backoff while it fails transiently, as far as `kind` allows
pub async fn retry_async<F, Fut, T>(config: &RetryConfig, kind: RequestKind, mut request: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = config.attempts_for(kind);
    let mut delay = config.initial_delay;

    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match request().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if attempt >= attempts || !is_transient(&error) {
            return Err(error);
        }

        tracing::warn!(
            kind = kind.as_str(),
            attempt,
            max_attempts = attempts,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "vault request failed, retrying"
        );
        sleep(config.jittered(delay)).await;
        delay = config.next_delay(delay);
    }
}
