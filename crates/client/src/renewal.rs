//! Background renewal of tokens and secret leases

use crate::api::VaultClient;
use baokit_core::{Error, Result, Secret};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

/// Progress reported by a [`LifetimeWatcher`]
#[derive(Debug)]
pub enum RenewalEvent {
    /// The token or lease was extended to `ttl`
    Renewed { ttl: Duration },
    /// The watcher stopped: `None` for expiry or a stop request, `Some` for a failed renewal
    Done(Option<Error>),
}

/// What a watcher renews
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewTarget {
    Token,
    Lease(String),
}

#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Increment requested on each renewal; `None` lets the vault choose
    pub increment: Option<Duration>,
    /// Share of the current ttl to wait before renewing
    pub renew_fraction: f64,
    pub channel_capacity: usize,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            increment: None,
            renew_fraction: 2.0 / 3.0,
            channel_capacity: 16,
        }
    }
}

/// Keeps a token or lease alive until it can no longer be renewed.
///
/// Dropping the watcher stops it.
#[derive(Debug)]
pub struct LifetimeWatcher {
    target: RenewTarget,
    stop: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

struct WatchTask {
    client: Arc<dyn VaultClient>,
    target: RenewTarget,
    options: WatcherOptions,
    stop: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    events: mpsc::Sender<RenewalEvent>,
}

impl LifetimeWatcher {
    /// Start watching the token carried by an auth response, or the lease of a secret
    pub fn start(
        client: Arc<dyn VaultClient>,
        secret: &Secret,
        options: WatcherOptions,
    ) -> Result<(Self, mpsc::Receiver<RenewalEvent>)> {
        let (target, ttl, renewable) = if secret.auth.is_some() {
            (
                RenewTarget::Token,
                secret.token_ttl().unwrap_or_default(),
                secret.token_renewable(),
            )
        } else if !secret.lease_id.is_empty() {
            (
                RenewTarget::Lease(secret.lease_id.clone()),
                secret.lease(),
                secret.renewable,
            )
        } else {
            return Err(Error::configuration(
                "secret carries neither a token nor a lease to watch",
            ));
        };

        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let stop = Arc::new(Notify::new());
        let stopped = Arc::new(AtomicBool::new(false));

        let task = WatchTask {
            client,
            target: target.clone(),
            options,
            stop: stop.clone(),
            stopped: stopped.clone(),
            events: tx,
        };
        tokio::spawn(task.run(ttl, renewable));

        Ok((
            Self {
                target,
                stop,
                stopped,
            },
            rx,
        ))
    }

    pub fn target(&self) -> &RenewTarget {
        &self.target
    }

    /// Stop the watcher; it reports `Done(None)` and exits
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            // notify_one keeps a permit when the task is between waits
            self.stop.notify_one();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for LifetimeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl WatchTask {
    async fn run(self, mut ttl: Duration, renewable: bool) {
        // A zero ttl never expires
        if ttl.is_zero() {
            self.stop.notified().await;
            self.finish(None).await;
            return;
        }
        if !renewable {
            self.wait_expiry(ttl).await;
            return;
        }

        loop {
            let wait = ttl.mul_f64(self.options.renew_fraction);
            tokio::select! {
                _ = self.stop.notified() => {
                    self.finish(None).await;
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }
            if self.stopped.load(Ordering::SeqCst) {
                self.finish(None).await;
                return;
            }

            let renewed = match &self.target {
                RenewTarget::Token => self.client.renew_token(self.options.increment).await,
                RenewTarget::Lease(lease_id) => {
                    self.client
                        .renew_lease(lease_id, self.options.increment)
                        .await
                }
            };

            let secret = match renewed {
                Ok(secret) => secret,
                Err(e) => {
                    self.finish(Some(e)).await;
                    return;
                }
            };

            let (next_ttl, still_renewable) = match &self.target {
                RenewTarget::Token => (
                    secret.token_ttl().unwrap_or_default(),
                    secret.token_renewable(),
                ),
                RenewTarget::Lease(_) => (secret.lease(), secret.renewable),
            };
            debug!(target = ?self.target, ttl_secs = next_ttl.as_secs(), "renewed");

            if self
                .events
                .send(RenewalEvent::Renewed { ttl: next_ttl })
                .await
                .is_err()
            {
                return;
            }

            if next_ttl.is_zero() {
                self.finish(None).await;
                return;
            }
            if !still_renewable {
                self.wait_expiry(next_ttl).await;
                return;
            }
            ttl = next_ttl;
        }
    }

    async fn wait_expiry(&self, ttl: Duration) {
        tokio::select! {
            _ = self.stop.notified() => {}
            _ = tokio::time::sleep(ttl) => {}
        }
        self.finish(None).await;
    }

    async fn finish(&self, error: Option<Error>) {
        // Receiver gone means nobody is interested anymore
        let _ = self.events.send(RenewalEvent::Done(error)).await;
    }
}
