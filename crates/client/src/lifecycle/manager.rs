//! Credential bootstrap, renewal and shutdown

use super::token::{direct_token, TokenOrigin};
use super::trust::{self, TrustRootWatch};
use crate::api::VaultClient;
use crate::auth::{AuthStrategy, IdentityProvider, NoCloudIdentity};
use crate::config::ClientConfig;
use crate::http::HttpVaultClient;
use crate::renewal::{LifetimeWatcher, RenewalEvent, WatcherOptions};
use baokit_core::{Credential, Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, error, info};

/// Where the credential lifecycle currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecyclePhase {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
    Renewing,
    Closed,
}

#[derive(Default)]
pub(crate) struct ManagerState {
    phase: LifecyclePhase,
    credential: Option<Credential>,
    watcher: Option<LifetimeWatcher>,
    trust_watch: Option<TrustRootWatch>,
    login_attempts: u64,
}

/// Read-only view of the current credential, shareable with resolution tasks
#[derive(Clone)]
pub struct CredentialHandle {
    state: Arc<Mutex<ManagerState>>,
}

impl CredentialHandle {
    /// A handle over a fixed token, with no lifecycle behind it
    pub fn fixed(token: impl Into<String>) -> Self {
        let state = ManagerState {
            phase: LifecyclePhase::Authenticated,
            credential: Some(Credential::from_token(token)),
            ..ManagerState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// The current token; `None` before the first login and after close
    pub fn token(&self) -> Option<String> {
        let state = self.state.lock();
        if state.phase == LifecyclePhase::Closed {
            return None;
        }
        state
            .credential
            .as_ref()
            .map(|credential| credential.token().to_string())
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.state.lock().phase
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.state.lock().credential.as_ref().map(Credential::ttl)
    }
}

impl std::fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("phase", &self.phase())
            .finish()
    }
}

pub(crate) struct ManagerInner {
    pub(crate) client: Arc<dyn VaultClient>,
    config: ClientConfig,
    state: Arc<Mutex<ManagerState>>,
    wake: Notify,
}

impl ManagerInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().phase == LifecyclePhase::Closed
    }

    /// Enter a new login attempt, returning its number; `None` once closed
    fn begin_attempt(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.phase == LifecyclePhase::Closed {
            return None;
        }
        state.phase = LifecyclePhase::Authenticating;
        state.login_attempts += 1;
        Some(state.login_attempts)
    }

    /// Make `credential` current; refused once closed
    fn install(&self, credential: Credential) -> bool {
        let mut state = self.state.lock();
        if state.phase == LifecyclePhase::Closed {
            return false;
        }
        self.client.set_token(credential.token());
        state.credential = Some(credential);
        state.phase = LifecyclePhase::Authenticated;
        true
    }

    fn attach_watcher(&self, watcher: LifetimeWatcher) -> bool {
        let mut state = self.state.lock();
        if state.phase == LifecyclePhase::Closed {
            watcher.stop();
            return false;
        }
        state.watcher = Some(watcher);
        state.phase = LifecyclePhase::Renewing;
        true
    }

    fn detach_watcher(&self) {
        let watcher = self.state.lock().watcher.take();
        drop(watcher);
    }

    fn refresh_ttl(&self, ttl: Duration) {
        if let Some(credential) = self.state.lock().credential.as_mut() {
            credential.refresh(ttl);
        }
    }

    /// Sleep for the login backoff, cut short by close
    async fn backoff(&self) {
        tokio::select! {
            _ = self.wake.notified() => {}
            _ = tokio::time::sleep(self.config.login_backoff) => {}
        }
    }

    fn close(&self) -> bool {
        let (watcher, trust_watch) = {
            let mut state = self.state.lock();
            if state.phase == LifecyclePhase::Closed {
                return false;
            }
            state.phase = LifecyclePhase::Closed;
            state.credential = None;
            self.client.clear_token();
            (state.watcher.take(), state.trust_watch.take())
        };

        if let Some(watcher) = watcher {
            watcher.stop();
        }
        drop(trust_watch);
        self.wake.notify_waiters();
        true
    }

    async fn run_login_cycle(
        self: Arc<Self>,
        strategy: AuthStrategy,
        identity: Arc<dyn IdentityProvider>,
        initial: oneshot::Sender<()>,
    ) {
        let mut initial = Some(initial);

        while let Some(attempt) = self.begin_attempt() {
            let request = match strategy.login_request(identity.as_ref()).await {
                Ok(request) => request,
                Err(e) => {
                    error!(method = %strategy.method(), attempt, error = %e, "failed to prepare vault login");
                    self.backoff().await;
                    continue;
                }
            };

            let secret = match self.client.login(&request).await {
                Ok(Some(secret)) => secret,
                Ok(None) => {
                    debug!(attempt, "received empty answer from vault, retrying");
                    self.backoff().await;
                    continue;
                }
                Err(e) => {
                    error!(method = %strategy.method(), attempt, error = %e, "failed to request new vault token");
                    self.backoff().await;
                    continue;
                }
            };
            let Some(credential) = secret.to_credential() else {
                debug!(attempt, "login answer carries no token, retrying");
                self.backoff().await;
                continue;
            };

            info!(
                addr = %self.config.url,
                role = %strategy.role(),
                path = %strategy.mount_path(),
                attempt,
                "received new vault token"
            );
            if !self.install(credential) {
                break;
            }
            if let Some(initial) = initial.take() {
                // Bootstrap may already have given up waiting
                let _ = initial.send(());
            }

            let (watcher, events) =
                match LifetimeWatcher::start(self.client.clone(), &secret, WatcherOptions::default())
                {
                    Ok(started) => started,
                    Err(e) => {
                        error!(error = %e, "failed to start vault token renewal");
                        self.backoff().await;
                        continue;
                    }
                };
            if !self.attach_watcher(watcher) {
                break;
            }

            self.run_renew_checker(events).await;
            self.detach_watcher();
        }

        info!("vault token renewal closed");
    }

    async fn run_renew_checker(&self, mut events: mpsc::Receiver<RenewalEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                RenewalEvent::Renewed { ttl } => {
                    info!(ttl_secs = ttl.as_secs(), "renewed vault token");
                    self.refresh_ttl(ttl);
                }
                RenewalEvent::Done(Some(e)) => {
                    error!(error = %e, "error in vault token renewal");
                    return;
                }
                RenewalEvent::Done(None) => {
                    debug!("vault token renewal finished");
                    return;
                }
            }
        }
    }
}

/// Owns the vault credential for the lifetime of the process.
///
/// Bootstrapping either adopts a directly supplied token or starts a background
/// login cycle and waits, bounded by the configured timeout, for its first token.
/// The cycle re-authenticates whenever renewal of the current token ends. Closing
/// the manager (explicitly or by dropping it) stops every background task and
/// wipes the credential.
pub struct CredentialManager {
    inner: Arc<ManagerInner>,
}

impl CredentialManager {
    /// Bootstrap against the vault over HTTP.
    ///
    /// No cloud identity provider is wired in here: a cloud auth method without a
    /// configured token is rejected up front. Use [`CredentialManager::bootstrap`]
    /// with an [`IdentityProvider`] for those.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        if config.auth_method.needs_cloud_identity() && direct_token(&config).is_none() {
            return Err(Error::configuration(format!(
                "auth method '{}' needs a cloud identity provider, use CredentialManager::bootstrap",
                config.auth_method
            )));
        }
        let client = Arc::new(HttpVaultClient::new(&config)?);
        Self::bootstrap(config, client, Arc::new(NoCloudIdentity)).await
    }

    /// Bootstrap with an explicit client and identity provider
    pub async fn bootstrap(
        config: ClientConfig,
        client: Arc<dyn VaultClient>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let manager = Self {
            inner: Arc::new(ManagerInner {
                client,
                config,
                state: Arc::new(Mutex::new(ManagerState::default())),
                wake: Notify::new(),
            }),
        };

        match direct_token(&manager.inner.config) {
            Some((token, origin)) => {
                match &origin {
                    TokenOrigin::Configured => info!("using configured vault token"),
                    TokenOrigin::File(path) => {
                        info!(path = %path.display(), "using vault token from file")
                    }
                }
                manager.inner.install(Credential::from_token(token));
            }
            None => manager.login(identity).await?,
        }

        manager.watch_trust_roots();
        Ok(manager)
    }

    async fn login(&self, identity: Arc<dyn IdentityProvider>) -> Result<()> {
        let strategy = AuthStrategy::from_config(&self.inner.config);
        let method = strategy.method();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(self.inner.clone().run_login_cycle(strategy, identity, tx));

        let timeout = self.inner.config.timeout;
        tokio::select! {
            arrived = rx => match arrived {
                Ok(()) => {
                    info!("initial vault token arrived");
                    Ok(())
                }
                Err(_) => {
                    self.close();
                    Err(Error::authentication(
                        method.as_str(),
                        "login cycle stopped before a token arrived",
                    ))
                }
            },
            _ = tokio::time::sleep(timeout) => {
                self.close();
                Err(Error::timeout("vault token", timeout))
            }
        }
    }

    fn watch_trust_roots(&self) {
        let config = &self.inner.config;
        let Some(ca_cert) = config.ca_cert.as_deref() else {
            return;
        };
        if !config.ca_cert_reload {
            return;
        }

        match trust::start(self.inner.clone(), ca_cert) {
            Ok(watch) => self.attach_trust_watch(watch),
            Err(e) => error!(path = %ca_cert.display(), error = %e, "failed to watch CA certificate"),
        }
    }

    pub(crate) fn attach_trust_watch(&self, watch: TrustRootWatch) {
        let mut state = self.inner.state.lock();
        if state.phase != LifecyclePhase::Closed {
            state.trust_watch = Some(watch);
        }
    }

    pub(crate) fn inner(&self) -> Arc<ManagerInner> {
        self.inner.clone()
    }

    /// The current token; `None` after close
    pub fn token(&self) -> Option<String> {
        self.handle().token()
    }

    pub fn handle(&self) -> CredentialHandle {
        CredentialHandle {
            state: self.inner.state.clone(),
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.inner.state.lock().phase
    }

    /// Number of login attempts made so far
    pub fn login_attempts(&self) -> u64 {
        self.inner.state.lock().login_attempts
    }

    /// The authenticated client
    pub fn client(&self) -> Arc<dyn VaultClient> {
        self.inner.client.clone()
    }

    /// Stop renewal and trust-root watching and destroy the credential.
    ///
    /// Safe to call more than once.
    pub fn close(&self) {
        if self.inner.close() {
            info!("vault credential manager closed");
        }
    }
}

impl Drop for CredentialManager {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("phase", &self.phase())
            .field("config", &self.inner.config)
            .finish()
    }
}
