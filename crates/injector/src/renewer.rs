use crate::store::SecretRenewer;
use baokit_client::{LifetimeWatcher, RenewalEvent, VaultClient, WatcherOptions};
use baokit_core::{Result, Secret};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Daemon-mode renewer: one lifetime watcher per leased secret path.
///
/// A path registered again replaces its previous watcher. Dropping the renewer
/// stops all watchers.
pub struct LeaseRenewer {
    client: Arc<dyn VaultClient>,
    options: WatcherOptions,
    watchers: Mutex<HashMap<String, LifetimeWatcher>>,
}

impl LeaseRenewer {
    pub fn new(client: Arc<dyn VaultClient>) -> Self {
        Self::with_options(client, WatcherOptions::default())
    }

    pub fn with_options(client: Arc<dyn VaultClient>, options: WatcherOptions) -> Self {
        Self {
            client,
            options,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Paths with a running watcher
    pub fn active(&self) -> usize {
        self.watchers
            .lock()
            .values()
            .filter(|watcher| !watcher.is_stopped())
            .count()
    }

    pub fn stop_all(&self) {
        let watchers: Vec<_> = self.watchers.lock().drain().collect();
        for (_, watcher) in watchers {
            watcher.stop();
        }
    }
}

impl SecretRenewer for LeaseRenewer {
    fn renew(&self, path: &str, secret: &Secret) -> Result<()> {
        let (watcher, mut events) =
            LifetimeWatcher::start(self.client.clone(), secret, self.options.clone())?;

        let watched = path.to_string();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    RenewalEvent::Renewed { ttl } => {
                        info!(path = %watched, ttl_secs = ttl.as_secs(), "secret lease renewed");
                    }
                    RenewalEvent::Done(Some(e)) => {
                        error!(path = %watched, error = %e, "secret lease renewal failed");
                        break;
                    }
                    RenewalEvent::Done(None) => {
                        info!(path = %watched, "secret lease renewal finished");
                        break;
                    }
                }
            }
        });

        self.watchers.lock().insert(path.to_string(), watcher);
        Ok(())
    }
}

impl Drop for LeaseRenewer {
    fn drop(&mut self) {
        self.stop_all();
    }
}
