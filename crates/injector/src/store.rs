//! Reads and writes of secret paths

use crate::cache::{secret_cache_key, ResolutionCache};
use crate::reference::{Mode, SecretReference};
use baokit_client::VaultClient;
use baokit_core::{Error, Result, Secret, SecretData};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Keeps the lease of a secret read in daemon mode alive
pub trait SecretRenewer: Send + Sync {
    fn renew(&self, path: &str, secret: &Secret) -> Result<()>;
}

/// Fetches secret paths, normalizing KV v1 and v2 response shapes
pub struct SecretPathStore {
    client: Arc<dyn VaultClient>,
    cache: Arc<ResolutionCache>,
    renewer: Option<Arc<dyn SecretRenewer>>,
    daemon_mode: bool,
}

impl SecretPathStore {
    pub fn new(
        client: Arc<dyn VaultClient>,
        cache: Arc<ResolutionCache>,
        renewer: Option<Arc<dyn SecretRenewer>>,
        daemon_mode: bool,
    ) -> Self {
        Self {
            client,
            cache,
            renewer,
            daemon_mode,
        }
    }

    /// Attributes for `reference`, from the cache or the vault.
    ///
    /// `None` means the path does not exist.
    pub async fn fetch(&self, reference: &SecretReference) -> Result<Option<Arc<SecretData>>> {
        let key = secret_cache_key(&reference.path, &reference.version_or_data);
        if let Some(data) = self.cache.secret(&key) {
            return Ok(Some(data));
        }

        let data = match reference.mode {
            Mode::Read => {
                self.read(&reference.path, &reference.version_or_data)
                    .await?
            }
            Mode::Write => {
                self.write(&reference.path, reference.write_payload()?)
                    .await?
            }
        };
        Ok(data.map(|data| self.cache.insert_secret(key, data)))
    }

    /// Read a path at a version, bypassing the cache
    pub async fn read(&self, path: &str, version: &str) -> Result<Option<SecretData>> {
        let secret = self.client.read(path, version).await?;
        self.normalize(path, version, secret)
    }

    /// Write a payload to a path, bypassing the cache
    pub async fn write(&self, path: &str, payload: SecretData) -> Result<Option<SecretData>> {
        let secret = self.client.write(path, &Value::Object(payload)).await?;
        self.normalize(path, "", secret)
    }

    fn normalize(
        &self,
        path: &str,
        version: &str,
        secret: Option<Secret>,
    ) -> Result<Option<SecretData>> {
        let Some(secret) = secret else {
            return Ok(None);
        };

        if self.daemon_mode && secret.lease_duration > 0 {
            info!(
                path,
                lease_duration = secret.lease_duration,
                "secret has a lease duration, starting renewal"
            );
            let renewer = self
                .renewer
                .as_ref()
                .ok_or_else(|| Error::renewal(path, "no lease renewer is configured"))?;
            renewer
                .renew(path, &secret)
                .map_err(|e| Error::renewal(path, e.to_string()))?;
        }

        for warning in &secret.warnings {
            warn!(path, "{warning}");
        }

        unwrap_kv2(path, version, secret.data).map(Some)
    }
}

/// Unwrap the `{data, metadata}` envelope of KV v2 reads; other shapes pass through
pub fn unwrap_kv2(path: &str, version: &str, mut data: SecretData) -> Result<SecretData> {
    let Some(inner) = data.remove("data") else {
        return Ok(data);
    };

    let metadata = match data.get("metadata") {
        None | Some(Value::Null) => {
            return Err(Error::configuration(format!(
                "metadata key not found or is nil in secret: {path}"
            )))
        }
        Some(Value::Object(metadata)) => metadata,
        Some(_) => {
            return Err(Error::configuration(format!(
                "metadata has an unexpected type in secret: {path}"
            )))
        }
    };

    if metadata.get("destroyed").and_then(Value::as_bool) == Some(true) {
        warn!(path, version, "version of secret has been permanently destroyed");
    }
    if let Some(deletion_time) = metadata
        .get("deletion_time")
        .and_then(Value::as_str)
        .filter(|time| !time.is_empty())
    {
        warn!(
            path,
            version,
            deletion_time,
            "cannot find data for path, given version has been deleted"
        );
    }

    Ok(match inner {
        Value::Object(map) => map,
        _ => SecretData::new(),
    })
}

/// The KV v2 write envelope with a check-and-set version
pub fn kv2_payload(cas: u64, data: SecretData) -> Value {
    json!({
        "options": { "cas": cas },
        "data": data,
    })
}
