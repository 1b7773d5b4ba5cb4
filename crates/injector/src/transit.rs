//! Transit decryption with batching and caching

use crate::cache::ResolutionCache;
use crate::config::InjectorConfig;
use crate::reference::{ciphertext_payload, is_transit_ciphertext};
use baokit_client::VaultClient;
use baokit_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Decrypts transit ciphertext values and remembers every plaintext it obtains
pub struct TransitDecryptor {
    client: Arc<dyn VaultClient>,
    cache: Arc<ResolutionCache>,
    mount_path: String,
    key_id: String,
    batch_size: usize,
}

/// Split `items` into consecutive chunks of at most `batch_size`
pub fn paginate<T: Clone>(items: &[T], batch_size: usize) -> Vec<Vec<T>> {
    items
        .chunks(batch_size.max(1))
        .map(<[T]>::to_vec)
        .collect()
}

impl TransitDecryptor {
    pub fn new(
        client: Arc<dyn VaultClient>,
        cache: Arc<ResolutionCache>,
        config: &InjectorConfig,
    ) -> Self {
        Self {
            client,
            cache,
            mount_path: config.transit_path.clone(),
            key_id: config.transit_key_id.clone(),
            batch_size: config.transit_batch_size,
        }
    }

    pub fn is_encrypted(&self, value: &str) -> bool {
        is_transit_ciphertext(value)
    }

    fn ensure_key(&self, subject: &str) -> Result<()> {
        if self.key_id.is_empty() {
            return Err(Error::configuration(format!(
                "found encrypted variable, but transit key ID is empty: {subject}"
            )));
        }
        Ok(())
    }

    /// Decrypt one value, consulting the cache first
    pub async fn decrypt(&self, value: &str) -> Result<Vec<u8>> {
        self.ensure_key(value)?;
        if let Some(plaintext) = self.cache.transit(value) {
            return Ok(plaintext);
        }

        let plaintext = self
            .client
            .decrypt(&self.mount_path, &self.key_id, ciphertext_payload(value))
            .await
            .map_err(|e| Error::decrypt_with_source("variable", e))?;
        self.cache.insert_transit(value, plaintext.clone());
        Ok(plaintext)
    }

    /// Split `values` into the chunks sent as one batch each
    pub fn batches(&self, values: &[String]) -> Vec<Vec<String>> {
        paginate(values, self.batch_size)
    }

    /// Decrypt one chunk with a single RPC, caching every plaintext
    pub async fn decrypt_chunk(&self, chunk: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        if chunk.is_empty() {
            return Ok(HashMap::new());
        }
        self.ensure_key(&chunk.join(", "))?;

        let payloads: Vec<String> = chunk
            .iter()
            .map(|value| ciphertext_payload(value).to_string())
            .collect();
        debug!(count = chunk.len(), mount = %self.mount_path, "decrypting transit batch");

        let plaintexts = self
            .client
            .decrypt_batch(&self.mount_path, &self.key_id, &payloads)
            .await
            .map_err(|e| Error::decrypt_with_source(format!("batch of {}", chunk.len()), e))?;

        let mut decrypted = HashMap::with_capacity(chunk.len());
        for (value, payload) in chunk.iter().zip(&payloads) {
            if let Some(plaintext) = plaintexts.get(payload) {
                self.cache.insert_transit(value.as_str(), plaintext.clone());
                decrypted.insert(value.clone(), plaintext.clone());
            }
        }
        Ok(decrypted)
    }

    /// Decrypt many values, one RPC per chunk of `transit_batch_size`.
    ///
    /// Results are keyed by the values passed in. The first failing chunk ends the
    /// call; chunks decrypted before it stay cached.
    pub async fn decrypt_batch(&self, values: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let mut decrypted = HashMap::with_capacity(values.len());
        for chunk in self.batches(values) {
            decrypted.extend(self.decrypt_chunk(&chunk).await?);
        }
        Ok(decrypted)
    }
}
