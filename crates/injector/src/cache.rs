use baokit_core::{SecretData, REFERENCE_SEPARATOR};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct CacheMaps {
    transit: HashMap<String, Vec<u8>>,
    secrets: HashMap<String, Arc<SecretData>>,
}

/// Decrypted ciphertexts and fetched secret paths, shared across resolution calls.
///
/// Both maps sit behind one lock and only ever grow. The lock is never held across
/// an await, so two callers missing the same entry may both fetch it; the first
/// insert is kept.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    maps: RwLock<CacheMaps>,
}

/// Cache key of a secret path at a version, or under a write payload
pub fn secret_cache_key(path: &str, version_or_data: &str) -> String {
    format!("{path}{REFERENCE_SEPARATOR}{version_or_data}")
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transit(&self, ciphertext: &str) -> Option<Vec<u8>> {
        self.maps.read().transit.get(ciphertext).cloned()
    }

    pub fn has_transit(&self, ciphertext: &str) -> bool {
        self.maps.read().transit.contains_key(ciphertext)
    }

    pub fn insert_transit(&self, ciphertext: impl Into<String>, plaintext: Vec<u8>) {
        self.maps
            .write()
            .transit
            .entry(ciphertext.into())
            .or_insert(plaintext);
    }

    /// The ciphertexts from `candidates` that are not cached yet
    pub fn uncached_transit<'a>(&self, candidates: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        let maps = self.maps.read();
        candidates
            .into_iter()
            .filter(|ciphertext| !maps.transit.contains_key(ciphertext.as_str()))
            .cloned()
            .collect()
    }

    pub fn secret(&self, key: &str) -> Option<Arc<SecretData>> {
        self.maps.read().secrets.get(key).cloned()
    }

    /// Insert fetched data, returning whatever is cached under `key` afterwards
    pub fn insert_secret(&self, key: impl Into<String>, data: SecretData) -> Arc<SecretData> {
        self.maps
            .write()
            .secrets
            .entry(key.into())
            .or_insert_with(|| Arc::new(data))
            .clone()
    }

    pub fn transit_len(&self) -> usize {
        self.maps.read().transit.len()
    }

    pub fn secret_len(&self) -> usize {
        self.maps.read().secrets.len()
    }
}
