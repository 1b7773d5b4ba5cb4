//! The RPC surface the credential manager and the injector consume

use crate::config::AuthMethod;
use async_trait::async_trait;
use baokit_core::{Result, Secret};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

/// One login call against an auth method mount
#[derive(Debug, Clone, PartialEq)]
pub struct LoginRequest {
    pub method: AuthMethod,
    pub mount_path: String,
    pub payload: Map<String, Value>,
}

impl LoginRequest {
    /// The logical path the login is written to
    #[must_use]
    pub fn path(&self) -> String {
        format!("auth/{}/login", self.mount_path.trim_matches('/'))
    }
}

/// Operations the vault exposes to this crate.
///
/// Implementations hold the current token; every call after a successful login is
/// authenticated with it.
#[async_trait]
pub trait VaultClient: Send + Sync {
    /// Log in, returning the auth response or `None` for an empty answer
    async fn login(&self, request: &LoginRequest) -> Result<Option<Secret>>;

    /// Read a logical path at the given version (`-1` for latest)
    async fn read(&self, path: &str, version: &str) -> Result<Option<Secret>>;

    /// Write a JSON payload to a logical path
    async fn write(&self, path: &str, payload: &Value) -> Result<Option<Secret>>;

    /// Renew the token the client currently holds
    async fn renew_token(&self, increment: Option<Duration>) -> Result<Secret>;

    /// Renew a secret lease
    async fn renew_lease(&self, lease_id: &str, increment: Option<Duration>) -> Result<Secret>;

    /// Decrypt one transit ciphertext
    async fn decrypt(&self, mount_path: &str, key_id: &str, ciphertext: &str) -> Result<Vec<u8>>;

    /// Decrypt several transit ciphertexts in one call, keyed by ciphertext
    async fn decrypt_batch(
        &self,
        mount_path: &str,
        key_id: &str,
        ciphertexts: &[String],
    ) -> Result<HashMap<String, Vec<u8>>>;

    fn token(&self) -> Option<String>;

    fn set_token(&self, token: &str);

    fn clear_token(&self);

    /// Re-read transport trust material (CA certificates) in place
    fn reload_trust_roots(&self) -> Result<()> {
        Ok(())
    }
}
