use super::trust::TrustRootWatch;
use super::*;
use crate::api::{LoginRequest, VaultClient};
use crate::auth::NoCloudIdentity;
use crate::config::{AuthMethod, ClientConfig};
use async_trait::async_trait;
use baokit_core::{Error, Result, Secret, SecretAuth};
use baokit_utils::{ChangeEvent, ChangeKind, ChangeStream};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Vault stand-in with scripted login answers
#[derive(Default)]
struct MockVault {
    logins: Mutex<VecDeque<Result<Option<Secret>>>>,
    login_calls: AtomicUsize,
    reloads: AtomicUsize,
    token: RwLock<Option<String>>,
}

impl MockVault {
    fn answering(logins: Vec<Result<Option<Secret>>>) -> Arc<Self> {
        Arc::new(Self {
            logins: Mutex::new(logins.into()),
            ..Self::default()
        })
    }

    fn unreachable() -> Arc<Self> {
        Self::answering(Vec::new())
    }

    fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VaultClient for MockVault {
    async fn login(&self, _request: &LoginRequest) -> Result<Option<Secret>> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.logins
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::transport("v1/auth/kubernetes/login", "connection refused")))
    }

    async fn read(&self, _path: &str, _version: &str) -> Result<Option<Secret>> {
        Ok(None)
    }

    async fn write(&self, _path: &str, _payload: &Value) -> Result<Option<Secret>> {
        Ok(None)
    }

    async fn renew_token(&self, _increment: Option<Duration>) -> Result<Secret> {
        Ok(auth_secret("s.renewed", 3600, true))
    }

    async fn renew_lease(&self, lease_id: &str, _increment: Option<Duration>) -> Result<Secret> {
        Err(Error::renewal(lease_id, "not supported by mock"))
    }

    async fn decrypt(&self, _mount: &str, _key: &str, _ciphertext: &str) -> Result<Vec<u8>> {
        Err(Error::decrypt("not supported by mock"))
    }

    async fn decrypt_batch(
        &self,
        _mount: &str,
        _key: &str,
        _ciphertexts: &[String],
    ) -> Result<HashMap<String, Vec<u8>>> {
        Err(Error::decrypt("not supported by mock"))
    }

    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn set_token(&self, token: &str) {
        *self.token.write() = Some(token.to_string());
    }

    fn clear_token(&self) {
        *self.token.write() = None;
    }

    fn reload_trust_roots(&self) -> Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn auth_secret(token: &str, ttl: u64, renewable: bool) -> Secret {
    Secret {
        auth: Some(SecretAuth {
            client_token: token.to_string(),
            accessor: format!("{token}-accessor"),
            lease_duration: ttl,
            renewable,
            ..SecretAuth::default()
        }),
        ..Secret::default()
    }
}

/// A login-only configuration: no token, a token file that does not exist
fn login_config(dir: &TempDir) -> ClientConfig {
    ClientConfig::default()
        .with_url("http://127.0.0.1:8200")
        .with_auth_method(AuthMethod::Namespaced)
        .with_existing_secret("sa-token")
        .with_token_path(dir.path().join("no-token"))
        .with_login_backoff(Duration::from_millis(20))
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test]
async fn test_direct_token_skips_login() {
    let vault = MockVault::unreachable();
    let config = ClientConfig::default()
        .with_url("http://127.0.0.1:8200")
        .with_token("s.direct");

    let manager = CredentialManager::bootstrap(config, vault.clone(), Arc::new(NoCloudIdentity))
        .await
        .unwrap();

    assert_eq!(manager.token().as_deref(), Some("s.direct"));
    assert_eq!(vault.token().as_deref(), Some("s.direct"));
    assert_eq!(manager.phase(), LifecyclePhase::Authenticated);
    assert_eq!(vault.login_calls(), 0);
    assert_eq!(manager.login_attempts(), 0);
}

#[tokio::test]
async fn test_connect_rejects_cloud_login_without_identity() {
    let dir = TempDir::new().unwrap();
    let config = ClientConfig::default()
        .with_url("http://127.0.0.1:1")
        .with_role("app")
        .with_auth_method(AuthMethod::AwsIam)
        .with_token_path(dir.path().join("no-token"))
        .with_timeout(Duration::from_secs(30));

    let started = std::time::Instant::now();
    let err = CredentialManager::connect(config).await.unwrap_err();

    assert!(matches!(err, Error::Configuration { .. }), "{err}");
    assert!(err.to_string().contains("aws-iam"));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_connect_with_token_ignores_cloud_method() {
    let dir = TempDir::new().unwrap();
    let config = ClientConfig::default()
        .with_url("http://127.0.0.1:1")
        .with_auth_method(AuthMethod::GcpGce)
        .with_token("s.direct")
        .with_token_path(dir.path().join("no-token"));

    let manager = CredentialManager::connect(config).await.unwrap();
    assert_eq!(manager.token().as_deref(), Some("s.direct"));
    manager.close();
}

#[tokio::test]
async fn test_token_file_skips_login() {
    let dir = TempDir::new().unwrap();
    let token_file = dir.path().join("vault-token");
    std::fs::write(&token_file, "s.from-file\n").unwrap();

    let vault = MockVault::unreachable();
    let config = ClientConfig::default()
        .with_url("http://127.0.0.1:8200")
        .with_token_path(&token_file);

    let manager = CredentialManager::bootstrap(config, vault.clone(), Arc::new(NoCloudIdentity))
        .await
        .unwrap();

    assert_eq!(manager.token().as_deref(), Some("s.from-file"));
    assert_eq!(vault.login_calls(), 0);
}

#[tokio::test]
async fn test_login_installs_token_and_starts_renewal() {
    let dir = TempDir::new().unwrap();
    let vault = MockVault::answering(vec![Ok(Some(auth_secret("s.login", 3600, true)))]);

    let manager = CredentialManager::bootstrap(
        login_config(&dir),
        vault.clone(),
        Arc::new(NoCloudIdentity),
    )
    .await
    .unwrap();

    assert_eq!(manager.token().as_deref(), Some("s.login"));
    assert_eq!(vault.token().as_deref(), Some("s.login"));
    assert!(eventually(|| manager.phase() == LifecyclePhase::Renewing).await);
    assert_eq!(manager.handle().ttl(), Some(Duration::from_secs(3600)));
}

#[tokio::test]
async fn test_empty_login_answers_are_retried() {
    let dir = TempDir::new().unwrap();
    let vault = MockVault::answering(vec![
        Ok(None),
        Ok(Some(auth_secret("", 3600, true))),
        Ok(Some(auth_secret("s.third", 3600, true))),
    ]);

    let manager = CredentialManager::bootstrap(
        login_config(&dir),
        vault.clone(),
        Arc::new(NoCloudIdentity),
    )
    .await
    .unwrap();

    assert_eq!(manager.token().as_deref(), Some("s.third"));
    assert_eq!(vault.login_calls(), 3);
    assert_eq!(manager.login_attempts(), 3);
}

#[tokio::test]
async fn test_bootstrap_timeout_closes_manager() {
    let dir = TempDir::new().unwrap();
    let vault = MockVault::unreachable();
    let config = login_config(&dir).with_timeout(Duration::from_millis(200));

    let err = CredentialManager::bootstrap(config, vault.clone(), Arc::new(NoCloudIdentity))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert!(vault.login_calls() > 1);

    // The login cycle is gone: no further attempts after close
    let calls_at_close = vault.login_calls();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(vault.login_calls(), calls_at_close);
    assert!(vault.token().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_expired_token_triggers_new_login() {
    let dir = TempDir::new().unwrap();
    let vault = MockVault::answering(vec![
        Ok(Some(auth_secret("s.short", 5, false))),
        Ok(Some(auth_secret("s.long", 3600, true))),
    ]);

    let manager = CredentialManager::bootstrap(
        login_config(&dir),
        vault.clone(),
        Arc::new(NoCloudIdentity),
    )
    .await
    .unwrap();
    assert_eq!(manager.token().as_deref(), Some("s.short"));

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(vault.login_calls(), 2);
    assert_eq!(manager.token().as_deref(), Some("s.long"));
}

#[tokio::test]
async fn test_close_is_idempotent_and_wipes_credential() {
    let dir = TempDir::new().unwrap();
    let vault = MockVault::answering(vec![Ok(Some(auth_secret("s.login", 3600, true)))]);

    let manager = CredentialManager::bootstrap(
        login_config(&dir),
        vault.clone(),
        Arc::new(NoCloudIdentity),
    )
    .await
    .unwrap();
    let handle = manager.handle();

    manager.close();
    manager.close();

    assert_eq!(manager.phase(), LifecyclePhase::Closed);
    assert!(manager.token().is_none());
    assert!(handle.token().is_none());
    assert!(handle.ttl().is_none());
    assert!(vault.token().is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(vault.login_calls(), 1);
}

#[tokio::test]
async fn test_trust_roots_reload_on_certificate_change() {
    let vault = MockVault::unreachable();
    let config = ClientConfig::default()
        .with_url("http://127.0.0.1:8200")
        .with_token("s.direct");
    let manager = CredentialManager::bootstrap(config, vault.clone(), Arc::new(NoCloudIdentity))
        .await
        .unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let stream: ChangeStream = Box::pin(UnboundedReceiverStream::new(rx));
    let ca_cert = std::path::PathBuf::from("/etc/vault/tls/ca.crt");
    manager.attach_trust_watch(TrustRootWatch::from_stream(
        manager.inner(),
        ca_cert,
        stream,
    ));

    tx.send(Ok(ChangeEvent::new("/etc/vault/tls/tls.key", ChangeKind::Write)))
        .unwrap();
    tx.send(Ok(ChangeEvent::new("/etc/vault/tls/ca.crt", ChangeKind::Write)))
        .unwrap();
    tx.send(Ok(ChangeEvent::new("/etc/vault/tls/..data", ChangeKind::Create)))
        .unwrap();

    assert!(eventually(|| vault.reloads() == 2).await);

    manager.close();
    let _ = tx.send(Ok(ChangeEvent::new("/etc/vault/tls/ca.crt", ChangeKind::Write)));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(vault.reloads(), 2);
}

#[tokio::test]
async fn test_trust_roots_reload_from_watched_directory() {
    let dir = TempDir::new().unwrap();
    let ca_cert = dir.path().join("ca.crt");
    std::fs::write(&ca_cert, "initial").unwrap();

    let vault = MockVault::unreachable();
    let config = ClientConfig::default()
        .with_url("http://127.0.0.1:8200")
        .with_token("s.direct")
        .with_ca_cert(&ca_cert, true);
    let manager = CredentialManager::bootstrap(config, vault.clone(), Arc::new(NoCloudIdentity))
        .await
        .unwrap();

    std::fs::write(&ca_cert, "rotated").unwrap();

    assert!(eventually(|| vault.reloads() >= 1).await);
    manager.close();
}
