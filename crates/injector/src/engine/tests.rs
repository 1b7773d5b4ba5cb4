use super::*;
use crate::reference::Mode;
use async_trait::async_trait;
use baokit_client::LoginRequest;
use baokit_core::Secret;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory vault: secrets keyed by (path, version), plaintexts keyed by ciphertext
#[derive(Default)]
struct MockVault {
    secrets: Mutex<HashMap<(String, String), Secret>>,
    written: Mutex<Vec<(String, Value)>>,
    plaintexts: Mutex<HashMap<String, Vec<u8>>>,
    batch_sizes: Mutex<Vec<usize>>,
    reads: AtomicUsize,
    single_decrypts: AtomicUsize,
    fail_decrypt: AtomicBool,
    token: RwLock<Option<String>>,
}

impl MockVault {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn put(&self, path: &str, version: &str, secret: Secret) {
        self.secrets
            .lock()
            .insert((path.to_string(), version.to_string()), secret);
    }

    fn put_kv2(&self, path: &str, version: &str, data: Value) {
        self.put(path, version, kv2(data));
    }

    fn put_plaintext(&self, ciphertext: &str, plaintext: &str) {
        self.plaintexts
            .lock()
            .insert(ciphertext.to_string(), plaintext.as_bytes().to_vec());
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn batches(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }

    fn plaintext(&self, ciphertext: &str) -> Result<Vec<u8>> {
        if self.fail_decrypt.load(Ordering::SeqCst) {
            return Err(Error::transport_status("v1/transit/decrypt/app", 400, "invalid ciphertext"));
        }
        self.plaintexts
            .lock()
            .get(ciphertext)
            .cloned()
            .ok_or_else(|| Error::decrypt("cipher: message authentication failed"))
    }
}

#[async_trait]
impl VaultClient for MockVault {
    async fn login(&self, _request: &LoginRequest) -> Result<Option<Secret>> {
        Ok(None)
    }

    async fn read(&self, path: &str, version: &str) -> Result<Option<Secret>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .secrets
            .lock()
            .get(&(path.to_string(), version.to_string()))
            .cloned())
    }

    async fn write(&self, path: &str, payload: &Value) -> Result<Option<Secret>> {
        self.written.lock().push((path.to_string(), payload.clone()));
        Ok(self
            .secrets
            .lock()
            .get(&(path.to_string(), "write".to_string()))
            .cloned())
    }

    async fn renew_token(&self, _increment: Option<Duration>) -> Result<Secret> {
        Err(Error::renewal("token", "not supported by mock"))
    }

    async fn renew_lease(&self, lease_id: &str, _increment: Option<Duration>) -> Result<Secret> {
        Err(Error::renewal(lease_id, "not supported by mock"))
    }

    async fn decrypt(&self, _mount: &str, _key: &str, ciphertext: &str) -> Result<Vec<u8>> {
        self.single_decrypts.fetch_add(1, Ordering::SeqCst);
        self.plaintext(ciphertext)
    }

    async fn decrypt_batch(
        &self,
        _mount: &str,
        _key: &str,
        ciphertexts: &[String],
    ) -> Result<HashMap<String, Vec<u8>>> {
        self.batch_sizes.lock().push(ciphertexts.len());
        ciphertexts
            .iter()
            .map(|ciphertext| Ok((ciphertext.clone(), self.plaintext(ciphertext)?)))
            .collect()
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
}

/// Records lease registrations
#[derive(Default)]
struct RecordingRenewer {
    registered: Mutex<Vec<(String, u64)>>,
    fail: bool,
}

impl SecretRenewer for RecordingRenewer {
    fn renew(&self, path: &str, secret: &Secret) -> Result<()> {
        if self.fail {
            return Err(Error::configuration("lease watcher unavailable"));
        }
        self.registered
            .lock()
            .push((path.to_string(), secret.lease_duration));
        Ok(())
    }
}

fn kv2(data: Value) -> Secret {
    let envelope = json!({
        "data": data,
        "metadata": {"version": 1, "destroyed": false, "deletion_time": ""}
    });
    match envelope {
        Value::Object(map) => Secret::with_data(map),
        _ => unreachable!(),
    }
}

fn refs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(name, raw)| (name.to_string(), raw.to_string()))
        .collect()
}

fn injector(vault: &Arc<MockVault>, config: InjectorConfig) -> SecretInjector {
    SecretInjector::new(config, vault.clone()).unwrap()
}

fn transit_config() -> InjectorConfig {
    InjectorConfig::default().with_transit_key("app")
}

#[tokio::test]
async fn test_literals_pass_through() {
    let vault = MockVault::new();
    let resolved = injector(&vault, InjectorConfig::default())
        .resolve_to_map(&refs(&[("PLAIN", "value"), ("EMPTY", ""), ("URL", "https://x")]))
        .await
        .unwrap();

    assert_eq!(resolved["PLAIN"], "value");
    assert_eq!(resolved["EMPTY"], "");
    assert_eq!(resolved["URL"], "https://x");
    assert_eq!(vault.reads(), 0);
}

#[tokio::test]
async fn test_token_echo_uses_client_token() {
    let vault = MockVault::new();
    vault.set_token("s.live");

    let resolved = injector(&vault, InjectorConfig::default())
        .resolve_to_map(&refs(&[("BAO_TOKEN", "bao:login")]))
        .await
        .unwrap();
    assert_eq!(resolved["BAO_TOKEN"], "s.live");
    assert_eq!(vault.reads(), 0);
}

#[tokio::test]
async fn test_token_echo_prefers_credential_handle() {
    let vault = MockVault::new();
    vault.set_token("s.client");

    let resolved = injector(&vault, InjectorConfig::default())
        .with_credential(CredentialHandle::fixed("s.handle"))
        .resolve_to_map(&refs(&[("BAO_TOKEN", "bao:login")]))
        .await
        .unwrap();
    assert_eq!(resolved["BAO_TOKEN"], "s.handle");
}

#[tokio::test]
async fn test_token_echo_without_token_fails() {
    let vault = MockVault::new();
    let err = injector(&vault, InjectorConfig::default())
        .resolve_to_map(&refs(&[("BAO_TOKEN", "bao:login")]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }));
}

#[tokio::test]
async fn test_path_is_read_once_and_cached() {
    let vault = MockVault::new();
    vault.put_kv2("secret/data/app", "-1", json!({"user": "app", "password": "hunter2"}));
    let injector = injector(&vault, InjectorConfig::default());

    let references = refs(&[
        ("USER", "bao:secret/data/app#user"),
        ("PASSWORD", "bao:secret/data/app#password"),
    ]);
    let resolved = injector.resolve_to_map(&references).await.unwrap();
    assert_eq!(resolved["USER"], "app");
    assert_eq!(resolved["PASSWORD"], "hunter2");
    assert_eq!(vault.reads(), 1);

    injector.resolve_to_map(&references).await.unwrap();
    assert_eq!(vault.reads(), 1);
    assert_eq!(injector.cache().secret_len(), 1);
}

#[tokio::test]
async fn test_versions_are_cached_separately() {
    let vault = MockVault::new();
    vault.put_kv2("secret/data/app", "1", json!({"k": "v1"}));
    vault.put_kv2("secret/data/app", "2", json!({"k": "v2"}));
    vault.put_kv2("secret/data/app", "-1", json!({"k": "v3"}));

    let resolved = injector(&vault, InjectorConfig::default())
        .resolve_to_map(&refs(&[
            ("X", "bao:secret/data/app#k#1"),
            ("Y", "bao:secret/data/app#k#2"),
            ("Z", "bao:secret/data/app#k"),
        ]))
        .await
        .unwrap();

    assert_eq!(resolved["X"], "v1");
    assert_eq!(resolved["Y"], "v2");
    assert_eq!(resolved["Z"], "v3");
    assert_eq!(vault.reads(), 3);
}

#[tokio::test]
async fn test_kv1_shape_is_used_directly() {
    let vault = MockVault::new();
    let mut data = SecretData::new();
    data.insert("port".into(), json!(5432));
    vault.put("kv/app", "-1", Secret::with_data(data));

    let resolved = injector(&vault, InjectorConfig::default())
        .resolve_to_map(&refs(&[("PORT", "bao:kv/app#port")]))
        .await
        .unwrap();
    assert_eq!(resolved["PORT"], "5432");
}

#[tokio::test]
async fn test_missing_path_is_fatal_by_default() {
    let vault = MockVault::new();
    let err = injector(&vault, InjectorConfig::default())
        .resolve_to_map(&refs(&[("X", "bao:missing/path#k")]))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "path not found: missing/path");
}

#[tokio::test]
async fn test_missing_path_is_skipped_when_ignored() {
    let vault = MockVault::new();
    let mut delivered = Vec::new();
    injector(&vault, InjectorConfig::default().ignore_missing_secrets(true))
        .resolve(
            &refs(&[("X", "bao:missing/path#k"), ("Y", "kept")]),
            |name, value| delivered.push((name.to_string(), value.to_string())),
        )
        .await
        .unwrap();
    assert_eq!(delivered, vec![("Y".to_string(), "kept".to_string())]);
}

#[tokio::test]
async fn test_missing_key_reports_path() {
    let vault = MockVault::new();
    vault.put_kv2("secret/data/app", "-1", json!({"user": "app"}));

    let err = injector(&vault, InjectorConfig::default())
        .resolve_to_map(&refs(&[("X", "bao:secret/data/app#nope")]))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "key 'nope' not found under path: secret/data/app"
    );
}

#[tokio::test]
async fn test_non_scalar_value_is_fatal_even_when_ignoring() {
    let vault = MockVault::new();
    vault.put_kv2("secret/data/app", "-1", json!({"hosts": ["a", "b"]}));

    let err = injector(&vault, InjectorConfig::default().ignore_missing_secrets(true))
        .resolve_to_map(&refs(&[("HOSTS", "bao:secret/data/app#hosts")]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

#[tokio::test]
async fn test_template_key_is_rendered() {
    let vault = MockVault::new();
    vault.put_kv2("secret/data/db", "-1", json!({"user": "app", "password": "hunter2"}));

    let resolved = injector(&vault, InjectorConfig::default())
        .resolve_to_map(&refs(&[(
            "DSN",
            "bao:secret/data/db#postgres://{{ .user }}:{{ .password }}@db",
        )]))
        .await
        .unwrap();
    assert_eq!(resolved["DSN"], "postgres://app:hunter2@db");
}

#[tokio::test]
async fn test_template_errors_are_fatal() {
    let vault = MockVault::new();
    vault.put_kv2("secret/data/db", "-1", json!({"user": "app"}));

    let err = injector(&vault, InjectorConfig::default().ignore_missing_secrets(true))
        .resolve_to_map(&refs(&[("DSN", "bao:secret/data/db#{{ .missing }}")]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Template { .. }));
}

#[tokio::test]
async fn test_each_ciphertext_is_decrypted_once() {
    let vault = MockVault::new();
    vault.put_plaintext("vault:v1:aaa", "hello");
    let injector = injector(&vault, transit_config());

    let references = refs(&[
        ("A", "bao:vault:v1:aaa"),
        ("B", "bao:vault:v1:aaa"),
        ("C", "greeting=${bao:vault:v1:aaa}"),
    ]);
    let resolved = injector.resolve_to_map(&references).await.unwrap();

    assert_eq!(resolved["A"], "hello");
    assert_eq!(resolved["B"], "hello");
    assert_eq!(resolved["C"], "greeting=hello");
    // bao:vault:v1:aaa is one distinct value, shared by the top-level and inline use
    assert_eq!(vault.batches(), vec![1]);

    injector.resolve_to_map(&references).await.unwrap();
    assert_eq!(vault.batches(), vec![1]);
    assert_eq!(vault.single_decrypts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transit_batches_are_paginated() {
    let vault = MockVault::new();
    let mut pairs = Vec::new();
    for i in 0..5 {
        vault.put_plaintext(&format!("vault:v1:c{i}"), &format!("p{i}"));
        pairs.push((format!("V{i}"), format!("vault:v1:c{i}")));
    }
    let references: HashMap<String, String> = pairs.into_iter().collect();

    let resolved = injector(&vault, transit_config().with_transit_batch_size(2))
        .resolve_to_map(&references)
        .await
        .unwrap();

    assert_eq!(resolved.len(), 5);
    assert_eq!(resolved["V3"], "p3");
    assert_eq!(vault.batches(), vec![2, 2, 1]);
}

#[tokio::test]
async fn test_ciphertext_without_transit_key_is_fatal() {
    let vault = MockVault::new();
    let err = injector(&vault, InjectorConfig::default())
        .resolve_to_map(&refs(&[("A", "bao:vault:v1:aaa")]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(vault.batches().is_empty());
}

#[tokio::test]
async fn test_decrypt_failure_is_fatal_by_default() {
    let vault = MockVault::new();
    vault.fail_decrypt.store(true, Ordering::SeqCst);

    let err = injector(&vault, transit_config())
        .resolve_to_map(&refs(&[("A", "bao:vault:v1:aaa")]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Decrypt { .. }));
}

#[tokio::test]
async fn test_decrypt_failure_is_skipped_when_ignored() {
    let vault = MockVault::new();
    vault.fail_decrypt.store(true, Ordering::SeqCst);

    let resolved = injector(&vault, transit_config().ignore_missing_secrets(true))
        .resolve_to_map(&refs(&[("A", "bao:vault:v1:aaa"), ("B", "plain")]))
        .await
        .unwrap();

    assert!(!resolved.contains_key("A"));
    assert_eq!(resolved["B"], "plain");
    // No second attempt outside the batch
    assert_eq!(vault.batches(), vec![1]);
    assert_eq!(vault.single_decrypts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_batch_does_not_drop_later_batches() {
    let vault = MockVault::new();
    vault.put_plaintext("vault:v1:b", "bee");
    vault.put_plaintext("vault:v1:c", "sea");

    let config = transit_config()
        .with_transit_batch_size(1)
        .ignore_missing_secrets(true);
    let resolved = injector(&vault, config)
        .resolve_to_map(&refs(&[
            ("A", "vault:v1:a"),
            ("B", "vault:v1:b"),
            ("C", "vault:v1:c"),
        ]))
        .await
        .unwrap();

    assert!(!resolved.contains_key("A"));
    assert_eq!(resolved["B"], "bee");
    assert_eq!(resolved["C"], "sea");
    assert_eq!(vault.batches(), vec![1, 1, 1]);
}

#[tokio::test]
async fn test_failed_batch_is_fatal_by_default() {
    let vault = MockVault::new();
    vault.put_plaintext("vault:v1:b", "bee");

    let err = injector(&vault, transit_config().with_transit_batch_size(1))
        .resolve_to_map(&refs(&[("A", "vault:v1:a"), ("B", "vault:v1:b")]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Decrypt { .. }));
    assert_eq!(vault.batches(), vec![1]);
}

#[tokio::test]
async fn test_inline_mixes_transit_and_secret_spans() {
    let vault = MockVault::new();
    vault.put_plaintext("vault:v1:aaa", "s3cret");
    vault.put_kv2("secret/data/db", "-1", json!({"user": "app"}));

    let resolved = injector(&vault, transit_config())
        .resolve_to_map(&refs(&[(
            "DSN",
            "postgres://${bao:secret/data/db#user}:${bao:vault:v1:aaa}@db",
        )]))
        .await
        .unwrap();
    assert_eq!(resolved["DSN"], "postgres://app:s3cret@db");
}

#[tokio::test]
async fn test_inline_secret_spans() {
    let vault = MockVault::new();
    vault.put_kv2("secret/data/db", "-1", json!({"user": "app", "host": "db.internal"}));

    let resolved = injector(&vault, InjectorConfig::default())
        .resolve_to_map(&refs(&[(
            "DSN",
            "postgres://${bao:secret/data/db#user}@${bao:secret/data/db#host}:5432",
        )]))
        .await
        .unwrap();
    assert_eq!(resolved["DSN"], "postgres://app@db.internal:5432");
    assert_eq!(vault.reads(), 1);
}

#[tokio::test]
async fn test_skipped_inline_span_is_left_in_place() {
    let vault = MockVault::new();
    let resolved = injector(&vault, InjectorConfig::default().ignore_missing_secrets(true))
        .resolve_to_map(&refs(&[("DSN", "user=${bao:missing/path#user}")]))
        .await
        .unwrap();
    assert_eq!(resolved["DSN"], "user=${bao:missing/path#user}");
}

#[tokio::test]
async fn test_transit_inline_values_are_delivered_first() {
    let vault = MockVault::new();
    vault.put_plaintext("vault:v1:aaa", "hello");

    let mut order = Vec::new();
    injector(&vault, transit_config())
        .resolve(
            &refs(&[
                ("A", "literal"),
                ("B", "x=${bao:vault:v1:aaa}"),
                ("C", "another"),
            ]),
            |name, _| order.push(name.to_string()),
        )
        .await
        .unwrap();

    assert_eq!(order.len(), 3);
    assert_eq!(order[0], "B");
}

#[tokio::test]
async fn test_write_reference_submits_payload_once() {
    let vault = MockVault::new();
    vault.put(
        "pki/issue/app",
        "write",
        Secret::with_data(match json!({"certificate": "-----BEGIN CERTIFICATE-----"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }),
    );
    let injector = injector(&vault, InjectorConfig::default());

    let references = refs(&[(
        "CERT",
        r#">>bao:pki/issue/app#certificate#{"common_name":"app.internal"}"#,
    )]);
    let resolved = injector.resolve_to_map(&references).await.unwrap();
    assert_eq!(resolved["CERT"], "-----BEGIN CERTIFICATE-----");

    injector.resolve_to_map(&references).await.unwrap();
    let written = vault.written.lock().clone();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].0, "pki/issue/app");
    assert_eq!(written[0].1, json!({"common_name": "app.internal"}));
}

#[tokio::test]
async fn test_daemon_mode_registers_leases() {
    let vault = MockVault::new();
    let mut secret = kv2(json!({"username": "v-app"}));
    secret.lease_id = "database/creds/app/1".into();
    secret.lease_duration = 300;
    vault.put("database/creds/app", "-1", secret);

    let renewer = Arc::new(RecordingRenewer::default());
    let resolved = injector(&vault, InjectorConfig::default().daemon_mode(true))
        .with_renewer(renewer.clone())
        .resolve_to_map(&refs(&[("DB_USER", "bao:database/creds/app#username")]))
        .await
        .unwrap();

    assert_eq!(resolved["DB_USER"], "v-app");
    assert_eq!(
        renewer.registered.lock().as_slice(),
        &[("database/creds/app".to_string(), 300)]
    );
}

#[tokio::test]
async fn test_daemon_mode_registration_failure_is_fatal() {
    let vault = MockVault::new();
    let mut secret = kv2(json!({"username": "v-app"}));
    secret.lease_duration = 300;
    vault.put("database/creds/app", "-1", secret);

    let renewer = Arc::new(RecordingRenewer {
        fail: true,
        ..RecordingRenewer::default()
    });
    let err = injector(&vault, InjectorConfig::default().daemon_mode(true))
        .with_renewer(renewer)
        .resolve_to_map(&refs(&[("DB_USER", "bao:database/creds/app#username")]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Renewal { .. }));
}

#[tokio::test]
async fn test_leases_are_not_registered_outside_daemon_mode() {
    let vault = MockVault::new();
    let mut secret = kv2(json!({"username": "v-app"}));
    secret.lease_duration = 300;
    vault.put("database/creds/app", "-1", secret);

    let renewer = Arc::new(RecordingRenewer::default());
    injector(&vault, InjectorConfig::default())
        .with_renewer(renewer.clone())
        .resolve_to_map(&refs(&[("DB_USER", "bao:database/creds/app#username")]))
        .await
        .unwrap();
    assert!(renewer.registered.lock().is_empty());
}

#[tokio::test]
async fn test_resolve_paths_injects_every_key() {
    let vault = MockVault::new();
    vault.put_kv2("secret/data/a", "-1", json!({"A1": "1", "A2": true}));
    vault.put_kv2("secret/data/b", "2", json!({"B1": "b"}));
    let injector = injector(&vault, InjectorConfig::default());

    let mut delivered = HashMap::new();
    injector
        .resolve_paths("secret/data/a,secret/data/b#2", |key, value| {
            delivered.insert(key.to_string(), value.to_string());
        })
        .await
        .unwrap();

    assert_eq!(delivered.len(), 3);
    assert_eq!(delivered["A2"], "true");
    assert_eq!(delivered["B1"], "b");

    // Whole-path reads bypass the cache
    injector.resolve_paths("secret/data/a", |_, _| {}).await.unwrap();
    assert_eq!(vault.reads(), 3);
    assert_eq!(injector.cache().secret_len(), 0);
}

#[tokio::test]
async fn test_resolve_paths_missing_path_policy() {
    let vault = MockVault::new();
    let strict = injector(&vault, InjectorConfig::default());
    assert!(strict.resolve_paths("secret/data/none", |_, _| {}).await.is_err());

    let lenient = injector(&vault, InjectorConfig::default().ignore_missing_secrets(true));
    let mut calls = 0;
    lenient
        .resolve_paths("secret/data/none", |_, _| calls += 1)
        .await
        .unwrap();
    assert_eq!(calls, 0);
}

#[tokio::test]
async fn test_parse_errors_abort_the_call() {
    let vault = MockVault::new();
    let mut calls = 0;
    let err = injector(&vault, InjectorConfig::default())
        .resolve(&refs(&[("X", "bao:secret/data/app")]), |_, _| calls += 1)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("secret data key or template not defined"));
    assert_eq!(calls, 0);
}

#[tokio::test]
async fn test_concurrent_calls_share_the_cache() {
    let vault = MockVault::new();
    vault.put_kv2("secret/data/app", "-1", json!({"user": "app"}));
    let injector = injector(&vault, InjectorConfig::default());
    let references = refs(&[("USER", "bao:secret/data/app#user")]);

    let (first, second) = tokio::join!(
        injector.resolve_to_map(&references),
        injector.resolve_to_map(&references)
    );
    assert_eq!(first.unwrap()["USER"], "app");
    assert_eq!(second.unwrap()["USER"], "app");
    // Concurrent misses may both read; never more than once per caller
    assert!((1..=2).contains(&vault.reads()));
    assert_eq!(injector.cache().secret_len(), 1);
}

#[test]
fn test_write_reference_mode() {
    match reference::parse("X", ">>bao:kv/app#k").unwrap() {
        Reference::Secret(reference) => assert_eq!(reference.mode, Mode::Write),
        other => panic!("unexpected reference: {other:?}"),
    }
}
