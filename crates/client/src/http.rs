//! HTTP implementation of [`VaultClient`] on top of `reqwest`

use crate::api::{LoginRequest, VaultClient};
use crate::config::ClientConfig;
use async_trait::async_trait;
use base64::Engine;
use baokit_core::{
    Error, Result, Secret, LATEST_VERSION, NAMESPACE_HEADER, REQUEST_HEADER, TOKEN_HEADER,
};
use baokit_utils::{retry_async, RequestKind, RetryConfig};
use parking_lot::RwLock;
use reqwest::{Method, Response, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct TlsOptions {
    ca_cert: Option<PathBuf>,
    skip_verify: bool,
}

/// Talks to the vault HTTP API.
///
/// The underlying `reqwest::Client` sits behind a lock so trust roots can be
/// swapped while requests are in flight.
pub struct HttpVaultClient {
    address: String,
    namespace: Option<String>,
    timeout: Duration,
    tls: TlsOptions,
    http: RwLock<reqwest::Client>,
    token: RwLock<Option<String>>,
    retry: RetryConfig,
}

impl std::fmt::Debug for HttpVaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVaultClient")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .field("tls", &self.tls)
            .finish()
    }
}

impl HttpVaultClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let tls = TlsOptions {
            ca_cert: config.ca_cert.clone(),
            skip_verify: config.tls_skip_verify,
        };
        let http = build_http(&tls, config.timeout)?;

        Ok(Self {
            address: config.url.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone().filter(|ns| !ns.is_empty()),
            timeout: config.timeout,
            tls,
            http: RwLock::new(http),
            token: RwLock::new(None),
            retry: RetryConfig::transport(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        // reqwest::Client is reference counted, cloning keeps the lock short
        let http = self.http.read().clone();
        let mut request = http
            .request(method, self.url(path))
            .header(REQUEST_HEADER, "true");
        if let Some(token) = self.token.read().as_deref() {
            request = request.header(TOKEN_HEADER, token);
        }
        if let Some(namespace) = &self.namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }
        request
    }

    /// Send one request; transient failures are retried only for repeatable kinds
    async fn send(
        &self,
        kind: RequestKind,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Option<Secret>> {
        retry_async(&self.retry, kind, move || {
            let method = method.clone();
            async move {
                let mut request = self.request(method, path).query(query);
                if let Some(body) = body {
                    request = request.json(body);
                }
                let response = request
                    .send()
                    .await
                    .map_err(|e| Error::transport_with_source(path, "request failed", e))?;
                decode(path, response).await
            }
        })
        .await
    }

    async fn send_expecting(
        &self,
        kind: RequestKind,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<Secret> {
        self.send(kind, method, path, &[], Some(body))
            .await?
            .ok_or_else(|| Error::transport(path, "vault returned an empty response"))
    }
}

fn build_http(tls: &TlsOptions, timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(tls.skip_verify);

    if let Some(path) = &tls.ca_cert {
        let pem =
            std::fs::read(path).map_err(|e| Error::file_system(path, "read CA certificate", e))?;
        let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
            Error::configuration(format!(
                "invalid CA certificate '{}': {e}",
                path.display()
            ))
        })?;
        builder = builder.add_root_certificate(certificate);
    }

    builder
        .build()
        .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))
}

async fn decode(path: &str, response: Response) -> Result<Option<Secret>> {
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(None);
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| Error::transport_with_source(path, "failed to read response body", e))?;

    if status == StatusCode::NOT_FOUND {
        // Deleted KV versions answer 404 with metadata worth keeping
        return Ok(serde_json::from_slice::<Secret>(&body)
            .ok()
            .filter(|secret| !secret.warnings.is_empty() || !secret.data.is_empty()));
    }

    if !status.is_success() {
        return Err(Error::transport_status(
            path,
            status.as_u16(),
            error_message(&body),
        ));
    }

    if body.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&body)?))
}

fn error_message(body: &[u8]) -> String {
    let errors = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| value.get("errors").cloned())
        .and_then(|errors| serde_json::from_value::<Vec<String>>(errors).ok());

    match errors {
        Some(errors) if !errors.is_empty() => errors.join("; "),
        _ => String::from_utf8_lossy(body).trim().to_string(),
    }
}

fn increment_body(increment: Option<Duration>) -> Value {
    match increment {
        Some(increment) => json!({ "increment": increment.as_secs() }),
        None => json!({}),
    }
}

fn decode_plaintext(path: &str, plaintext: Option<&Value>) -> Result<Vec<u8>> {
    let encoded = plaintext
        .and_then(Value::as_str)
        .ok_or_else(|| Error::decrypt(format!("{path}: response carries no plaintext")))?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| Error::decrypt(format!("{path}: plaintext is not base64: {e}")))
}

#[async_trait]
impl VaultClient for HttpVaultClient {
    async fn login(&self, request: &LoginRequest) -> Result<Option<Secret>> {
        let path = request.path();
        debug!(path = %path, method = %request.method, "logging in");
        self.send(
            RequestKind::Login,
            Method::POST,
            &path,
            &[],
            Some(&Value::Object(request.payload.clone())),
        )
        .await
    }

    async fn read(&self, path: &str, version: &str) -> Result<Option<Secret>> {
        if version.is_empty() || version == LATEST_VERSION {
            self.send(RequestKind::Read, Method::GET, path, &[], None)
                .await
        } else {
            self.send(
                RequestKind::Read,
                Method::GET,
                path,
                &[("version", version)],
                None,
            )
            .await
        }
    }

    async fn write(&self, path: &str, payload: &Value) -> Result<Option<Secret>> {
        self.send(RequestKind::Write, Method::PUT, path, &[], Some(payload))
            .await
    }

    async fn renew_token(&self, increment: Option<Duration>) -> Result<Secret> {
        self.send_expecting(
            RequestKind::Renewal,
            Method::POST,
            "auth/token/renew-self",
            &increment_body(increment),
        )
        .await
    }

    async fn renew_lease(&self, lease_id: &str, increment: Option<Duration>) -> Result<Secret> {
        let mut body = increment_body(increment);
        body["lease_id"] = Value::String(lease_id.to_string());
        self.send_expecting(RequestKind::Renewal, Method::PUT, "sys/leases/renew", &body)
            .await
    }

    async fn decrypt(&self, mount_path: &str, key_id: &str, ciphertext: &str) -> Result<Vec<u8>> {
        let path = format!("{}/decrypt/{key_id}", mount_path.trim_matches('/'));
        let secret = self
            .send_expecting(
                RequestKind::Decrypt,
                Method::POST,
                &path,
                &json!({ "ciphertext": ciphertext }),
            )
            .await?;
        decode_plaintext(&path, secret.data.get("plaintext"))
    }

    async fn decrypt_batch(
        &self,
        mount_path: &str,
        key_id: &str,
        ciphertexts: &[String],
    ) -> Result<HashMap<String, Vec<u8>>> {
        if ciphertexts.is_empty() {
            return Ok(HashMap::new());
        }

        let path = format!("{}/decrypt/{key_id}", mount_path.trim_matches('/'));
        let batch_input: Vec<Value> = ciphertexts
            .iter()
            .map(|ciphertext| json!({ "ciphertext": ciphertext }))
            .collect();
        let secret = self
            .send_expecting(
                RequestKind::Decrypt,
                Method::POST,
                &path,
                &json!({ "batch_input": batch_input }),
            )
            .await?;

        let results = secret
            .data
            .get("batch_results")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::decrypt(format!("{path}: response carries no batch results")))?;
        if results.len() != ciphertexts.len() {
            return Err(Error::decrypt(format!(
                "{path}: expected {} batch results, got {}",
                ciphertexts.len(),
                results.len()
            )));
        }

        let mut plaintexts = HashMap::with_capacity(ciphertexts.len());
        for (ciphertext, result) in ciphertexts.iter().zip(results) {
            if let Some(error) = result
                .get("error")
                .and_then(Value::as_str)
                .filter(|e| !e.is_empty())
            {
                return Err(Error::decrypt(format!("{path}: {error}")));
            }
            plaintexts.insert(
                ciphertext.clone(),
                decode_plaintext(&path, result.get("plaintext"))?,
            );
        }
        Ok(plaintexts)
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
        let http = build_http(&self.tls, self.timeout)?;
        *self.http.write() = http;
        Ok(())
    }
}
