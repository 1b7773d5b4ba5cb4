//! Resolution of name → reference mappings into name → value pairs
//!
//! One call runs in three passes:
//!
//! 1. every transit ciphertext, top-level or inside an inline span, that is not cached
//!    yet is decrypted in batches;
//! 2. inline values with at least one span answered by the transit cache are
//!    substituted and delivered;
//! 3. everything else is delivered: literals as-is, the token echo, ciphertexts from
//!    the cache, and secret references through the path store and key lookup.
//!
//! Each resolved name reaches the sink once. With `ignore_missing_secrets` set, missing
//! paths or keys and failed decrypts are logged and the name is skipped.

use crate::cache::ResolutionCache;
use crate::cast;
use crate::config::InjectorConfig;
use crate::reference::{self, parse_path_list, InlineSpan, Reference, SecretReference};
use crate::renewer::LeaseRenewer;
use crate::store::{SecretPathStore, SecretRenewer};
use crate::template::{DelimitedTemplater, TemplateRenderer};
use crate::transit::TransitDecryptor;
use baokit_client::{CredentialHandle, CredentialManager, VaultClient};
use baokit_core::{Error, Result, SecretData};
use baokit_utils::tracing::resolution_span;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

#[cfg(test)]
mod tests;

/// Resolves secret references against the vault and hands the values to a sink
pub struct SecretInjector {
    config: InjectorConfig,
    client: Arc<dyn VaultClient>,
    credential: Option<CredentialHandle>,
    cache: Arc<ResolutionCache>,
    renewer: Option<Arc<dyn SecretRenewer>>,
    renderer: Arc<dyn TemplateRenderer>,
    transit: TransitDecryptor,
    store: SecretPathStore,
}

impl SecretInjector {
    /// An injector with a fresh cache, the default templater and, in daemon mode, a
    /// [`LeaseRenewer`]
    pub fn new(config: InjectorConfig, client: Arc<dyn VaultClient>) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(ResolutionCache::new());
        let renewer: Option<Arc<dyn SecretRenewer>> = config
            .daemon_mode
            .then(|| Arc::new(LeaseRenewer::new(client.clone())) as Arc<dyn SecretRenewer>);

        let transit = TransitDecryptor::new(client.clone(), cache.clone(), &config);
        let store = SecretPathStore::new(
            client.clone(),
            cache.clone(),
            renewer.clone(),
            config.daemon_mode,
        );

        Ok(Self {
            config,
            client,
            credential: None,
            cache,
            renewer,
            renderer: Arc::new(DelimitedTemplater::default()),
            transit,
            store,
        })
    }

    /// An injector using the authenticated client of a credential manager
    pub fn from_manager(config: InjectorConfig, manager: &CredentialManager) -> Result<Self> {
        Ok(Self::new(config, manager.client())?.with_credential(manager.handle()))
    }

    /// Echo tokens from this handle instead of the client
    #[must_use]
    pub fn with_credential(mut self, credential: CredentialHandle) -> Self {
        self.credential = Some(credential);
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    #[must_use]
    pub fn with_renewer(mut self, renewer: Arc<dyn SecretRenewer>) -> Self {
        self.renewer = Some(renewer);
        self.rebuild();
        self
    }

    /// Share a cache with other injectors
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ResolutionCache>) -> Self {
        self.cache = cache;
        self.rebuild();
        self
    }

    fn rebuild(&mut self) {
        self.transit = TransitDecryptor::new(self.client.clone(), self.cache.clone(), &self.config);
        self.store = SecretPathStore::new(
            self.client.clone(),
            self.cache.clone(),
            self.renewer.clone(),
            self.config.daemon_mode,
        );
    }

    pub fn config(&self) -> &InjectorConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    /// Resolve every reference and hand each resolved value to `sink`
    pub async fn resolve<F>(&self, references: &HashMap<String, String>, sink: F) -> Result<()>
    where
        F: FnMut(&str, &str),
    {
        self.run(references, sink)
            .instrument(resolution_span(references.len()))
            .await
    }

    /// Resolve every reference into a map
    pub async fn resolve_to_map(
        &self,
        references: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>> {
        let mut resolved = HashMap::with_capacity(references.len());
        self.resolve(references, |name, value| {
            resolved.insert(name.to_string(), value.to_string());
        })
        .await?;
        Ok(resolved)
    }

    /// Deliver every attribute of each `path[#version]` in a comma-separated list.
    ///
    /// Reads bypass the cache.
    pub async fn resolve_paths<F>(&self, paths: &str, mut sink: F) -> Result<()>
    where
        F: FnMut(&str, &str),
    {
        for (path, version) in parse_path_list(paths) {
            let Some(data) = self.store.read(&path, &version).await? else {
                self.skip_or_fail(Error::path_not_found(&path))?;
                continue;
            };
            for (key, value) in &data {
                let value = cast::to_string(value)
                    .map_err(|_| Error::type_error(format!("non-scalar value for key: {key}")))?;
                sink(key, &value);
            }
        }
        Ok(())
    }

    async fn run<F>(&self, references: &HashMap<String, String>, mut sink: F) -> Result<()>
    where
        F: FnMut(&str, &str),
    {
        let mut parsed = Vec::with_capacity(references.len());
        for (name, raw) in references {
            parsed.push((name.as_str(), reference::parse(name, raw)?));
        }

        self.prefetch_transit(&parsed).await?;

        // Inline values answered by the transit cache go first
        let mut remaining = Vec::with_capacity(parsed.len());
        for (name, parsed_reference) in parsed {
            if let Reference::Inline { raw, spans } = &parsed_reference {
                if self.has_cached_span(spans) {
                    let value = self.substitute(name, raw, spans).await?;
                    sink(name, &value);
                    continue;
                }
            }
            remaining.push((name, parsed_reference));
        }

        for (name, parsed_reference) in remaining {
            let resolved = match &parsed_reference {
                Reference::Inline { raw, spans } => Some(self.substitute(name, raw, spans).await?),
                other => self.resolve_direct(name, other).await?,
            };
            if let Some(value) = resolved {
                sink(name, &value);
            }
        }

        Ok(())
    }

    /// Batch-decrypt every uncached ciphertext the references mention
    async fn prefetch_transit(&self, parsed: &[(&str, Reference)]) -> Result<()> {
        let mut ciphertexts = BTreeSet::new();
        for (_, parsed_reference) in parsed {
            match parsed_reference {
                Reference::Ciphertext(raw) => {
                    ciphertexts.insert(raw.clone());
                }
                Reference::Inline { spans, .. } => {
                    for span in spans {
                        if let Reference::Ciphertext(raw) = &span.reference {
                            ciphertexts.insert(raw.clone());
                        }
                    }
                }
                _ => {}
            }
        }

        let pending = self.cache.uncached_transit(&ciphertexts);
        if pending.is_empty() {
            return Ok(());
        }

        debug!(count = pending.len(), "decrypting transit values");
        // Each batch stands on its own: a skipped batch leaves later ones running
        for batch in self.transit.batches(&pending) {
            if let Err(e) = self.transit.decrypt_chunk(&batch).await {
                if !(self.config.ignore_missing_secrets && e.is_ignorable()) {
                    return Err(e);
                }
                warn!(error = %e, count = batch.len(), "failed to decrypt secrets");
            }
        }
        Ok(())
    }

    fn has_cached_span(&self, spans: &[InlineSpan]) -> bool {
        spans.iter().any(|span| match &span.reference {
            Reference::Ciphertext(raw) => self.cache.has_transit(raw),
            _ => false,
        })
    }

    /// Replace each span by its resolved value; skipped spans stay as written
    async fn substitute(&self, name: &str, raw: &str, spans: &[InlineSpan]) -> Result<String> {
        let mut value = raw.to_string();
        for span in spans {
            if let Some(resolved) = self.resolve_direct(name, &span.reference).await? {
                value = value.replace(&span.span, &resolved);
            }
        }
        Ok(value)
    }

    /// Resolve a reference that is not inline; `None` means skipped
    async fn resolve_direct(&self, name: &str, parsed: &Reference) -> Result<Option<String>> {
        match parsed {
            Reference::Literal(value) => Ok(Some(value.clone())),
            Reference::TokenEcho => self.live_token().map(Some),
            Reference::Ciphertext(raw) => {
                if self.config.transit_key_id.is_empty() {
                    return Err(Error::configuration(format!(
                        "found encrypted variable, but transit key ID is empty: {name}"
                    )));
                }
                match self.cache.transit(raw) {
                    Some(plaintext) => Ok(Some(String::from_utf8_lossy(&plaintext).into_owned())),
                    None => self.skip_or_fail(Error::decrypt(format!("variable: {name}"))),
                }
            }
            Reference::Secret(secret) => self.resolve_secret(name, secret).await,
            Reference::Inline { .. } => Err(Error::configuration(format!(
                "nested inline references are not supported: {name}"
            ))),
        }
    }

    async fn resolve_secret(&self, name: &str, reference: &SecretReference) -> Result<Option<String>> {
        let Some(data) = self.store.fetch(reference).await? else {
            return self.skip_or_fail(Error::path_not_found(&reference.path));
        };

        match self.resolve_key(reference, &data) {
            Ok(value) => {
                debug!(name, path = %reference.path, "resolved secret");
                Ok(Some(value))
            }
            Err(e) => self.skip_or_fail(e),
        }
    }

    fn resolve_key(&self, reference: &SecretReference, data: &SecretData) -> Result<String> {
        if self.renderer.is_template(&reference.key) {
            return self.renderer.render(&reference.key, data);
        }
        let value = data
            .get(&reference.key)
            .ok_or_else(|| Error::key_not_found(&reference.key, &reference.path))?;
        cast::to_string(value)
    }

    fn live_token(&self) -> Result<String> {
        let token = match &self.credential {
            Some(credential) => credential.token(),
            None => self.client.token(),
        };
        token.ok_or_else(|| Error::authentication("token", "no vault token is held"))
    }

    fn skip_or_fail(&self, error: Error) -> Result<Option<String>> {
        if self.config.ignore_missing_secrets && error.is_ignorable() {
            warn!(error = %error, "skipping secret");
            return Ok(None);
        }
        Err(error)
    }
}
