//! Client configuration
//!
//! Every recognized option lives on [`ClientConfig`] with its default. Environment
//! overrides are read once, by [`ClientConfig::from_env`], and the result is validated
//! once when the credential manager is constructed.

use baokit_core::{
    Error, Result, DEFAULT_AUTH_PATH, DEFAULT_JWT_FILE, DEFAULT_LOGIN_BACKOFF_SECS, DEFAULT_ROLE,
    DEFAULT_TIMEOUT_SECS, DEFAULT_VAULT_ADDR, SERVICE_ACCOUNT_TOKEN_VAR, VAULT_ADDR_VAR,
    VAULT_CACERT_RELOAD_VAR, VAULT_CACERT_VAR, VAULT_CLIENT_TIMEOUT_VAR, VAULT_JWT_FILE_VAR,
    VAULT_NAMESPACE_VAR, VAULT_SKIP_VERIFY_VAR, VAULT_TOKEN_PATH_VAR, VAULT_TOKEN_VAR,
};
use baokit_utils::parse_duration;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// The auth methods a client can log in with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthMethod {
    AwsEc2,
    AwsIam,
    GcpGce,
    GcpIam,
    Azure,
    Namespaced,
    /// JWT, OIDC and Kubernetes service account logins
    #[default]
    Jwt,
}

impl AuthMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::AwsEc2 => "aws-ec2",
            AuthMethod::AwsIam => "aws-iam",
            AuthMethod::GcpGce => "gcp-gce",
            AuthMethod::GcpIam => "gcp-iam",
            AuthMethod::Azure => "azure",
            AuthMethod::Namespaced => "namespaced",
            AuthMethod::Jwt => "jwt",
        }
    }

    /// Whether logging in needs a signed identity from a cloud provider
    #[must_use]
    pub fn needs_cloud_identity(&self) -> bool {
        matches!(
            self,
            AuthMethod::AwsEc2
                | AuthMethod::AwsIam
                | AuthMethod::GcpGce
                | AuthMethod::GcpIam
                | AuthMethod::Azure
        )
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "aws-ec2" => Ok(AuthMethod::AwsEc2),
            "aws-iam" => Ok(AuthMethod::AwsIam),
            "gcp-gce" => Ok(AuthMethod::GcpGce),
            "gcp-iam" => Ok(AuthMethod::GcpIam),
            "azure" => Ok(AuthMethod::Azure),
            "namespaced" => Ok(AuthMethod::Namespaced),
            "" | "jwt" | "kubernetes" => Ok(AuthMethod::Jwt),
            other => Err(Error::configuration(format!("unknown auth method '{other}'"))),
        }
    }
}

/// Configuration of the vault client and its credential lifecycle
#[derive(Clone)]
pub struct ClientConfig {
    /// Vault address, e.g. `https://vault.example.org:8200`
    pub url: String,
    /// Role requested at login
    pub role: String,
    /// Mount path of the auth method
    pub auth_path: String,
    pub auth_method: AuthMethod,
    /// A token to use directly; no login cycle runs when set
    pub token: Option<String>,
    /// File holding a token to use directly
    pub token_path: Option<PathBuf>,
    /// Bound on the initial token bootstrap and on each HTTP request
    pub timeout: Duration,
    /// Vault Enterprise / OpenBao namespace
    pub namespace: Option<String>,
    /// Service account token used by the namespaced auth method instead of the JWT file
    pub existing_secret: Option<String>,
    /// JWT file used by JWT-based logins
    pub jwt_file: Option<PathBuf>,
    /// CA certificate used to verify the vault's TLS certificate
    pub ca_cert: Option<PathBuf>,
    /// Reload the CA certificate when the file changes
    pub ca_cert_reload: bool,
    pub tls_skip_verify: bool,
    /// Wait between failed login attempts
    pub login_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_VAULT_ADDR.to_string(),
            role: DEFAULT_ROLE.to_string(),
            auth_path: DEFAULT_AUTH_PATH.to_string(),
            auth_method: AuthMethod::default(),
            token: None,
            token_path: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            namespace: None,
            existing_secret: None,
            jwt_file: None,
            ca_cert: None,
            ca_cert_reload: true,
            tls_skip_verify: false,
            login_backoff: Duration::from_secs(DEFAULT_LOGIN_BACKOFF_SECS),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("role", &self.role)
            .field("auth_path", &self.auth_path)
            .field("auth_method", &self.auth_method)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("token_path", &self.token_path)
            .field("timeout", &self.timeout)
            .field("namespace", &self.namespace)
            .field("existing_secret", &self.existing_secret.as_ref().map(|_| "[REDACTED]"))
            .field("jwt_file", &self.jwt_file)
            .field("ca_cert", &self.ca_cert)
            .field("ca_cert_reload", &self.ca_cert_reload)
            .field("tls_skip_verify", &self.tls_skip_verify)
            .field("login_backoff", &self.login_backoff)
            .finish()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_flag(name: &str) -> Option<bool> {
    env_var(name).map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

impl ClientConfig {
    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = env_var(VAULT_ADDR_VAR) {
            config.url = url;
        }
        config.token = env_var(VAULT_TOKEN_VAR);
        config.token_path = env_var(VAULT_TOKEN_PATH_VAR).map(PathBuf::from);
        if let Some(timeout) = env_var(VAULT_CLIENT_TIMEOUT_VAR) {
            config.timeout = parse_duration(&timeout)?;
        }
        config.namespace = env_var(VAULT_NAMESPACE_VAR);
        config.jwt_file = env_var(SERVICE_ACCOUNT_TOKEN_VAR)
            .or_else(|| env_var(VAULT_JWT_FILE_VAR))
            .map(PathBuf::from);
        config.ca_cert = env_var(VAULT_CACERT_VAR).map(PathBuf::from);
        config.ca_cert_reload = std::env::var(VAULT_CACERT_RELOAD_VAR)
            .map(|value| value != "false")
            .unwrap_or(true);
        config.tls_skip_verify = env_flag(VAULT_SKIP_VERIFY_VAR).unwrap_or(false);

        Ok(config)
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    #[must_use]
    pub fn with_auth_path(mut self, auth_path: impl Into<String>) -> Self {
        self.auth_path = auth_path.into();
        self
    }

    #[must_use]
    pub fn with_auth_method(mut self, auth_method: AuthMethod) -> Self {
        self.auth_method = auth_method;
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_existing_secret(mut self, secret: impl Into<String>) -> Self {
        self.existing_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_jwt_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.jwt_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>, reload: bool) -> Self {
        self.ca_cert = Some(path.into());
        self.ca_cert_reload = reload;
        self
    }

    #[must_use]
    pub fn with_login_backoff(mut self, backoff: Duration) -> Self {
        self.login_backoff = backoff;
        self
    }

    /// The JWT file used by JWT-based logins
    #[must_use]
    pub fn jwt_file(&self) -> PathBuf {
        self.jwt_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_JWT_FILE))
    }

    /// Check the configuration once, before anything talks to the vault
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::configuration(format!(
                "vault url must start with http:// or https://, got '{}'",
                self.url
            )));
        }
        if self.role.trim().is_empty() {
            return Err(Error::configuration("role cannot be empty"));
        }
        if self.auth_path.trim_matches('/').is_empty() {
            return Err(Error::configuration("auth mount path cannot be empty"));
        }
        if self.timeout.is_zero() {
            return Err(Error::configuration("timeout must be greater than zero"));
        }
        if self.login_backoff.is_zero() {
            return Err(Error::configuration("login backoff must be greater than zero"));
        }
        Ok(())
    }
}
