//! Login strategies
//!
//! Each auth method builds the payload its mount expects. Cloud identity documents
//! and signed requests come from an [`IdentityProvider`]; the JWT-based methods only
//! need the projected service account token on disk.

use crate::api::LoginRequest;
use crate::config::{AuthMethod, ClientConfig};
use async_trait::async_trait;
use baokit_core::{Error, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Source of cloud identity material for the cloud auth methods
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fields merged into the login payload for `method`
    async fn identity(&self, method: AuthMethod, role: &str) -> Result<Map<String, Value>>;
}

/// Provider used when no cloud SDK is wired in
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCloudIdentity;

#[async_trait]
impl IdentityProvider for NoCloudIdentity {
    async fn identity(&self, method: AuthMethod, _role: &str) -> Result<Map<String, Value>> {
        Err(Error::unsupported(
            format!("{method} login"),
            "no cloud identity provider is configured",
        ))
    }
}

/// How the client logs in, resolved once from the configuration
#[derive(Debug, Clone, PartialEq)]
pub enum AuthStrategy {
    AwsEc2 {
        role: String,
        mount_path: String,
        jwt_file: PathBuf,
    },
    AwsIam {
        role: String,
        mount_path: String,
    },
    GcpGce {
        role: String,
        mount_path: String,
    },
    GcpIam {
        role: String,
        mount_path: String,
    },
    Azure {
        role: String,
        mount_path: String,
    },
    /// Kubernetes login with a service account token handed over in the configuration
    Namespaced {
        role: String,
        mount_path: String,
        service_account_token: String,
    },
    Jwt {
        role: String,
        mount_path: String,
        jwt_file: PathBuf,
    },
}

impl AuthStrategy {
    pub fn from_config(config: &ClientConfig) -> Self {
        let role = config.role.clone();
        let mount_path = config.auth_path.trim_matches('/').to_string();

        match config.auth_method {
            AuthMethod::AwsEc2 => AuthStrategy::AwsEc2 {
                role,
                mount_path,
                jwt_file: config.jwt_file(),
            },
            AuthMethod::AwsIam => AuthStrategy::AwsIam { role, mount_path },
            AuthMethod::GcpGce => AuthStrategy::GcpGce { role, mount_path },
            AuthMethod::GcpIam => AuthStrategy::GcpIam { role, mount_path },
            AuthMethod::Azure => AuthStrategy::Azure { role, mount_path },
            AuthMethod::Namespaced => match config.existing_secret.as_deref() {
                Some(token) if !token.trim().is_empty() => AuthStrategy::Namespaced {
                    role,
                    mount_path,
                    service_account_token: token.trim().to_string(),
                },
                // Without a handed-over token the namespaced login is a plain JWT login
                _ => AuthStrategy::Jwt {
                    role,
                    mount_path,
                    jwt_file: config.jwt_file(),
                },
            },
            AuthMethod::Jwt => AuthStrategy::Jwt {
                role,
                mount_path,
                jwt_file: config.jwt_file(),
            },
        }
    }

    pub fn method(&self) -> AuthMethod {
        match self {
            AuthStrategy::AwsEc2 { .. } => AuthMethod::AwsEc2,
            AuthStrategy::AwsIam { .. } => AuthMethod::AwsIam,
            AuthStrategy::GcpGce { .. } => AuthMethod::GcpGce,
            AuthStrategy::GcpIam { .. } => AuthMethod::GcpIam,
            AuthStrategy::Azure { .. } => AuthMethod::Azure,
            AuthStrategy::Namespaced { .. } => AuthMethod::Namespaced,
            AuthStrategy::Jwt { .. } => AuthMethod::Jwt,
        }
    }

    pub fn role(&self) -> &str {
        match self {
            AuthStrategy::AwsEc2 { role, .. }
            | AuthStrategy::AwsIam { role, .. }
            | AuthStrategy::GcpGce { role, .. }
            | AuthStrategy::GcpIam { role, .. }
            | AuthStrategy::Azure { role, .. }
            | AuthStrategy::Namespaced { role, .. }
            | AuthStrategy::Jwt { role, .. } => role,
        }
    }

    pub fn mount_path(&self) -> &str {
        match self {
            AuthStrategy::AwsEc2 { mount_path, .. }
            | AuthStrategy::AwsIam { mount_path, .. }
            | AuthStrategy::GcpGce { mount_path, .. }
            | AuthStrategy::GcpIam { mount_path, .. }
            | AuthStrategy::Azure { mount_path, .. }
            | AuthStrategy::Namespaced { mount_path, .. }
            | AuthStrategy::Jwt { mount_path, .. } => mount_path,
        }
    }

    /// Build the login request for one attempt.
    ///
    /// Files are re-read on every attempt so rotated service account tokens are picked up.
    pub async fn login_request(&self, identity: &dyn IdentityProvider) -> Result<LoginRequest> {
        let mut payload = Map::new();
        payload.insert("role".into(), Value::String(self.role().to_string()));

        match self {
            AuthStrategy::Jwt { jwt_file, .. } => {
                let jwt = read_jwt(jwt_file).await?;
                payload.insert("jwt".into(), Value::String(jwt));
            }
            AuthStrategy::Namespaced {
                service_account_token,
                ..
            } => {
                payload.insert("jwt".into(), Value::String(service_account_token.clone()));
            }
            AuthStrategy::AwsEc2 { jwt_file, .. } => {
                let jwt = read_jwt(jwt_file).await?;
                payload.insert("nonce".into(), Value::String(ec2_nonce(&jwt)));
                payload.extend(identity.identity(self.method(), self.role()).await?);
            }
            AuthStrategy::AwsIam { .. }
            | AuthStrategy::GcpGce { .. }
            | AuthStrategy::GcpIam { .. }
            | AuthStrategy::Azure { .. } => {
                payload.extend(identity.identity(self.method(), self.role()).await?);
            }
        }

        Ok(LoginRequest {
            method: self.method(),
            mount_path: self.mount_path().to_string(),
            payload,
        })
    }
}

/// The EC2 login nonce: hex-encoded SHA-256 of the service account token, stable
/// across restarts of the same pod
pub fn ec2_nonce(jwt: &str) -> String {
    hex::encode(Sha256::digest(jwt.as_bytes()))
}

async fn read_jwt(path: &Path) -> Result<String> {
    let jwt = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::file_system(path, "read JWT file", e))?;
    let jwt = jwt.trim();
    if jwt.is_empty() {
        return Err(Error::authentication(
            AuthMethod::Jwt.as_str(),
            format!("JWT file '{}' is empty", path.display()),
        ));
    }
    Ok(jwt.to_string())
}
