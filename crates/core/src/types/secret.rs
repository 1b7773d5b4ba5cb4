use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use super::credential::Credential;

/// Decoded attribute mapping of one secret path
pub type SecretData = Map<String, Value>;

/// The response envelope the vault returns for logical reads, writes and logins
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub lease_id: String,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: SecretData,
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub auth: Option<SecretAuth>,
}

/// Authentication block of a login or token renewal response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretAuth {
    pub client_token: String,
    #[serde(default)]
    pub accessor: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub policies: Vec<String>,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Secret {
    /// Create a secret holding plain attribute data
    #[must_use]
    pub fn with_data(data: SecretData) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// The lease duration attached to this secret
    #[must_use]
    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_duration)
    }

    /// The token carried by an auth response
    #[must_use]
    pub fn token_id(&self) -> Option<&str> {
        self.auth
            .as_ref()
            .map(|auth| auth.client_token.as_str())
            .filter(|token| !token.is_empty())
    }

    /// The ttl of the token carried by this response.
    ///
    /// Auth responses carry it in the auth block; token lookups carry it as `data.ttl`.
    #[must_use]
    pub fn token_ttl(&self) -> Option<Duration> {
        if let Some(auth) = &self.auth {
            return Some(Duration::from_secs(auth.lease_duration));
        }
        self.data
            .get("ttl")
            .and_then(Value::as_u64)
            .map(Duration::from_secs)
    }

    /// Whether the token carried by this response can be renewed
    #[must_use]
    pub fn token_renewable(&self) -> bool {
        self.auth.as_ref().is_some_and(|auth| auth.renewable)
    }

    /// Convert an auth response into a credential, if it carries a token
    #[must_use]
    pub fn to_credential(&self) -> Option<Credential> {
        let auth = self.auth.as_ref()?;
        if auth.client_token.is_empty() {
            return None;
        }
        Some(Credential::new(
            auth.client_token.clone(),
            self.lease_id.clone(),
            auth.accessor.clone(),
            Duration::from_secs(auth.lease_duration),
            auth.renewable,
        ))
    }
}
