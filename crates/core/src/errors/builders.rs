//! Builder methods for creating errors with context

use super::types::Error;
use std::path::PathBuf;
use std::time::Duration;

// Helper methods for creating errors with context
impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error caused by another failure, kept as its source
    #[must_use]
    pub fn configuration_with_source(message: impl Into<String>, source: Error) -> Self {
        Error::Configuration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an authentication error for the given auth method
    #[must_use]
    pub fn authentication(method: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Authentication {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create a transport error
    #[must_use]
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Create a transport error carrying the HTTP status the vault answered with
    #[must_use]
    pub fn transport_status(
        endpoint: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Error::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
            status: Some(status),
            source: None,
        }
    }

    /// Create a transport error with a source error
    #[must_use]
    pub fn transport_with_source(
        endpoint: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
            status: None,
            source: Some(source.into()),
        }
    }

    /// Create a not found error for a secret path
    #[must_use]
    pub fn path_not_found(path: &str) -> Self {
        Error::NotFound {
            message: format!("path not found: {path}"),
        }
    }

    /// Create a not found error for a key under a secret path
    #[must_use]
    pub fn key_not_found(key: &str, path: &str) -> Self {
        Error::NotFound {
            message: format!("key '{key}' not found under path: {path}"),
        }
    }

    /// Create a transit decryption error
    #[must_use]
    pub fn decrypt(message: impl Into<String>) -> Self {
        Error::Decrypt {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transit decryption error wrapping the underlying failure
    #[must_use]
    pub fn decrypt_with_source(message: impl Into<String>, source: Error) -> Self {
        Error::Decrypt {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a type error for values that are not scalar strings
    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Type {
            message: message.into(),
        }
    }

    /// Create a renewal registration error
    #[must_use]
    pub fn renewal(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Renewal {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a template error
    #[must_use]
    pub fn template(template: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Template {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported feature error
    #[must_use]
    pub fn unsupported(feature: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Unsupported {
            feature: feature.into(),
            message: message.into(),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether the ignore-missing-secrets policy may downgrade this error to a warning.
    ///
    /// Only absent paths/keys and transit decryption failures qualify; every other
    /// kind stays fatal to the call that produced it.
    #[must_use]
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::Decrypt { .. })
    }

    /// The HTTP status attached to a transport error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport { status, .. } => *status,
            _ => None,
        }
    }
}
