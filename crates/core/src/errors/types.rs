//! Core error type definitions

use std::path::PathBuf;

/// Result type alias for baokit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for baokit operations using thiserror
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration errors (missing transit key id, malformed payloads, bad references)
    Configuration {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Login failures against an auth method
    Authentication { method: String, message: String },

    /// Errors surfaced by the vault transport
    Transport {
        endpoint: String,
        message: String,
        status: Option<u16>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A path or key that does not exist in the vault
    NotFound { message: String },

    /// Transit decryption failures
    Decrypt {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Values that cannot be represented as a scalar string
    Type { message: String },

    /// Registration with the lease renewer failed
    Renewal { path: String, message: String },

    /// Template interpolation errors
    Template { template: String, message: String },

    /// Unsupported operation errors
    Unsupported { feature: String, message: String },

    /// File system operations
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Operation timeout errors
    Timeout {
        operation: String,
        duration: std::time::Duration,
    },
}
