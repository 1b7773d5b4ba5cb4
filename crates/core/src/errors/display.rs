//! Display implementations for error types

use super::types::Error;
use std::fmt;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration { message, source } => match source {
                Some(inner) => write!(f, "configuration error: {message}: {inner}"),
                None => write!(f, "configuration error: {message}"),
            },
            Error::Authentication { method, message } => {
                write!(f, "authentication with '{method}' failed: {message}")
            }
            Error::Transport {
                endpoint,
                message,
                status,
                ..
            } => match status {
                Some(code) => write!(f, "request to '{endpoint}' failed with status {code}: {message}"),
                None => write!(f, "request to '{endpoint}' failed: {message}"),
            },
            Error::NotFound { message } => write!(f, "{message}"),
            Error::Decrypt { message, source } => match source {
                Some(inner) => write!(f, "failed to decrypt {message}: {inner}"),
                None => write!(f, "failed to decrypt {message}"),
            },
            Error::Type { message } => {
                write!(f, "value can't be cast to a string: {message}")
            }
            Error::Renewal { path, message } => {
                write!(f, "secret renewal can't be established for '{path}': {message}")
            }
            Error::Template { template, message } => {
                write!(
                    f,
                    "failed to interpolate template key with vault data '{template}': {message}"
                )
            }
            Error::Unsupported { feature, message } => {
                write!(f, "unsupported feature '{feature}': {message}")
            }
            Error::FileSystem {
                path,
                operation,
                source,
            } => {
                write!(
                    f,
                    "file system {} operation failed for '{}': {}",
                    operation,
                    path.display(),
                    source
                )
            }
            Error::Json { message, .. } => {
                write!(f, "JSON error: {message}")
            }
            Error::Timeout {
                operation,
                duration,
            } => {
                write!(f, "timeout [{duration:?}] during waiting for {operation}")
            }
        }
    }
}
