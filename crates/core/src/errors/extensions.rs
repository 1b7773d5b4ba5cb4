//! Context for failures that surface as configuration errors

use super::types::{Error, Result};

/// Turns any failure convertible into [`Error`] into a configuration error.
///
/// The underlying error is kept as the `source`, so callers can still tell a
/// malformed JSON payload from other configuration problems.
pub trait ResultExt<T> {
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::configuration_with_source(message, e.into()))
    }
}
