//! Directly supplied tokens

use crate::config::ClientConfig;
use baokit_core::DEFAULT_TOKEN_FILE;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Where a directly supplied token came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenOrigin {
    Configured,
    File(PathBuf),
}

/// Token file consulted when none is configured: `$HOME/.vault-token`
fn default_token_file() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_TOKEN_FILE))
}

/// Resolve a token that makes a login unnecessary.
///
/// A configured token wins over a token file. A missing or empty file means the
/// login cycle has to run.
pub(crate) fn direct_token(config: &ClientConfig) -> Option<(String, TokenOrigin)> {
    if let Some(token) = config.token.as_deref().map(str::trim) {
        if !token.is_empty() {
            return Some((token.to_string(), TokenOrigin::Configured));
        }
    }

    let path = config.token_path.clone().or_else(default_token_file)?;
    match std::fs::read_to_string(&path) {
        Ok(contents) => {
            let token = contents.trim();
            if token.is_empty() {
                debug!(path = %path.display(), "token file is empty");
                None
            } else {
                Some((token.to_string(), TokenOrigin::File(path)))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read token file");
            None
        }
    }
}
