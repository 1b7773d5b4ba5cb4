//! Secret reference grammar
//!
//! ```text
//! [>>]bao:<path>#<key>[#<version-or-json-payload>]
//! ```
//!
//! `>>` switches the reference to write mode; the third segment is then a JSON object
//! written to the path. Values may also embed references inline as `${bao:...}`, carry
//! transit ciphertext (`vault:v1:...`), or be the reserved `BAO_TOKEN=bao:login` pair.
//! Anything else is a literal.

use baokit_core::{
    Error, Result, ResultExt, SecretData, EMPTY_WRITE_PAYLOAD, LATEST_VERSION, REFERENCE_SEPARATOR,
    SECRET_SCHEME_PREFIX, TOKEN_ECHO_NAME, TOKEN_ECHO_PATH, WRITE_MODE_MARKER,
};
use once_cell::sync::Lazy;
use regex::Regex;

static INLINE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{(>{0,2}bao:.*?#*\}?)\}").expect("inline reference pattern is valid")
});

static TRANSIT_CIPHERTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:>>)?(?:bao:)?(vault:v\d+:.*)$").expect("ciphertext pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

/// A parsed `bao:path#key#version` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReference {
    pub mode: Mode,
    pub path: String,
    /// Attribute name or template rendered against the attributes
    pub key: String,
    /// Version for reads, JSON payload for writes
    pub version_or_data: String,
}

impl SecretReference {
    /// The JSON object a write-mode reference submits
    pub fn write_payload(&self) -> Result<SecretData> {
        parse_write_payload(&self.version_or_data)
    }
}

/// One `${...}` span of an inline value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineSpan {
    /// The full span text, delimiters included
    pub span: String,
    /// The reference between the delimiters
    pub inner: String,
    pub reference: Reference,
}

/// What a raw value asks the resolver to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Literal(String),
    /// The token currently held by the credential handle
    TokenEcho,
    /// Transit ciphertext; holds the raw value, which is also its cache key
    Ciphertext(String),
    Secret(SecretReference),
    Inline { raw: String, spans: Vec<InlineSpan> },
}

/// Whether the value uses the secret scheme, in read or write mode
pub fn is_valid_prefix(value: &str) -> bool {
    value.starts_with(SECRET_SCHEME_PREFIX)
        || value
            .strip_prefix(WRITE_MODE_MARKER)
            .is_some_and(|rest| rest.starts_with(SECRET_SCHEME_PREFIX))
}

/// Whether the value is transit ciphertext, bare or behind the scheme prefix
pub fn is_transit_ciphertext(value: &str) -> bool {
    TRANSIT_CIPHERTEXT.is_match(value)
}

/// The `vault:vN:...` part of a ciphertext value, as sent to the transit engine
pub fn ciphertext_payload(value: &str) -> &str {
    TRANSIT_CIPHERTEXT
        .captures(value)
        .and_then(|captures| captures.get(1))
        .map_or(value, |payload| payload.as_str())
}

/// All `${...}` spans of a value as (span, inner reference) pairs, in order
pub fn find_inline_spans(value: &str) -> Vec<(String, String)> {
    INLINE_REFERENCE
        .captures_iter(value)
        .filter_map(|captures| {
            let span = captures.get(0)?.as_str().to_string();
            let inner = captures.get(1)?.as_str().to_string();
            Some((span, inner))
        })
        .collect()
}

/// Parse the value bound to `name`
pub fn parse(name: &str, raw: &str) -> Result<Reference> {
    let spans = find_inline_spans(raw);
    if spans.is_empty() {
        return parse_direct(name, raw);
    }

    let spans = spans
        .into_iter()
        .map(|(span, inner)| {
            let reference = parse_direct(name, &inner)?;
            Ok(InlineSpan {
                span,
                inner,
                reference,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Reference::Inline {
        raw: raw.to_string(),
        spans,
    })
}

/// Parse a value without looking for inline spans
fn parse_direct(name: &str, raw: &str) -> Result<Reference> {
    if is_transit_ciphertext(raw) {
        return Ok(Reference::Ciphertext(raw.to_string()));
    }

    let (mode, value) = match raw.strip_prefix(WRITE_MODE_MARKER) {
        Some(rest) if rest.starts_with(SECRET_SCHEME_PREFIX) => (Mode::Write, rest),
        _ => (Mode::Read, raw),
    };

    let Some(body) = value.strip_prefix(SECRET_SCHEME_PREFIX) else {
        return Ok(Reference::Literal(raw.to_string()));
    };

    if name == TOKEN_ECHO_NAME && body == TOKEN_ECHO_PATH {
        return Ok(Reference::TokenEcho);
    }

    let mut segments = body.splitn(3, REFERENCE_SEPARATOR);
    let path = segments.next().unwrap_or_default();
    let Some(key) = segments.next() else {
        return Err(Error::configuration(
            "secret data key or template not defined",
        ));
    };
    let version_or_data = match (segments.next(), mode) {
        (Some(third), _) => third.to_string(),
        (None, Mode::Read) => LATEST_VERSION.to_string(),
        (None, Mode::Write) => EMPTY_WRITE_PAYLOAD.to_string(),
    };

    if mode == Mode::Write {
        parse_write_payload(&version_or_data)?;
    }

    Ok(Reference::Secret(SecretReference {
        mode,
        path: path.to_string(),
        key: key.to_string(),
        version_or_data,
    }))
}

fn parse_write_payload(payload: &str) -> Result<SecretData> {
    serde_json::from_str::<SecretData>(payload).context("failed to unmarshal data for writing")
}

/// Split a comma-separated list of `path[#version]` entries
pub fn parse_path_list(paths: &str) -> Vec<(String, String)> {
    paths
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(REFERENCE_SEPARATOR) {
            Some((path, version)) => (path.to_string(), version.to_string()),
            None => (entry.to_string(), LATEST_VERSION.to_string()),
        })
        .collect()
}
