//! Conversions from library errors into baokit errors

use super::types::Error;
use serde_json::error::Category;

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        let problem = match error.classify() {
            Category::Syntax => "malformed JSON",
            Category::Data => "unexpected JSON shape",
            Category::Eof => "truncated JSON",
            Category::Io => "could not read JSON",
        };
        Error::Json {
            message: format!("{problem} at line {} column {}", error.line(), error.column()),
            source: error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Lease {
        lease_duration: u64,
    }

    #[test]
    fn test_json_errors_are_classified() {
        let syntax: Error = serde_json::from_str::<Lease>("{lease}").unwrap_err().into();
        assert!(syntax.to_string().starts_with("JSON error: malformed JSON at line 1"));

        let shape: Error = serde_json::from_str::<Lease>(r#"{"lease_duration": "soon"}"#)
            .unwrap_err()
            .into();
        assert!(shape.to_string().starts_with("JSON error: unexpected JSON shape"));

        let truncated: Error = serde_json::from_str::<Lease>(r#"{"lease_duration": 3"#)
            .unwrap_err()
            .into();
        assert!(truncated.to_string().starts_with("JSON error: truncated JSON"));
        assert!(matches!(truncated, Error::Json { .. }));
    }
}
