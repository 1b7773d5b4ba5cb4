//! Templated keys
//!
//! A key such as `postgres://{{ .user }}:{{ .password }}@db` is rendered against the
//! attribute map of its path. Each action is a field path, optionally piped through
//! simple functions: `{{ .cert | b64enc }}`.

use crate::cast;
use base64::Engine;
use baokit_core::{Error, Result, SecretData};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Renders templated keys against secret data
pub trait TemplateRenderer: Send + Sync {
    /// Whether `key` carries template markers
    fn is_template(&self, key: &str) -> bool;

    fn render(&self, template: &str, data: &SecretData) -> Result<String>;
}

pub const DEFAULT_LEFT_DELIMITER: &str = "{{";
pub const DEFAULT_RIGHT_DELIMITER: &str = "}}";

/// Field templater with configurable delimiters
#[derive(Debug, Clone)]
pub struct DelimitedTemplater {
    left: String,
    right: String,
    action: Regex,
}

static DEFAULT_ACTION: Lazy<Regex> = Lazy::new(|| {
    action_pattern(DEFAULT_LEFT_DELIMITER, DEFAULT_RIGHT_DELIMITER)
        .expect("default template delimiters are valid")
});

fn action_pattern(left: &str, right: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"{}\s*(.*?)\s*{}",
        regex::escape(left),
        regex::escape(right)
    ))
}

impl Default for DelimitedTemplater {
    fn default() -> Self {
        Self {
            left: DEFAULT_LEFT_DELIMITER.to_string(),
            right: DEFAULT_RIGHT_DELIMITER.to_string(),
            action: DEFAULT_ACTION.clone(),
        }
    }
}

impl DelimitedTemplater {
    pub fn new(left: &str, right: &str) -> Result<Self> {
        if left.is_empty() || right.is_empty() {
            return Err(Error::configuration("template delimiters cannot be empty"));
        }
        let action = action_pattern(left, right)
            .map_err(|e| Error::configuration(format!("invalid template delimiters: {e}")))?;
        Ok(Self {
            left: left.to_string(),
            right: right.to_string(),
            action,
        })
    }

    fn evaluate(&self, template: &str, action: &str, data: &SecretData) -> Result<String> {
        let mut stages = action.split('|').map(str::trim);
        let field = stages.next().unwrap_or_default();

        let mut value = cast::to_string(lookup(template, field, data)?)
            .map_err(|e| Error::template(template, e.to_string()))?;

        for function in stages {
            value = apply(template, function, value)?;
        }
        Ok(value)
    }
}

fn lookup<'a>(template: &str, field: &str, data: &'a SecretData) -> Result<&'a Value> {
    let Some(path) = field.strip_prefix('.') else {
        return Err(Error::template(
            template,
            format!("unsupported action '{field}', expected a field such as .name"),
        ));
    };

    let mut segments = path.split('.').filter(|segment| !segment.is_empty());
    let Some(first) = segments.next() else {
        return Err(Error::template(template, "the root object cannot be rendered"));
    };

    let mut current = data
        .get(first)
        .ok_or_else(|| Error::template(template, format!("key '{first}' not found")))?;
    for segment in segments {
        current = current
            .get(segment)
            .ok_or_else(|| Error::template(template, format!("key '{segment}' not found")))?;
    }
    Ok(current)
}

fn apply(template: &str, function: &str, value: String) -> Result<String> {
    let engine = base64::engine::general_purpose::STANDARD;
    match function {
        "b64enc" => Ok(engine.encode(value.as_bytes())),
        "b64dec" => {
            let bytes = engine
                .decode(value.trim())
                .map_err(|e| Error::template(template, format!("b64dec: {e}")))?;
            String::from_utf8(bytes)
                .map_err(|e| Error::template(template, format!("b64dec: {e}")))
        }
        "upper" => Ok(value.to_uppercase()),
        "lower" => Ok(value.to_lowercase()),
        "trim" => Ok(value.trim().to_string()),
        "quote" => Ok(format!("{value:?}")),
        other => Err(Error::template(
            template,
            format!("function '{other}' not defined"),
        )),
    }
}

impl TemplateRenderer for DelimitedTemplater {
    fn is_template(&self, key: &str) -> bool {
        key.contains(&self.left) && key.contains(&self.right)
    }

    fn render(&self, template: &str, data: &SecretData) -> Result<String> {
        let mut rendered = String::with_capacity(template.len());
        let mut last = 0;

        for captures in self.action.captures_iter(template) {
            let (Some(whole), Some(action)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            rendered.push_str(&template[last..whole.start()]);
            rendered.push_str(&self.evaluate(template, action.as_str(), data)?);
            last = whole.end();
        }
        rendered.push_str(&template[last..]);
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> SecretData {
        match json!({
            "user": "app",
            "password": "hunter2",
            "port": 5432,
            "tls": {"ca": "LS0tLS1CRUdJTg=="}
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_detects_templates() {
        let templater = DelimitedTemplater::default();
        assert!(templater.is_template("{{ .user }}"));
        assert!(templater.is_template("prefix-{{.user}}-suffix"));
        assert!(!templater.is_template("user"));
        assert!(!templater.is_template("{{ unterminated"));
    }

    #[test]
    fn test_renders_fields() {
        let rendered = DelimitedTemplater::default()
            .render("postgres://{{ .user }}:{{.password}}@db:{{ .port }}", &data())
            .unwrap();
        assert_eq!(rendered, "postgres://app:hunter2@db:5432");
    }

    #[test]
    fn test_nested_fields_and_pipes() {
        let templater = DelimitedTemplater::default();
        assert_eq!(
            templater.render("{{ .tls.ca | b64dec }}", &data()).unwrap(),
            "-----BEGIN"
        );
        assert_eq!(
            templater.render("{{ .user | upper }}", &data()).unwrap(),
            "APP"
        );
        assert_eq!(
            templater.render("{{ .user | b64enc }}", &data()).unwrap(),
            "YXBw"
        );
    }

    #[test]
    fn test_errors() {
        let templater = DelimitedTemplater::default();
        let missing = templater.render("{{ .missing }}", &data()).unwrap_err();
        assert!(matches!(missing, Error::Template { .. }));
        assert!(templater.render("{{ .tls }}", &data()).is_err());
        assert!(templater.render("{{ .user | shout }}", &data()).is_err());
        assert!(templater.render("{{ user }}", &data()).is_err());
    }

    #[test]
    fn test_custom_delimiters() {
        let templater = DelimitedTemplater::new("[[", "]]").unwrap();
        assert!(templater.is_template("[[ .user ]]"));
        assert_eq!(templater.render("[[ .user ]]", &data()).unwrap(), "app");
        assert!(DelimitedTemplater::new("", "]]").is_err());
    }
}
