use baokit_core::{Error, Result};
use serde_json::Value;

/// Render a secret attribute as the string handed to the sink.
///
/// Scalars are formatted, `null` becomes empty, and arrays or objects are rejected.
pub fn to_string(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Number(n) => Ok(match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (None, Some(u), _) => u.to_string(),
            // Whole floats print without a trailing ".0"
            (None, None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        }),
        Value::Array(_) => Err(Error::type_error("unable to cast an array to a string")),
        Value::Object(_) => Err(Error::type_error("unable to cast an object to a string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(to_string(&json!("hunter2")).unwrap(), "hunter2");
        assert_eq!(to_string(&json!(5432)).unwrap(), "5432");
        assert_eq!(to_string(&json!(-7)).unwrap(), "-7");
        assert_eq!(to_string(&json!(1.5)).unwrap(), "1.5");
        assert_eq!(to_string(&json!(3.0)).unwrap(), "3");
        assert_eq!(to_string(&json!(true)).unwrap(), "true");
        assert_eq!(to_string(&Value::Null).unwrap(), "");
    }

    #[test]
    fn test_non_scalars_are_type_errors() {
        let err = to_string(&json!(["a", "b"])).unwrap_err();
        assert!(matches!(err, Error::Type { .. }));
        assert!(err.to_string().contains("can't be cast to a string"));
        assert!(to_string(&json!({"nested": true})).is_err());
    }
}
