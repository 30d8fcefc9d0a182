use serde::{Deserialize, Serialize};

/// Serialization format that is never accepted for variables set by migration.
pub const JAVA_SERIALIZATION_FORMAT: &str = "application/x-java-serialized-object";

/// A variable value plus the format it was serialized with, if any.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypedValue {
    pub value: serde_json::Value,
    pub serialization_format: Option<String>,
}

impl TypedValue {
    pub fn new(value: impl Into<serde_json::Value>) -> Self {
        Self {
            value: value.into(),
            serialization_format: None,
        }
    }

    pub fn serialized(value: impl Into<serde_json::Value>, format: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            serialization_format: Some(format.into()),
        }
    }

    pub fn is_java_serialized(&self) -> bool {
        self.serialization_format.as_deref() == Some(JAVA_SERIALIZATION_FORMAT)
    }

    /// Text form used when substituting the value into an expression.
    pub fn as_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_form_of_strings_has_no_quotes() {
        assert_eq!(TypedValue::from("bar").as_text(), "bar");
        assert_eq!(TypedValue::from(42).as_text(), "42");
    }

    #[test]
    fn detects_java_serialization() {
        let value = TypedValue::serialized("rO0AB", JAVA_SERIALIZATION_FORMAT);
        assert!(value.is_java_serialized());
        assert!(!TypedValue::serialized("{}", "application/json").is_java_serialized());
    }
}
