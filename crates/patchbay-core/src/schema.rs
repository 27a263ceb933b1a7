//! Editable-field descriptors for node types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::pipeline::NodeRole;

/// Semantic type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    /// A string restricted to [`FieldDescriptor::choices`]
    Choice,
}

/// One editable configuration field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Whether the field may be omitted or null
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
}

impl FieldDescriptor {
    fn new(name: &str, field_type: FieldType) -> Self {
        Self { name: name.to_string(), field_type, nullable: false, choices: Vec::new(), help_text: None }
    }

    #[must_use]
    pub fn string(name: &str) -> Self {
        Self::new(name, FieldType::String)
    }

    #[must_use]
    pub fn integer(name: &str) -> Self {
        Self::new(name, FieldType::Integer)
    }

    #[must_use]
    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    #[must_use]
    pub fn choice(name: &str, choices: &[&str]) -> Self {
        let mut field = Self::new(name, FieldType::Choice);
        field.choices = choices.iter().map(ToString::to_string).collect();
        field
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn help(mut self, text: &str) -> Self {
        self.help_text = Some(text.to_string());
        self
    }

    fn check(&self, value: Option<&Value>) -> Result<()> {
        let value = match value {
            None | Some(Value::Null) if self.nullable => return Ok(()),
            None | Some(Value::Null) => {
                return Err(Error::invalid_config(&self.name, "This field is required"));
            }
            Some(value) => value,
        };

        let ok = match self.field_type {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Choice => {
                let Some(choice) = value.as_str() else {
                    return Err(Error::invalid_config(&self.name, "Expected a string"));
                };
                if !self.choices.iter().any(|c| c == choice) {
                    return Err(Error::invalid_config(
                        &self.name,
                        format!("'{choice}' is not one of: {}", self.choices.join(", ")),
                    ));
                }
                true
            }
        };

        if ok {
            Ok(())
        } else {
            Err(Error::invalid_config(&self.name, format!("Expected {}", self.type_name())))
        }
    }

    fn type_name(&self) -> &'static str {
        match self.field_type {
            FieldType::String | FieldType::Choice => "a string",
            FieldType::Integer => "an integer",
            FieldType::Boolean => "a boolean",
        }
    }
}

/// Describes a node type to the request layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSchema {
    pub type_tag: String,
    /// Display name
    pub label: String,
    pub role: NodeRole,
    /// Ordered editable fields
    pub fields: Vec<FieldDescriptor>,
}

impl NodeSchema {
    /// Check a submitted configuration against the field descriptors.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for the first offending field, including
    /// fields the node type does not know about.
    pub fn check_config(&self, config: &Map<String, Value>) -> Result<()> {
        if let Some(unknown) = config.keys().find(|k| !self.fields.iter().any(|f| &f.name == *k)) {
            return Err(Error::invalid_config(unknown, "Unknown field"));
        }
        for field in &self.fields {
            field.check(config.get(&field.name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn tunnel_schema() -> NodeSchema {
        NodeSchema {
            type_tag: "pulseaudio.tunnel".into(),
            label: "Tunnel".into(),
            role: NodeRole::Device,
            fields: vec![
                FieldDescriptor::string("server"),
                FieldDescriptor::choice("mode", &["source", "sink"]),
                FieldDescriptor::string("cookie").nullable(),
                FieldDescriptor::integer("latency_msec").nullable(),
            ],
        }
    }

    fn config(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let schema = tunnel_schema();
        let cfg = config(json!({ "server": "10.0.0.2", "mode": "sink", "cookie": null }));
        assert!(schema.check_config(&cfg).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let schema = tunnel_schema();
        let cfg = config(json!({ "mode": "sink" }));
        assert_matches!(
            schema.check_config(&cfg),
            Err(Error::InvalidConfig { field, .. }) if field == "server"
        );
    }

    #[test]
    fn test_choice_outside_range() {
        let schema = tunnel_schema();
        let cfg = config(json!({ "server": "h", "mode": "both" }));
        let err = schema.check_config(&cfg).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration for field 'mode': 'both' is not one of: source, sink"
        );
    }

    #[test]
    fn test_wrong_type() {
        let schema = tunnel_schema();
        let cfg = config(json!({ "server": "h", "mode": "sink", "latency_msec": "20" }));
        assert_matches!(
            schema.check_config(&cfg),
            Err(Error::InvalidConfig { field, message }) if field == "latency_msec" && message == "Expected an integer"
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let schema = tunnel_schema();
        let cfg = config(json!({ "server": "h", "mode": "sink", "volume": 3 }));
        assert_matches!(
            schema.check_config(&cfg),
            Err(Error::InvalidConfig { field, .. }) if field == "volume"
        );
    }
}
