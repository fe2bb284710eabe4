//! Registry of local message types
//!
//! A message type is a `package/Type` name with a fixed set of field names.
//! Bridges resolve their `message_type` here when they are built, and inbound
//! payloads are populated into the type before they reach the local bus.

use crate::config::MessageTypeConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

static TYPE_NAME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*/[A-Za-z][A-Za-z0-9_]*$").ok());

const BUILTIN_TYPES: &[(&str, &[&str])] = &[
    ("std_msgs/String", &["data"]),
    ("std_msgs/Bool", &["data"]),
    ("std_msgs/Int32", &["data"]),
    ("std_msgs/Int64", &["data"]),
    ("std_msgs/Float32", &["data"]),
    ("std_msgs/Float64", &["data"]),
    ("std_msgs/Empty", &[]),
    ("std_msgs/Header", &["seq", "stamp", "frame_id"]),
    ("geometry_msgs/Vector3", &["x", "y", "z"]),
    ("geometry_msgs/Point", &["x", "y", "z"]),
    ("geometry_msgs/Twist", &["linear", "angular"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageTypeError {
    #[error("Invalid message type name '{0}', expected 'package/Type'")]
    InvalidName(String),
    #[error("Unknown message type '{0}'")]
    Unknown(String),
    #[error("{msg_type} expects an object, got {found}")]
    NotAnObject { msg_type: String, found: String },
    #[error("{msg_type} is missing field(s) {fields:?}")]
    MissingFields { msg_type: String, fields: Vec<String> },
    #[error("{msg_type} has no field(s) {fields:?}")]
    UnknownFields { msg_type: String, fields: Vec<String> },
}

/// A resolved message type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageType {
    name: String,
    fields: BTreeSet<String>,
}

impl MessageType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    /// Build a message body of this type from a decoded payload.
    ///
    /// The payload must be an object with exactly the declared fields.
    pub fn populate(&self, payload: Value) -> Result<Value, MessageTypeError> {
        let object: Map<String, Value> = match payload {
            Value::Object(object) => object,
            other => {
                return Err(MessageTypeError::NotAnObject {
                    msg_type: self.name.clone(),
                    found: json_kind(&other).to_string(),
                })
            }
        };

        let missing: Vec<String> = self
            .fields
            .iter()
            .filter(|f| !object.contains_key(f.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(MessageTypeError::MissingFields {
                msg_type: self.name.clone(),
                fields: missing,
            });
        }

        let mut unknown: Vec<String> = object
            .keys()
            .filter(|k| !self.fields.contains(k.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            return Err(MessageTypeError::UnknownFields {
                msg_type: self.name.clone(),
                fields: unknown,
            });
        }

        Ok(Value::Object(object))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn validate_type_name(name: &str) -> Result<(), MessageTypeError> {
    match TYPE_NAME.as_ref() {
        Some(pattern) if pattern.is_match(name) => Ok(()),
        _ => Err(MessageTypeError::InvalidName(name.to_string())),
    }
}

/// Known message types by name
#[derive(Debug, Clone, Default)]
pub struct MessageTypeRegistry {
    types: HashMap<String, Arc<MessageType>>,
}

impl MessageTypeRegistry {
    /// Registry with the standard message types
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        for (name, fields) in BUILTIN_TYPES {
            registry.types.insert(
                name.to_string(),
                Arc::new(MessageType {
                    name: name.to_string(),
                    fields: fields.iter().map(|f| f.to_string()).collect(),
                }),
            );
        }
        registry
    }

    /// Builtins plus the `[[message_type]]` entries of the configuration
    pub fn from_config(declared: &[MessageTypeConfig]) -> Result<Self, MessageTypeError> {
        let mut registry = Self::with_builtins();
        for message_type in declared {
            registry.register(&message_type.name, &message_type.fields)?;
        }
        Ok(registry)
    }

    /// Register or replace a type
    pub fn register<S: AsRef<str>>(
        &mut self,
        name: &str,
        fields: &[S],
    ) -> Result<(), MessageTypeError> {
        validate_type_name(name)?;
        self.types.insert(
            name.to_string(),
            Arc::new(MessageType {
                name: name.to_string(),
                fields: fields.iter().map(|f| f.as_ref().to_string()).collect(),
            }),
        );
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<MessageType>, MessageTypeError> {
        validate_type_name(name)?;
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| MessageTypeError::Unknown(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins_resolve() {
        let registry = MessageTypeRegistry::with_builtins();
        assert_eq!(registry.len(), BUILTIN_TYPES.len());
        let twist = registry.resolve("geometry_msgs/Twist").unwrap();
        assert_eq!(twist.fields().collect::<Vec<_>>(), vec!["angular", "linear"]);
    }

    #[test]
    fn test_name_validation() {
        let registry = MessageTypeRegistry::with_builtins();
        assert_eq!(
            registry.resolve("String"),
            Err(MessageTypeError::InvalidName("String".to_string()))
        );
        assert_eq!(
            registry.resolve("std_msgs/Nope"),
            Err(MessageTypeError::Unknown("std_msgs/Nope".to_string()))
        );
        assert!(validate_type_name("std_msgs/String/extra").is_err());
    }

    #[test]
    fn test_configured_types_extend_builtins() {
        let declared = vec![MessageTypeConfig {
            name: "custom_msgs/Reading".to_string(),
            fields: vec!["sensor".to_string(), "value".to_string()],
        }];
        let registry = MessageTypeRegistry::from_config(&declared).unwrap();
        assert!(registry.resolve("custom_msgs/Reading").is_ok());
        assert!(registry.resolve("std_msgs/Bool").is_ok());

        let bad = vec![MessageTypeConfig {
            name: "not a type".to_string(),
            fields: vec![],
        }];
        assert!(MessageTypeRegistry::from_config(&bad).is_err());
    }

    #[test]
    fn test_populate_requires_exact_fields() {
        let registry = MessageTypeRegistry::with_builtins();
        let vector = registry.resolve("geometry_msgs/Vector3").unwrap();

        let body = json!({"x": 1.0, "y": 2.0, "z": 3.0});
        assert_eq!(vector.populate(body.clone()).unwrap(), body);

        assert!(matches!(
            vector.populate(json!({"x": 1.0, "y": 2.0})),
            Err(MessageTypeError::MissingFields { fields, .. }) if fields == vec!["z"]
        ));
        assert!(matches!(
            vector.populate(json!({"x": 1.0, "y": 2.0, "z": 3.0, "w": 0.0})),
            Err(MessageTypeError::UnknownFields { fields, .. }) if fields == vec!["w"]
        ));
        assert!(matches!(
            vector.populate(json!([1.0, 2.0, 3.0])),
            Err(MessageTypeError::NotAnObject { .. })
        ));
    }

    #[test]
    fn test_empty_type_accepts_empty_object_only() {
        let registry = MessageTypeRegistry::with_builtins();
        let empty = registry.resolve("std_msgs/Empty").unwrap();
        assert!(empty.populate(json!({})).is_ok());
        assert!(empty.populate(json!({"data": 1})).is_err());
    }
}
