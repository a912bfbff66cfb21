//! Values that cross the sandbox boundary.
//!
//! The shim reduces every console argument to JSON before posting it. This
//! module gives that JSON a typed shape on the host side.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};
use std::fmt;

/// Console level of a relayed log call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Warn,
    Error,
    Info,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Info => "info",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transferable form of a sandbox runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum SerializedValue {
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// An exception value, reduced to `{isError: true, message, stack}`.
    Error {
        message: String,
        stack: Option<String>,
    },
    /// Any array or plain object, already deep-copied by the shim.
    Structured(Value),
}

impl SerializedValue {
    /// Decode one argument of a boundary message.
    pub fn from_wire(value: Value) -> Self {
        match value {
            Value::Null => SerializedValue::Null,
            Value::Bool(b) => SerializedValue::Bool(b),
            Value::Number(n) => SerializedValue::Number(n),
            Value::String(s) => SerializedValue::String(s),
            Value::Object(map) => Self::from_object(map),
            array @ Value::Array(_) => SerializedValue::Structured(array),
        }
    }

    fn from_object(mut map: Map<String, Value>) -> Self {
        if map.get("isUndefined") == Some(&Value::Bool(true)) && map.len() == 1 {
            return SerializedValue::Undefined;
        }
        if map.get("isError") == Some(&Value::Bool(true)) {
            let message = match map.remove("message") {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => String::new(),
            };
            let stack = match map.remove("stack") {
                Some(Value::String(s)) if !s.is_empty() => Some(s),
                _ => None,
            };
            return SerializedValue::Error { message, stack };
        }
        SerializedValue::Structured(Value::Object(map))
    }

    /// Encode back into the wire shape the shim produces.
    pub fn to_wire(&self) -> Value {
        match self {
            SerializedValue::Undefined => json!({ "isUndefined": true }),
            SerializedValue::Null => Value::Null,
            SerializedValue::Bool(b) => Value::Bool(*b),
            SerializedValue::Number(n) => Value::Number(n.clone()),
            SerializedValue::String(s) => Value::String(s.clone()),
            SerializedValue::Error { message, stack } => match stack {
                Some(stack) => json!({ "isError": true, "message": message, "stack": stack }),
                None => json!({ "isError": true, "message": message }),
            },
            SerializedValue::Structured(v) => v.clone(),
        }
    }

    /// Text shown in the log panel for this argument.
    pub fn display_text(&self) -> String {
        match self {
            SerializedValue::Undefined => "undefined".to_string(),
            SerializedValue::Null => "null".to_string(),
            SerializedValue::Bool(b) => b.to_string(),
            SerializedValue::Number(n) => n.to_string(),
            SerializedValue::String(s) => s.clone(),
            SerializedValue::Error { message, stack } => match stack {
                Some(stack) => format!("{}\n{}", message, stack),
                None => message.clone(),
            },
            SerializedValue::Structured(v) => {
                serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
            }
        }
    }
}

impl From<&str> for SerializedValue {
    fn from(value: &str) -> Self {
        SerializedValue::String(value.to_string())
    }
}

/// One relayed console call.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub args: Vec<SerializedValue>,
}

impl LogEvent {
    pub fn new(level: LogLevel, args: Vec<SerializedValue>) -> Self {
        Self { level, args }
    }

    /// Rendered text of all arguments, space separated.
    pub fn text(&self) -> String {
        self.args
            .iter()
            .map(SerializedValue::display_text)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
