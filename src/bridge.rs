//! Host side of the telemetry bridge.
//!
//! Every `parent.postMessage` call inside the sandbox arrives here as an
//! [`Envelope`] stamped with the sender's [`ContextId`]. The listener only lets
//! through messages that come from the context currently embedded and that
//! carry the shim's source tag.

use crate::instrument::SOURCE_TAG;
use crate::value::{LogEvent, LogLevel, SerializedValue};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Identity of one embedded sandbox context.
///
/// A fresh id is minted for every preview cycle, so messages from a replaced
/// context never match the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message posted across the sandbox boundary.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: ContextId,
    pub data: serde_json::Value,
}

/// Why a boundary message was dropped.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("no sandbox context is embedded")]
    NotEmbedded,
    #[error("message from context {actual} does not match embedded context {expected}")]
    ForeignOrigin {
        expected: ContextId,
        actual: ContextId,
    },
    #[error("message does not carry the console bridge source tag")]
    MissingSourceTag,
    #[error("malformed console message: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    level: LogLevel,
    #[serde(default)]
    message: Vec<serde_json::Value>,
}

/// Validates boundary messages for the currently embedded context.
#[derive(Debug, Default)]
pub struct BridgeListener {
    embedded: Option<ContextId>,
}

impl BridgeListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the listener at a newly embedded context.
    pub fn embed(&mut self, context: ContextId) {
        self.embedded = Some(context);
    }

    pub fn embedded(&self) -> Option<ContextId> {
        self.embedded
    }

    /// Validate an envelope and decode it into a [`LogEvent`].
    pub fn accept(&self, envelope: Envelope) -> Result<LogEvent, Rejection> {
        let expected = self.embedded.ok_or(Rejection::NotEmbedded)?;
        if envelope.origin != expected {
            return Err(Rejection::ForeignOrigin {
                expected,
                actual: envelope.origin,
            });
        }

        let tagged = envelope
            .data
            .get("source")
            .and_then(serde_json::Value::as_str)
            == Some(SOURCE_TAG);
        if !tagged {
            return Err(Rejection::MissingSourceTag);
        }

        let wire: WireMessage = serde_json::from_value(envelope.data)?;

        Ok(LogEvent::new(
            wire.level,
            wire.message
                .into_iter()
                .map(SerializedValue::from_wire)
                .collect(),
        ))
    }
}
