//! Ops backing the browser-shaped globals of the preview sandbox.
//!
//! This module contains all custom ops and the extension! macro definition.
//! `bootstrap.js` wires them up as `console`, `parent.postMessage`, `crypto`,
//! `atob` and `btoa`. Timers use the runtime's own timer queue.

use crate::bridge::{ContextId, Envelope};
use anyhow::{anyhow, Error};
use deno_core::{op2, OpState};
use tokio::sync::mpsc::UnboundedSender;

// ============================================================================
// Boundary channel
// ============================================================================

/// The sandbox's end of the telemetry channel, stamped with its identity.
#[derive(Debug, Clone)]
pub struct SandboxPort {
    pub context: ContextId,
    pub outbox: UnboundedSender<Envelope>,
}

/// `parent.postMessage(data)` - hand a message to the embedding host.
#[op2]
pub fn op_post_message(state: &mut OpState, #[serde] data: serde_json::Value) {
    let Some(port) = state.try_borrow::<SandboxPort>() else {
        return;
    };
    let envelope = Envelope {
        origin: port.context,
        data,
    };
    if port.outbox.send(envelope).is_err() {
        tracing::debug!(context = %port.context, "Host listener closed, message dropped");
    }
}

// ============================================================================
// Native console
// ============================================================================

/// Output of the sandbox's own console, i.e. what the bridge forwards to.
#[derive(Debug, Default, Clone)]
pub struct NativeConsole {
    pub lines: Vec<NativeLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeLine {
    pub level: String,
    pub text: String,
}

#[op2(fast)]
pub fn op_console_native(state: &mut OpState, #[string] level: &str, #[string] text: &str) {
    if let Some(port) = state.try_borrow::<SandboxPort>() {
        tracing::debug!(
            target: "live_markup::sandbox",
            context = %port.context,
            console = level,
            "{}",
            text
        );
    }
    if let Some(console) = state.try_borrow_mut::<NativeConsole>() {
        console.lines.push(NativeLine {
            level: level.to_string(),
            text: text.to_string(),
        });
    }
}

// ============================================================================
// Crypto Ops
// ============================================================================

#[op2]
#[string]
pub fn op_random_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[op2(fast)]
pub fn op_get_random_values(#[buffer] buf: &mut [u8]) {
    use rand::RngCore;
    rand::thread_rng().fill_bytes(buf);
}

// ============================================================================
// Encoding Ops
// ============================================================================

/// `btoa` - every code unit must fit in one byte (Latin-1).
#[op2]
#[string]
pub fn op_btoa(#[string] data: &str) -> Result<String, Error> {
    use base64::Engine;
    let bytes = latin1_bytes(data)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// `atob` - decoded bytes map one-to-one onto Latin-1 characters.
#[op2]
#[string]
pub fn op_atob(#[string] data: &str) -> Result<String, Error> {
    use base64::Engine;
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(compact.as_bytes()))
        .map_err(|e| anyhow!("InvalidCharacterError: invalid base64 input: {}", e))?;
    Ok(bytes.into_iter().map(char::from).collect())
}

fn latin1_bytes(data: &str) -> Result<Vec<u8>, Error> {
    data.chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| {
                anyhow!("InvalidCharacterError: '{}' is outside the Latin-1 range", c)
            })
        })
        .collect()
}

// ============================================================================
// Extension Definition
// ============================================================================

deno_core::extension!(
    preview_host,
    ops = [
        op_post_message,
        op_console_native,
        op_random_uuid,
        op_get_random_values,
        op_btoa,
        op_atob,
    ],
    esm_entry_point = "ext:preview_host/bootstrap.js",
    esm = ["ext:preview_host/bootstrap.js" = "src/bootstrap.js"],
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_bytes() {
        assert_eq!(latin1_bytes("hé").unwrap(), vec![b'h', 0xE9]);
        let err = latin1_bytes("✓").unwrap_err();
        assert!(err.to_string().contains("InvalidCharacterError"));
    }

    #[test]
    fn test_port_stamps_origin() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let context = ContextId::new();
        let port = SandboxPort {
            context,
            outbox: tx,
        };
        port.outbox
            .send(Envelope {
                origin: port.context,
                data: serde_json::json!({}),
            })
            .unwrap();
        assert_eq!(rx.try_recv().unwrap().origin, context);
    }
}
