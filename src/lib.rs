//! # LiveMarkup
//!
//! Core of a live HTML/CSS/JS playground: three source buffers are composed
//! into a preview document, run in a sandboxed V8 isolate, and everything the
//! preview logs is relayed back across the sandbox boundary to a log panel.
//!
//! ## Sandbox Guarantees
//!
//! - **Fresh context per cycle**: every preview discards the previous isolate
//! - **No network access**: library references are composed, never fetched
//! - **No module loading**: `import()` is refused
//! - **No system access**: no fs, env, or process APIs exist in the sandbox
//! - **Bounded**: heap limit and per-cycle time limit
//! - **Checked telemetry**: only tagged messages from the embedded context
//!   reach the log panel
//!
//! ## Usage
//!
//! ```rust,ignore
//! use live_markup::{MemoryStore, Playground, ProjectConfig, SandboxConfig, SourceKind};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut playground = Playground::new(
//!         ProjectConfig::default(),
//!         MemoryStore::new(),
//!         SandboxConfig::default(),
//!     );
//!     playground.edit(SourceKind::Js, "console.log('hello', { a: 1 })")?;
//!     playground.run_preview().await?;
//!     playground.panel().write_to(&mut std::io::stdout())?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod buffer;
pub mod compositor;
pub mod config;
pub mod export;
pub mod format;
pub mod host;
pub mod instrument;
mod loader;
mod ops;
pub mod playground;
pub mod preferences;
pub mod renderer;
pub mod scheduler;
pub mod value;
pub mod watch;

pub use bridge::{BridgeListener, ContextId, Envelope, Rejection};
pub use buffer::{SourceBuffer, SourceKind, Workspace};
pub use compositor::{compose, StyleLibrary, SyntheticDocument};
pub use config::ProjectConfig;
pub use format::{format_source, FormatError};
pub use host::{CycleReport, SandboxConfig, SandboxHost};
pub use ops::NativeLine;
pub use playground::Playground;
pub use preferences::{JsonFileStore, KeyValueStore, MemoryStore, PreferencesState};
pub use renderer::LogPanel;
pub use scheduler::{Debouncer, PREVIEW_DEBOUNCE};
pub use value::{LogEvent, LogLevel, SerializedValue};
pub use watch::{PreviewSchedule, ProjectWatcher};
