//! UI preferences and the local key-value store that persists them.
//!
//! The store holds opaque string blobs, like a browser's local storage: the
//! last-known buffer contents and one JSON-encoded [`PreferencesState`].

use crate::buffer::SourceKind;
use crate::compositor::StyleLibrary;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Smallest editor font size reachable with zoom out.
pub const MIN_FONT_SIZE: u8 = 8;
pub const DEFAULT_FONT_SIZE: u8 = 14;
pub const DEFAULT_TAB_WIDTH: u8 = 4;
/// Tab widths offered by the editor.
pub const TAB_WIDTHS: [u8; 3] = [2, 4, 8];
/// Viewports narrower than this stack the panes vertically.
pub const LG_BREAKPOINT: u32 = 1024;

const PREFERENCES_KEY: &str = "livemarkup.preferences";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreferenceError {
    #[error("unsupported tab width {0} (expected one of 2, 4, 8)")]
    TabWidth(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorTheme {
    #[default]
    Dark,
    Light,
}

impl EditorTheme {
    /// Editor theme identifier applied to all three editors.
    pub fn editor_theme_id(self) -> &'static str {
        match self {
            EditorTheme::Dark => "ace/theme/tomorrow_night_eighties",
            EditorTheme::Light => "ace/theme/chrome",
        }
    }
}

/// User's layout choice. `Auto` follows the viewport width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutPreference {
    #[default]
    Auto,
    Vertical,
    Horizontal,
}

/// Layout actually applied to the editor and preview panes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesState {
    pub theme: EditorTheme,
    pub font_size: u8,
    pub tab_width: u8,
    pub layout: LayoutPreference,
    pub library: Option<StyleLibrary>,
}

impl Default for PreferencesState {
    fn default() -> Self {
        Self {
            theme: EditorTheme::Dark,
            font_size: DEFAULT_FONT_SIZE,
            tab_width: DEFAULT_TAB_WIDTH,
            layout: LayoutPreference::Auto,
            library: None,
        }
    }
}

impl PreferencesState {
    pub fn zoom_in(&mut self) {
        self.font_size = self.font_size.saturating_add(1);
    }

    /// Shrink the font, never below [`MIN_FONT_SIZE`].
    pub fn zoom_out(&mut self) {
        if self.font_size > MIN_FONT_SIZE {
            self.font_size -= 1;
        }
    }

    pub fn toggle_theme(&mut self) {
        self.theme = match self.theme {
            EditorTheme::Dark => EditorTheme::Light,
            EditorTheme::Light => EditorTheme::Dark,
        };
    }

    pub fn set_tab_width(&mut self, width: u8) -> Result<(), PreferenceError> {
        if !TAB_WIDTHS.contains(&width) {
            return Err(PreferenceError::TabWidth(width));
        }
        self.tab_width = width;
        Ok(())
    }

    pub fn set_library(&mut self, library: Option<StyleLibrary>) {
        self.library = library;
    }

    pub fn resolve_layout(&self, viewport_width: u32) -> Layout {
        match self.layout {
            LayoutPreference::Vertical => Layout::Vertical,
            LayoutPreference::Horizontal => Layout::Horizontal,
            LayoutPreference::Auto if viewport_width < LG_BREAKPOINT => Layout::Vertical,
            LayoutPreference::Auto => Layout::Horizontal,
        }
    }

    /// Force the layout opposite to the one currently shown.
    pub fn toggle_layout(&mut self, viewport_width: u32) -> Layout {
        self.layout = match self.resolve_layout(viewport_width) {
            Layout::Vertical => LayoutPreference::Horizontal,
            Layout::Horizontal => LayoutPreference::Vertical,
        };
        self.resolve_layout(viewport_width)
    }

    /// A window resize drops any forced layout.
    pub fn reset_layout(&mut self) {
        self.layout = LayoutPreference::Auto;
    }
}

/// Opaque string storage keyed by name.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store, for tests and `--ephemeral` sessions.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by one JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt state file '{}'", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(anyhow!("Failed to read state file '{}': {}", path.display(), e))
            }
        };
        Ok(Self { path, entries })
    }

    /// `<data dir>/live-markup/state.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("live-markup").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("Failed to write state file '{}'", self.path.display()))
    }
}

/// Key under which a buffer's last-known text is stored.
pub fn buffer_key(kind: SourceKind) -> String {
    format!("livemarkup.buffer.{}", kind)
}

/// Load preferences; missing or corrupt blobs give the defaults.
pub fn load_preferences(store: &impl KeyValueStore) -> PreferencesState {
    let raw = match store.get(PREFERENCES_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return PreferencesState::default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read stored preferences");
            return PreferencesState::default();
        }
    };

    match serde_json::from_str::<PreferencesState>(&raw) {
        Ok(mut prefs) => {
            if !TAB_WIDTHS.contains(&prefs.tab_width) {
                prefs.tab_width = DEFAULT_TAB_WIDTH;
            }
            prefs.font_size = prefs.font_size.max(MIN_FONT_SIZE);
            prefs
        }
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring corrupt stored preferences");
            PreferencesState::default()
        }
    }
}

pub fn save_preferences(store: &mut impl KeyValueStore, prefs: &PreferencesState) -> Result<()> {
    let raw = serde_json::to_string(prefs)?;
    store.set(PREFERENCES_KEY, &raw)
}

/// Last-known text of a buffer, if one was saved.
pub fn load_buffer(store: &impl KeyValueStore, kind: SourceKind) -> Option<String> {
    match store.get(&buffer_key(kind)) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, buffer = %kind, "Failed to read stored buffer");
            None
        }
    }
}

pub fn save_buffer(store: &mut impl KeyValueStore, kind: SourceKind, text: &str) -> Result<()> {
    store.set(&buffer_key(kind), text)
}
