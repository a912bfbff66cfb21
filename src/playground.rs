//! The playground controller: owns the buffers, preferences, sandbox host,
//! bridge listener and log panel, and runs preview cycles over them.

use crate::bridge::{BridgeListener, ContextId, Envelope};
use crate::buffer::{SourceKind, Workspace};
use crate::compositor::{compose, StyleLibrary, SyntheticDocument};
use crate::config::ProjectConfig;
use crate::export::export_bundle;
use crate::format::format_source;
use crate::host::{CycleReport, SandboxConfig, SandboxHost};
use crate::preferences::{
    load_buffer, load_preferences, save_buffer, save_preferences, KeyValueStore, Layout,
    PreferencesState,
};
use crate::renderer::LogPanel;
use crate::value::{LogEvent, LogLevel, SerializedValue};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub struct Playground<S: KeyValueStore> {
    config: ProjectConfig,
    workspace: Workspace,
    preferences: PreferencesState,
    store: S,
    host: SandboxHost,
    inbox: UnboundedReceiver<Envelope>,
    listener: BridgeListener,
    panel: LogPanel,
    last_report: Option<CycleReport>,
}

impl<S: KeyValueStore> Playground<S> {
    /// Build the playground, restoring buffers and preferences from `store`.
    /// Buffers never saved start with the configured default content.
    pub fn new(config: ProjectConfig, store: S, sandbox: SandboxConfig) -> Self {
        let defaults = config.default_workspace();
        let restore = |kind: SourceKind| {
            load_buffer(&store, kind).unwrap_or_else(|| defaults.text(kind).to_string())
        };
        let workspace = Workspace::new(
            restore(SourceKind::Html),
            restore(SourceKind::Css),
            restore(SourceKind::Js),
        );
        let preferences = load_preferences(&store);
        let (host, inbox) = SandboxHost::new(sandbox);

        Self {
            config,
            workspace,
            preferences,
            store,
            host,
            inbox,
            listener: BridgeListener::new(),
            panel: LogPanel::default(),
            last_report: None,
        }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn preferences(&self) -> &PreferencesState {
        &self.preferences
    }

    pub fn panel(&self) -> &LogPanel {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut LogPanel {
        &mut self.panel
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Report of the most recent preview cycle.
    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    /// Sender into the boundary channel the listener drains.
    pub fn outbox(&self) -> UnboundedSender<Envelope> {
        self.host.outbox()
    }

    /// Replace a buffer and persist it. Returns false if the text was unchanged.
    pub fn edit(&mut self, kind: SourceKind, text: impl Into<String>) -> Result<bool> {
        if !self.workspace.edit(kind, text) {
            return Ok(false);
        }
        save_buffer(&mut self.store, kind, self.workspace.text(kind))?;
        Ok(true)
    }

    /// Copy the project files in `dir` (`index.html`, `style.css`, `script.js`)
    /// into the buffers. Missing files leave their buffer alone. Returns true
    /// if any buffer changed.
    pub fn sync_from_dir(&mut self, dir: &Path) -> Result<bool> {
        let mut changed = false;
        for kind in SourceKind::ALL {
            let path = dir.join(kind.file_name());
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read project file");
                    continue;
                }
            };
            changed |= self.edit(kind, text)?;
        }
        Ok(changed)
    }

    /// The document the next preview cycle would load.
    pub fn document(&self) -> SyntheticDocument {
        compose(&self.workspace, self.preferences.library.as_ref())
    }

    /// Run one preview cycle: clear the console, embed a fresh sandbox
    /// context with the composed document and relay what it logged.
    pub async fn run_preview(&mut self) -> Result<&CycleReport> {
        self.panel.clear();

        let context = ContextId::new();
        self.listener.embed(context);
        let document = self.document();
        tracing::debug!(%context, bytes = document.markup().len(), "Loading preview");

        let report = self.host.load(context, &document).await?;
        self.drain_telemetry();

        if let Some(notice) = interruption_notice(&report, self.host.config()) {
            self.panel.append(&notice);
        }
        tracing::info!(
            %context,
            entries = self.panel.len(),
            uncaught = report.uncaught_errors,
            "Preview cycle finished"
        );

        Ok(self.last_report.insert(report))
    }

    /// Relay queued boundary messages to the panel. Returns how many were
    /// accepted; the rest are dropped.
    pub fn drain_telemetry(&mut self) -> usize {
        let mut accepted = 0;
        while let Ok(envelope) = self.inbox.try_recv() {
            match self.listener.accept(envelope) {
                Ok(event) => {
                    self.panel.append(&event);
                    accepted += 1;
                }
                Err(rejection) => {
                    tracing::debug!(%rejection, "Dropped boundary message");
                }
            }
        }
        accepted
    }

    pub fn clear_console(&mut self) {
        self.panel.clear();
    }

    /// Re-indent a buffer with the preferred tab width. A buffer that cannot
    /// be formatted is left as is and `Ok(false)` is returned.
    pub fn format_buffer(&mut self, kind: SourceKind) -> Result<bool> {
        let formatted = match format_source(kind, self.workspace.text(kind), self.preferences.tab_width)
        {
            Ok(formatted) => formatted,
            Err(e) => {
                tracing::error!(buffer = %kind, error = %e, "Formatting failed");
                return Ok(false);
            }
        };
        self.edit(kind, formatted)
    }

    /// Export the buffers as a zip archive in `dir`.
    pub fn export(&self, dir: &Path) -> Result<PathBuf> {
        let now = chrono::Local::now().naive_local();
        export_bundle(&self.workspace, dir, &now)
    }

    pub fn zoom_in(&mut self) -> Result<()> {
        self.update_preferences(PreferencesState::zoom_in)
    }

    pub fn zoom_out(&mut self) -> Result<()> {
        self.update_preferences(PreferencesState::zoom_out)
    }

    pub fn toggle_theme(&mut self) -> Result<()> {
        self.update_preferences(PreferencesState::toggle_theme)
    }

    pub fn set_tab_width(&mut self, width: u8) -> Result<()> {
        self.preferences.set_tab_width(width)?;
        save_preferences(&mut self.store, &self.preferences)
    }

    /// Select the style library referenced by later previews.
    pub fn set_library(&mut self, library: Option<StyleLibrary>) -> Result<()> {
        self.update_preferences(|prefs| prefs.set_library(library))
    }

    pub fn toggle_layout(&mut self, viewport_width: u32) -> Result<Layout> {
        let layout = self.preferences.toggle_layout(viewport_width);
        save_preferences(&mut self.store, &self.preferences)?;
        Ok(layout)
    }

    pub fn reset_layout(&mut self) -> Result<()> {
        self.update_preferences(PreferencesState::reset_layout)
    }

    fn update_preferences(&mut self, change: impl FnOnce(&mut PreferencesState)) -> Result<()> {
        change(&mut self.preferences);
        save_preferences(&mut self.store, &self.preferences)
    }
}

/// Error line shown when the host cut a cycle short.
fn interruption_notice(report: &CycleReport, config: &SandboxConfig) -> Option<LogEvent> {
    let text = if report.timed_out {
        match config.timeout_ms {
            Some(ms) => format!("Preview stopped: script ran longer than {} ms", ms),
            None => "Preview stopped: script ran too long".to_string(),
        }
    } else if report.out_of_memory {
        "Preview stopped: script exceeded the memory limit".to_string()
    } else {
        return None;
    };
    Some(LogEvent::new(
        LogLevel::Error,
        vec![SerializedValue::String(text)],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::SOURCE_TAG;
    use crate::preferences::{buffer_key, EditorTheme, MemoryStore};
    use serde_json::json;
    use tempfile::tempdir;

    fn playground() -> Playground<MemoryStore> {
        Playground::new(
            ProjectConfig::default(),
            MemoryStore::new(),
            SandboxConfig {
                timeout_ms: Some(2_000),
                ..Default::default()
            },
        )
    }

    fn texts(playground: &Playground<MemoryStore>) -> Vec<String> {
        playground
            .panel()
            .entries()
            .iter()
            .map(|entry| entry.text.clone())
            .collect()
    }

    #[test]
    fn test_starts_from_config_then_store() {
        let fresh = playground();
        assert!(fresh.workspace().text(SourceKind::Html).contains("Welcome to LiveMarkup"));

        let mut store = MemoryStore::new();
        store.set(&buffer_key(SourceKind::Js), "console.log('saved')").unwrap();
        let restored = Playground::new(ProjectConfig::default(), store, SandboxConfig::default());
        assert_eq!(restored.workspace().text(SourceKind::Js), "console.log('saved')");
        assert!(restored.workspace().text(SourceKind::Css).contains("tip-box"));
    }

    #[test]
    fn test_edit_persists_buffer() {
        let mut pg = playground();
        assert!(pg.edit(SourceKind::Css, "p { color: red; }").unwrap());
        assert!(!pg.edit(SourceKind::Css, "p { color: red; }").unwrap());
        assert_eq!(
            pg.store().get(&buffer_key(SourceKind::Css)).unwrap().as_deref(),
            Some("p { color: red; }")
        );
    }

    #[tokio::test]
    async fn test_preview_relays_welcome_logs() {
        let mut pg = playground();
        let report = pg.run_preview().await.unwrap();
        assert!(!report.interrupted());
        assert_eq!(
            texts(&pg),
            vec![
                "Welcome to LiveMarkup!",
                "Try adding a CSS library to see the UI transform instantly."
            ]
        );
    }

    #[tokio::test]
    async fn test_each_cycle_starts_with_empty_console() {
        let mut pg = playground();
        pg.edit(SourceKind::Js, "console.log('once')").unwrap();
        pg.run_preview().await.unwrap();
        pg.run_preview().await.unwrap();
        assert_eq!(texts(&pg), vec!["once"]);
    }

    #[tokio::test]
    async fn test_foreign_envelope_is_dropped() {
        let mut pg = playground();
        pg.edit(SourceKind::Js, "console.log('mine')").unwrap();
        pg.run_preview().await.unwrap();
        let before = pg.panel().len();

        pg.outbox()
            .send(Envelope {
                origin: ContextId::new(),
                data: json!({ "source": SOURCE_TAG, "level": "log", "message": ["forged"] }),
            })
            .unwrap();
        assert_eq!(pg.drain_telemetry(), 0);
        assert_eq!(pg.panel().len(), before);
    }

    #[tokio::test]
    async fn test_runaway_script_leaves_notice() {
        let mut pg = Playground::new(
            ProjectConfig::default(),
            MemoryStore::new(),
            SandboxConfig {
                timeout_ms: Some(200),
                ..Default::default()
            },
        );
        pg.edit(SourceKind::Js, "console.log('start'); while (true) {}").unwrap();
        let report = pg.run_preview().await.unwrap();
        assert!(report.timed_out);

        let entries = pg.panel().entries();
        assert_eq!(entries.first().unwrap().text, "start");
        let last = entries.last().unwrap();
        assert_eq!(last.level, LogLevel::Error);
        assert!(last.text.contains("longer than 200 ms"));
    }

    #[tokio::test]
    async fn test_clear_console_keeps_preview() {
        let mut pg = playground();
        pg.run_preview().await.unwrap();
        let context = pg.last_report().unwrap().context;
        pg.clear_console();
        assert!(pg.panel().is_empty());
        assert_eq!(pg.last_report().unwrap().context, context);
    }

    #[test]
    fn test_format_failure_leaves_buffer() {
        let mut pg = playground();
        pg.edit(SourceKind::Js, "function broken() {").unwrap();
        assert!(!pg.format_buffer(SourceKind::Js).unwrap());
        assert_eq!(pg.workspace().text(SourceKind::Js), "function broken() {");
    }

    #[test]
    fn test_format_uses_tab_width() {
        let mut pg = playground();
        pg.set_tab_width(2).unwrap();
        pg.edit(SourceKind::Css, "a {\ncolor: red;\n}").unwrap();
        assert!(pg.format_buffer(SourceKind::Css).unwrap());
        assert_eq!(pg.workspace().text(SourceKind::Css), "a {\n  color: red;\n}\n");
    }

    #[test]
    fn test_preferences_persist() {
        let mut pg = playground();
        pg.toggle_theme().unwrap();
        pg.zoom_in().unwrap();
        pg.set_library(Some(StyleLibrary::Bulma)).unwrap();
        assert!(pg.set_tab_width(3).is_err());

        let stored = load_preferences(pg.store());
        assert_eq!(stored.theme, EditorTheme::Light);
        assert_eq!(stored.font_size, 15);
        assert_eq!(stored.library, Some(StyleLibrary::Bulma));
        assert!(pg.document().markup().contains(StyleLibrary::Bulma.href()));
    }

    #[test]
    fn test_layout_toggle_and_reset() {
        let mut pg = playground();
        assert_eq!(pg.toggle_layout(1280).unwrap(), Layout::Vertical);
        pg.reset_layout().unwrap();
        assert_eq!(pg.preferences().resolve_layout(1280), Layout::Horizontal);
    }

    #[test]
    fn test_sync_from_dir_copies_present_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("script.js"), "console.log('disk')").unwrap();

        let mut pg = playground();
        let css = pg.workspace().text(SourceKind::Css).to_string();
        assert!(pg.sync_from_dir(dir.path()).unwrap());
        assert_eq!(pg.workspace().text(SourceKind::Js), "console.log('disk')");
        assert_eq!(pg.workspace().text(SourceKind::Css), css);
        assert!(!pg.sync_from_dir(dir.path()).unwrap());
    }

    #[test]
    fn test_export_writes_archive() {
        let dir = tempdir().unwrap();
        let pg = playground();
        let path = pg.export(dir.path()).unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("code-project-") && name.ends_with(".zip"));
    }
}
