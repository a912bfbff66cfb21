//! Project directory watching for `live-markup watch`.
//!
//! [`ProjectWatcher`] turns filesystem notifications for the three project
//! files into a stream of change signals; [`PreviewSchedule`] coalesces those
//! signals with a [`Debouncer`] into preview runs.

use crate::buffer::SourceKind;
use crate::scheduler::Debouncer;
use anyhow::{bail, Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Signals a change to `index.html`, `style.css` or `script.js` in one directory.
pub struct ProjectWatcher {
    // Dropping the watcher stops the notifications.
    _watcher: RecommendedWatcher,
    changes: UnboundedReceiver<()>,
}

impl ProjectWatcher {
    pub fn new(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            bail!("'{}' is not a directory", dir.display());
        }

        let (tx, changes) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if touches_project_file(&event) => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "File watcher error"),
        })
        .context("Failed to create file watcher")?;

        // Non-recursive on the directory so editors that save by rename are seen.
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch '{}'", dir.display()))?;
        tracing::debug!(dir = %dir.display(), "Watching project directory");

        Ok(Self {
            _watcher: watcher,
            changes,
        })
    }

    /// Wait for the next change. Signals that piled up meanwhile are folded in.
    pub async fn changed(&mut self) -> Option<()> {
        self.changes.recv().await?;
        while self.changes.try_recv().is_ok() {}
        Some(())
    }
}

fn touches_project_file(event: &Event) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event.paths.iter().any(|path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| SourceKind::ALL.iter().any(|kind| kind.file_name() == name))
    })
}

/// A debounced preview request: bursts of [`trigger`](Self::trigger) calls
/// make [`due`](Self::due) resolve once, after the quiet period.
pub struct PreviewSchedule {
    debouncer: Debouncer,
    due: UnboundedReceiver<()>,
}

impl PreviewSchedule {
    pub fn new(delay: Duration) -> Self {
        let (tx, due) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(delay, move || {
            let _ = tx.send(());
        });
        Self { debouncer, due }
    }

    pub fn trigger(&mut self) {
        self.debouncer.trigger();
    }

    pub fn cancel(&mut self) {
        self.debouncer.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Resolves when a triggered preview run is due.
    pub async fn due(&mut self) -> Option<()> {
        self.due.recv().await
    }
}
