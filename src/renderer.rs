//! Log panel - renders relayed console events in arrival order.

use crate::value::{LogEvent, LogLevel};
use std::io::{self, Write};

/// Lines shown at once when no viewport height is set.
pub const DEFAULT_VIEWPORT_LINES: usize = 40;

/// One rendered console call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub text: String,
}

impl LogEntry {
    pub fn label(&self) -> &'static str {
        self.level.as_str()
    }

    fn line_count(&self) -> usize {
        self.text.lines().count().max(1)
    }
}

/// Scrollable list of rendered entries that follows the newest one.
#[derive(Debug)]
pub struct LogPanel {
    entries: Vec<LogEntry>,
    viewport_lines: usize,
    scroll_top: usize,
}

impl Default for LogPanel {
    fn default() -> Self {
        Self::new(DEFAULT_VIEWPORT_LINES)
    }
}

impl LogPanel {
    pub fn new(viewport_lines: usize) -> Self {
        Self {
            entries: Vec::new(),
            viewport_lines: viewport_lines.max(1),
            scroll_top: 0,
        }
    }

    /// Render an event at the end of the list and scroll to it.
    pub fn append(&mut self, event: &LogEvent) {
        self.entries.push(LogEntry {
            level: event.level,
            text: event.text(),
        });
        self.scroll_to_bottom();
    }

    /// Empty the panel. The preview is not touched.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.scroll_top = 0;
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_lines(&self) -> usize {
        self.entries.iter().map(LogEntry::line_count).sum()
    }

    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    pub fn set_viewport_lines(&mut self, lines: usize) {
        self.viewport_lines = lines.max(1);
        self.scroll_to_bottom();
    }

    /// Scroll up by `lines`, stopping at the first line.
    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_top = self.scroll_top.saturating_sub(lines);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_top = self.total_lines().saturating_sub(self.viewport_lines);
    }

    /// Labeled lines currently inside the viewport.
    pub fn visible_lines(&self) -> Vec<(LogLevel, &str)> {
        self.entries
            .iter()
            .flat_map(|entry| {
                let lines: Vec<&str> = if entry.text.is_empty() {
                    vec![""]
                } else {
                    entry.text.lines().collect()
                };
                lines.into_iter().map(move |line| (entry.level, line))
            })
            .skip(self.scroll_top)
            .take(self.viewport_lines)
            .collect()
    }

    /// Write every entry as `[LEVEL] text`, continuation lines indented.
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        for entry in &self.entries {
            let label = format!("[{}]", entry.label().to_ascii_uppercase());
            let mut lines = entry.text.lines();
            writeln!(out, "{} {}", label, lines.next().unwrap_or(""))?;
            for line in lines {
                writeln!(out, "{:width$} {}", "", line, width = label.len())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SerializedValue;
    use serde_json::json;

    fn event(level: LogLevel, text: &str) -> LogEvent {
        LogEvent::new(level, vec![text.into()])
    }

    #[test]
    fn test_append_preserves_arrival_order() {
        let mut panel = LogPanel::default();
        panel.append(&event(LogLevel::Log, "first"));
        panel.append(&event(LogLevel::Warn, "second"));
        let texts: Vec<_> = panel.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
        assert_eq!(panel.entries()[1].label(), "warn");
    }

    #[test]
    fn test_clear_empties_panel() {
        let mut panel = LogPanel::default();
        panel.append(&event(LogLevel::Info, "x"));
        panel.clear();
        assert!(panel.is_empty());
        assert_eq!(panel.scroll_top(), 0);
    }

    #[test]
    fn test_follows_newest_entry() {
        let mut panel = LogPanel::new(2);
        for i in 0..5 {
            panel.append(&event(LogLevel::Log, &i.to_string()));
        }
        assert_eq!(panel.scroll_top(), 3);
        let visible: Vec<_> = panel.visible_lines().into_iter().map(|(_, l)| l).collect();
        assert_eq!(visible, ["3", "4"]);

        panel.scroll_up(10);
        assert_eq!(panel.scroll_top(), 0);
        panel.append(&event(LogLevel::Log, "5"));
        assert_eq!(panel.scroll_top(), 4);
    }

    #[test]
    fn test_multiline_entries_count_all_lines() {
        let mut panel = LogPanel::new(10);
        panel.append(&LogEvent::new(
            LogLevel::Log,
            vec![SerializedValue::from_wire(json!({ "a": 1 }))],
        ));
        assert_eq!(panel.total_lines(), 3);
    }

    #[test]
    fn test_write_to_labels_entries() {
        let mut panel = LogPanel::default();
        panel.append(&LogEvent::new(
            LogLevel::Error,
            vec![SerializedValue::Error {
                message: "boom".into(),
                stack: Some("at x".into()),
            }],
        ));
        let mut out = Vec::new();
        panel.write_to(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[ERROR] boom\n        at x\n");
    }
}
