//! Source buffers edited by the user: one HTML, one CSS and one JS buffer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which of the three editor panes a buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Html,
    Css,
    Js,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Html, SourceKind::Css, SourceKind::Js];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Html => "html",
            SourceKind::Css => "css",
            SourceKind::Js => "js",
        }
    }

    /// File name used for this buffer in exports and watched directories.
    pub fn file_name(self) -> &'static str {
        match self {
            SourceKind::Html => "index.html",
            SourceKind::Css => "style.css",
            SourceKind::Js => "script.js",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" | "htm" => Ok(SourceKind::Html),
            "css" => Ok(SourceKind::Css),
            "js" | "javascript" | "mjs" => Ok(SourceKind::Js),
            other => Err(anyhow::anyhow!("Unknown source kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBuffer {
    pub kind: SourceKind,
    pub text: String,
}

/// The three buffers of one playground session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    html: SourceBuffer,
    css: SourceBuffer,
    js: SourceBuffer,
}

impl Workspace {
    pub fn new(html: impl Into<String>, css: impl Into<String>, js: impl Into<String>) -> Self {
        Self {
            html: SourceBuffer {
                kind: SourceKind::Html,
                text: html.into(),
            },
            css: SourceBuffer {
                kind: SourceKind::Css,
                text: css.into(),
            },
            js: SourceBuffer {
                kind: SourceKind::Js,
                text: js.into(),
            },
        }
    }

    pub fn buffer(&self, kind: SourceKind) -> &SourceBuffer {
        match kind {
            SourceKind::Html => &self.html,
            SourceKind::Css => &self.css,
            SourceKind::Js => &self.js,
        }
    }

    pub fn text(&self, kind: SourceKind) -> &str {
        &self.buffer(kind).text
    }

    /// Replace a buffer's text. Returns `false` when the text is unchanged.
    pub fn edit(&mut self, kind: SourceKind, text: impl Into<String>) -> bool {
        let text = text.into();
        let buffer = match kind {
            SourceKind::Html => &mut self.html,
            SourceKind::Css => &mut self.css,
            SourceKind::Js => &mut self.js,
        };
        if buffer.text == text {
            return false;
        }
        buffer.text = text;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_reports_changes() {
        let mut ws = Workspace::new("<p>x</p>", "", "");
        assert!(!ws.edit(SourceKind::Html, "<p>x</p>"));
        assert!(ws.edit(SourceKind::Css, "p{color:red}"));
        assert_eq!(ws.text(SourceKind::Css), "p{color:red}");
        assert_eq!(ws.buffer(SourceKind::Css).kind, SourceKind::Css);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("HTML".parse::<SourceKind>().unwrap(), SourceKind::Html);
        assert_eq!("javascript".parse::<SourceKind>().unwrap(), SourceKind::Js);
        assert!("rust".parse::<SourceKind>().is_err());
    }
}
