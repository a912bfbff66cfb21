//! Project configuration: starting buffer contents and descriptive metadata.

use crate::buffer::Workspace;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_HTML: &str = r#"
<h2>Welcome to LiveMarkup 🚀</h2>
<p>Your instant frontend playground. Edit HTML, CSS, and JS on the editor and see the magic happen here.</p>

<div class="tip-box">
	<strong>Pro Tip:</strong> Pick a style library to add Tailwind, Bootstrap, MUI, or Bulma.
</div>
"#;

const DEFAULT_CSS: &str = r#"/* Your CSS code goes here */
body {
	font-family: system-ui, -apple-system, sans-serif;
	padding: 1rem;
	line-height: 1.5;
}

.tip-box {
	background: #f0f4f8;
	border-left: 4px solid #3b82f6;
	padding: 1rem;
	border-radius: 4px;
	margin-top: 1.5rem;
	color: #222;
}

.tip-box strong {
	color: #333;
}

h1 {
	margin-bottom: 0.5rem;
}
"#;

const DEFAULT_JS: &str = r#"// Your JavaScript code goes here
console.log("Welcome to LiveMarkup!");
console.log("Try adding a CSS library to see the UI transform instantly.");"#;

/// Initial contents of the three buffers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultContent {
    pub html: String,
    pub css: String,
    pub js: String,
}

impl Default for DefaultContent {
    fn default() -> Self {
        Self {
            html: DEFAULT_HTML.to_string(),
            css: DEFAULT_CSS.to_string(),
            js: DEFAULT_JS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectInfo {
    pub title: String,
    pub header_title: String,
    pub description: String,
    pub keywords: String,
    pub url: String,
}

impl Default for ProjectInfo {
    fn default() -> Self {
        Self {
            title: "LiveMarkup - HTML, CSS & JS Playground".to_string(),
            header_title: "LiveMarkup".to_string(),
            description: "Instant frontend playground with live preview and console output."
                .to_string(),
            keywords: "html, css, javascript, playground, live preview".to_string(),
            url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Author {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub url: String,
}

/// Everything supplied at startup. Only `default_content` reaches the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub default_content: DefaultContent,
    pub project_info: ProjectInfo,
    pub author: Author,
    pub repository: Repository,
}

impl ProjectConfig {
    /// Load a TOML project file. Omitted sections keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config '{}'", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config '{}'", path.display()))
    }

    pub fn default_workspace(&self) -> Workspace {
        let content = &self.default_content;
        Workspace::new(&content.html, &content.css, &content.js)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SourceKind;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_have_welcome_content() {
        let ws = ProjectConfig::default().default_workspace();
        assert!(ws.text(SourceKind::Html).contains("Welcome to LiveMarkup"));
        assert!(ws.text(SourceKind::Js).contains("console.log"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.toml");
        fs::write(
            &path,
            r#"
[default_content]
js = "console.log('custom')"

[author]
name = "Ada"
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.default_content.js, "console.log('custom')");
        assert_eq!(config.default_content.css, DEFAULT_CSS);
        assert_eq!(config.author.name, "Ada");
        assert_eq!(config.project_info.header_title, "LiveMarkup");
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.toml");
        fs::write(&path, "default_content = 3").unwrap();
        let err = ProjectConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }
}
