//! Preview compositor - assembles the three buffers into one synthetic document.
//!
//! The layering order is fixed:
//! shell -> library reference -> instrumentation -> `<style>` -> `<body>` -> guarded `<script>`.

use crate::buffer::{SourceKind, Workspace};
use crate::instrument;
use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// An auxiliary style library injected ahead of the user's CSS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StyleLibrary {
    Tailwind,
    Bootstrap,
    Bulma,
    Mui,
    /// Any other stylesheet, referenced by absolute http(s) URL.
    Custom(Url),
}

/// How a library is referenced from the document head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Stylesheet,
    Script,
}

impl StyleLibrary {
    pub const BUILTIN: [StyleLibrary; 4] = [
        StyleLibrary::Tailwind,
        StyleLibrary::Bootstrap,
        StyleLibrary::Bulma,
        StyleLibrary::Mui,
    ];

    pub fn href(&self) -> &str {
        match self {
            StyleLibrary::Tailwind => "https://cdn.tailwindcss.com",
            StyleLibrary::Bootstrap => {
                "https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css"
            }
            StyleLibrary::Bulma => "https://cdn.jsdelivr.net/npm/bulma@1.0.2/css/bulma.min.css",
            StyleLibrary::Mui => "https://cdn.muicss.com/mui-0.10.3/css/mui.min.css",
            StyleLibrary::Custom(url) => url.as_str(),
        }
    }

    pub fn reference_kind(&self) -> ReferenceKind {
        match self {
            // Tailwind's play CDN is a script that generates styles at runtime
            StyleLibrary::Tailwind => ReferenceKind::Script,
            _ => ReferenceKind::Stylesheet,
        }
    }

    fn reference_tag(&self) -> String {
        match self.reference_kind() {
            ReferenceKind::Script => format!(r#"<script src="{}"></script>"#, self.href()),
            ReferenceKind::Stylesheet => {
                format!(r#"<link rel="stylesheet" href="{}">"#, self.href())
            }
        }
    }
}

impl fmt::Display for StyleLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleLibrary::Tailwind => f.write_str("tailwind"),
            StyleLibrary::Bootstrap => f.write_str("bootstrap"),
            StyleLibrary::Bulma => f.write_str("bulma"),
            StyleLibrary::Mui => f.write_str("mui"),
            StyleLibrary::Custom(url) => f.write_str(url.as_str()),
        }
    }
}

impl FromStr for StyleLibrary {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tailwind" | "tailwindcss" => return Ok(StyleLibrary::Tailwind),
            "bootstrap" => return Ok(StyleLibrary::Bootstrap),
            "bulma" => return Ok(StyleLibrary::Bulma),
            "mui" | "muicss" => return Ok(StyleLibrary::Mui),
            _ => {}
        }

        let url = Url::parse(s.trim()).map_err(|e| anyhow!("Unknown style library '{}': {}", s, e))?;
        match url.scheme() {
            "http" | "https" => Ok(StyleLibrary::Custom(url)),
            other => Err(anyhow!(
                "Style library URLs must be http or https, got: {}",
                other
            )),
        }
    }
}

impl TryFrom<String> for StyleLibrary {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StyleLibrary> for String {
    fn from(value: StyleLibrary) -> Self {
        value.to_string()
    }
}

/// A composed preview document. Never mutated; rebuilt on every preview cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticDocument {
    markup: String,
}

impl SyntheticDocument {
    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn into_markup(self) -> String {
        self.markup
    }

    /// Bodies of the inline classic scripts, in document order.
    ///
    /// Blocks carrying a `src` attribute are external and are skipped here, as
    /// are data blocks and modules (any `type` that is not classic JavaScript)
    /// and anything inside an HTML comment.
    pub fn inline_scripts(&self) -> Vec<&str> {
        scan_tags(&self.markup)
            .into_iter()
            .filter(|tag| tag.name == "script")
            .filter(|tag| attribute(tag.open, "src").is_none())
            .filter(|tag| is_classic_script(attribute(tag.open, "type").as_deref()))
            .filter_map(|tag| tag.body)
            .collect()
    }

    /// `src` and stylesheet `href` references, in document order.
    pub fn external_resources(&self) -> Vec<String> {
        scan_tags(&self.markup)
            .into_iter()
            .filter_map(|tag| match tag.name.as_str() {
                "script" => attribute(tag.open, "src"),
                "link" => {
                    let rel = attribute(tag.open, "rel").unwrap_or_default();
                    let stylesheet = rel
                        .split_ascii_whitespace()
                        .any(|token| token.eq_ignore_ascii_case("stylesheet"));
                    stylesheet.then(|| attribute(tag.open, "href")).flatten()
                }
                _ => None,
            })
            .collect()
    }
}

/// Elements whose content is text up to the matching end tag.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// `type` values that run as classic scripts.
const JAVASCRIPT_TYPES: [&str; 16] = [
    "application/ecmascript",
    "application/javascript",
    "application/x-ecmascript",
    "application/x-javascript",
    "text/ecmascript",
    "text/javascript",
    "text/javascript1.0",
    "text/javascript1.1",
    "text/javascript1.2",
    "text/javascript1.3",
    "text/javascript1.4",
    "text/javascript1.5",
    "text/jscript",
    "text/livescript",
    "text/x-ecmascript",
    "text/x-javascript",
];

fn is_classic_script(script_type: Option<&str>) -> bool {
    match script_type.map(str::trim) {
        None | Some("") => true,
        Some(t) => JAVASCRIPT_TYPES.iter().any(|js| js.eq_ignore_ascii_case(t)),
    }
}

/// An opening tag, with the content of raw text elements.
struct TagMatch<'a> {
    name: String,
    open: &'a str,
    body: Option<&'a str>,
}

/// Opening tags in document order. Comments are skipped and `script`/`style`
/// content is never searched for tags.
fn scan_tags(markup: &str) -> Vec<TagMatch<'_>> {
    let lower = markup.to_ascii_lowercase();
    let mut tags = Vec::new();
    let mut pos = 0;

    while let Some(i) = lower[pos..].find('<') {
        let at = pos + i;
        let rest = &lower[at..];

        if let Some(comment) = rest.strip_prefix("<!--") {
            pos = comment.find("-->").map_or(lower.len(), |j| at + 4 + j + 3);
            continue;
        }

        let name: String = rest[1..]
            .chars()
            .take_while(|&c| c.is_ascii_alphanumeric() || c == '-')
            .collect();
        if name.is_empty() {
            pos = at + 1;
            continue;
        }

        let open_end = rest.find('>').map_or(lower.len(), |j| at + j);
        let mut next = (open_end + 1).min(lower.len());
        let mut body = None;

        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            let close = lower[next..]
                .find(&format!("</{}", name))
                .map_or(lower.len(), |j| next + j);
            body = Some(&markup[next..close]);
            next = lower[close..].find('>').map_or(lower.len(), |j| close + j + 1);
        }

        tags.push(TagMatch {
            name,
            open: &markup[at..open_end],
            body,
        });
        pos = next;
    }

    tags
}

/// Read a quoted or bare attribute value out of an opening tag.
fn attribute(tag: &str, name: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let mut pos = 0;
    while let Some(i) = lower[pos..].find(name) {
        let at = pos + i;
        pos = at + name.len();

        let preceded_by_space = lower[..at]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_whitespace());
        if !preceded_by_space {
            continue;
        }

        let rest = tag[pos..].trim_start();
        let Some(rest) = rest.strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        let value = match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => rest[1..].split(quote).next().unwrap_or(""),
            _ => rest
                .split(|c: char| c.is_ascii_whitespace() || c == '>')
                .next()
                .unwrap_or(""),
        };
        return Some(value.to_string());
    }
    None
}

/// Build the preview document for the current buffers.
pub fn compose(workspace: &Workspace, library: Option<&StyleLibrary>) -> SyntheticDocument {
    let library_reference = library.map(StyleLibrary::reference_tag).unwrap_or_default();

    let markup = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
{library_reference}
{instrumentation}
<style>{css}</style>
</head>
<body>
{html}
<script>
try {{
{js}
}} catch (e) {{
    console.error(e);
}}
</script>
</body>
</html>
"#,
        instrumentation = instrument::fragment(),
        css = workspace.text(SourceKind::Css),
        html = workspace.text(SourceKind::Html),
        js = workspace.text(SourceKind::Js),
    );

    SyntheticDocument { markup }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Workspace {
        Workspace::new("<p>x</p>", "p{color:red}", "console.log(1)")
    }

    #[test]
    fn test_contains_buffers_verbatim() {
        let doc = compose(&sample(), None);
        assert!(doc.markup().contains("<style>p{color:red}</style>"));
        assert!(doc.markup().contains("<body>\n<p>x</p>\n"));
        assert!(doc.markup().contains("try {\nconsole.log(1)\n} catch (e) {"));
    }

    #[test]
    fn test_layering_order() {
        let doc = compose(&sample(), Some(&StyleLibrary::Bootstrap));
        let m = doc.markup();
        let shell = m.find("<!DOCTYPE html>").unwrap();
        let library = m.find("bootstrap.min.css").unwrap();
        let instrumentation = m.find(instrument::SOURCE_TAG).unwrap();
        let style = m.find("<style>").unwrap();
        let body = m.find("<body>").unwrap();
        let guard = m.find("try {").unwrap();
        assert!(shell < library);
        assert!(library < instrumentation);
        assert!(instrumentation < style);
        assert!(style < body);
        assert!(body < guard);
    }

    #[test]
    fn test_inline_scripts_in_document_order() {
        let ws = Workspace::new(
            "<script src=\"lib.js\"></script><SCRIPT>var a = 1;</SCRIPT>",
            "",
            "console.log(a)",
        );
        let doc = compose(&ws, Some(&StyleLibrary::Tailwind));
        let scripts = doc.inline_scripts();
        assert_eq!(scripts.len(), 3);
        assert!(scripts[0].contains(instrument::SOURCE_TAG));
        assert_eq!(scripts[1], "var a = 1;");
        assert!(scripts[2].contains("console.log(a)"));
    }

    #[test]
    fn test_external_resources() {
        let ws = Workspace::new("<script src='extra.js'></script>", "", "");
        let doc = compose(&ws, Some(&StyleLibrary::Bulma));
        assert_eq!(
            doc.external_resources(),
            vec![
                "https://cdn.jsdelivr.net/npm/bulma@1.0.2/css/bulma.min.css".to_string(),
                "extra.js".to_string(),
            ]
        );
    }

    #[test]
    fn test_does_not_match_similar_tag_names() {
        let ws = Workspace::new("<scripted>not a script</scripted>", "", "");
        let doc = compose(&ws, None);
        assert_eq!(doc.inline_scripts().len(), 2);
    }

    #[test]
    fn test_commented_out_scripts_are_skipped() {
        let ws = Workspace::new(
            "<!-- <script>console.log('hidden')</script> -->\n<p>x</p>\n<!-- <script src=\"old.js\"></script> -->",
            "",
            "",
        );
        let doc = compose(&ws, None);
        let scripts = doc.inline_scripts();
        assert_eq!(scripts.len(), 2);
        assert!(scripts.iter().all(|s| !s.contains("hidden")));
        assert!(doc.external_resources().is_empty());
    }

    #[test]
    fn test_only_classic_script_types_run() {
        let ws = Workspace::new(
            concat!(
                "<script type=\"application/json\">{\"a\":1}</script>",
                "<script type=\"application/ld+json\">{}</script>",
                "<script type='text/template'><p>{{ name }}</p></script>",
                "<script type=\"module\">import x from './x.js';</script>",
                "<script type=\"Text/JavaScript\">var classic = 1;</script>",
                "<script type=\"\">var untyped = 1;</script>",
            ),
            "",
            "",
        );
        let doc = compose(&ws, None);
        let scripts = doc.inline_scripts();
        assert_eq!(scripts.len(), 4);
        assert_eq!(scripts[1], "var classic = 1;");
        assert_eq!(scripts[2], "var untyped = 1;");
    }

    #[test]
    fn test_script_bodies_are_not_scanned_for_tags() {
        let ws = Workspace::new(
            "<script>const s = '<script>nested';</script><style>a::before { content: '<script>'; }</style>",
            "",
            "",
        );
        let doc = compose(&ws, None);
        let scripts = doc.inline_scripts();
        assert_eq!(scripts.len(), 3);
        assert_eq!(scripts[1], "const s = '<script>nested';");
    }

    #[test]
    fn test_library_parsing() {
        assert_eq!("Bootstrap".parse::<StyleLibrary>().unwrap(), StyleLibrary::Bootstrap);
        let custom: StyleLibrary = "https://example.com/pico.css".parse().unwrap();
        assert_eq!(custom.reference_kind(), ReferenceKind::Stylesheet);
        assert_eq!(custom.href(), "https://example.com/pico.css");
        assert!("ftp://example.com/x.css".parse::<StyleLibrary>().is_err());
        assert!("materialize".parse::<StyleLibrary>().is_err());
    }

    #[test]
    fn test_library_serde_round_trips_as_string() {
        let json = serde_json::to_string(&StyleLibrary::Mui).unwrap();
        assert_eq!(json, "\"mui\"");
        let back: StyleLibrary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StyleLibrary::Mui);
    }
}
