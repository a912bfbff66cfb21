//! Project export - packs the three buffers into a timestamped zip archive.

use crate::buffer::{SourceKind, Workspace};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;

/// Markup file that links the stylesheet and script by relative name.
pub fn linked_markup(html: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Code Project</title>
    <link rel="stylesheet" href="{css}">
</head>
<body>
{html}
    <script src="{js}"></script>
</body>
</html>
"#,
        css = SourceKind::Css.file_name(),
        js = SourceKind::Js.file_name(),
    )
}

/// `code-project-YYYYMMDD-HHMMSS.zip`
pub fn export_filename(timestamp: &NaiveDateTime) -> String {
    format!("code-project-{}.zip", timestamp.format("%Y%m%d-%H%M%S"))
}

/// Write the export archive into `dir` and return its path.
pub fn export_bundle(workspace: &Workspace, dir: &Path, timestamp: &NaiveDateTime) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory '{}'", dir.display()))?;
    let path = dir.join(export_filename(timestamp));

    let file = File::create(&path)
        .with_context(|| format!("Failed to create '{}'", path.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let files = [
        (
            SourceKind::Html.file_name(),
            linked_markup(workspace.text(SourceKind::Html)),
        ),
        (
            SourceKind::Css.file_name(),
            workspace.text(SourceKind::Css).to_string(),
        ),
        (
            SourceKind::Js.file_name(),
            workspace.text(SourceKind::Js).to_string(),
        ),
    ];
    for (name, contents) in files {
        zip.start_file(name, options)?;
        zip.write_all(contents.as_bytes())?;
    }

    let mut file = zip.finish()?;
    file.flush()?;

    tracing::info!(path = %path.display(), "Exported project bundle");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Read;
    use tempfile::tempdir;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 42)
            .unwrap()
    }

    fn read_entry(archive: &mut zip::ZipArchive<File>, name: &str) -> String {
        let mut entry = archive.by_name(name).unwrap();
        let mut out = String::new();
        entry.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_filename_timestamp() {
        assert_eq!(export_filename(&timestamp()), "code-project-20240307-090542.zip");
    }

    #[test]
    fn test_bundle_reproduces_buffers() {
        let dir = tempdir().unwrap();
        let ws = Workspace::new("<p>x</p>\n<b>y</b>", "p{color:red}", "console.log(1)");

        let path = export_bundle(&ws, dir.path(), &timestamp()).unwrap();
        assert_eq!(path, dir.path().join("code-project-20240307-090542.zip"));

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);
        assert_eq!(read_entry(&mut archive, "style.css"), "p{color:red}");
        assert_eq!(read_entry(&mut archive, "script.js"), "console.log(1)");

        let markup = read_entry(&mut archive, "index.html");
        assert!(markup.contains(r#"<link rel="stylesheet" href="style.css">"#));
        assert!(markup.contains(r#"<script src="script.js"></script>"#));
        let body_start = markup.find("<body>").unwrap();
        let body_end = markup.find("</body>").unwrap();
        assert!(markup[body_start..body_end].contains("<p>x</p>\n<b>y</b>"));
    }
}
