//! LiveMarkup CLI
//!
//! One-shot preview:
//!   live-markup run --js script.js
//!
//! Watch a project directory (index.html, style.css, script.js) and rerun
//! the preview whenever a file changes:
//!   live-markup watch ./project
//!
//! Buffers and preferences persist in a state file between invocations,
//! the way the browser playground keeps them in local storage.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use live_markup::preferences::Layout;
use live_markup::{
    JsonFileStore, KeyValueStore, MemoryStore, Playground, PreviewSchedule, ProjectConfig,
    ProjectWatcher, SandboxConfig, SourceKind, StyleLibrary, PREVIEW_DEBOUNCE,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "live-markup")]
#[command(about = "Live HTML, CSS and JavaScript playground")]
#[command(version)]
struct Cli {
    /// Project configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// State file holding saved buffers and preferences
    #[arg(long, global = true, value_name = "FILE")]
    state: Option<PathBuf>,

    /// Keep buffers and preferences in memory only
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Time limit per preview cycle in milliseconds (0 = unlimited)
    #[arg(long, global = true, default_value_t = 5_000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one preview cycle and print its console
    Run {
        #[command(flatten)]
        sources: SourceArgs,

        /// Also write the composed preview document to this file
        #[arg(long, value_name = "FILE")]
        emit: Option<PathBuf>,
    },
    /// Print the composed preview document
    Compose {
        #[command(flatten)]
        sources: SourceArgs,
    },
    /// Watch a project directory and rerun the preview on change
    Watch {
        /// Directory containing index.html, style.css and script.js
        dir: PathBuf,

        /// Quiet period before a rerun, in milliseconds
        #[arg(long, default_value_t = PREVIEW_DEBOUNCE.as_millis() as u64)]
        debounce_ms: u64,
    },
    /// Write the buffers to a timestamped zip archive
    Export {
        /// Output directory
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Re-indent a buffer and print the result
    Format {
        /// Buffer to format (html, css, js)
        kind: SourceKind,
    },
    /// Show or change editor preferences
    Prefs {
        #[command(subcommand)]
        action: Option<PrefsAction>,
    },
}

/// Files replacing buffer contents before the command runs.
#[derive(Args, Debug)]
struct SourceArgs {
    #[arg(long, value_name = "FILE")]
    html: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    css: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    js: Option<PathBuf>,

    /// Style library to reference (tailwind, bootstrap, bulma, mui, or a URL)
    #[arg(long)]
    library: Option<StyleLibrary>,
}

#[derive(Subcommand, Debug)]
enum PrefsAction {
    /// Print the current preferences
    Show,
    ZoomIn,
    ZoomOut,
    ToggleTheme,
    /// Set the editor tab width (2, 4 or 8)
    TabWidth { width: u8 },
    /// Set the style library; omit to remove it
    Library { library: Option<StyleLibrary> },
    /// Force the layout opposite to the one shown at this viewport width
    ToggleLayout {
        #[arg(long, default_value_t = 1280)]
        width: u32,
    },
    /// Go back to the width-dependent layout
    ResetLayout,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ProjectConfig::load(path)?,
        None => ProjectConfig::default(),
    };
    let sandbox = SandboxConfig {
        timeout_ms: (cli.timeout_ms > 0).then_some(cli.timeout_ms),
        ..Default::default()
    };

    if cli.ephemeral {
        let playground = Playground::new(config, MemoryStore::new(), sandbox);
        return execute(cli.command, playground).await;
    }

    let state_path = match cli.state {
        Some(path) => path,
        None => JsonFileStore::default_path().context("No data directory for the state file; pass --state")?,
    };
    let store = JsonFileStore::open(&state_path)?;
    tracing::debug!(path = %state_path.display(), "Opened state file");
    execute(cli.command, Playground::new(config, store, sandbox)).await
}

/// `RUST_LOG` when set and valid, otherwise warnings and up.
fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

async fn execute<S: KeyValueStore>(command: Command, mut playground: Playground<S>) -> Result<()> {
    match command {
        Command::Run { sources, emit } => {
            apply_sources(&mut playground, &sources)?;
            if let Some(path) = emit {
                std::fs::write(&path, playground.document().markup())
                    .with_context(|| format!("Failed to write '{}'", path.display()))?;
            }
            run_and_print(&mut playground).await
        }
        Command::Compose { sources } => {
            apply_sources(&mut playground, &sources)?;
            print!("{}", playground.document().markup());
            Ok(())
        }
        Command::Watch { dir, debounce_ms } => {
            watch(&mut playground, &dir, Duration::from_millis(debounce_ms)).await
        }
        Command::Export { dir } => {
            let path = playground.export(&dir)?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Format { kind } => {
            if !playground.format_buffer(kind)? {
                bail!("The {} buffer could not be formatted", kind);
            }
            print!("{}", playground.workspace().text(kind));
            Ok(())
        }
        Command::Prefs { action } => {
            match action.unwrap_or(PrefsAction::Show) {
                PrefsAction::Show => {}
                PrefsAction::ZoomIn => playground.zoom_in()?,
                PrefsAction::ZoomOut => playground.zoom_out()?,
                PrefsAction::ToggleTheme => playground.toggle_theme()?,
                PrefsAction::TabWidth { width } => playground.set_tab_width(width)?,
                PrefsAction::Library { library } => playground.set_library(library)?,
                PrefsAction::ToggleLayout { width } => {
                    let layout = playground.toggle_layout(width)?;
                    tracing::info!(?layout, width, "Layout forced");
                }
                PrefsAction::ResetLayout => playground.reset_layout()?,
            }
            print_preferences(&playground);
            Ok(())
        }
    }
}

fn apply_sources<S: KeyValueStore>(playground: &mut Playground<S>, sources: &SourceArgs) -> Result<()> {
    let files = [
        (SourceKind::Html, &sources.html),
        (SourceKind::Css, &sources.css),
        (SourceKind::Js, &sources.js),
    ];
    for (kind, path) in files {
        if let Some(path) = path {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read '{}'", path.display()))?;
            playground.edit(kind, text)?;
        }
    }
    if let Some(library) = &sources.library {
        playground.set_library(Some(library.clone()))?;
    }
    Ok(())
}

async fn run_and_print<S: KeyValueStore>(playground: &mut Playground<S>) -> Result<()> {
    let report = playground.run_preview().await?;
    for href in &report.skipped_resources {
        tracing::info!(href = %href, "Library referenced but not loaded in the sandbox");
    }
    if report.unsettled {
        tracing::warn!("Preview still had pending timers when the cycle ended");
    }

    let mut stdout = std::io::stdout().lock();
    playground.panel().write_to(&mut stdout)?;
    stdout.flush()?;
    Ok(())
}

async fn watch<S: KeyValueStore>(playground: &mut Playground<S>, dir: &Path, debounce: Duration) -> Result<()> {
    let mut watcher = ProjectWatcher::new(dir)?;
    let mut schedule = PreviewSchedule::new(debounce);

    playground.sync_from_dir(dir)?;
    run_and_print(playground).await?;
    eprintln!("Watching {} (Ctrl-C to stop)", dir.display());

    loop {
        tokio::select! {
            Some(()) = watcher.changed() => {
                if playground.sync_from_dir(dir)? {
                    schedule.trigger();
                }
            }
            Some(()) = schedule.due() => {
                println!("--- preview ---");
                run_and_print(playground).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                schedule.cancel();
                break;
            }
        }
    }
    Ok(())
}

fn print_preferences<S: KeyValueStore>(playground: &Playground<S>) {
    let prefs = playground.preferences();
    let layout = match prefs.resolve_layout(1280) {
        Layout::Vertical => "vertical",
        Layout::Horizontal => "horizontal",
    };
    println!("theme:      {:?} ({})", prefs.theme, prefs.theme.editor_theme_id());
    println!("font size:  {}", prefs.font_size);
    println!("tab width:  {}", prefs.tab_width);
    println!("layout:     {:?} (at 1280px: {})", prefs.layout, layout);
    match &prefs.library {
        Some(library) => println!("library:    {}", library),
        None => println!("library:    none"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_defaults_to_warn() {
        assert_eq!(env_filter(None).to_string(), "warn");
        assert_eq!(env_filter(Some("live_markup=loud")).to_string(), "warn");
    }

    #[test]
    fn test_env_filter_honours_rust_log() {
        assert_eq!(env_filter(Some("debug")).to_string(), "debug");
        let filter = env_filter(Some("live_markup=trace"));
        assert_eq!(filter.to_string(), "live_markup=trace");
        assert_eq!(filter.max_level_hint(), Some(tracing::level_filters::LevelFilter::TRACE));
    }
}
