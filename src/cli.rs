//! Command-line front end.
//!
//! The binary drives the page enhancements against a [`HeadlessPage`] built
//! from a markdown file, which makes it a quick way to check what a page
//! would get: its outline, the assets injected into the head, the section
//! highlighted at a given scroll position and the icon packs that resolve.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;

use crate::config::PageConfig;
use crate::headless::{HeadElement, HeadlessPage};
use crate::icons::{HttpFetcher, IconFetcher, IconPackRegistrar, OfflineFetcher, RegistrationReport};
use crate::markdown::{parse_markdown, Document};
use crate::page;
use crate::platform::Platform;
use crate::toc::build_toc;

#[derive(Parser)]
#[command(
    name = "pagelight",
    version,
    about = "Preview documentation page enhancements: asset loading, icon packs and a ToC sidebar"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the sidebar table of contents for a markdown file
    Outline {
        /// Path to the markdown file
        file: PathBuf,
        /// YAML page configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the page enhancements against a markdown file and report the result
    Preview {
        /// Path to the markdown file
        file: PathBuf,
        /// YAML page configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Viewport scroll position in pixels
        #[arg(long, default_value_t = 0.0)]
        scroll: f64,
        /// Do not fetch icon packs over the network
        #[arg(long)]
        offline: bool,
    },
    /// Resolve the configured icon packs
    Icons {
        /// YAML page configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Do not fetch icon packs over the network
        #[arg(long)]
        offline: bool,
    },
}

fn invalid_input(err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
}

fn load_config(path: Option<&Path>) -> io::Result<PageConfig> {
    match path {
        Some(path) => PageConfig::from_yaml_file(path).map_err(invalid_input),
        None => Ok(PageConfig::default()),
    }
}

/// Read and parse a markdown file, rejecting non-markdown extensions.
fn read_markdown(path: &Path) -> io::Result<Document> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("md" | "markdown" | "mdx" | "mdown" | "mkd" | "mkdn") => {}
        Some(ext) => {
            return Err(invalid_input(format!(
                "'{ext}' is not a recognized markdown extension"
            )))
        }
        None => {
            return Err(invalid_input(format!(
                "'{}' has no file extension",
                path.display()
            )))
        }
    }
    let source = fs::read_to_string(path).map_err(|e| {
        io::Error::new(e.kind(), format!("cannot read {}: {e}", path.display()))
    })?;
    Ok(parse_markdown(&source))
}

fn fetcher(offline: bool) -> Rc<dyn IconFetcher> {
    if offline {
        Rc::new(OfflineFetcher)
    } else {
        Rc::new(HttpFetcher::default())
    }
}

fn runtime() -> io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// Dispatch a parsed command line, writing the report to `out`.
pub fn run(cli: Cli, out: &mut dyn Write) -> io::Result<()> {
    match cli.command {
        Commands::Outline { file, config } => run_outline(&file, config.as_deref(), out),
        Commands::Preview {
            file,
            config,
            scroll,
            offline,
        } => run_preview(&file, config.as_deref(), scroll, offline, out),
        Commands::Icons { config, offline } => run_icons(config.as_deref(), offline, out),
    }
}

fn run_outline(file: &Path, config: Option<&Path>, out: &mut dyn Write) -> io::Result<()> {
    let config = load_config(config)?;
    let location = config.location_url().map_err(invalid_input)?;
    let doc = read_markdown(file)?;
    let page = doc.headless_page(location, &config.toc.container_selector);
    build_toc(&page, &config.toc);
    out.write_all(page.sidebar_html().unwrap_or_default().as_bytes())
}

fn run_preview(
    file: &Path,
    config: Option<&Path>,
    scroll: f64,
    offline: bool,
    out: &mut dyn Write,
) -> io::Result<()> {
    let config = load_config(config)?;
    let location = config.location_url().map_err(invalid_input)?;
    let doc = read_markdown(file)?;

    let page = Rc::new(doc.headless_page(location.clone(), &config.toc.container_selector));
    page.auto_settle_scripts(true);
    if let Ok(diagram_src) = location.join(&config.diagram.script) {
        page.script_defines_global(diagram_src.as_str(), &config.diagram.global);
    }
    page.install_diagram_library(&config.diagram.global, true);
    page.scroll_to(scroll);

    let session = page::init(page.clone(), &config, fetcher(offline));
    runtime()?.block_on(page.settle());

    writeln!(out, "head:")?;
    for element in page.head() {
        match element {
            HeadElement::Script { src } => writeln!(out, "  script {src}")?,
            HeadElement::Stylesheet { href, .. } => writeln!(out, "  stylesheet {href}")?,
            HeadElement::InlineStyle { id, .. } => writeln!(out, "  style #{id}")?,
        }
    }
    match &session.toc {
        Some(ids) => writeln!(out, "toc: {} headings", ids.len())?,
        None => writeln!(out, "toc: no content container")?,
    }
    let active = session.highlighter.as_ref().and_then(|h| h.active());
    writeln!(out, "active: {}", active.as_deref().unwrap_or("-"))?;
    if let Some(sidebar) = &session.sidebar {
        let state = if sidebar.is_visible() { "visible" } else { "hidden" };
        writeln!(out, "sidebar: {state}")?;
    }
    writeln!(out, "diagrams: {}", doc.diagrams)?;
    match session.icon_report() {
        Some(report) => write_report(&report, out)?,
        None => writeln!(out, "icon packs: not registered")?,
    }
    Ok(())
}

fn run_icons(config: Option<&Path>, offline: bool, out: &mut dyn Write) -> io::Result<()> {
    let config = load_config(config)?;
    let location = config.location_url().map_err(invalid_input)?;
    let page = HeadlessPage::new(location);
    let library = page.install_diagram_library(&config.diagram.global, true);
    page.define_global(&config.diagram.global);

    let registrar = IconPackRegistrar::new(fetcher(offline), config.icon_cdn.clone());
    let report = runtime()?.block_on(
        registrar.register_packs(page.diagram_library(&config.diagram.global), &config.icon_packs),
    );
    write_report(&report, out)?;

    for pack in library.batches().into_iter().flatten() {
        let count = pack
            .icons
            .get("icons")
            .and_then(Value::as_object)
            .map_or(0, |icons| icons.len());
        writeln!(out, "  {}: {count} icons", pack.name)?;
    }
    Ok(())
}

fn write_report(report: &RegistrationReport, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "icon packs:")?;
    for pack in &report.packs {
        match &pack.source {
            Some(url) => writeln!(out, "  {} <- {url}", pack.name)?,
            None => writeln!(out, "  {} <- (empty)", pack.name)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_markdown_extension() {
        let err = read_markdown(Path::new("notes.txt")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("'txt'"));
    }

    #[test]
    fn rejects_missing_extension() {
        let err = read_markdown(Path::new("README")).unwrap_err();
        assert!(err.to_string().contains("no file extension"));
    }

    #[test]
    fn cli_parses_preview_flags() {
        let cli = Cli::try_parse_from([
            "pagelight", "-vv", "preview", "doc.md", "--scroll", "600", "--offline",
        ])
        .expect("parse");
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Preview {
                file,
                scroll,
                offline,
                config,
            } => {
                assert_eq!(file, PathBuf::from("doc.md"));
                assert_eq!(scroll, 600.0);
                assert!(offline);
                assert!(config.is_none());
            }
            _ => panic!("expected preview"),
        }
    }
}
