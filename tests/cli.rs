use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

struct Fixture {
    _tmp: TempDir,
    root: PathBuf,
    doc: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().expect("create tempdir");
        let root = tmp.path().to_path_buf();
        let doc = root.join("guide.md");
        fs::write(
            &doc,
            "# Guide\n\nIntro.\n\n## Install\n\nSteps.\n\n## Usage\n\n```mermaid\ngraph TD;\nA-->B;\n```\n",
        )
        .expect("write guide");
        Self {
            _tmp: tmp,
            root,
            doc,
        }
    }

    fn write_config(&self, yaml: &str) -> PathBuf {
        let path = self.root.join("pagelight.yml");
        fs::write(&path, yaml).expect("write config");
        path
    }
}

fn pagelight(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pagelight"))
        .args(args)
        .env_remove("PAGELIGHT_LOG")
        .output()
        .expect("run pagelight")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn context(output: &Output) -> String {
    format!(
        "status={:?}\nstdout:\n{}\nstderr:\n{}",
        output.status.code(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn outline_prints_nested_toc() {
    let fixture = Fixture::new();
    let output = pagelight(&["outline", fixture.doc.to_str().expect("utf-8 path")]);
    assert!(output.status.success(), "{}", context(&output));

    let html = stdout(&output);
    assert!(
        html.contains("<details open><summary><a href=\"#guide\">Guide</a></summary>"),
        "{}",
        context(&output)
    );
    assert!(html.contains("<li class=\"toc-h2\"><a href=\"#install\">Install</a></li>"));
    assert!(html.contains("<li class=\"toc-h2\"><a href=\"#usage\">Usage</a></li>"));
}

#[test]
fn preview_reports_assets_and_active_section() {
    let fixture = Fixture::new();
    let output = pagelight(&[
        "preview",
        fixture.doc.to_str().expect("utf-8 path"),
        "--scroll",
        "100",
        "--offline",
    ]);
    assert!(output.status.success(), "{}", context(&output));

    let report = stdout(&output);
    assert!(report.contains("  style #pagelight-sidebar-style"), "{}", context(&output));
    assert!(report.contains(
        "  script https://cdn.jsdelivr.net/npm/mermaid@11/dist/mermaid.min.js"
    ));
    assert!(report.contains("toc: 3 headings"));
    assert!(report.contains("active: install"), "{}", context(&output));
    assert!(report.contains("sidebar: visible"));
    assert!(report.contains("diagrams: 1"));
    assert!(report.contains("  logos <- (empty)"), "{}", context(&output));
}

#[test]
fn preview_honours_config_file() {
    let fixture = Fixture::new();
    let config = fixture.write_config(
        "location: https://docs.example.com/guide/\nstyles:\n  - css/site.css\nfont_awesome: null\nicon_packs: []\n",
    );
    let output = pagelight(&[
        "preview",
        fixture.doc.to_str().expect("utf-8 path"),
        "--config",
        config.to_str().expect("utf-8 path"),
        "--offline",
    ]);
    assert!(output.status.success(), "{}", context(&output));

    let report = stdout(&output);
    assert!(report.contains("  stylesheet https://docs.example.com/guide/css/site.css"));
    assert!(!report.contains("fontawesome"));
    assert!(report.contains("active: guide"));
    assert!(report.contains("icon packs: not registered"));
}

#[test]
fn icons_offline_falls_back_to_empty_packs() {
    let output = pagelight(&["icons", "--offline"]);
    assert!(output.status.success(), "{}", context(&output));
    let report = stdout(&output);
    assert!(report.contains("  logos <- (empty)"));
    assert!(report.contains("  logos: 0 icons"));
}

#[test]
fn invalid_config_exits_with_error() {
    let fixture = Fixture::new();
    let config = fixture.write_config("colour: red\n");
    let output = pagelight(&[
        "outline",
        fixture.doc.to_str().expect("utf-8 path"),
        "--config",
        config.to_str().expect("utf-8 path"),
    ]);
    assert_eq!(output.status.code(), Some(1), "{}", context(&output));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error: invalid config"));
}

#[test]
fn non_markdown_file_is_rejected() {
    let fixture = Fixture::new();
    let path = fixture.root.join("notes.txt");
    fs::write(&path, "hello").expect("write notes");
    let output = pagelight(&["preview", path.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(1), "{}", context(&output));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not a recognized markdown extension"));
}
