//! Page configuration.
//!
//! Everything the page enhancements need (asset URLs, icon packs, the storage
//! key for the sidebar flag, ToC options) is carried by [`PageConfig`] and
//! handed to [`crate::page::init`]. Every field has a default so a YAML file
//! only needs to name what it overrides.

use std::fs;
use std::path::Path;

use reqwest::Url;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::icons::{IconCdn, IconPackSpec};
use crate::toc::TocOptions;

/// Pinned major version of the diagram library. `registerIconPacks` first
/// shipped in the 11.x line.
const DEFAULT_DIAGRAM_SCRIPT: &str = "https://cdn.jsdelivr.net/npm/mermaid@11/dist/mermaid.min.js";

/// Top-level configuration for one hosting page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageConfig {
    /// Absolute URL of the hosting page; relative asset URLs resolve against it.
    pub location: String,
    /// Extra scripts to load (besides the diagram library).
    pub scripts: Vec<ScriptAsset>,
    /// Stylesheets to link into the document head.
    pub styles: Vec<String>,
    /// Font Awesome stylesheet, linked only when the page lacks one.
    pub font_awesome: Option<String>,
    pub diagram: DiagramConfig,
    pub icon_packs: Vec<IconPackSpec>,
    pub icon_cdn: IconCdn,
    pub sidebar: SidebarConfig,
    pub toc: TocOptions,
    /// Forward bias in pixels used when picking the active heading.
    pub highlight_bias: f64,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            location: "http://localhost/index.html".to_owned(),
            scripts: Vec::new(),
            styles: Vec::new(),
            font_awesome: Some(
                "https://cdn.jsdelivr.net/npm/@fortawesome/fontawesome-free@6/css/all.min.css"
                    .to_owned(),
            ),
            diagram: DiagramConfig::default(),
            icon_packs: vec![IconPackSpec {
                name: "logos".to_owned(),
                package: "@iconify-json/logos".to_owned(),
            }],
            icon_cdn: IconCdn::default(),
            sidebar: SidebarConfig::default(),
            toc: TocOptions::default(),
            highlight_bias: 80.0,
        }
    }
}

/// A script to load, optionally guarded by a global that marks it ready.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptAsset {
    pub url: String,
    #[serde(default)]
    pub global: Option<String>,
}

/// Where the diagram library comes from and which global it defines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagramConfig {
    pub script: String,
    pub global: String,
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            script: DEFAULT_DIAGRAM_SCRIPT.to_owned(),
            global: "mermaid".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SidebarConfig {
    /// Local-storage key under which the visibility flag is persisted.
    pub storage_key: String,
    /// Visibility used when nothing (or garbage) is stored.
    pub default_visible: bool,
}

impl Default for SidebarConfig {
    fn default() -> Self {
        Self {
            storage_key: "pagelight.sidebar.visible".to_owned(),
            default_visible: true,
        }
    }
}

impl PageConfig {
    /// Parse a YAML document into a configuration.
    pub fn from_yaml_str(source: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_yml::from_str(source).map_err(|source| ConfigError::Yaml {
            path: origin.to_owned(),
            source,
        })
    }

    /// Read and parse a YAML configuration file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let origin = path.display().to_string();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: origin.clone(),
            source,
        })?;
        Self::from_yaml_str(&source, &origin)
    }

    /// The page location as a parsed absolute URL.
    pub fn location_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.location).map_err(|_| ConfigError::Location(self.location.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = PageConfig::from_yaml_str("{}", "inline").expect("parse");
        assert_eq!(config, PageConfig::default());
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = "\
location: https://docs.example.com/guide/
styles:
  - css/site.css
icon_packs:
  - name: azure
    package: '@iconify-json/devicon'
sidebar:
  storage_key: docs.sidebar
";
        let config = PageConfig::from_yaml_str(yaml, "inline").expect("parse");
        assert_eq!(config.location, "https://docs.example.com/guide/");
        assert_eq!(config.styles, vec!["css/site.css".to_owned()]);
        assert_eq!(config.icon_packs.len(), 1);
        assert_eq!(config.icon_packs[0].name, "azure");
        assert_eq!(config.sidebar.storage_key, "docs.sidebar");
        assert!(config.sidebar.default_visible);
        assert_eq!(config.diagram.global, "mermaid");
        assert_eq!(config.highlight_bias, 80.0);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = PageConfig::from_yaml_str("colour: red\n", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }), "got {err:?}");
    }

    #[test]
    fn relative_location_is_rejected() {
        let config = PageConfig {
            location: "docs/index.html".to_owned(),
            ..PageConfig::default()
        };
        assert!(matches!(
            config.location_url(),
            Err(ConfigError::Location(_))
        ));
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = PageConfig::from_yaml_file(Path::new("/nonexistent/pagelight.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }), "got {err:?}");
    }
}
