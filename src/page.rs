//! Page initialization: the single entry point a hosting page calls once.

use std::cell::RefCell;
use std::rc::Rc;

use futures_util::FutureExt;
use tracing::{debug, error, info};

use crate::config::PageConfig;
use crate::error::LoadError;
use crate::highlight::Highlighter;
use crate::icons::{IconFetcher, IconPackRegistrar, RegistrationReport};
use crate::loader::AssetLoader;
use crate::platform::Platform;
use crate::sidebar::Sidebar;
use crate::toc::{build_toc, TocOptions};
use crate::web_assets::{SIDEBAR_CSS, SIDEBAR_STYLE_ID};

/// Everything [`init`] set up. The page listeners own the highlighter and
/// the sidebar, so dropping the session leaves them attached.
pub struct PageSession {
    pub loader: AssetLoader,
    pub registrar: Rc<IconPackRegistrar>,
    /// Outlined heading ids, or `None` when the page has no content container.
    pub toc: Option<Vec<String>>,
    pub highlighter: Option<Rc<Highlighter>>,
    pub sidebar: Option<Rc<Sidebar>>,
    icon_report: Rc<RefCell<Option<RegistrationReport>>>,
    platform: Rc<dyn Platform>,
    toc_options: TocOptions,
}

impl PageSession {
    /// Rebuild the ToC from the current headings and put the highlight
    /// marker back on the freshly mounted markup.
    pub fn rebuild_toc(&mut self) -> Option<&[String]> {
        self.toc = build_toc(self.platform.as_ref(), &self.toc_options);
        if let (Some(highlighter), Some(_)) = (&self.highlighter, &self.toc) {
            highlighter.reapply();
        }
        self.toc.as_deref()
    }

    /// Result of icon-pack registration, once it has run.
    pub fn icon_report(&self) -> Option<RegistrationReport> {
        self.icon_report.borrow().clone()
    }
}

/// Enhance the hosting page.
///
/// 1. inject the sidebar style, link configured stylesheets and Font Awesome;
/// 2. build the ToC, restore sidebar visibility, attach the highlighter;
/// 3. load configured scripts and the diagram library; once the library is
///    ready, icon-pack registration is spawned on the platform.
///
/// Failures are logged and contained: a missing stylesheet, container or
/// library only disables the feature that needed it.
pub fn init(
    platform: Rc<dyn Platform>,
    config: &PageConfig,
    fetcher: Rc<dyn IconFetcher>,
) -> PageSession {
    let loader = AssetLoader::new(Rc::clone(&platform));

    loader.inject_style(SIDEBAR_STYLE_ID, SIDEBAR_CSS);
    for style in &config.styles {
        // Resolution errors are already logged by the loader.
        let _ = loader.load_style(style);
    }
    if let Some(url) = &config.font_awesome {
        let _ = loader.ensure_font_awesome(url);
    }

    let toc = build_toc(platform.as_ref(), &config.toc);
    let (highlighter, sidebar) = match &toc {
        Some(ids) => (
            Some(Highlighter::attach(
                Rc::clone(&platform),
                ids.clone(),
                config.highlight_bias,
            )),
            Some(Sidebar::restore(Rc::clone(&platform), &config.sidebar)),
        ),
        None => (None, None),
    };

    for script in &config.scripts {
        loader.load_script(&script.url, None, script.global.as_deref());
    }

    let registrar = Rc::new(IconPackRegistrar::new(fetcher, config.icon_cdn.clone()));
    let icon_report = Rc::new(RefCell::new(None));
    let on_diagram_ready = {
        let platform = Rc::clone(&platform);
        let registrar = Rc::clone(&registrar);
        let icon_report = Rc::clone(&icon_report);
        let global = config.diagram.global.clone();
        let packs = config.icon_packs.clone();
        move |outcome: Result<(), LoadError>| {
            if let Err(err) = outcome {
                error!(error = %err, "diagram library unavailable; icon packs not registered");
                return;
            }
            if packs.is_empty() {
                debug!("no icon packs configured");
                return;
            }
            let library = platform.diagram_library(&global);
            platform.spawn_local(
                async move {
                    let report = registrar.register_packs(library, &packs).await;
                    *icon_report.borrow_mut() = Some(report);
                }
                .boxed_local(),
            );
        }
    };
    loader.load_script(
        &config.diagram.script,
        Some(Box::new(on_diagram_ready)),
        Some(&config.diagram.global),
    );

    info!(
        toc = toc.as_ref().map_or(0, Vec::len),
        scripts = config.scripts.len() + 1,
        styles = config.styles.len(),
        "page initialised"
    );

    PageSession {
        loader,
        registrar,
        toc,
        highlighter,
        sidebar,
        icon_report,
        platform,
        toc_options: config.toc.clone(),
    }
}
