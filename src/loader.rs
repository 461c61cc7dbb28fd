//! De-duplicating loader for external scripts and stylesheets.
//!
//! Every request is keyed by its canonical URL (resolved against the page
//! location), so `js/app.js` and `https://host/js/app.js` share one element.
//! Script requests that arrive while the element is still loading queue
//! behind it and are resolved together, in registration order, when the
//! element settles.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::rc::Rc;

use reqwest::Url;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::error::LoadError;
use crate::platform::Platform;

/// Completion callback for a script request.
pub type ReadyCallback = Box<dyn FnOnce(Result<(), LoadError>)>;

/// Lifecycle of one tracked resource.
enum Status {
    /// An element exists and has not settled; callers wait in FIFO order.
    Loading(VecDeque<ReadyCallback>),
    /// The element fired its load event.
    Loaded,
}

/// Tracking entry for one canonical script URL. Failed records are removed
/// so a later request starts over with a fresh element.
struct ResourceRecord {
    status: Status,
}

/// Per-loader table of tracked scripts, keyed by canonical URL, plus the
/// stylesheets whose `<link>` reported an error.
#[derive(Default)]
pub struct ResourceRegistry {
    records: HashMap<String, ResourceRecord>,
    failed_styles: HashSet<String>,
}

impl ResourceRegistry {
    /// Whether `url` (canonical form) has an element that has not settled.
    pub fn is_loading(&self, url: &str) -> bool {
        matches!(
            self.records.get(url),
            Some(ResourceRecord {
                status: Status::Loading(_)
            })
        )
    }

    /// Whether `url` (canonical form) finished loading successfully.
    pub fn is_loaded(&self, url: &str) -> bool {
        matches!(
            self.records.get(url),
            Some(ResourceRecord {
                status: Status::Loaded
            })
        )
    }

    /// Whether the stylesheet at `url` (canonical form) fired its error event.
    pub fn style_failed(&self, url: &str) -> bool {
        self.failed_styles.contains(url)
    }

    /// Number of callbacks waiting on `url`.
    pub fn pending_callbacks(&self, url: &str) -> usize {
        match self.records.get(url) {
            Some(ResourceRecord {
                status: Status::Loading(queue),
            }) => queue.len(),
            _ => 0,
        }
    }

    /// Mark `key` settled and hand back the callbacks that were waiting on it.
    fn settle(&mut self, key: &str, succeeded: bool) -> VecDeque<ReadyCallback> {
        let Some(record) = self.records.get_mut(key) else {
            return VecDeque::new();
        };
        let waiters = match std::mem::replace(&mut record.status, Status::Loaded) {
            Status::Loading(queue) => queue,
            Status::Loaded => {
                warn!(url = key, "settle event for a resource that already loaded");
                VecDeque::new()
            }
        };
        if !succeeded {
            self.records.remove(key);
        }
        waiters
    }
}

/// Loads scripts and stylesheets into the hosting page at most once each.
///
/// Cloning is cheap and clones share the same registry.
#[derive(Clone)]
pub struct AssetLoader {
    platform: Rc<dyn Platform>,
    registry: Rc<RefCell<ResourceRegistry>>,
}

impl AssetLoader {
    pub fn new(platform: Rc<dyn Platform>) -> Self {
        Self {
            platform,
            registry: Rc::new(RefCell::new(ResourceRegistry::default())),
        }
    }

    /// Read access to the tracking table, mainly for diagnostics and tests.
    pub fn registry(&self) -> std::cell::Ref<'_, ResourceRegistry> {
        self.registry.borrow()
    }

    /// Resolve `url` against the page location.
    pub fn canonicalize(&self, url: &str) -> Result<Url, LoadError> {
        self.platform
            .location()
            .join(url.trim())
            .map_err(|e| LoadError::InvalidUrl {
                url: url.to_owned(),
                reason: e.to_string(),
            })
    }

    /// Load the script at `url`, invoking `on_ready` once it is usable.
    ///
    /// - When `global` names a binding that already exists, `on_ready` runs on
    ///   a later turn and nothing is fetched.
    /// - When the same canonical URL is already loading, `on_ready` queues
    ///   behind it and no element is created.
    /// - Otherwise a deferred script element is appended.
    ///
    /// `on_ready` is never invoked before this call returns, and is invoked
    /// exactly once: with `Ok` after the load event, or with
    /// [`LoadError::Failed`] after the error event.
    pub fn load_script(&self, url: &str, on_ready: Option<ReadyCallback>, global: Option<&str>) {
        let canonical = match self.canonicalize(url) {
            Ok(canonical) => canonical,
            Err(err) => {
                error!(url, error = %err, "cannot resolve script url");
                self.defer_callback(on_ready, Err(err));
                return;
            }
        };

        if let Some(name) = global {
            if self.platform.has_global(name) {
                debug!(url = %canonical, global = name, "global already present; skipping load");
                self.defer_callback(on_ready, Ok(()));
                return;
            }
        }

        let key = canonical.to_string();
        {
            let mut registry = self.registry.borrow_mut();
            match registry.records.get_mut(&key) {
                Some(record) => match &mut record.status {
                    Status::Loading(queue) => {
                        if let Some(callback) = on_ready {
                            queue.push_back(callback);
                        }
                        debug!(url = %canonical, waiting = queue.len(), "script already loading; queued");
                        return;
                    }
                    Status::Loaded => {
                        debug!(url = %canonical, "script already loaded");
                        self.defer_callback(on_ready, Ok(()));
                        return;
                    }
                },
                None => {
                    registry.records.insert(
                        key.clone(),
                        ResourceRecord {
                            status: Status::Loading(on_ready.into_iter().collect()),
                        },
                    );
                }
            }
        }

        info!(url = %canonical, "loading script");
        let registry = Rc::clone(&self.registry);
        self.platform.append_script(
            &canonical,
            Box::new(move |outcome: Result<(), String>| {
                settle_script(&registry, &key, outcome)
            }),
        );
    }

    /// Future flavour of [`AssetLoader::load_script`].
    pub fn load_script_async(
        &self,
        url: &str,
        global: Option<&str>,
    ) -> impl Future<Output = Result<(), LoadError>> + 'static {
        let (tx, rx) = oneshot::channel();
        self.load_script(
            url,
            Some(Box::new(move |outcome: Result<(), LoadError>| {
                let _ = tx.send(outcome);
            })),
            global,
        );
        let url = url.to_owned();
        async move {
            rx.await
                .unwrap_or_else(|_| Err(LoadError::Abandoned { url }))
        }
    }

    /// Link the stylesheet at `url` unless an equivalent one is present.
    ///
    /// A stylesheet counts as present when the generated element id exists or
    /// when any existing `<link rel="stylesheet">` resolves to the same
    /// canonical URL. Returns the generated id either way.
    pub fn load_style(&self, url: &str) -> Result<String, LoadError> {
        let canonical = self.canonicalize(url).inspect_err(|err| {
            error!(url, error = %err, "cannot resolve stylesheet url");
        })?;
        let id = style_id(&canonical);

        if self.platform.has_element(&id) {
            debug!(url = %canonical, id = %id, "stylesheet already injected");
            return Ok(id);
        }
        let location = self.platform.location();
        let already_linked = self
            .platform
            .stylesheet_hrefs()
            .iter()
            .filter_map(|href| location.join(href).ok())
            .any(|existing| existing == canonical);
        if already_linked {
            debug!(url = %canonical, "stylesheet already linked by the page");
            return Ok(id);
        }

        info!(url = %canonical, id = %id, "linking stylesheet");
        let registry = Rc::clone(&self.registry);
        let href = canonical.to_string();
        self.platform.append_stylesheet(
            &id,
            &canonical,
            Box::new(move |reason: String| {
                error!(url = %href, reason = %reason, "stylesheet failed to load");
                registry.borrow_mut().failed_styles.insert(href);
            }),
        );
        Ok(id)
    }

    /// Insert an inline `<style id>` block once. Returns whether it was inserted.
    pub fn inject_style(&self, id: &str, css: &str) -> bool {
        if self.platform.has_element(id) {
            return false;
        }
        debug!(id, bytes = css.len(), "injecting inline style");
        self.platform.append_inline_style(id, css);
        true
    }

    /// Link a Font Awesome stylesheet unless the page already carries one.
    ///
    /// Returns the id of the injected element, or `None` when an existing
    /// Font Awesome stylesheet was detected.
    pub fn ensure_font_awesome(&self, url: &str) -> Result<Option<String>, LoadError> {
        let detected = self.platform.stylesheet_hrefs().iter().any(|href| {
            let href = href.to_ascii_lowercase();
            href.contains("font-awesome") || href.contains("fontawesome")
        });
        if detected {
            debug!("font awesome already present");
            return Ok(None);
        }
        self.load_style(url).map(Some)
    }

    fn defer_callback(&self, on_ready: Option<ReadyCallback>, outcome: Result<(), LoadError>) {
        if let Some(callback) = on_ready {
            self.platform.defer(Box::new(move || callback(outcome)));
        }
    }
}

fn settle_script(registry: &RefCell<ResourceRegistry>, key: &str, outcome: Result<(), String>) {
    let waiters = registry.borrow_mut().settle(key, outcome.is_ok());
    match outcome {
        Ok(()) => {
            info!(url = key, callbacks = waiters.len(), "script loaded");
            for callback in waiters {
                callback(Ok(()));
            }
        }
        Err(reason) => {
            error!(url = key, reason = %reason, callbacks = waiters.len(), "script failed to load");
            let err = LoadError::Failed {
                url: key.to_owned(),
                reason,
            };
            for callback in waiters {
                callback(Err(err.clone()));
            }
        }
    }
}

/// Stable element id for a stylesheet URL (64-bit FNV-1a of the URL).
pub fn style_id(canonical: &Url) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in canonical.as_str().bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    format!("pagelight-style-{hash:016x}")
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::headless::{HeadElement, HeadlessPage};

    const PAGE: &str = "https://docs.example.com/guide/index.html";

    fn setup() -> (Rc<HeadlessPage>, AssetLoader) {
        let page = Rc::new(HeadlessPage::new(Url::parse(PAGE).expect("page url")));
        let loader = AssetLoader::new(page.clone());
        (page, loader)
    }

    fn recorder(log: &Rc<RefCell<Vec<String>>>, tag: &str) -> Option<ReadyCallback> {
        let log = Rc::clone(log);
        let tag = tag.to_owned();
        Some(Box::new(move |outcome: Result<(), LoadError>| {
            let entry = match outcome {
                Ok(()) => format!("{tag}:ok"),
                Err(LoadError::Failed { .. }) => format!("{tag}:failed"),
                Err(other) => format!("{tag}:{other}"),
            };
            log.borrow_mut().push(entry);
        }))
    }

    #[test]
    fn concurrent_requests_share_one_element_and_fire_in_order() {
        let (page, loader) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));

        loader.load_script("js/app.js", recorder(&log, "a"), None);
        loader.load_script("/guide/js/app.js", recorder(&log, "b"), None);
        loader.load_script("https://docs.example.com/guide/js/app.js", recorder(&log, "c"), None);

        let url = "https://docs.example.com/guide/js/app.js";
        assert_eq!(page.script_count(url), 1);
        assert_eq!(loader.registry().pending_callbacks(url), 3);
        assert!(log.borrow().is_empty());

        assert!(page.complete_script(url, Ok(())));
        page.run_until_idle();

        assert_eq!(*log.borrow(), vec!["a:ok", "b:ok", "c:ok"]);
        assert!(loader.registry().is_loaded(url));
        assert_eq!(loader.registry().pending_callbacks(url), 0);
    }

    #[test]
    fn existing_global_defers_callback_without_loading() {
        let (page, loader) = setup();
        page.define_global("mermaid");
        let log = Rc::new(RefCell::new(Vec::new()));

        loader.load_script("mermaid.min.js", recorder(&log, "m"), Some("mermaid"));

        assert!(log.borrow().is_empty(), "callback must not run synchronously");
        assert!(page.head().is_empty());
        page.run_until_idle();
        assert_eq!(*log.borrow(), vec!["m:ok"]);
    }

    #[test]
    fn failure_notifies_every_waiter_and_allows_retry() {
        let (page, loader) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let url = "https://cdn.example.net/lib.js";

        loader.load_script(url, recorder(&log, "a"), None);
        loader.load_script(url, recorder(&log, "b"), None);
        page.complete_script(url, Err("net::ERR_FAILED".to_owned()));
        page.run_until_idle();

        assert_eq!(*log.borrow(), vec!["a:failed", "b:failed"]);
        assert!(!loader.registry().is_loading(url));

        loader.load_script(url, recorder(&log, "c"), None);
        assert_eq!(page.script_count(url), 2, "retry creates a fresh element");
    }

    #[test]
    fn request_after_load_completes_on_a_later_turn() {
        let (page, loader) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let url = "https://cdn.example.net/lib.js";

        loader.load_script(url, None, None);
        page.complete_script(url, Ok(()));
        page.run_until_idle();

        loader.load_script(url, recorder(&log, "late"), None);
        assert!(log.borrow().is_empty());
        page.run_until_idle();
        assert_eq!(*log.borrow(), vec!["late:ok"]);
        assert_eq!(page.script_count(url), 1);
    }

    #[test]
    fn invalid_url_reports_error_asynchronously() {
        let page = Rc::new(HeadlessPage::new(
            Url::parse("data:text/plain,hello").expect("data url"),
        ));
        let loader = AssetLoader::new(page.clone());
        let log = Rc::new(RefCell::new(Vec::new()));

        loader.load_script("relative.js", recorder(&log, "x"), None);
        assert!(log.borrow().is_empty());
        page.run_until_idle();
        assert_eq!(log.borrow().len(), 1);
        assert!(log.borrow()[0].starts_with("x:invalid resource url"));
        assert!(page.head().is_empty());
    }

    #[test]
    fn style_loaded_twice_yields_one_link() {
        let (page, loader) = setup();
        let first = loader.load_style("../site.css").expect("first");
        let second = loader
            .load_style("https://docs.example.com/site.css")
            .expect("second");
        assert_eq!(first, second);
        assert_eq!(page.stylesheet_count("https://docs.example.com/site.css"), 1);
    }

    #[test]
    fn failed_stylesheet_is_recorded_without_blocking_others() {
        let (page, loader) = setup();
        page.fail_stylesheet("https://docs.example.com/broken.css");

        loader.load_style("/broken.css").expect("link broken");
        loader.load_style("/site.css").expect("link site");
        assert!(!loader.registry().style_failed("https://docs.example.com/broken.css"));

        page.run_until_idle();
        assert!(loader.registry().style_failed("https://docs.example.com/broken.css"));
        assert!(!loader.registry().style_failed("https://docs.example.com/site.css"));
        assert_eq!(page.stylesheet_count("https://docs.example.com/site.css"), 1);

        loader.load_style("/broken.css").expect("relink");
        assert_eq!(page.stylesheet_count("https://docs.example.com/broken.css"), 1);
    }

    #[test]
    fn style_already_linked_by_page_is_not_duplicated() {
        let (page, loader) = setup();
        page.add_stylesheet_link("/theme.css");
        loader.load_style("https://docs.example.com/theme.css").expect("load");
        assert_eq!(page.head().len(), 1);
    }

    #[test]
    fn inline_style_is_injected_once_per_id() {
        let (page, loader) = setup();
        assert!(loader.inject_style("sidebar-css", "nav{}"));
        assert!(!loader.inject_style("sidebar-css", "nav{}"));
        let inline = page
            .head()
            .into_iter()
            .filter(|el| matches!(el, HeadElement::InlineStyle { .. }))
            .count();
        assert_eq!(inline, 1);
    }

    #[test]
    fn font_awesome_detected_from_existing_link() {
        let (page, loader) = setup();
        page.add_stylesheet_link("https://use.fontawesome.com/releases/v6.5.0/css/all.css");
        let injected = loader
            .ensure_font_awesome("https://cdn.example.net/fa.css")
            .expect("ensure");
        assert_eq!(injected, None);
        assert_eq!(page.head().len(), 1);
    }

    #[test]
    fn font_awesome_linked_when_missing() {
        let (page, loader) = setup();
        let injected = loader
            .ensure_font_awesome("https://cdn.example.net/fa.css")
            .expect("ensure");
        assert!(injected.is_some());
        assert_eq!(page.stylesheet_count("https://cdn.example.net/fa.css"), 1);
    }

    #[test]
    fn style_id_is_stable_and_distinguishes_urls() {
        let a = Url::parse("https://x.test/a-b.css").expect("url");
        let b = Url::parse("https://x.test/a_b.css").expect("url");
        assert_eq!(style_id(&a), style_id(&a));
        assert_ne!(style_id(&a), style_id(&b));
        assert!(style_id(&a).starts_with("pagelight-style-"));
    }

    #[test]
    fn separate_loaders_do_not_share_state() {
        let page = Rc::new(HeadlessPage::new(Url::parse(PAGE).expect("page url")));
        let first = AssetLoader::new(page.clone());
        let second = AssetLoader::new(page.clone());
        first.load_script("a.js", None, None);
        second.load_script("a.js", None, None);
        assert_eq!(page.script_count("https://docs.example.com/guide/a.js"), 2);
    }

    #[tokio::test]
    async fn async_load_resolves_after_settle() {
        let (page, loader) = setup();
        let url = "https://cdn.example.net/lib.js";
        let pending = loader.load_script_async(url, None);
        page.complete_script(url, Ok(()));
        page.run_until_idle();
        assert_eq!(pending.await, Ok(()));
    }
}
