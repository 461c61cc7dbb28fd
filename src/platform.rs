//! The adapter between the page enhancements and the hosting page.
//!
//! Core logic (asset de-duplication, outline building, highlight selection)
//! only ever talks to a [`Platform`]. A browser binding implements it on top
//! of the DOM; [`crate::headless::HeadlessPage`] implements it in memory for
//! tests and the command-line preview.
//!
//! Everything runs on one thread, so callbacks are plain `Box<dyn FnOnce()>`
//! and listeners are `Rc<dyn Fn()>`.

use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use reqwest::Url;

use crate::icons::IconPack;

/// A unit of work scheduled on the page's event loop.
pub type Task = Box<dyn FnOnce()>;

/// Receives the terminal outcome of a script element: `Ok` on its load
/// event, `Err(reason)` on its error event.
pub type SettleHandler = Box<dyn FnOnce(Result<(), String>)>;

/// Receives the reason a `<link rel="stylesheet">` fired its error event.
pub type StyleErrorHandler = Box<dyn FnOnce(String)>;

/// A long-lived event listener.
pub type Listener = Rc<dyn Fn()>;

/// Page-level events the enhancements subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageEvent {
    Scroll,
    Resize,
    /// The injected sidebar toggle control was activated.
    ToggleSidebar,
}

/// Opaque reference to a heading element owned by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub usize);

/// A heading element as found in the content container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingElement {
    pub handle: ElementHandle,
    /// 1 through 6.
    pub level: u8,
    pub text: String,
    /// The element's `id` attribute, when it has a non-empty one.
    pub id: Option<String>,
}

/// The diagram-rendering library's global object.
pub trait DiagramLibrary {
    /// Whether the library exposes its icon-pack registration entry point.
    fn supports_icon_packs(&self) -> bool {
        true
    }

    /// Hand a batch of icon packs to the library. The library de-duplicates
    /// by pack name.
    fn register_icon_packs(&self, packs: Vec<IconPack>);
}

/// Host-page capabilities used by the enhancements.
pub trait Platform {
    // --- location and globals ---

    /// Absolute URL of the hosting document.
    fn location(&self) -> Url;

    /// Whether a global binding named `name` exists.
    fn has_global(&self, name: &str) -> bool;

    /// The diagram library bound to `global`, if it is present.
    fn diagram_library(&self, global: &str) -> Option<Rc<dyn DiagramLibrary>>;

    // --- event loop ---

    /// Run `task` on a later turn of the event loop, never synchronously.
    fn defer(&self, task: Task);

    /// Run `task` before the next repaint.
    fn request_animation_frame(&self, task: Task);

    /// Drive `future` to completion on the page's event loop.
    fn spawn_local(&self, future: LocalBoxFuture<'static, ()>);

    fn add_listener(&self, event: PageEvent, listener: Listener);

    // --- document head ---

    /// Append a deferred `<script src>` to the head. `on_settle` fires at
    /// most once, on the element's load or error event.
    fn append_script(&self, src: &Url, on_settle: SettleHandler);

    /// Whether an element with this `id` exists anywhere in the document.
    fn has_element(&self, id: &str) -> bool;

    /// `href` values of every `<link rel="stylesheet">` in the document.
    fn stylesheet_hrefs(&self) -> Vec<String>;

    /// Append `<link rel="stylesheet" id href>`. `on_error` fires at most
    /// once, on the element's error event; a successful load is silent.
    fn append_stylesheet(&self, id: &str, href: &Url, on_error: StyleErrorHandler);

    fn append_inline_style(&self, id: &str, css: &str);

    // --- content ---

    /// Headings (levels 1-6) inside the first element matching
    /// `container_selector`, in document order. `None` when no element
    /// matches.
    fn headings(&self, container_selector: &str) -> Option<Vec<HeadingElement>>;

    fn set_heading_id(&self, handle: ElementHandle, id: &str);

    /// Vertical document offset of the element with this `id`.
    fn offset_top(&self, id: &str) -> Option<f64>;

    /// Current vertical scroll position of the viewport.
    fn scroll_offset(&self) -> f64;

    // --- body chrome ---

    /// Install the toggle control and sidebar navigation, replacing any
    /// previously mounted ToC markup.
    fn mount_sidebar(&self, toc_html: &str);

    /// Add or remove the highlight marker on every ToC link targeting `#id`.
    fn set_link_highlight(&self, id: &str, highlighted: bool);

    fn set_sidebar_visible(&self, visible: bool);

    // --- local storage ---

    fn storage_get(&self, key: &str) -> Option<String>;

    fn storage_set(&self, key: &str, value: &str);
}
