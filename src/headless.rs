//! In-memory [`Platform`] implementation.
//!
//! `HeadlessPage` stands in for a browser document: it keeps a FIFO task
//! queue and an animation-frame queue, records every head mutation, stores
//! headings with fixed vertical offsets, and settles script elements either
//! on demand ([`HeadlessPage::complete_script`]) or automatically. The
//! command-line preview and the test suites drive the page enhancements
//! through it.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::future::poll_fn;
use std::mem;
use std::rc::Rc;
use std::task::Poll;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use reqwest::Url;

use crate::icons::IconPack;
use crate::platform::{
    DiagramLibrary, ElementHandle, HeadingElement, Listener, PageEvent, Platform, SettleHandler,
    StyleErrorHandler, Task,
};

/// An element appended to (or pre-seeded in) the document head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadElement {
    Script { src: String },
    Stylesheet { id: Option<String>, href: String },
    InlineStyle { id: String, css: String },
}

/// A heading in the headless document.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessHeading {
    pub level: u8,
    pub text: String,
    pub id: Option<String>,
    /// Vertical offset from the top of the document, in pixels.
    pub offset: f64,
}

impl HeadlessHeading {
    pub fn new(level: u8, text: &str, offset: f64) -> Self {
        Self {
            level,
            text: text.to_owned(),
            id: None,
            offset,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_owned());
        self
    }
}

/// Diagram library stand-in that records every registration batch.
pub struct RecordingDiagram {
    supports_icon_packs: bool,
    batches: RefCell<Vec<Vec<IconPack>>>,
}

impl RecordingDiagram {
    /// Distinct pack names registered so far, in first-registration order.
    pub fn registered_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.batches
            .borrow()
            .iter()
            .flatten()
            .filter(|pack| seen.insert(pack.name.clone()))
            .map(|pack| pack.name.clone())
            .collect()
    }

    pub fn batches(&self) -> Vec<Vec<IconPack>> {
        self.batches.borrow().clone()
    }
}

impl DiagramLibrary for RecordingDiagram {
    fn supports_icon_packs(&self) -> bool {
        self.supports_icon_packs
    }

    fn register_icon_packs(&self, packs: Vec<IconPack>) {
        self.batches.borrow_mut().push(packs);
    }
}

#[derive(Default)]
struct State {
    globals: HashSet<String>,
    tasks: VecDeque<Task>,
    frames: VecDeque<Task>,
    futures: Vec<LocalBoxFuture<'static, ()>>,
    listeners: HashMap<PageEvent, Vec<Listener>>,
    head: Vec<HeadElement>,
    pending_scripts: Vec<(String, SettleHandler)>,
    auto_settle: bool,
    failing_scripts: HashSet<String>,
    failing_stylesheets: HashSet<String>,
    script_globals: HashMap<String, String>,
    container: Option<String>,
    headings: Vec<HeadlessHeading>,
    scroll: f64,
    sidebar_html: Option<String>,
    sidebar_mounts: usize,
    sidebar_visible: Option<bool>,
    highlighted: BTreeSet<String>,
    highlight_mutations: usize,
    storage: HashMap<String, String>,
    diagram: Option<(String, Rc<RecordingDiagram>)>,
}

/// A document without a rendering engine.
pub struct HeadlessPage {
    location: Url,
    state: RefCell<State>,
}

impl HeadlessPage {
    pub fn new(location: Url) -> Self {
        Self {
            location,
            state: RefCell::new(State::default()),
        }
    }

    // --- setup ---

    /// Install a content container matched by exactly `selector`.
    pub fn with_container(self, selector: &str, headings: Vec<HeadlessHeading>) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.container = Some(selector.to_owned());
            state.headings = headings;
        }
        self
    }

    pub fn define_global(&self, name: &str) {
        self.state.borrow_mut().globals.insert(name.to_owned());
    }

    /// Install a recording diagram library reachable once `global` is defined.
    pub fn install_diagram_library(
        &self,
        global: &str,
        supports_icon_packs: bool,
    ) -> Rc<RecordingDiagram> {
        let library = Rc::new(RecordingDiagram {
            supports_icon_packs,
            batches: RefCell::new(Vec::new()),
        });
        self.state.borrow_mut().diagram = Some((global.to_owned(), Rc::clone(&library)));
        library
    }

    /// Settle every appended script on the next turn without being asked.
    pub fn auto_settle_scripts(&self, enabled: bool) {
        self.state.borrow_mut().auto_settle = enabled;
    }

    /// Auto-settled scripts at `src` fire their error event.
    pub fn fail_script(&self, src: &str) {
        self.state.borrow_mut().failing_scripts.insert(src.to_owned());
    }

    /// Stylesheets linked at `href` fire their error event on the next task.
    pub fn fail_stylesheet(&self, href: &str) {
        self.state
            .borrow_mut()
            .failing_stylesheets
            .insert(href.to_owned());
    }

    /// Loading the script at `src` defines `global`.
    pub fn script_defines_global(&self, src: &str, global: &str) {
        self.state
            .borrow_mut()
            .script_globals
            .insert(src.to_owned(), global.to_owned());
    }

    /// Seed a `<link rel="stylesheet">` the page shipped with.
    pub fn add_stylesheet_link(&self, href: &str) {
        self.state.borrow_mut().head.push(HeadElement::Stylesheet {
            id: None,
            href: href.to_owned(),
        });
    }

    pub fn set_storage(&self, key: &str, value: &str) {
        self.state
            .borrow_mut()
            .storage
            .insert(key.to_owned(), value.to_owned());
    }

    // --- driving the event loop ---

    /// Fire the load (`Ok`) or error (`Err`) event of the oldest pending
    /// script element with this `src`. The event is dispatched as a task.
    /// Returns false when no such element is pending.
    pub fn complete_script(&self, src: &str, outcome: Result<(), String>) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(index) = state.pending_scripts.iter().position(|(s, _)| s == src) else {
            return false;
        };
        let (src, handler) = state.pending_scripts.remove(index);
        let task = settle_task(&mut state, src, handler, outcome);
        state.tasks.push_back(task);
        true
    }

    /// Run queued tasks, then batches of animation frames, until both queues
    /// are empty.
    pub fn run_until_idle(&self) {
        loop {
            let next = self.state.borrow_mut().tasks.pop_front();
            if let Some(task) = next {
                task();
                continue;
            }
            let frames = mem::take(&mut self.state.borrow_mut().frames);
            if frames.is_empty() {
                break;
            }
            for frame in frames {
                frame();
            }
        }
    }

    /// Run tasks and spawned futures until the page is quiescent.
    pub async fn settle(&self) {
        let mut running: Vec<LocalBoxFuture<'static, ()>> = Vec::new();
        poll_fn(|cx| {
            loop {
                self.run_until_idle();
                running.append(&mut self.state.borrow_mut().futures);
                running.retain_mut(|future| future.poll_unpin(cx).is_pending());
                let state = self.state.borrow();
                if state.tasks.is_empty() && state.frames.is_empty() && state.futures.is_empty() {
                    break;
                }
            }
            if running.is_empty() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await
    }

    /// Move the viewport and dispatch a scroll event.
    pub fn scroll_to(&self, offset: f64) {
        self.state.borrow_mut().scroll = offset;
        self.dispatch(PageEvent::Scroll);
    }

    /// Change a heading's offset (layout shift) and dispatch a resize event.
    pub fn resize_with_offsets(&self, offsets: &[f64]) {
        {
            let mut state = self.state.borrow_mut();
            for (heading, offset) in state.headings.iter_mut().zip(offsets) {
                heading.offset = *offset;
            }
        }
        self.dispatch(PageEvent::Resize);
    }

    pub fn click_sidebar_toggle(&self) {
        self.dispatch(PageEvent::ToggleSidebar);
    }

    fn dispatch(&self, event: PageEvent) {
        let listeners = self
            .state
            .borrow()
            .listeners
            .get(&event)
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            listener();
        }
    }

    // --- inspection ---

    pub fn head(&self) -> Vec<HeadElement> {
        self.state.borrow().head.clone()
    }

    pub fn script_count(&self, src: &str) -> usize {
        self.state
            .borrow()
            .head
            .iter()
            .filter(|el| matches!(el, HeadElement::Script { src: s } if s == src))
            .count()
    }

    pub fn stylesheet_count(&self, href: &str) -> usize {
        self.state
            .borrow()
            .head
            .iter()
            .filter(|el| matches!(el, HeadElement::Stylesheet { href: h, .. } if h == href))
            .count()
    }

    /// Current heading ids in document order.
    pub fn heading_ids(&self) -> Vec<Option<String>> {
        self.state
            .borrow()
            .headings
            .iter()
            .map(|h| h.id.clone())
            .collect()
    }

    pub fn sidebar_html(&self) -> Option<String> {
        self.state.borrow().sidebar_html.clone()
    }

    pub fn sidebar_mounts(&self) -> usize {
        self.state.borrow().sidebar_mounts
    }

    pub fn sidebar_visible(&self) -> Option<bool> {
        self.state.borrow().sidebar_visible
    }

    /// Ids whose ToC links currently carry the highlight marker.
    pub fn highlighted(&self) -> Vec<String> {
        self.state.borrow().highlighted.iter().cloned().collect()
    }

    /// Number of highlight add/remove operations performed so far.
    pub fn highlight_mutations(&self) -> usize {
        self.state.borrow().highlight_mutations
    }

    pub fn storage_value(&self, key: &str) -> Option<String> {
        self.state.borrow().storage.get(key).cloned()
    }
}

/// Build the task that delivers a script's terminal event.
fn settle_task(
    state: &mut State,
    src: String,
    handler: SettleHandler,
    outcome: Result<(), String>,
) -> Task {
    let defines = if outcome.is_ok() {
        state.script_globals.get(&src).cloned()
    } else {
        None
    };
    if let Some(global) = defines {
        // Globals become visible when the script executes, before its load event.
        state.globals.insert(global);
    }
    Box::new(move || handler(outcome))
}

impl Platform for HeadlessPage {
    fn location(&self) -> Url {
        self.location.clone()
    }

    fn has_global(&self, name: &str) -> bool {
        self.state.borrow().globals.contains(name)
    }

    fn diagram_library(&self, global: &str) -> Option<Rc<dyn DiagramLibrary>> {
        let state = self.state.borrow();
        if !state.globals.contains(global) {
            return None;
        }
        match &state.diagram {
            Some((name, library)) if name == global => {
                Some(Rc::clone(library) as Rc<dyn DiagramLibrary>)
            }
            _ => None,
        }
    }

    fn defer(&self, task: Task) {
        self.state.borrow_mut().tasks.push_back(task);
    }

    fn request_animation_frame(&self, task: Task) {
        self.state.borrow_mut().frames.push_back(task);
    }

    fn spawn_local(&self, future: LocalBoxFuture<'static, ()>) {
        self.state.borrow_mut().futures.push(future);
    }

    fn add_listener(&self, event: PageEvent, listener: Listener) {
        self.state
            .borrow_mut()
            .listeners
            .entry(event)
            .or_default()
            .push(listener);
    }

    fn append_script(&self, src: &Url, on_settle: SettleHandler) {
        let mut state = self.state.borrow_mut();
        let src = src.to_string();
        state.head.push(HeadElement::Script { src: src.clone() });
        if state.auto_settle {
            let outcome = if state.failing_scripts.contains(&src) {
                Err(format!("failed to fetch {src}"))
            } else {
                Ok(())
            };
            let task = settle_task(&mut state, src, on_settle, outcome);
            state.tasks.push_back(task);
        } else {
            state.pending_scripts.push((src, on_settle));
        }
    }

    fn has_element(&self, id: &str) -> bool {
        self.state.borrow().head.iter().any(|el| match el {
            HeadElement::Stylesheet { id: Some(el_id), .. } => el_id == id,
            HeadElement::InlineStyle { id: el_id, .. } => el_id == id,
            _ => false,
        })
    }

    fn stylesheet_hrefs(&self) -> Vec<String> {
        self.state
            .borrow()
            .head
            .iter()
            .filter_map(|el| match el {
                HeadElement::Stylesheet { href, .. } => Some(href.clone()),
                _ => None,
            })
            .collect()
    }

    fn append_stylesheet(&self, id: &str, href: &Url, on_error: StyleErrorHandler) {
        let mut state = self.state.borrow_mut();
        let href = href.to_string();
        if state.failing_stylesheets.contains(&href) {
            let reason = format!("failed to fetch {href}");
            state.tasks.push_back(Box::new(move || on_error(reason)));
        }
        state.head.push(HeadElement::Stylesheet {
            id: Some(id.to_owned()),
            href,
        });
    }

    fn append_inline_style(&self, id: &str, css: &str) {
        self.state.borrow_mut().head.push(HeadElement::InlineStyle {
            id: id.to_owned(),
            css: css.to_owned(),
        });
    }

    fn headings(&self, container_selector: &str) -> Option<Vec<HeadingElement>> {
        let state = self.state.borrow();
        if state.container.as_deref() != Some(container_selector) {
            return None;
        }
        let headings = state
            .headings
            .iter()
            .enumerate()
            .map(|(index, h)| HeadingElement {
                handle: ElementHandle(index),
                level: h.level,
                text: h.text.clone(),
                id: h.id.clone().filter(|id| !id.is_empty()),
            })
            .collect();
        Some(headings)
    }

    fn set_heading_id(&self, handle: ElementHandle, id: &str) {
        if let Some(heading) = self.state.borrow_mut().headings.get_mut(handle.0) {
            heading.id = Some(id.to_owned());
        }
    }

    fn offset_top(&self, id: &str) -> Option<f64> {
        self.state
            .borrow()
            .headings
            .iter()
            .find(|h| h.id.as_deref() == Some(id))
            .map(|h| h.offset)
    }

    fn scroll_offset(&self) -> f64 {
        self.state.borrow().scroll
    }

    fn mount_sidebar(&self, toc_html: &str) {
        let mut state = self.state.borrow_mut();
        state.sidebar_html = Some(toc_html.to_owned());
        state.sidebar_mounts += 1;
        // Fresh markup carries no highlight markers.
        state.highlighted.clear();
    }

    fn set_link_highlight(&self, id: &str, highlighted: bool) {
        let mut state = self.state.borrow_mut();
        if highlighted {
            state.highlighted.insert(id.to_owned());
        } else {
            state.highlighted.remove(id);
        }
        state.highlight_mutations += 1;
    }

    fn set_sidebar_visible(&self, visible: bool) {
        self.state.borrow_mut().sidebar_visible = Some(visible);
    }

    fn storage_get(&self, key: &str) -> Option<String> {
        self.state.borrow().storage.get(key).cloned()
    }

    fn storage_set(&self, key: &str, value: &str) {
        self.state
            .borrow_mut()
            .storage
            .insert(key.to_owned(), value.to_owned());
    }
}
