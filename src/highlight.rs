//! Scroll-driven highlighting of the current section in the ToC.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::debug;

use crate::platform::{PageEvent, Platform};

/// Pick the active heading for a scroll position.
///
/// `headings` holds `(id, offset)` pairs in document order. The active one is
/// the last heading whose offset is at or above `scroll + bias`; when none
/// qualifies the first heading is active.
pub fn select_active(headings: &[(String, f64)], scroll: f64, bias: f64) -> Option<&str> {
    let threshold = scroll + bias;
    headings
        .iter()
        .filter(|(_, offset)| *offset <= threshold)
        .last()
        .or_else(|| headings.first())
        .map(|(id, _)| id.as_str())
}

/// Keeps the highlighted ToC link in sync with the viewport.
///
/// Scroll events are coalesced to one evaluation per animation frame; resize
/// events evaluate immediately. The DOM is touched only when the active
/// heading changes. The listeners own the highlighter, so it stays attached
/// for the lifetime of the page.
pub struct Highlighter {
    platform: Rc<dyn Platform>,
    ids: Vec<String>,
    bias: f64,
    active: RefCell<Option<String>>,
    frame_pending: Cell<bool>,
}

impl Highlighter {
    /// Evaluate once and subscribe to scroll and resize events.
    pub fn attach(platform: Rc<dyn Platform>, ids: Vec<String>, bias: f64) -> Rc<Self> {
        let highlighter = Rc::new(Self {
            platform: Rc::clone(&platform),
            ids,
            bias,
            active: RefCell::new(None),
            frame_pending: Cell::new(false),
        });
        highlighter.evaluate();

        let on_scroll = Rc::clone(&highlighter);
        platform.add_listener(
            PageEvent::Scroll,
            Rc::new(move || Rc::clone(&on_scroll).schedule()),
        );
        let on_resize = Rc::clone(&highlighter);
        platform.add_listener(PageEvent::Resize, Rc::new(move || on_resize.evaluate()));
        highlighter
    }

    /// Currently highlighted heading id.
    pub fn active(&self) -> Option<String> {
        self.active.borrow().clone()
    }

    /// Forget the active heading and evaluate again.
    ///
    /// Call after the ToC markup was remounted: fresh links carry no highlight
    /// marker, so the current section has to be marked anew.
    pub fn reapply(&self) {
        self.active.borrow_mut().take();
        self.evaluate();
    }

    /// Recompute the active heading and move the highlight if it changed.
    pub fn evaluate(&self) {
        let offsets: Vec<(String, f64)> = self
            .ids
            .iter()
            .filter_map(|id| self.platform.offset_top(id).map(|offset| (id.clone(), offset)))
            .collect();
        let scroll = self.platform.scroll_offset();
        let next = select_active(&offsets, scroll, self.bias).map(str::to_owned);

        let mut active = self.active.borrow_mut();
        if *active == next {
            return;
        }
        if let Some(previous) = active.as_deref() {
            self.platform.set_link_highlight(previous, false);
        }
        if let Some(id) = next.as_deref() {
            self.platform.set_link_highlight(id, true);
        }
        debug!(scroll, from = ?active.as_deref(), to = ?next.as_deref(), "active section changed");
        *active = next;
    }

    fn schedule(self: Rc<Self>) {
        if self.frame_pending.replace(true) {
            return;
        }
        let highlighter = Rc::clone(&self);
        self.platform.request_animation_frame(Box::new(move || {
            highlighter.frame_pending.set(false);
            highlighter.evaluate();
        }));
    }
}
