//! Sidebar visibility, persisted in local storage.

use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

use crate::config::SidebarConfig;
use crate::platform::{PageEvent, Platform};

/// Decode a stored flag; anything unrecognised falls back to `default`.
pub fn parse_flag(raw: Option<&str>, default: bool) -> bool {
    match raw.map(str::trim) {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

/// The sidebar's show/hide state.
pub struct Sidebar {
    platform: Rc<dyn Platform>,
    storage_key: String,
    visible: Cell<bool>,
}

impl Sidebar {
    /// Apply the stored visibility and wire up the toggle control.
    pub fn restore(platform: Rc<dyn Platform>, config: &SidebarConfig) -> Rc<Self> {
        let stored = platform.storage_get(&config.storage_key);
        let visible = parse_flag(stored.as_deref(), config.default_visible);
        platform.set_sidebar_visible(visible);
        debug!(key = %config.storage_key, visible, "restored sidebar visibility");

        let sidebar = Rc::new(Self {
            platform: Rc::clone(&platform),
            storage_key: config.storage_key.clone(),
            visible: Cell::new(visible),
        });
        let on_toggle = Rc::clone(&sidebar);
        platform.add_listener(
            PageEvent::ToggleSidebar,
            Rc::new(move || {
                on_toggle.toggle();
            }),
        );
        sidebar
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    /// Flip, apply and persist the visibility. Returns the new state.
    pub fn toggle(&self) -> bool {
        let visible = !self.visible.get();
        self.visible.set(visible);
        self.platform.set_sidebar_visible(visible);
        self.platform
            .storage_set(&self.storage_key, if visible { "true" } else { "false" });
        debug!(visible, "sidebar toggled");
        visible
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Url;

    use super::*;
    use crate::headless::HeadlessPage;

    fn page() -> Rc<HeadlessPage> {
        Rc::new(HeadlessPage::new(
            Url::parse("https://docs.example.com/").expect("url"),
        ))
    }

    #[test]
    fn parse_flag_accepts_known_spellings() {
        assert!(parse_flag(Some("true"), false));
        assert!(parse_flag(Some(" 1 "), false));
        assert!(!parse_flag(Some("false"), true));
        assert!(!parse_flag(Some("0"), true));
        assert!(parse_flag(Some("maybe"), true));
        assert!(!parse_flag(None, false));
    }

    #[test]
    fn restore_applies_stored_flag() {
        let page = page();
        let config = SidebarConfig::default();
        page.set_storage(&config.storage_key, "false");

        let sidebar = Sidebar::restore(page.clone(), &config);
        assert!(!sidebar.is_visible());
        assert_eq!(page.sidebar_visible(), Some(false));
    }

    #[test]
    fn restore_without_stored_flag_uses_default() {
        let page = page();
        let sidebar = Sidebar::restore(page.clone(), &SidebarConfig::default());
        assert!(sidebar.is_visible());
        assert_eq!(page.storage_value("pagelight.sidebar.visible"), None);
    }

    #[test]
    fn toggle_control_flips_and_persists() {
        let page = page();
        let config = SidebarConfig {
            storage_key: "docs.sidebar".to_owned(),
            default_visible: true,
        };
        let sidebar = Sidebar::restore(page.clone(), &config);

        page.click_sidebar_toggle();
        assert!(!sidebar.is_visible());
        assert_eq!(page.sidebar_visible(), Some(false));
        assert_eq!(page.storage_value("docs.sidebar").as_deref(), Some("false"));

        page.click_sidebar_toggle();
        assert_eq!(page.storage_value("docs.sidebar").as_deref(), Some("true"));
    }

    #[test]
    fn toggle_survives_dropped_handle() {
        let page = page();
        drop(Sidebar::restore(page.clone(), &SidebarConfig::default()));

        page.click_sidebar_toggle();
        assert_eq!(page.sidebar_visible(), Some(false));
        assert_eq!(
            page.storage_value("pagelight.sidebar.visible").as_deref(),
            Some("false")
        );
    }
}
