//! Static assets injected into the hosting page.
//!
//! Compiled into the binary via `include_str!` so nothing has to be shipped
//! alongside it.

/// Element id of the inline `<style>` carrying [`SIDEBAR_CSS`].
pub const SIDEBAR_STYLE_ID: &str = "pagelight-sidebar-style";

/// Layout for the toggle control and the ToC sidebar, including the
/// `a.active` highlight marker.
///
/// Loaded from `src/assets/sidebar.css` at compile time.
pub const SIDEBAR_CSS: &str = include_str!("assets/sidebar.css");
