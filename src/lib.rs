//! Page enhancements for static documentation previews.
//!
//! - [`loader`]: de-duplicating script/stylesheet loader.
//! - [`icons`]: icon-pack resolution and registration with the diagram library.
//! - [`toc`]: sidebar outline built from the page's headings.
//! - [`highlight`]: keeps the current section highlighted while scrolling.
//! - [`sidebar`]: persisted sidebar visibility.
//! - [`page`]: the one-shot initialization entry point tying them together.
//!
//! All of them work against the [`platform::Platform`] adapter;
//! [`headless::HeadlessPage`] is an in-memory implementation.

pub mod cli;
pub mod config;
pub mod error;
pub mod headless;
pub mod highlight;
pub mod icons;
pub mod loader;
pub mod logging;
pub mod markdown;
pub mod page;
pub mod platform;
pub mod sidebar;
pub mod toc;
pub mod web_assets;
