//! Sidebar table of contents.
//!
//! Headings are read from the content container in document order, given a
//! stable `id` when they lack one, folded into a nested outline and rendered
//! as collapsible `<details>` groups.

use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::platform::Platform;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TocOptions {
    /// Selector of the element whose headings make up the outline.
    pub container_selector: String,
    /// Heading ids (or slugified heading texts) that mark an inline table of
    /// contents; such headings are left out of the sidebar.
    pub reserved_markers: Vec<String>,
    /// Groups at this level or shallower start expanded.
    pub open_depth: u8,
}

impl Default for TocOptions {
    fn default() -> Self {
        Self {
            container_selector: "main.content".to_owned(),
            reserved_markers: vec![
                "table-of-contents".to_owned(),
                "contents".to_owned(),
                "toc".to_owned(),
            ],
            open_depth: 2,
        }
    }
}

/// One entry of the outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingNode {
    /// Heading level (1–6).
    pub level: u8,
    pub text: String,
    pub id: String,
    pub children: Vec<HeadingNode>,
}

impl HeadingNode {
    pub fn new(level: u8, text: &str, id: &str) -> Self {
        Self {
            level,
            text: text.to_owned(),
            id: id.to_owned(),
            children: Vec::new(),
        }
    }
}

/// Convert heading text to an anchor slug.
///
/// Trims and lowercases the text, turns each whitespace run into a single
/// `-`, then drops everything that is not an ASCII letter, digit, `_` or `-`.
/// Applying it to its own output is a no-op.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.trim().to_lowercase().chars() {
        if c.is_whitespace() {
            if !in_space {
                slug.push('-');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            slug.push(c);
        }
    }
    slug
}

/// Identifier for a heading that has none: its slug, or a random `toc-xxxxxxxx`
/// when the slug comes out empty.
///
/// Headings with identical text get identical slugs; nothing de-duplicates them.
pub fn heading_id(text: &str) -> String {
    let slug = slugify(text);
    if !slug.is_empty() {
        return slug;
    }
    let random = Uuid::new_v4().simple().to_string();
    format!("toc-{}", &random[..8])
}

/// Fold a document-order heading list into a forest.
///
/// Each node becomes a child of the nearest preceding node with a strictly
/// lower level; nodes with no such predecessor are roots. Order is preserved
/// at every depth.
pub fn build_tree(flat: Vec<HeadingNode>) -> Vec<HeadingNode> {
    let mut roots = Vec::new();
    let mut open: Vec<HeadingNode> = Vec::new();
    for node in flat {
        while open.last().is_some_and(|top| top.level >= node.level) {
            close_top(&mut open, &mut roots);
        }
        open.push(node);
    }
    while !open.is_empty() {
        close_top(&mut open, &mut roots);
    }
    roots
}

fn close_top(open: &mut Vec<HeadingNode>, roots: &mut Vec<HeadingNode>) {
    if let Some(done) = open.pop() {
        match open.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
    }
}

/// Minimal HTML entity escaping for text content and attribute values.
fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the outline as nested lists.
///
/// Nodes with children become `<details>` groups (expanded when
/// `level <= open_depth`) whose summary holds the link; leaves are plain
/// links. Returns an empty string for an empty forest.
pub fn render_toc(forest: &[HeadingNode], open_depth: u8) -> String {
    if forest.is_empty() {
        return String::new();
    }
    let mut html = String::new();
    render_list(forest, open_depth, &mut html);
    html
}

fn render_list(nodes: &[HeadingNode], open_depth: u8, html: &mut String) {
    html.push_str("<ul class=\"toc-list\">\n");
    for node in nodes {
        let class = format!("toc-h{}", node.level);
        let link = format!(
            "<a href=\"#{}\">{}</a>",
            html_escape(&node.id),
            html_escape(&node.text)
        );
        if node.children.is_empty() {
            html.push_str(&format!("<li class=\"{class}\">{link}</li>\n"));
            continue;
        }
        let open = if node.level <= open_depth { " open" } else { "" };
        html.push_str(&format!(
            "<li class=\"{class}\"><details{open}><summary>{link}</summary>\n"
        ));
        render_list(&node.children, open_depth, html);
        html.push_str("</details></li>\n");
    }
    html.push_str("</ul>\n");
}

fn is_reserved(id: &str, text: &str, markers: &[String]) -> bool {
    let text_slug = slugify(text);
    markers.iter().any(|marker| {
        let marker = slugify(marker);
        marker == id || marker == text_slug
    })
}

/// Build the sidebar outline for the page and mount it.
///
/// Returns the ids of the outlined headings in document order, or `None`
/// when the page has no content container. Calling it again replaces the
/// previously mounted outline.
pub fn build_toc(platform: &dyn Platform, options: &TocOptions) -> Option<Vec<String>> {
    let Some(elements) = platform.headings(&options.container_selector) else {
        debug!(selector = %options.container_selector, "no content container; skipping table of contents");
        return None;
    };

    let mut flat = Vec::with_capacity(elements.len());
    for element in elements {
        let id = match element.id {
            Some(id) => id,
            None => {
                let id = heading_id(&element.text);
                platform.set_heading_id(element.handle, &id);
                id
            }
        };
        if is_reserved(&id, &element.text, &options.reserved_markers) {
            debug!(id = %id, "skipping inline contents heading");
            continue;
        }
        flat.push(HeadingNode::new(
            element.level.clamp(1, 6),
            element.text.trim(),
            &id,
        ));
    }

    let ids: Vec<String> = flat.iter().map(|node| node.id.clone()).collect();
    let forest = build_tree(flat);
    platform.mount_sidebar(&render_toc(&forest, options.open_depth));
    info!(headings = ids.len(), roots = forest.len(), "built table of contents");
    Some(ids)
}
