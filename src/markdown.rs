//! Markdown source for the headless page.
//!
//! Parses a document with comrak (GFM extensions) and lists its headings in
//! document order, together with the number of Mermaid fences the diagram
//! library would pick up. Heading ids are left alone: the ToC builder assigns
//! them.

use comrak::{
    nodes::{AstNode, NodeValue},
    parse_document, Arena, Options,
};
use reqwest::Url;
use tracing::debug;

use crate::headless::{HeadlessHeading, HeadlessPage};

/// Synthetic height of one source line, used to lay headings out vertically.
pub const LINE_HEIGHT: f64 = 24.0;

/// A heading found in the markdown source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHeading {
    /// Heading level (1–6).
    pub level: u8,
    /// Plain-text content of the heading.
    pub text: String,
    /// 1-based source line.
    pub line: usize,
}

/// What the page enhancements see of a markdown file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub headings: Vec<DocumentHeading>,
    /// Number of Mermaid fences.
    pub diagrams: usize,
}

impl Document {
    /// A headless page whose content container (matched by `selector`) holds
    /// this document's headings, each offset by its source line.
    pub fn headless_page(&self, location: Url, selector: &str) -> HeadlessPage {
        let headings = self
            .headings
            .iter()
            .map(|h| {
                HeadlessHeading::new(
                    h.level,
                    &h.text,
                    h.line.saturating_sub(1) as f64 * LINE_HEIGHT,
                )
            })
            .collect();
        HeadlessPage::new(location).with_container(selector, headings)
    }

    fn visit<'a>(&mut self, node: &'a AstNode<'a>) {
        let data = node.data.borrow();
        match &data.value {
            NodeValue::Heading(heading) => self.headings.push(DocumentHeading {
                level: heading.level,
                text: inline_text(node),
                line: data.sourcepos.start.line,
            }),
            NodeValue::CodeBlock(block)
                if block.fenced
                    && block
                        .info
                        .split_whitespace()
                        .next()
                        .is_some_and(|lang| lang.eq_ignore_ascii_case("mermaid")) =>
            {
                self.diagrams += 1;
            }
            _ => {}
        }
    }
}

/// Heading text with inline markup flattened; line breaks become spaces.
fn inline_text<'a>(heading: &'a AstNode<'a>) -> String {
    heading
        .descendants()
        .skip(1)
        .filter_map(|node| match &node.data.borrow().value {
            NodeValue::Text(text) => Some(text.to_string()),
            NodeValue::Code(code) => Some(code.literal.clone()),
            NodeValue::SoftBreak | NodeValue::LineBreak => Some(" ".to_owned()),
            _ => None,
        })
        .collect()
}

/// Parse `input` and collect its headings and diagram fences.
pub fn parse_markdown(input: &str) -> Document {
    let arena = Arena::new();
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    let root = parse_document(&arena, input, &options);

    let mut document = Document::default();
    for node in root.descendants() {
        document.visit(node);
    }
    debug!(
        headings = document.headings.len(),
        diagrams = document.diagrams,
        "parsed markdown"
    );
    document
}
