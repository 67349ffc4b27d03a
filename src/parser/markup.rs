use std::ops::Range;
use std::sync::LazyLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use crate::error::MarkupError;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Owned markup node. `text` is the content before the first child, `tail`
/// the content after the closing tag up to the next sibling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
    pub tail: String,
    /// Byte range of the element in the source it was parsed from.
    pub span: Range<usize>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Element {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// `attr` that treats an empty or blank value as absent.
    pub fn attr_nonempty(&self, name: &str) -> Option<&str> {
        self.attr(name).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.attr(name).map(str::trim), Some("yes" | "true"))
    }

    /// All descendants in document (pre-)order, not including `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// Descendants whose tag is one of `tags`, in document order.
    pub fn find_all<'a>(&'a self, tags: &'a [&'a str]) -> impl Iterator<Item = &'a Element> + 'a {
        self.descendants().filter(move |e| tags.contains(&e.tag.as_str()))
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<&'a Element> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}

/// Collapse every whitespace run, newlines included, to one space.
pub fn normalize_whitespace(s: &str) -> String {
    WHITESPACE_RE.replace_all(s, " ").into_owned()
}

/// Parse a markup fragment (any number of top-level nodes) into a synthetic
/// root element named `root`. Declarations, processing instructions, doctypes
/// and comments are skipped.
///
/// Tags that do not pair up never fail the parse:
/// - an end tag closes the nearest open element of that name, and every
///   element opened after it;
/// - an end tag with no open element of that name is dropped;
/// - a `div` closes any `div` still open, as blocks never nest;
/// - elements open at the end of input are closed there.
///
/// Text with an unknown entity is kept verbatim. Only lexical errors, such
/// as a broken attribute, are reported.
pub fn parse(source: &str) -> Result<Element, MarkupError> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().check_end_names = false;
    reader.config_mut().allow_unmatched_ends = true;
    let mut stack: Vec<Element> = vec![Element {
        tag: "root".to_string(),
        span: 0..source.len(),
        ..Default::default()
    }];

    loop {
        let event = reader.read_event()?;
        let after = reader.buffer_position() as usize;
        match event {
            Event::Start(e) => {
                let el = open_element(&e)?;
                let start = tag_start(source, after);
                close_open_block(&mut stack, &el.tag, start);
                stack.push(Element {
                    span: start..after,
                    ..el
                });
            }
            Event::Empty(e) => {
                let el = open_element(&e)?;
                let start = tag_start(source, after);
                close_open_block(&mut stack, &el.tag, start);
                push_child(
                    &mut stack,
                    Element {
                        span: start..after,
                        ..el
                    },
                );
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                // The synthetic root at depth 0 is never closed by the source.
                if let Some(depth) = stack.iter().rposition(|el| el.tag == name).filter(|&d| d > 0) {
                    close_to(&mut stack, depth, tag_start(source, after), after);
                }
            }
            Event::Text(t) => {
                let text = match t.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(&t).into_owned(),
                };
                push_text(&mut stack, &text);
            }
            Event::CData(t) => push_text(&mut stack, &String::from_utf8_lossy(&t.into_inner())),
            Event::Eof => break,
            // Decl, PI, DocType, Comment
            _ => {}
        }
    }

    if stack.len() > 1 {
        close_to(&mut stack, 1, source.len(), source.len());
    }
    Ok(stack.pop().unwrap_or_default())
}

/// Blocks of a parsed page: the root's element children, or the children of
/// a single non-`div` wrapper element when the page has one.
pub fn top_level_blocks(root: &Element) -> &[Element] {
    match root.children.as_slice() {
        [only] if only.tag != "div" => &only.children,
        blocks => blocks,
    }
}

fn open_element(e: &BytesStart) -> Result<Element, MarkupError> {
    let mut el = Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        el.attrs.push((key, value));
    }
    Ok(el)
}

const BLOCK_TAG: &str = "div";

/// Close the open block, if any, when another block starts at `start`.
fn close_open_block(stack: &mut Vec<Element>, tag: &str, start: usize) {
    if tag != BLOCK_TAG {
        return;
    }
    if let Some(depth) = stack.iter().rposition(|el| el.tag == BLOCK_TAG).filter(|&d| d > 0) {
        close_to(stack, depth, start, start);
    }
}

/// Pop the element at `depth` and everything above it into their parents.
/// Elements left open above `depth` end at `cut`, the one at `depth` at `end`.
fn close_to(stack: &mut Vec<Element>, depth: usize, cut: usize, end: usize) {
    while stack.len() > depth {
        let Some(mut el) = stack.pop() else {
            break;
        };
        el.span.end = if stack.len() == depth { end } else { cut };
        push_child(stack, el);
    }
}

fn push_child(stack: &mut [Element], el: Element) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
    }
}

fn push_text(stack: &mut [Element], text: &str) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    match parent.children.last_mut() {
        Some(prev) => prev.tail.push_str(text),
        None => parent.text.push_str(text),
    }
}

/// Position of the `<` opening the tag that ends at `after`.
fn tag_start(source: &str, after: usize) -> usize {
    source
        .get(..after)
        .and_then(|head| head.rfind('<'))
        .unwrap_or(0)
}

// ── Tests ──
