//! Strict XML strategy for RSS documents.
//!
//! The document is read into a small element tree with `quick-xml`. Any
//! structural problem (mismatched or unclosed tags, no root element, text or
//! a second element outside the root) counts as "not XML", which sends the
//! caller to the HTML strategy instead.
//!
//! Nesting deeper than [`MAX_DEPTH`] is rejected the same way, so the tree
//! stays shallow enough to walk and drop without exhausting the stack.
//!
//! Entity references are kept verbatim in the tree and decoded during field
//! extraction, so feeds using HTML entities such as `&nbsp;` still parse.

use crate::models::NormalizedItem;
use crate::utils::clean_text;
use html_escape::decode_html_entities;
use itertools::Itertools;
use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

/// Deepest element nesting accepted as a feed.
pub const MAX_DEPTH: usize = 256;

/// Why a document was rejected as XML.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),
    #[error("element <{0}> is never closed")]
    Unclosed(String),
    #[error("closing tag without an open element")]
    UnmatchedEnd,
    #[error("document has no root element")]
    NoRoot,
    #[error("content outside the root element")]
    OutsideRoot,
    #[error("elements nested deeper than {} levels", MAX_DEPTH)]
    TooDeep,
}

/// A parsed XML element: qualified name, direct text, and child elements.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn named(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Self::default()
        }
    }

    /// Direct children with the given name.
    pub fn children_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first direct child named `name`, or `""`.
    pub fn child_text(&self, name: &str) -> &str {
        self.children_named(name)
            .next()
            .map(|c| c.text.as_str())
            .unwrap_or_default()
    }

    /// All descendants named `name`, in document order.
    pub fn descendants_named<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        let mut pending: Vec<&'a Element> = self.children.iter().rev().collect();
        while let Some(el) = pending.pop() {
            if el.name == name {
                out.push(el);
            }
            pending.extend(el.children.iter().rev());
        }
    }
}

/// Parse `text` into an element tree, failing on anything that is not
/// well-formed XML.
pub fn parse_tree(text: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().check_end_names = true;

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if stack.is_empty() && root.is_some() {
                    return Err(XmlError::OutsideRoot);
                }
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::TooDeep);
                }
                stack.push(Element::named(e.name().as_ref()));
            }
            Event::Empty(e) => {
                attach(&mut stack, &mut root, Element::named(e.name().as_ref()))?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or(XmlError::UnmatchedEnd)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(e) => push_text(&mut stack, &String::from_utf8_lossy(&e))?,
            Event::CData(e) => push_text(&mut stack, &String::from_utf8_lossy(&e))?,
            Event::GeneralRef(e) => {
                let entity = format!("&{};", String::from_utf8_lossy(&e));
                push_text(&mut stack, &entity)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Unclosed(open.name.clone()));
    }
    root.ok_or(XmlError::NoRoot)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(XmlError::OutsideRoot),
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(top) => top.text.push_str(text),
        None if text.trim().is_empty() => {}
        None => return Err(XmlError::OutsideRoot),
    }
    Ok(())
}

/// Extract up to `max_items` valid items from an RSS tree.
///
/// `channel/item` elements are preferred; when there are none, any `item`
/// element in the document is used (some feeds have no channel wrapper).
pub fn extract_items(root: &Element, max_items: usize) -> Vec<NormalizedItem> {
    let mut candidates: Vec<&Element> = root
        .children_named("channel")
        .flat_map(|channel| channel.children_named("item"))
        .collect();
    if candidates.is_empty() {
        root.descendants_named("item", &mut candidates);
    }

    candidates
        .into_iter()
        .filter_map(to_item)
        .unique_by(|item| item.link.clone())
        .take(max_items)
        .collect()
}

fn to_item(element: &Element) -> Option<NormalizedItem> {
    let title = clean_text(element.child_text("title"));
    let link = decode_html_entities(element.child_text("link").trim()).into_owned();
    let summary = clean_text(element.child_text("description"));
    let published = element.child_text("pubDate");
    NormalizedItem::new(&title, &link, &summary, Some(published))
}
