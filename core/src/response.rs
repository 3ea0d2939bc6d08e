//! Response parser.
//!
//! # Design
//! Server responses are read with `quick_xml::Reader` into an owned element
//! tree. The response schema depends on the target structure, so the tree is
//! handed to the caller uninterpreted; `XmlDocument::get` navigates it with
//! dot-separated paths such as `"action.sess_id"`. Anything that is not a
//! single well-formed element (truncated input, mismatched tags, stray text,
//! several roots, nothing at all) is an `ApiError::Parse`.
//!
//! Text is kept exactly as sent. Whitespace-only runs are dropped only where
//! they sit between child elements, so indented responses still parse into
//! clean containers while a value of `"  "` survives.

use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ApiError;

/// A parsed response document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    root: XmlElement,
}

impl XmlDocument {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let mut reader = Reader::from_str(raw);
        let decoder = reader.decoder();

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                ApiError::Parse(format!("{e} at byte {}", reader.buffer_position()))
            })?;
            match event {
                Event::Start(start) => {
                    if stack.is_empty() && root.is_some() {
                        return Err(ApiError::Parse("more than one root element".to_string()));
                    }
                    drop_layout_text(&mut stack);
                    stack.push(open_element(&start, decoder)?);
                }
                Event::Empty(start) => {
                    drop_layout_text(&mut stack);
                    let element = open_element(&start, decoder)?;
                    attach(element, &mut stack, &mut root)?;
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| ApiError::Parse("unexpected closing tag".to_string()))?;
                    if !element.children.is_empty() && is_blank(&element.text) {
                        element.text.clear();
                    }
                    attach(element, &mut stack, &mut root)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| ApiError::Parse(e.to_string()))?;
                    push_text(&mut stack, &text)?;
                }
                Event::CData(data) => {
                    let text = decoder
                        .decode(&data)
                        .map_err(|e| ApiError::Parse(e.to_string()))?;
                    push_text(&mut stack, &text)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(ApiError::Parse(format!(
                "document ended inside <{}>",
                open.name
            )));
        }
        root.map(|root| Self { root })
            .ok_or_else(|| ApiError::Parse("document has no root element".to_string()))
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn into_root(self) -> XmlElement {
        self.root
    }

    /// Element at a dot-separated path below the root, e.g. `"action.sess_id"`
    /// in `<response><action><sess_id>..`.
    pub fn get(&self, path: &str) -> Option<&XmlElement> {
        self.root.find(path)
    }

    pub fn text_at(&self, path: &str) -> Option<&str> {
        self.get(path).map(XmlElement::text)
    }
}

/// One element of a parsed response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Concatenated text content, untrimmed.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    /// First child with the given tag name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Follows a dot-separated path of first-match child names.
    pub fn find(&self, path: &str) -> Option<&XmlElement> {
        path.split('.')
            .try_fold(self, |element, segment| element.child(segment))
    }
}

fn open_element(start: &BytesStart<'_>, decoder: Decoder) -> Result<XmlElement, ApiError> {
    let name = decoder
        .decode(start.name().as_ref())
        .map_err(|e| ApiError::Parse(e.to_string()))?
        .into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ApiError::Parse(e.to_string()))?;
        let key = decoder
            .decode(attr.key.as_ref())
            .map_err(|e| ApiError::Parse(e.to_string()))?
            .into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ApiError::Parse(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        ..XmlElement::default()
    })
}

fn attach(
    element: XmlElement,
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<(), ApiError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_some() => {
            return Err(ApiError::Parse("more than one root element".to_string()));
        }
        None => *root = Some(element),
    }
    Ok(())
}

fn push_text(stack: &mut [XmlElement], text: &str) -> Result<(), ApiError> {
    match stack.last_mut() {
        Some(element) => {
            element.text.push_str(text);
            Ok(())
        }
        None if is_blank(text) => Ok(()),
        None => Err(ApiError::Parse("text outside the root element".to_string())),
    }
}

/// Clears indentation collected before a child element opens.
fn drop_layout_text(stack: &mut [XmlElement]) {
    if let Some(parent) = stack.last_mut() {
        if is_blank(&parent.text) {
            parent.text.clear();
        }
    }
}

fn is_blank(text: &str) -> bool {
    text.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
}
