//! Minimal XML tree for decoding client requests.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Default, Clone)]
pub struct Node {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Node>,
}

impl Node {
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child_text(&self, name: &str) -> String {
        self.child(name).map(|c| c.text.clone()).unwrap_or_default()
    }
}

pub fn parse(raw: &str) -> Result<Node, String> {
    let mut reader = Reader::from_str(raw);
    let mut stack: Vec<Node> = Vec::new();

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => {
                clear_layout(&mut stack);
                stack.push(node(&e)?);
            }
            Event::Empty(e) => {
                clear_layout(&mut stack);
                let n = node(&e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(n),
                    None => return Ok(n),
                }
            }
            Event::End(_) => {
                let mut n = stack.pop().ok_or("unbalanced closing tag")?;
                if !n.children.is_empty() && n.text.trim().is_empty() {
                    n.text.clear();
                }
                match stack.last_mut() {
                    Some(parent) => parent.children.push(n),
                    None => return Ok(n),
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|e| e.to_string())?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::Eof => return Err("unexpected end of document".to_string()),
            _ => {}
        }
    }
}

/// Whitespace before a child element is layout, not a value.
fn clear_layout(stack: &mut [Node]) {
    if let Some(parent) = stack.last_mut() {
        if parent.text.trim().is_empty() {
            parent.text.clear();
        }
    }
}

fn node(start: &BytesStart<'_>) -> Result<Node, String> {
    let name = String::from_utf8(start.name().as_ref().to_vec()).map_err(|e| e.to_string())?;
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8(attr.key.as_ref().to_vec()).map_err(|e| e.to_string())?;
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        attributes.push((key, value));
    }
    Ok(Node {
        name,
        attributes,
        ..Node::default()
    })
}

/// Escapes text and attribute content.
pub fn esc(s: &str) -> String {
    quick_xml::escape::escape(s).into_owned()
}
