//! A minimal in-memory XML tree, the Rust stand-in for the original
//! `eurephia_xml.h` helpers (`xmlFindNode`, `xmlGetAttrValue`,
//! `xmlExtractContent`) over libxml2. Built once from `quick_xml` events;
//! read-only thereafter — the only documents this system ever needs to
//! inspect (the transform's sqldata output, and well-formedness of an
//! incoming report) are never mutated in place.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use parserd_core::ParserError;

#[derive(Debug, Clone)]
pub enum Child {
    Element(usize),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Child>,
}

impl Node {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct XmlDoc {
    nodes: Vec<Node>,
    root: usize,
}

impl XmlDoc {
    /// Parses `input` into a tree, returning `XmlParse` on malformed XML —
    /// the source of the `XML_FAIL` terminal status (§4.6 LOAD_XML).
    pub fn parse(input: &str) -> Result<Self, ParserError> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        let mut root: Option<usize> = None;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| ParserError::XmlParse(e.to_string()))?;
            match event {
                Event::Start(e) => {
                    let idx = push_node(&mut nodes, &e)?;
                    attach_child(&mut nodes, &stack, Child::Element(idx));
                    stack.push(idx);
                    root.get_or_insert(idx);
                }
                Event::Empty(e) => {
                    let idx = push_node(&mut nodes, &e)?;
                    attach_child(&mut nodes, &stack, Child::Element(idx));
                    root.get_or_insert(idx);
                }
                Event::End(_) => {
                    if stack.pop().is_none() {
                        return Err(ParserError::XmlParse("unbalanced end tag".into()));
                    }
                }
                Event::Text(t) => {
                    let text = unescape(&String::from_utf8_lossy(&t));
                    if !text.trim().is_empty() {
                        attach_child(&mut nodes, &stack, Child::Text(text));
                    }
                }
                Event::CData(t) => {
                    let text = String::from_utf8_lossy(&t).into_owned();
                    attach_child(&mut nodes, &stack, Child::Text(text));
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(ParserError::XmlParse("unclosed element at end of document".into()));
        }
        let root = root.ok_or_else(|| ParserError::XmlParse("document has no root element".into()))?;
        Ok(Self { nodes, root })
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    /// Direct element children of `idx`, in document order.
    pub fn element_children<'a>(&'a self, idx: usize) -> impl Iterator<Item = usize> + 'a {
        self.nodes[idx].children.iter().filter_map(|c| match c {
            Child::Element(i) => Some(*i),
            Child::Text(_) => None,
        })
    }

    /// First direct child element named `tag`.
    pub fn find_child(&self, idx: usize, tag: &str) -> Option<usize> {
        self.element_children(idx).find(|&c| self.nodes[c].tag == tag)
    }

    /// All direct child elements named `tag`, in document order.
    pub fn find_all_children(&self, idx: usize, tag: &str) -> Vec<usize> {
        self.element_children(idx).filter(|&c| self.nodes[c].tag == tag).collect()
    }

    /// Concatenation of this node's direct text children only (no descent
    /// into child elements), in document order.
    pub fn direct_text(&self, idx: usize) -> String {
        self.nodes[idx]
            .children
            .iter()
            .filter_map(|c| match c {
                Child::Text(t) => Some(t.as_str()),
                Child::Element(_) => None,
            })
            .collect()
    }
}

fn push_node(nodes: &mut Vec<Node>, e: &BytesStart) -> Result<usize, ParserError> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for a in e.attributes() {
        let a = a.map_err(|e| ParserError::XmlParse(e.to_string()))?;
        let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
        let val = unescape(&String::from_utf8_lossy(&a.value));
        attrs.push((key, val));
    }
    nodes.push(Node { tag, attrs, children: Vec::new() });
    Ok(nodes.len() - 1)
}

fn attach_child(nodes: &mut [Node], stack: &[usize], child: Child) {
    if let Some(&parent) = stack.last() {
        nodes[parent].children.push(child);
    }
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_attrs() {
        let doc = XmlDoc::parse(
            r#"<sqldata table="systems" schemaver="3"><record><field name="hostname">foo</field></record></sqldata>"#,
        )
        .unwrap();
        let root = doc.root();
        assert_eq!(doc.node(root).tag, "sqldata");
        assert_eq!(doc.node(root).attr("table"), Some("systems"));
        let record = doc.find_child(root, "record").unwrap();
        let field = doc.find_child(record, "field").unwrap();
        assert_eq!(doc.node(field).attr("name"), Some("hostname"));
        assert_eq!(doc.direct_text(field), "foo");
    }

    #[test]
    fn rejects_unbalanced_xml() {
        assert!(XmlDoc::parse("<a><b></a>").is_err());
    }

    #[test]
    fn rejects_empty_input() {
        assert!(XmlDoc::parse("").is_err());
    }

    #[test]
    fn handles_self_closing_tags() {
        let doc = XmlDoc::parse(r#"<root><field name="x" null="1"/></root>"#).unwrap();
        let field = doc.find_child(doc.root(), "field").unwrap();
        assert_eq!(doc.node(field).attr("null"), Some("1"));
    }
}
