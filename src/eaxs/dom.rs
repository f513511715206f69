//! Minimal owned XML tree for one element subtree.
//!
//! The pipeline never materializes a whole archive: only a single
//! `<Message>` subtree is held in memory at a time. Qualified names are
//! stored verbatim so namespace prefixes round-trip; lookups match on the
//! local part.

use std::io::BufRead;

use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// A child of an [`XmlElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// A nested element.
    Element(XmlElement),
    /// Character data (stored unescaped).
    Text(String),
    /// A CDATA section.
    CData(String),
}

/// An owned XML element subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name as it appeared in the source (e.g. `ncdcr:Message`).
    pub name: String,
    /// Attributes in document order.
    pub attrs: Vec<(String, String)>,
    /// Child nodes in document order.
    pub children: Vec<XmlNode>,
}

impl Default for XmlElement {
    fn default() -> Self {
        Self::new("")
    }
}

impl XmlElement {
    /// Create an empty element.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// The local part of the qualified name.
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    /// Set (or replace) an attribute.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(attr) = self.attrs.iter_mut().find(|(n, _)| n == name) {
            attr.1 = value;
        } else {
            self.attrs.push((name.to_string(), value));
        }
    }

    /// Get an attribute value.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The element's text content: all directly contained text and CDATA,
    /// concatenated.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
                XmlNode::Element(_) => {}
            }
        }
        out
    }

    /// Append a child element.
    pub fn push_element(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    /// Append a text child.
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(XmlNode::Text(text.into()));
    }

    /// Append a CDATA child.
    pub fn push_cdata(&mut self, text: impl Into<String>) {
        self.children.push(XmlNode::CData(text.into()));
    }

    /// First child element with the given local name.
    pub fn find(&self, local: &str) -> Option<&XmlElement> {
        self.child_elements().find(|el| el.local_name() == local)
    }

    /// Mutable variant of [`XmlElement::find`].
    pub fn find_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(el) if el.local_name() == local => Some(el),
            _ => None,
        })
    }

    /// Iterate over all direct child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    /// Iterate over direct child elements with the given local name.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.child_elements()
            .filter(move |el| el.local_name() == local)
    }

    /// True if any descendant element (at any depth) has the given local
    /// name.
    pub fn has_descendant(&self, local: &str) -> bool {
        self.child_elements()
            .any(|el| el.local_name() == local || el.has_descendant(local))
    }
}

/// Read the subtree opened by `start` from `reader`, consuming events up to
/// and including the matching end tag.
pub fn read_subtree<R: BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart<'_>,
) -> Result<XmlElement, quick_xml::Error> {
    let mut root = element_from_start(start)?;
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let element = element_from_start(&e)?;
                stack.push(std::mem::replace(&mut root, element));
            }
            Event::Empty(e) => {
                let element = element_from_start(&e)?;
                root.push_element(element);
            }
            Event::Text(e) => {
                let text = e.unescape()?;
                if !text.is_empty() {
                    root.push_text(text.into_owned());
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                root.push_cdata(text);
            }
            Event::End(_) => match stack.pop() {
                Some(mut parent) => {
                    let finished = std::mem::take(&mut root);
                    parent.push_element(finished);
                    root = parent;
                }
                None => return Ok(root),
            },
            Event::Eof => {
                return Err(quick_xml::Error::UnexpectedEof(format!(
                    "while reading <{}> subtree",
                    root.name
                )))
            }
            // Comments, PIs, and declarations inside a message are dropped.
            _ => {}
        }
        buf.clear();
    }
}

/// Build an element (without children) from a start or empty tag.
fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, quick_xml::Error> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::InvalidAttr)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attrs.push((key, value));
    }
    Ok(element)
}

/// Write an element subtree through a `quick-xml` writer.
///
/// CDATA sections containing `]]>` are split into adjacent sections so the
/// output stays well formed.
pub fn write_subtree<W: std::io::Write>(
    writer: &mut Writer<W>,
    element: &XmlElement,
) -> Result<(), quick_xml::Error> {
    let mut start = BytesStart::new(element.name.as_str());
    for (name, value) in &element.attrs {
        start.push_attribute((name.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            XmlNode::Element(el) => write_subtree(writer, el)?,
            XmlNode::Text(text) => {
                writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            XmlNode::CData(text) => {
                let safe = text.replace("]]>", "]]]]><![CDATA[>");
                writer.write_event(Event::CData(BytesCData::new(safe)))?;
            }
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

/// Serialize an element to a standalone string (tests and diagnostics).
pub fn to_string(element: &XmlElement) -> Result<String, quick_xml::Error> {
    let mut writer = Writer::new(Vec::new());
    write_subtree(&mut writer, element)?;
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> XmlElement {
        let mut reader = Reader::from_str(xml);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf).expect("read") {
                Event::Start(e) => {
                    let start = e.to_owned();
                    return read_subtree(&mut reader, &start).expect("subtree");
                }
                Event::Eof => panic!("no root element"),
                _ => {}
            }
        }
    }

    #[test]
    fn test_roundtrip_preserves_structure() {
        let xml = r#"<a x="1"><b>hi</b><c/>tail</a>"#;
        let el = parse(xml);
        assert_eq!(el.name, "a");
        assert_eq!(el.attr("x"), Some("1"));
        assert_eq!(to_string(&el).unwrap(), xml);
    }

    #[test]
    fn test_local_name_strips_prefix() {
        let el = parse(r#"<ncdcr:Message xmlns:ncdcr="urn:x"><ncdcr:MessageId>m1</ncdcr:MessageId></ncdcr:Message>"#);
        assert_eq!(el.local_name(), "Message");
        let id = el.find("MessageId").expect("child");
        assert_eq!(id.text(), "m1");
    }

    #[test]
    fn test_nested_subtree_and_descendants() {
        let el = parse("<m><MultiBody><SingleBody><Disposition>attachment</Disposition></SingleBody></MultiBody></m>");
        assert!(el.has_descendant("Disposition"));
        assert!(!el.has_descendant("Nope"));
        let multi = el.find("MultiBody").unwrap();
        assert_eq!(multi.children_named("SingleBody").count(), 1);
    }

    #[test]
    fn test_text_concatenates_cdata() {
        let el = parse("<a>one<![CDATA[ two]]></a>");
        assert_eq!(el.text(), "one two");
    }

    #[test]
    fn test_set_attr_replaces() {
        let mut el = XmlElement::new("m");
        el.set_attr("Restricted", "false");
        el.set_attr("Restricted", "true");
        assert_eq!(el.attr("Restricted"), Some("true"));
        assert_eq!(el.attrs.len(), 1);
    }

    #[test]
    fn test_cdata_with_end_marker_is_split() {
        let mut el = XmlElement::new("a");
        el.push_cdata("x]]>y");
        let out = to_string(&el).unwrap();
        assert_eq!(out, "<a><![CDATA[x]]]]><![CDATA[>y]]></a>");
    }

    #[test]
    fn test_escaped_text_roundtrip() {
        let el = parse("<a>fish &amp; chips</a>");
        assert_eq!(el.text(), "fish & chips");
        assert_eq!(to_string(&el).unwrap(), "<a>fish &amp; chips</a>");
    }
}
