//! Minimal XML tree with source spans.
//!
//! The transformer reads protocol objects from this tree, and the signature
//! code uses the recorded byte spans to cut signed elements out of the
//! original text without re-serializing them.

use std::borrow::Cow;
use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};

/// An element with its attributes, children and text.
///
/// Names are local names; namespace prefixes are dropped.
#[derive(Debug, Clone, Default)]
pub(crate) struct XmlElement {
    pub name: String,
    /// Name as written, with its prefix.
    pub qname: String,
    /// `xmlns` declarations made on this element; the default namespace has prefix "".
    pub namespaces: Vec<(String, String)>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
    /// Byte range of the element in the parsed document.
    pub start: usize,
    pub end: usize,
    /// Offset just past the start tag; equals `end` for empty elements.
    pub content_start: usize,
}

impl XmlElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn required_attr(&self, name: &str) -> SamlResult<&str> {
        self.attr(name)
            .ok_or_else(|| SamlError::MissingElement(format!("{}@{name}", self.name)))
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn required_child(&self, name: &str) -> SamlResult<&XmlElement> {
        self.child(name)
            .ok_or_else(|| SamlError::MissingElement(format!("{}/{name}", self.name)))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    /// Depth-first search for an element carrying `ID="id"`.
    pub fn find_by_id(&self, id: &str) -> Option<&XmlElement> {
        if self.attr("ID") == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_id(id))
    }
}

/// Parses `xml` into a tree. The document must have exactly one root.
pub(crate) fn parse(xml: &str) -> SamlResult<XmlElement> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let before = position(&reader);
        let event = reader.read_event()?;
        let after = position(&reader);
        match event {
            Event::Start(start) => {
                let mut element = element_from(&start)?;
                element.start = before;
                element.content_start = after;
                stack.push(element);
            }
            Event::Empty(start) => {
                let mut element = element_from(&start)?;
                element.start = before;
                element.end = after;
                element.content_start = after;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| SamlError::XmlParse("unbalanced end tag".to_string()))?;
                element.end = after;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::DocType(_) => {
                return Err(SamlError::XmlParse("DOCTYPE is not allowed".to_string()));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(SamlError::XmlParse("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
}

fn position(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

fn element_from(start: &BytesStart<'_>) -> SamlResult<XmlElement> {
    let name = utf8(start.local_name().as_ref())?.into_owned();
    let qname = utf8(start.name().as_ref())?.into_owned();
    let mut attributes = Vec::new();
    let mut namespaces = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            let prefix = key.strip_prefix(b"xmlns:").unwrap_or_default();
            namespaces.push((utf8(prefix)?.into_owned(), attr.unescape_value()?.into_owned()));
            continue;
        }
        let local = utf8(attr.key.local_name().as_ref())?.into_owned();
        attributes.push((local, attr.unescape_value()?.into_owned()));
    }
    Ok(XmlElement {
        name,
        qname,
        namespaces,
        attributes,
        ..XmlElement::default()
    })
}

/// Cuts `element` out of the document it was parsed from.
///
/// The span of `omit` is left out, and namespace declarations the fragment
/// inherits from its ancestors are repeated on its start tag so that the
/// fragment can be processed on its own.
pub(crate) fn detach(
    xml: &str,
    root: &XmlElement,
    element: &XmlElement,
    omit: Option<&XmlElement>,
) -> SamlResult<String> {
    let mut ancestors = Vec::new();
    if !path_to(root, element, &mut ancestors) {
        return Err(SamlError::XmlParse(format!(
            "element '{}' is not part of the document",
            element.name
        )));
    }

    let mut inherited: BTreeMap<&str, &str> = BTreeMap::new();
    for ancestor in &ancestors {
        for (prefix, uri) in &ancestor.namespaces {
            inherited.insert(prefix, uri);
        }
    }
    for (prefix, _) in &element.namespaces {
        inherited.remove(prefix.as_str());
    }

    let mut body = String::with_capacity(element.end - element.start);
    match omit {
        Some(omitted) if element.start <= omitted.start && omitted.end <= element.end => {
            body.push_str(&xml[element.start..omitted.start]);
            body.push_str(&xml[omitted.end..element.end]);
        }
        _ => body.push_str(&xml[element.start..element.end]),
    }

    let mut declarations = String::new();
    for (prefix, uri) in inherited {
        let used = prefix.is_empty()
            || body.contains(&format!("<{prefix}:"))
            || body.contains(&format!(" {prefix}:"));
        if !used {
            continue;
        }
        let attribute = if prefix.is_empty() {
            "xmlns".to_string()
        } else {
            format!("xmlns:{prefix}")
        };
        declarations.push_str(&format!(" {attribute}=\"{}\"", escape(uri)));
    }

    let tag_name_end = 1 + element.qname.len();
    body.insert_str(tag_name_end, &declarations);
    Ok(body)
}

fn path_to<'a>(node: &'a XmlElement, target: &XmlElement, path: &mut Vec<&'a XmlElement>) -> bool {
    if node.start == target.start && node.end == target.end {
        return true;
    }
    path.push(node);
    if node.children.iter().any(|child| path_to(child, target, path)) {
        return true;
    }
    path.pop();
    false
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> SamlResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(SamlError::XmlParse(
                "document has more than one root element".to_string(),
            ))
        }
    }
    Ok(())
}

fn utf8(bytes: &[u8]) -> SamlResult<Cow<'_, str>> {
    std::str::from_utf8(bytes)
        .map(Cow::Borrowed)
        .map_err(|e| SamlError::XmlParse(format!("invalid UTF-8: {e}")))
}

/// Escapes text and attribute values.
pub(crate) fn escape(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_cover_elements_exactly() {
        let xml = r#"<?xml version="1.0"?><p:Root xmlns:p="urn:x" ID="_r"><p:Issuer>me</p:Issuer><Child ID="_c" a="1"/></p:Root>"#;
        let root = parse(xml).unwrap();
        assert_eq!(root.name, "Root");
        assert_eq!(&xml[root.start..root.end], &xml[xml.find("<p:Root").unwrap()..]);

        let child = root.find_by_id("_c").unwrap();
        assert_eq!(&xml[child.start..child.end], r#"<Child ID="_c" a="1"/>"#);
        assert_eq!(child.attr("a"), Some("1"));
        assert_eq!(root.required_child("Issuer").unwrap().trimmed_text(), "me");
        assert!(root.attr("p").is_none());
    }

    #[test]
    fn rejects_doctype_and_trailing_roots() {
        assert!(parse(r#"<!DOCTYPE x [<!ENTITY a "b">]><x/>"#).is_err());
        assert!(parse("<a/><b/>").is_err());
        assert!(parse("<a><b></a>").is_err());
    }

    #[test]
    fn detached_element_keeps_inherited_namespaces() {
        let xml = r#"<p:Root xmlns:p="urn:p" xmlns:q="urn:q" xmlns:unused="urn:u"><p:Inner ID="_i"><q:Leaf/><p:Drop/></p:Inner></p:Root>"#;
        let root = parse(xml).unwrap();
        let inner = root.find_by_id("_i").unwrap();
        let drop = inner.child("Drop").unwrap();

        let fragment = detach(xml, &root, inner, Some(drop)).unwrap();
        assert_eq!(
            fragment,
            r#"<p:Inner xmlns:p="urn:p" xmlns:q="urn:q" ID="_i"><q:Leaf/></p:Inner>"#
        );
        assert_eq!(detach(xml, &root, &root, None).unwrap(), xml);
    }

    #[test]
    fn text_is_unescaped() {
        let root = parse("<a>x &amp; y</a>").unwrap();
        assert_eq!(root.text, "x & y");
        assert_eq!(escape("x & <y>"), "x &amp; &lt;y&gt;");
    }
}
