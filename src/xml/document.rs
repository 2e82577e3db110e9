// src/xml/document.rs
//! In-memory XML document model.
//!
//! Response documents are assembled as an element tree first and serialized
//! afterwards, so that assembly can fail closed before a single byte of the
//! response body is produced. The tree keeps namespace declarations,
//! attributes and children in insertion order; serialization is delegated to
//! the canonicalization module so the bytes on the wire are the bytes that
//! were digested during signing.

use crate::xml::c14n;

/// A node in the element tree: a child element or character data.
#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An XML element with optional prefix, namespace declarations, attributes
/// and children.
#[derive(Debug, Clone)]
pub struct XmlElement {
    prefix: Option<String>,
    local: String,
    /// Namespace declarations on this element: (prefix, URI); `None` is the
    /// default namespace
    namespaces: Vec<(Option<String>, String)>,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    /// Creates an unprefixed element.
    pub fn new(local: &str) -> Self {
        XmlElement {
            prefix: None,
            local: local.to_string(),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Creates an element with a namespace prefix.
    pub fn prefixed(prefix: &str, local: &str) -> Self {
        XmlElement {
            prefix: Some(prefix.to_string()),
            local: local.to_string(),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Declares a namespace on this element. `prefix = None` declares the
    /// default namespace.
    pub fn declare_ns(mut self, prefix: Option<&str>, uri: &str) -> Self {
        self.namespaces
            .push((prefix.map(str::to_string), uri.to_string()));
        self
    }

    /// Adds an (unqualified) attribute.
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    /// Appends a text child.
    pub fn text(mut self, content: &str) -> Self {
        self.children.push(XmlNode::Text(content.to_string()));
        self
    }

    /// Appends an element child.
    pub fn child(mut self, element: XmlElement) -> Self {
        self.children.push(XmlNode::Element(element));
        self
    }

    /// Appends an element child in place.
    pub fn push_child(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn local_name(&self) -> &str {
        &self.local
    }

    /// The serialized tag name, `prefix:local` or `local`.
    pub fn qname(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }

    pub fn namespaces(&self) -> &[(Option<String>, String)] {
        &self.namespaces
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Gets the value of an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// Iterates the element children, skipping text nodes.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// Finds the first child element with the given local name.
    pub fn find_child(&self, local: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.local == local)
    }

    /// Concatenated character data of the direct text children.
    pub fn text_content(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }
}

/// An XML document, i.e. a root element ready for serialization.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    pub root: XmlElement,
}

impl XmlDocument {
    pub fn new(root: XmlElement) -> Self {
        XmlDocument { root }
    }

    /// Serializes the document for the HTTP entity body.
    ///
    /// The body is the canonical serialization of the tree, so a signature
    /// computed over the tree stays verifiable on the serialized output.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(&c14n::canonicalize(&self.root));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_navigation() {
        let root = XmlElement::new("ServiceGroup")
            .declare_ns(None, "urn:test")
            .child(XmlElement::new("ParticipantID").attr("schemeID", "s").text("p1"))
            .child(XmlElement::new("ServiceReference"));
        assert_eq!(root.child_elements().count(), 2);
        let pid = root.find_child("ParticipantID").unwrap();
        assert_eq!(pid.text_content(), "p1");
        assert_eq!(pid.attribute("schemeID"), Some("s"));
    }

    #[test]
    fn test_document_serialization_has_declaration() {
        let doc = XmlDocument::new(XmlElement::new("Root").text("x"));
        let xml = doc.to_xml_string();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<Root>x</Root>"));
    }
}
