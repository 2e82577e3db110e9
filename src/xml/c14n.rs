// src/xml/c14n.rs
//! XML canonicalization.
//!
//! Implements the canonical serializations the XML signature layer needs:
//! Canonical XML 1.0/1.1 (inclusive) and Exclusive XML Canonicalization,
//! for documents produced by this server's own element tree. The trees the
//! responders build use only unqualified attributes and namespace
//! declarations placed on the elements that introduce them, which keeps the
//! namespace-node rules tractable while remaining byte-compatible with what
//! a standard canonicalizer produces for the parsed serialization.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::xml::document::{XmlElement, XmlNode};

/// Canonical XML 1.0 algorithm URI.
pub const C14N_10: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
/// Canonical XML 1.1 algorithm URI.
pub const C14N_11: &str = "http://www.w3.org/2006/12/xml-c14n11";
/// Exclusive XML Canonicalization algorithm URI.
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
/// XML-DSig namespace.
pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
/// Enveloped-signature transform URI.
pub const ENVELOPED_SIGNATURE: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// The canonicalization algorithm URI is not one this server implements.
#[derive(Debug, Error)]
#[error("unsupported canonicalization algorithm: {0}")]
pub struct UnsupportedC14n(pub String);

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Inclusive,
    Exclusive,
}

fn mode_for(algorithm: &str) -> Result<Mode, UnsupportedC14n> {
    match algorithm {
        C14N_10 | C14N_11 => Ok(Mode::Inclusive),
        EXC_C14N => Ok(Mode::Exclusive),
        other => Err(UnsupportedC14n(other.to_string())),
    }
}

/// Canonicalizes a tree with Canonical XML 1.0. Infallible serialization
/// used for the HTTP entity body and as the default digest input.
pub fn canonicalize(element: &XmlElement) -> String {
    let mut out = String::new();
    write_element(
        element,
        &BTreeMap::new(),
        &BTreeMap::new(),
        Mode::Inclusive,
        false,
        &mut out,
    );
    out
}

/// Serializes a tree with the given canonicalization algorithm.
///
/// # Arguments
/// * `element` - apex of the (sub)tree; treated as a document subset root,
///   i.e. no inherited namespace context
/// * `algorithm` - canonicalization algorithm URI
/// * `exclude_signature` - apply the enveloped-signature transform: skip
///   `ds:Signature` children of the apex element
pub fn serialize(
    element: &XmlElement,
    algorithm: &str,
    exclude_signature: bool,
) -> Result<String, UnsupportedC14n> {
    let mode = mode_for(algorithm)?;
    let mut out = String::new();
    write_element(
        element,
        &BTreeMap::new(),
        &BTreeMap::new(),
        mode,
        exclude_signature,
        &mut out,
    );
    Ok(out)
}

/// Whether a child element is the enveloped `ds:Signature` of a response.
fn is_signature(el: &XmlElement) -> bool {
    el.local_name() == "Signature"
        && el.namespaces().iter().any(|(_, uri)| uri == DSIG_NS)
}

fn write_element(
    el: &XmlElement,
    scope: &BTreeMap<Option<String>, String>,
    rendered: &BTreeMap<Option<String>, String>,
    mode: Mode,
    skip_signature_children: bool,
    out: &mut String,
) {
    // Namespace declarations visible to this element and its descendants
    let mut new_scope = scope.clone();
    for (prefix, uri) in el.namespaces() {
        new_scope.insert(prefix.clone(), uri.clone());
    }

    // Decide which declarations to emit on this element
    let mut to_emit: BTreeMap<Option<String>, String> = BTreeMap::new();
    match mode {
        Mode::Inclusive => {
            // Emit every declaration that is new or changed relative to the
            // parent scope
            for (prefix, uri) in &new_scope {
                if scope.get(prefix) != Some(uri) {
                    to_emit.insert(prefix.clone(), uri.clone());
                }
            }
        }
        Mode::Exclusive => {
            // Emit only visibly utilized declarations not identically
            // rendered on an output ancestor. With unqualified attributes
            // the only utilized prefix is the element's own.
            let utilized = el.prefix().map(str::to_string);
            if let Some(uri) = new_scope.get(&utilized) {
                if rendered.get(&utilized) != Some(uri) {
                    to_emit.insert(utilized, uri.clone());
                }
            }
        }
    }

    let mut new_rendered = rendered.clone();
    for (prefix, uri) in &to_emit {
        new_rendered.insert(prefix.clone(), uri.clone());
    }

    let qname = el.qname();
    out.push('<');
    out.push_str(&qname);

    // Namespace declarations first (BTreeMap iterates default before
    // prefixed, prefixes in lexicographic order, as canonical XML requires)
    for (prefix, uri) in &to_emit {
        match prefix {
            None => {
                out.push_str(" xmlns=\"");
                out.push_str(&escape_attr(uri));
                out.push('"');
            }
            Some(p) => {
                out.push_str(" xmlns:");
                out.push_str(p);
                out.push_str("=\"");
                out.push_str(&escape_attr(uri));
                out.push('"');
            }
        }
    }

    // Attributes in lexicographic order (all attributes are unqualified)
    let mut attrs: Vec<&(String, String)> = el.attributes().iter().collect();
    attrs.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, value) in attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');

    for node in el.children() {
        match node {
            XmlNode::Text(t) => out.push_str(&escape_text(t)),
            XmlNode::Element(child) => {
                if skip_signature_children && is_signature(child) {
                    continue;
                }
                // The enveloped transform only removes the signature that is
                // a direct child of the apex element
                write_element(child, &new_scope, &new_rendered, mode, false, out);
            }
        }
    }

    out.push_str("</");
    out.push_str(&qname);
    out.push('>');
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::document::XmlElement;

    #[test]
    fn test_inclusive_renders_all_new_declarations_at_apex() {
        let root = XmlElement::new("Root")
            .declare_ns(None, "urn:default")
            .declare_ns(Some("b"), "urn:b")
            .child(XmlElement::prefixed("b", "Inner").text("x"));
        let xml = serialize(&root, C14N_10, false).unwrap();
        assert_eq!(
            xml,
            "<Root xmlns=\"urn:default\" xmlns:b=\"urn:b\"><b:Inner>x</b:Inner></Root>"
        );
    }

    #[test]
    fn test_exclusive_renders_only_utilized_declarations() {
        let root = XmlElement::new("Root")
            .declare_ns(None, "urn:default")
            .declare_ns(Some("b"), "urn:b")
            .child(XmlElement::prefixed("b", "Inner").text("x"));
        let xml = serialize(&root, EXC_C14N, false).unwrap();
        assert_eq!(
            xml,
            "<Root xmlns=\"urn:default\"><b:Inner xmlns:b=\"urn:b\">x</b:Inner></Root>"
        );
    }

    #[test]
    fn test_attributes_sorted_and_escaped() {
        let el = XmlElement::new("E")
            .attr("zeta", "a&b")
            .attr("alpha", "\"quoted\"")
            .text("1 < 2");
        let xml = serialize(&el, C14N_10, false).unwrap();
        assert_eq!(
            xml,
            "<E alpha=\"&quot;quoted&quot;\" zeta=\"a&amp;b\">1 &lt; 2</E>"
        );
    }

    #[test]
    fn test_enveloped_transform_skips_signature_child() {
        let root = XmlElement::new("Doc")
            .child(XmlElement::new("Payload").text("p"))
            .child(XmlElement::new("Signature").declare_ns(None, DSIG_NS));
        let with_sig = serialize(&root, C14N_10, false).unwrap();
        let without = serialize(&root, C14N_10, true).unwrap();
        assert!(with_sig.contains("Signature"));
        assert!(!without.contains("Signature"));
        assert!(without.contains("<Payload>p</Payload>"));
    }

    #[test]
    fn test_identical_redeclaration_not_repeated() {
        let root = XmlElement::new("Doc")
            .declare_ns(None, "urn:x")
            .child(XmlElement::new("Inner").declare_ns(None, "urn:x").text("v"));
        let xml = serialize(&root, C14N_10, false).unwrap();
        assert_eq!(xml, "<Doc xmlns=\"urn:x\"><Inner>v</Inner></Doc>");
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let el = XmlElement::new("E");
        assert!(serialize(&el, "urn:not-a-c14n", false).is_err());
    }
}
