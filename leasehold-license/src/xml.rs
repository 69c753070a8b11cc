//! XML helpers shared by signing and verification.

use roxmltree::{Node, NodeId, NodeType};

/// Escapes character data.
pub(crate) fn escape_text(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

/// Escapes an attribute value for a double-quoted attribute.
pub(crate) fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

/// Returns true if `name` is usable as an unprefixed attribute name.
pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Serializes `node` into the canonical digest form, leaving out the
/// subtree rooted at `skip`.
///
/// Elements are never self-closing, attributes are sorted by
/// (namespace, name), and a default namespace declaration is written only
/// where an element's namespace differs from its canonical parent.
/// Namespaced attributes use Clark notation. Comments and processing
/// instructions are dropped.
pub(crate) fn canonicalize(node: Node<'_, '_>, skip: Option<NodeId>) -> String {
    let mut out = String::new();
    write_canonical(node, skip, None, &mut out);
    out
}

fn write_canonical(
    node: Node<'_, '_>,
    skip: Option<NodeId>,
    parent_ns: Option<&str>,
    out: &mut String,
) {
    if Some(node.id()) == skip {
        return;
    }

    match node.node_type() {
        NodeType::Root => {
            for child in node.children() {
                write_canonical(child, skip, None, out);
            }
        }
        NodeType::Element => {
            let name = node.tag_name().name();
            let ns = node.tag_name().namespace();

            out.push('<');
            out.push_str(name);
            if ns != parent_ns {
                out.push_str(" xmlns=\"");
                escape_attr(ns.unwrap_or(""), out);
                out.push('"');
            }

            let mut attrs: Vec<(&str, &str, &str)> = node
                .attributes()
                .map(|a| (a.namespace().unwrap_or(""), a.name(), a.value()))
                .collect();
            attrs.sort_unstable();

            for (attr_ns, attr_name, value) in attrs {
                out.push(' ');
                if !attr_ns.is_empty() {
                    out.push('{');
                    out.push_str(attr_ns);
                    out.push('}');
                }
                out.push_str(attr_name);
                out.push_str("=\"");
                escape_attr(value, out);
                out.push('"');
            }
            out.push('>');

            for child in node.children() {
                write_canonical(child, skip, ns, out);
            }

            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        NodeType::Text => {
            if let Some(text) = node.text() {
                escape_text(text, out);
            }
        }
        NodeType::Comment | NodeType::PI => {}
    }
}

/// Returns the first child element of `node` with the given local name and
/// namespace.
pub(crate) fn child_element<'a, 'input>(
    node: Node<'a, 'input>,
    name: &str,
    namespace: Option<&str>,
) -> Option<Node<'a, 'input>> {
    node.children().find(|c| {
        c.is_element() && c.tag_name().name() == name && c.tag_name().namespace() == namespace
    })
}

/// Returns the concatenated text content of `node`'s direct text children.
pub(crate) fn text_content(node: Node<'_, '_>) -> Option<String> {
    let text: String = node
        .children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(xml: &str) -> String {
        let doc = roxmltree::Document::parse(xml).unwrap();
        canonicalize(doc.root_element(), None)
    }

    #[test]
    fn attributes_are_sorted_and_elements_expanded() {
        assert_eq!(
            canonical(r#"<a z="1" b="2"><c/></a>"#),
            r#"<a b="2" z="1"><c></c></a>"#
        );
    }

    #[test]
    fn quoting_style_does_not_matter() {
        assert_eq!(canonical("<a x='1'/>"), canonical(r#"<a x="1"></a>"#));
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(canonical("<a><!-- hi --><b>t</b></a>"), "<a><b>t</b></a>");
    }

    #[test]
    fn default_namespace_written_once() {
        assert_eq!(
            canonical(r#"<s xmlns="urn:x"><i>v</i></s>"#),
            r#"<s xmlns="urn:x"><i>v</i></s>"#
        );
    }

    #[test]
    fn nested_subtree_declares_its_namespace() {
        let doc = roxmltree::Document::parse(r#"<s xmlns="urn:x"><i a="1">v</i></s>"#).unwrap();
        let inner = doc.root_element().first_element_child().unwrap();
        assert_eq!(canonicalize(inner, None), r#"<i xmlns="urn:x" a="1">v</i>"#);
    }

    #[test]
    fn special_characters_escaped() {
        assert_eq!(
            canonical(r#"<a v="&quot;&lt;">x &amp; y &gt; z</a>"#),
            r#"<a v="&quot;&lt;">x &amp; y &gt; z</a>"#
        );
    }

    #[test]
    fn skip_removes_subtree() {
        let doc = roxmltree::Document::parse("<a>1<b>2</b>3</a>").unwrap();
        let b = doc.root_element().first_element_child().unwrap();
        assert_eq!(canonicalize(doc.root_element(), Some(b.id())), "<a>13</a>");
    }

    #[test]
    fn names() {
        assert!(is_valid_name("edition"));
        assert!(is_valid_name("max-seats"));
        assert!(!is_valid_name("1abc"));
        assert!(!is_valid_name("a b"));
        assert!(!is_valid_name(""));
    }
}
