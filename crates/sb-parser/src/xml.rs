use std::collections::BTreeMap;
use std::ops::Range;

use roxmltree::{Document, Node, NodeType};
use sb_core::{SourceLocation, SourceSpan, StepBlocksError};

/// Owned copy of a parsed XML source, detached from the input text.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root: XmlElementNode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElementNode),
    /// Non-empty character data, entities already decoded.
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlElementNode {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<XmlNode>,
    pub location: SourceSpan,
}

impl XmlElementNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElementNode> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// Collects matching descendants in document order; names compare case-insensitively.
    pub fn descendants_named<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElementNode>) {
        for child in self.child_elements() {
            if child.name.eq_ignore_ascii_case(name) {
                out.push(child);
            }
            child.descendants_named(name, out);
        }
    }

    pub fn text_content(&self) -> String {
        self.children
            .iter()
            .map(|child| match child {
                XmlNode::Text(text) => text.clone(),
                XmlNode::Element(element) => element.text_content(),
            })
            .collect()
    }
}

pub fn parse_xml_document(source: &str) -> Result<XmlDocument, StepBlocksError> {
    let document = Document::parse(source).map_err(|error| {
        StepBlocksError::syntax("XML_PARSE_ERROR", format!("Malformed XML: {}", error))
    })?;

    let root = document
        .root()
        .children()
        .find(Node::is_element)
        .ok_or_else(|| StepBlocksError::syntax("XML_PARSE_ERROR", "No root element found."))?;

    Ok(XmlDocument {
        root: convert_element(&document, root),
    })
}

fn convert_element(document: &Document<'_>, node: Node<'_, '_>) -> XmlElementNode {
    let attributes = node
        .attributes()
        .map(|attribute| (attribute.name().to_string(), attribute.value().to_string()))
        .collect();

    let children = node
        .children()
        .filter_map(|child| match child.node_type() {
            NodeType::Element => Some(XmlNode::Element(convert_element(document, child))),
            NodeType::Text => child
                .text()
                .filter(|text| !text.is_empty())
                .map(|text| XmlNode::Text(text.to_string())),
            _ => None,
        })
        .collect();

    XmlElementNode {
        name: node.tag_name().name().to_string(),
        attributes,
        children,
        location: span_of(document, node.range()),
    }
}

fn span_of(document: &Document<'_>, range: Range<usize>) -> SourceSpan {
    let position = |offset: usize| {
        let pos = document.text_pos_at(offset);
        SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }
    };
    SourceSpan {
        start: position(range.start),
        end: position(range.end),
    }
}

#[cfg(test)]
mod xml_tests {
    use super::*;

    #[test]
    fn parse_xml_document_builds_tree_with_attributes_and_text() {
        let source = r#"<unit name="main"><command name="echo" target="hi"/><note>Hello</note></unit>"#;
        let document = parse_xml_document(source).expect("xml should parse");
        assert_eq!(document.root.name, "unit");
        assert_eq!(document.root.attribute("name"), Some("main"));
        assert_eq!(document.root.child_elements().count(), 2);

        let command = document
            .root
            .child_elements()
            .next()
            .expect("command element");
        assert_eq!(command.attribute("target"), Some("hi"));
        assert!(command.location.start.line >= 1);

        let note = document.root.child_elements().nth(1).expect("note element");
        assert_eq!(note.text_content(), "Hello");
    }

    #[test]
    fn descendants_named_walks_nested_elements() {
        let source = r#"<html><body><table><tbody><tr><td>a</td></tr><tr><td>b</td></tr></tbody></table></body></html>"#;
        let document = parse_xml_document(source).expect("xml should parse");
        let mut rows = Vec::new();
        document.root.descendants_named("tr", &mut rows);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].text_content(), "b");
    }

    #[test]
    fn parse_xml_document_returns_parse_error_for_invalid_xml() {
        let error = parse_xml_document("<unit>").expect_err("invalid xml should fail");
        assert_eq!(error.code, "XML_PARSE_ERROR");
    }

    #[test]
    fn parse_xml_document_returns_parse_error_when_root_element_is_missing() {
        let error = parse_xml_document("<?xml version=\"1.0\"?><!---->")
            .expect_err("missing root element should fail");
        assert_eq!(error.code, "XML_PARSE_ERROR");
    }
}
