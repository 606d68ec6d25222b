// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Element and attribute access over the IDF document tree

use idf_nexus_model::{IdfError, Result, SourcePos};
use roxmltree::{Document, Node};

/// Namespace of the instrument definition schema
pub const IDF_NAMESPACE: &str = "http://www.mantidproject.org/IDF/1.0";

/// Parse the text and check the root is an IDF `<instrument>`
pub fn parse_document(content: &str) -> Result<Document<'_>> {
    let document = Document::parse(content).map_err(|e| IdfError::format(e.to_string()))?;

    let root = document.root_element();
    if root.tag_name().name() != "instrument" {
        return Err(IdfError::format(format!(
            "root element is <{}>, expected <instrument>",
            root.tag_name().name()
        )));
    }
    if root.tag_name().namespace() != Some(IDF_NAMESPACE) {
        return Err(IdfError::format(format!(
            "<instrument> is not in the {} namespace",
            IDF_NAMESPACE
        )));
    }
    Ok(document)
}

/// Line and column of an element
pub fn pos(node: Node<'_, '_>) -> SourcePos {
    let text_pos = node.document().text_pos_at(node.range().start);
    SourcePos::new(text_pos.row, text_pos.col)
}

pub fn is_element(node: &Node<'_, '_>, tag: &str) -> bool {
    node.is_element() && node.tag_name().name() == tag
}

/// Element children with the given local name, in document order
pub fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |child| is_element(child, tag))
}

pub fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| is_element(child, tag))
}

pub(crate) fn invalid(node: Node<'_, '_>, attribute: &str, message: String) -> IdfError {
    IdfError::InvalidAttribute {
        element: node.tag_name().name().to_string(),
        attribute: attribute.to_string(),
        message,
        pos: pos(node),
    }
}

/// Required string attribute
pub fn required_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name)
        .ok_or_else(|| invalid(node, name, "attribute is required".to_string()))
}

/// Optional float attribute
pub fn attr_f64(node: Node<'_, '_>, name: &str) -> Result<Option<f64>> {
    node.attribute(name)
        .map(|raw| {
            lexical_core::parse::<f64>(raw.trim().as_bytes())
                .map_err(|_| invalid(node, name, format!("'{}' is not a number", raw)))
        })
        .transpose()
}

/// Optional integer attribute
pub fn attr_i64(node: Node<'_, '_>, name: &str) -> Result<Option<i64>> {
    node.attribute(name)
        .map(|raw| {
            lexical_core::parse::<i64>(raw.trim().as_bytes())
                .map_err(|_| invalid(node, name, format!("'{}' is not an integer", raw)))
        })
        .transpose()
}

pub fn required_f64(node: Node<'_, '_>, name: &str) -> Result<f64> {
    attr_f64(node, name)?.ok_or_else(|| invalid(node, name, "attribute is required".to_string()))
}

pub fn required_i64(node: Node<'_, '_>, name: &str) -> Result<i64> {
    attr_i64(node, name)?.ok_or_else(|| invalid(node, name, "attribute is required".to_string()))
}

/// Required non-negative count attribute
pub fn required_count(node: Node<'_, '_>, name: &str) -> Result<usize> {
    let value = required_i64(node, name)?;
    usize::try_from(value).map_err(|_| invalid(node, name, format!("{} is negative", value)))
}

/// `is` attribute compared case-insensitively
pub fn is_kind(node: Node<'_, '_>, kind: &str) -> bool {
    node.attribute("is")
        .map_or(false, |is| is.eq_ignore_ascii_case(kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DOC: &str = r#"<?xml version="1.0"?>
<instrument xmlns="http://www.mantidproject.org/IDF/1.0" name="TEST">
  <type name="pixel" is="detector" />
  <type name="bank" xpixels="4" xstep="0.5e-2" bad="x" />
</instrument>"#;

    #[test]
    fn test_parse_document_checks_root() {
        assert!(parse_document(TEST_DOC).is_ok());
        assert!(parse_document("<annotation/>").is_err());
        assert!(parse_document("<instrument name=\"x\"/>").is_err());
        assert!(parse_document("<instrument").is_err());
    }

    #[test]
    fn test_attribute_parsing() {
        let doc = parse_document(TEST_DOC).unwrap();
        let root = doc.root_element();
        let types: Vec<_> = children(root, "type").collect();
        assert_eq!(types.len(), 2);
        assert!(is_kind(types[0], "Detector"));

        let bank = types[1];
        assert_eq!(required_count(bank, "xpixels").unwrap(), 4);
        assert_eq!(attr_f64(bank, "xstep").unwrap(), Some(0.005));
        assert_eq!(attr_f64(bank, "ystep").unwrap(), None);
        assert!(matches!(
            attr_f64(bank, "bad"),
            Err(IdfError::InvalidAttribute { .. })
        ));
        assert_eq!(pos(bank).line, 4);
    }
}
