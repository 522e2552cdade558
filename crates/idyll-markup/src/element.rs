//! Generic element tree for the wire markup.
//!
//! Built on `quick_xml`'s pull reader. Only elements, attributes, text and
//! CDATA reach the tree; the declaration, comments, processing instructions
//! and DOCTYPE are dropped. No namespaces (a `prefix:name` is just a name).

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use serde_json::json;

use crate::error::{ParseError, ParseErrorCode};

pub type Attributes = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Attributes,
    pub children: Vec<Node>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First direct child element called `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    /// Concatenated text and CDATA of all descendants, in document order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(t) | Node::CData(t) => out.push_str(t),
                Node::Element(child) => child.collect_text(out),
            }
        }
    }
}

/// Read `input` into its single root element.
///
/// Nesting deeper than `max_depth` (root = 1) fails with `DEPTH_EXCEEDED`.
pub fn read(input: &str, max_depth: usize) -> Result<Element, ParseError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(false);
    // Closing tags are matched against `open` below, with our own message.
    reader.config_mut().check_end_names = false;

    let mut open: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(input, reader.error_position() as usize, &e.to_string()))?;
        let at = reader.buffer_position() as usize;

        match event {
            Event::Start(start) | Event::Empty(start) if root.is_some() && open.is_empty() => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                return Err(malformed(
                    input,
                    at,
                    &format!("unexpected <{name}> after the root element"),
                ));
            }
            Event::Start(start) => {
                check_depth(open.len() + 1, max_depth)?;
                open.push(element(input, at, &start)?);
            }
            Event::Empty(start) => {
                check_depth(open.len() + 1, max_depth)?;
                let el = element(input, at, &start)?;
                attach(&mut open, &mut root, el);
            }
            Event::End(end) => {
                let closing = utf8(input, at, end.name().as_ref())?;
                let Some(el) = open.pop() else {
                    return Err(malformed(input, at, &format!("unexpected </{closing}>")));
                };
                if el.name != closing {
                    return Err(malformed(
                        input,
                        at,
                        &format!(
                            "mismatched closing tag: expected </{}>, found </{closing}>",
                            el.name
                        ),
                    ));
                }
                attach(&mut open, &mut root, el);
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| malformed(input, at, &e.to_string()))?;
                match open.last_mut() {
                    Some(parent) => push_text(parent, &text),
                    None if text.trim().is_empty() => {}
                    None => {
                        return Err(malformed(input, at, "text outside the root element"));
                    }
                }
            }
            Event::CData(data) => {
                let data = utf8(input, at, &data)?;
                match open.last_mut() {
                    Some(parent) => parent.children.push(Node::CData(data)),
                    None => {
                        return Err(malformed(input, at, "CDATA outside the root element"));
                    }
                }
            }
            Event::Eof => break,
            // Declaration, comments, processing instructions, DOCTYPE.
            _ => {}
        }
    }

    if let Some(el) = open.last() {
        return Err(malformed(
            input,
            input.len(),
            &format!("<{}> is never closed", el.name),
        ));
    }
    root.ok_or_else(|| {
        ParseError::new(
            ParseErrorCode::EmptyInput,
            "input contains no root element",
        )
    })
}

fn check_depth(depth: usize, max_depth: usize) -> Result<(), ParseError> {
    if depth > max_depth {
        return Err(ParseError::new(
            ParseErrorCode::DepthExceeded,
            format!("element nesting exceeds the limit of {max_depth}"),
        )
        .with_details(json!({ "max_depth": max_depth })));
    }
    Ok(())
}

fn element(input: &str, at: usize, start: &BytesStart<'_>) -> Result<Element, ParseError> {
    let name = utf8(input, at, start.name().as_ref())?;
    let mut attributes = Attributes::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(input, at, &format!("<{name}>: {e}")))?;
        let key = utf8(input, at, attr.key.as_ref())?;
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(input, at, &format!("<{name}> attribute '{key}': {e}")))?
            .into_owned();
        if attributes.insert(key.clone(), value).is_some() {
            return Err(malformed(
                input,
                at,
                &format!("duplicate attribute '{key}' on <{name}>"),
            ));
        }
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

/// Hand a finished element to its parent, or make it the root.
fn attach(open: &mut [Element], root: &mut Option<Element>, el: Element) {
    match open.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None => *root = Some(el),
    }
}

/// A comment between two runs leaves them adjacent; merge them.
fn push_text(parent: &mut Element, text: &str) {
    match parent.children.last_mut() {
        Some(Node::Text(prev)) => prev.push_str(text),
        _ => parent.children.push(Node::Text(text.to_string())),
    }
}

fn utf8(input: &str, at: usize, bytes: &[u8]) -> Result<String, ParseError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| malformed(input, at, &e.to_string()))
}

fn malformed(input: &str, offset: usize, message: &str) -> ParseError {
    let consumed = &input.as_bytes()[..offset.min(input.len())];
    let line = consumed.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = consumed
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    let column = String::from_utf8_lossy(&consumed[line_start..]).chars().count() + 1;
    ParseError::new(
        ParseErrorCode::MalformedMarkup,
        format!("{message} (line {line}, column {column})"),
    )
    .with_details(json!({ "line": line, "column": column }))
}

/// Escape text content.
pub fn escape_text(s: &str) -> String {
    partial_escape(s).into_owned()
}

/// Escape an attribute value (either quote style).
pub fn escape_attr(s: &str) -> String {
    escape(s).into_owned()
}

/// Wrap `s` in CDATA, splitting any `]]>` it contains.
pub fn cdata(s: &str) -> String {
    format!("<![CDATA[{}]]>", s.replace("]]>", "]]]]><![CDATA[>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_ok(input: &str) -> Element {
        read(input, 16).unwrap()
    }

    #[test]
    fn reads_attributes_text_and_children() {
        let root = read_ok(
            r#"<?xml version="1.0"?>
<!-- leading comment -->
<document id='d1'><p id="a">Hi &amp; <b>bye</b></p><separator/></document>"#,
        );
        assert_eq!(root.name, "document");
        assert_eq!(root.attr("id"), Some("d1"));

        let p = root.child("p").unwrap();
        assert_eq!(p.children[0], Node::Text("Hi & ".into()));
        assert_eq!(p.child("b").map(Element::text).as_deref(), Some("bye"));
        assert!(root.child("separator").is_some());
    }

    #[test]
    fn text_includes_nested_elements() {
        let root = read_ok("<code>fn <b>main</b>() <i><![CDATA[{}]]></i></code>");
        assert_eq!(root.text(), "fn main() {}");
    }

    #[test]
    fn cdata_is_kept_verbatim() {
        let root = read_ok(r#"<params><![CDATA[{"a": "<b> & c"}]]></params>"#);
        assert_eq!(root.text(), r#"{"a": "<b> & c"}"#);
    }

    #[test]
    fn cdata_splitting_round_trips() {
        let wrapped = format!("<x>{}</x>", cdata("a]]>b"));
        assert_eq!(read_ok(&wrapped).text(), "a]]>b");
    }

    #[test]
    fn numeric_entities_decode() {
        let root = read_ok("<p>&#65;&#x42;&#10;</p>");
        assert_eq!(root.text(), "AB\n");
    }

    #[test]
    fn comments_do_not_split_text() {
        let root = read_ok("<p>a<!-- x -->b</p>");
        assert_eq!(root.children, vec![Node::Text("ab".into())]);
    }

    #[test]
    fn mismatched_close_is_malformed() {
        let err = read("<p><b>x</p></b>", 16).unwrap_err();
        assert_eq!(err.code, ParseErrorCode::MalformedMarkup);
        assert!(err.message.contains("expected </b>"), "{}", err.message);
    }

    #[test]
    fn errors_carry_line_and_column() {
        let err = read("<document>\n  <p>\n</document>", 16).unwrap_err();
        let details = err.details.unwrap();
        assert_eq!(details["line"], 3);
    }

    #[test]
    fn second_root_is_rejected() {
        let err = read("<a/><b/>", 16).unwrap_err();
        assert_eq!(err.code, ParseErrorCode::MalformedMarkup);
    }

    #[test]
    fn unknown_entity_is_rejected() {
        let err = read("<p>&nbsp;</p>", 16).unwrap_err();
        assert_eq!(err.code, ParseErrorCode::MalformedMarkup);
    }

    #[test]
    fn duplicate_attributes_are_rejected() {
        assert!(read(r#"<p id="a" id="b"/>"#, 16).is_err());
    }

    #[test]
    fn depth_limit_applies() {
        let deep = "<a><a><a><a/></a></a></a>";
        assert!(read(deep, 4).is_ok());
        let err = read(deep, 3).unwrap_err();
        assert_eq!(err.code, ParseErrorCode::DepthExceeded);
    }

    #[test]
    fn whitespace_only_input_is_empty() {
        let err = read("  \n <!-- nothing --> ", 16).unwrap_err();
        assert_eq!(err.code, ParseErrorCode::EmptyInput);
    }

    #[test]
    fn escaping_covers_markup_characters() {
        assert_eq!(escape_text("a < b & c > d"), "a &lt; b &amp; c &gt; d");
        assert_eq!(escape_attr(r#"say "hi" 'x'"#), "say &quot;hi&quot; &apos;x&apos;");
    }
}
