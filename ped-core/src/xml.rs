//! Markup reading and writing for [`Document`] using quick-xml
//!
//! Element and attribute names are kept as written (prefix included) and no
//! namespace resolution takes place, so a document writes back with the same
//! names and declarations it was read with.

use std::borrow::Cow;

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{PedError, PedResult};
use crate::tree::{Document, Node, NodeId, NodeKind};

fn xml_error(err: impl std::fmt::Display) -> PedError {
    PedError::Xml(err.to_string())
}

fn raw(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn element_kind(start: &BytesStart<'_>) -> PedResult<NodeKind> {
    let name = raw(start.name().as_ref());
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = raw(attr.key.as_ref());
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        attributes.push((key, value));
    }
    Ok(NodeKind::Element { name, attributes })
}

/// Incremental tree builder fed by reader events
struct Builder {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    prolog: String,
    stack: Vec<NodeId>,
    /// Most recently closed child of the open element; text goes to its tail
    last_closed: Option<NodeId>,
}

impl Builder {
    fn new() -> Self {
        Builder {
            nodes: Vec::new(),
            root: None,
            prolog: String::new(),
            stack: Vec::new(),
            last_closed: None,
        }
    }

    fn add_node(&mut self, kind: NodeKind) -> PedResult<NodeId> {
        let id = NodeId(self.nodes.len());
        let mut node = Node::new(kind);
        match self.stack.last() {
            Some(&parent) => {
                node.parent = Some(parent);
                self.nodes.push(node);
                self.nodes[parent.0].children.push(id);
            }
            None if self.root.is_none() => {
                self.nodes.push(node);
                self.root = Some(id);
            }
            None => {
                return Err(PedError::Xml(
                    "document has more than one root element".to_string(),
                ));
            }
        }
        Ok(id)
    }

    fn add_text(&mut self, text: &str) {
        if self.stack.is_empty() {
            // Whitespace around the root element
            if self.root.is_none() {
                self.prolog.push_str(text);
            }
            return;
        }
        let slot = match self.last_closed {
            Some(sibling) => &mut self.nodes[sibling.0].tail,
            None => {
                let parent = self.stack[self.stack.len() - 1];
                &mut self.nodes[parent.0].text
            }
        };
        slot.get_or_insert_with(String::new).push_str(text);
    }

    /// Comments and processing instructions become nodes inside the root and
    /// prolog text before it; anything after the root is dropped
    fn add_misc(&mut self, kind: NodeKind, content: String, markup: String) -> PedResult<()> {
        if self.stack.is_empty() {
            if self.root.is_none() {
                self.prolog.push_str(&markup);
            }
            return Ok(());
        }
        let id = self.add_node(kind)?;
        self.nodes[id.0].text = Some(content);
        self.last_closed = Some(id);
        Ok(())
    }

    fn finish(self) -> PedResult<Document> {
        if let Some(&open) = self.stack.last() {
            let name = match &self.nodes[open.0].kind {
                NodeKind::Element { name, .. } => name.clone(),
                _ => String::new(),
            };
            return Err(PedError::Xml(format!("element <{}> is not closed", name)));
        }
        let root = self
            .root
            .ok_or_else(|| PedError::Xml("no root element found".to_string()))?;
        Ok(Document {
            nodes: self.nodes,
            root,
            prolog: self.prolog,
        })
    }
}

impl Document {
    /// Parse a complete document, or a single element fragment
    pub fn parse_str(input: &str) -> PedResult<Document> {
        let mut reader = Reader::from_str(input);
        let mut builder = Builder::new();

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(start) => {
                    let id = builder.add_node(element_kind(&start)?)?;
                    builder.stack.push(id);
                    builder.last_closed = None;
                }
                Event::Empty(start) => {
                    let id = builder.add_node(element_kind(&start)?)?;
                    builder.last_closed = Some(id);
                }
                Event::End(_) => {
                    let id = builder
                        .stack
                        .pop()
                        .ok_or_else(|| PedError::Xml("unexpected end tag".to_string()))?;
                    builder.last_closed = Some(id);
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(xml_error)?;
                    builder.add_text(&text);
                }
                Event::CData(data) => {
                    builder.add_text(&raw(&data));
                }
                Event::Comment(comment) => {
                    let content = raw(&comment);
                    let markup = format!("<!--{}-->", content);
                    builder.add_misc(NodeKind::Comment, content, markup)?;
                }
                Event::PI(pi) => {
                    let content = raw(&pi);
                    let markup = format!("<?{}?>", content);
                    builder.add_misc(NodeKind::ProcessingInstruction, content, markup)?;
                }
                Event::Decl(decl) => {
                    builder.prolog.push_str(&format!("<?{}?>", raw(&decl)));
                }
                Event::DocType(doctype) => {
                    builder
                        .prolog
                        .push_str(&format!("<!DOCTYPE {}>", raw(&doctype)));
                }
                Event::Eof => break,
            }
        }

        builder.finish()
    }

    /// Serialize the whole document, prolog included
    pub fn to_xml_string(&self) -> String {
        let mut out = self.prolog.clone();
        self.write_node(self.root, false, &mut out);
        out
    }

    /// Serialize one node and its subtree
    pub fn serialize_node(&self, id: NodeId, with_tail: bool) -> String {
        let mut out = String::new();
        self.write_node(id, with_tail, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, with_tail: bool, out: &mut String) {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Element { name, attributes } => {
                out.push('<');
                out.push_str(name);
                for (key, value) in attributes {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape(value));
                    out.push('"');
                }
                if node.text.is_none() && node.children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    if let Some(text) = &node.text {
                        out.push_str(&partial_escape(text));
                    }
                    for &child in &node.children {
                        self.write_node(child, true, out);
                    }
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
            }
            NodeKind::Comment => {
                out.push_str("<!--");
                out.push_str(node.text.as_deref().unwrap_or(""));
                out.push_str("-->");
            }
            NodeKind::ProcessingInstruction => {
                out.push_str("<?");
                out.push_str(node.text.as_deref().unwrap_or(""));
                out.push_str("?>");
            }
        }
        if with_tail {
            if let Some(tail) = &node.tail {
                let escaped: Cow<'_, str> = partial_escape(tail);
                out.push_str(&escaped);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Slot;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<xliff version="1.2"><file><body><trans-unit id="1"><target>Click <g id="3">Save</g> &amp; exit<x id="4"/>.</target></trans-unit></body></file></xliff>"#;

    #[test]
    fn test_parse_text_and_tail() {
        let doc = Document::parse_str(SAMPLE).unwrap();
        let target = doc.find_descendants(doc.root(), "target")[0];
        assert_eq!(doc.text_content(target), "Click Save & exit.");

        let children = doc.children(target).to_vec();
        assert_eq!(children.len(), 2);
        assert_eq!(doc.node(target).text.as_deref(), Some("Click "));
        assert_eq!(doc.node(children[0]).text.as_deref(), Some("Save"));
        assert_eq!(doc.node(children[0]).tail.as_deref(), Some(" & exit"));
        assert_eq!(doc.node(children[1]).text, None);
        assert_eq!(doc.node(children[1]).tail.as_deref(), Some("."));
    }

    #[test]
    fn test_roundtrip_preserves_markup() {
        let doc = Document::parse_str(SAMPLE).unwrap();
        assert_eq!(doc.to_xml_string(), SAMPLE);
    }

    #[test]
    fn test_prolog_is_kept() {
        let doc = Document::parse_str(SAMPLE).unwrap();
        assert_eq!(doc.prolog(), "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    }

    #[test]
    fn test_serialize_node_with_and_without_tail() {
        let doc = Document::parse_str(SAMPLE).unwrap();
        let g = doc.find_descendants(doc.root(), "g")[0];
        assert_eq!(doc.serialize_node(g, false), r#"<g id="3">Save</g>"#);
        assert_eq!(doc.serialize_node(g, true), r#"<g id="3">Save</g> &amp; exit"#);
    }

    #[test]
    fn test_attribute_values_are_unescaped_and_escaped() {
        let doc = Document::parse_str(r#"<a title="&quot;x&quot; &lt; y"/>"#).unwrap();
        assert_eq!(doc.attribute(doc.root(), "title"), Some("\"x\" < y"));
        assert_eq!(
            doc.to_xml_string(),
            r#"<a title="&quot;x&quot; &lt; y"/>"#
        );
    }

    #[test]
    fn test_comments_keep_tails() {
        let doc = Document::parse_str("<t>a<!-- note -->b</t>").unwrap();
        let root = doc.root();
        assert_eq!(doc.text_content(root), "ab");
        let comment = doc.children(root)[0];
        assert_eq!(doc.node(comment).kind, NodeKind::Comment);
        assert_eq!(doc.fragments(root)[1].slot, Slot::Tail);
        assert_eq!(doc.to_xml_string(), "<t>a<!-- note -->b</t>");
    }

    #[test]
    fn test_cdata_folds_into_text() {
        let doc = Document::parse_str("<t><![CDATA[a < b]]></t>").unwrap();
        assert_eq!(doc.text_content(doc.root()), "a < b");
        assert_eq!(doc.to_xml_string(), "<t>a &lt; b</t>");
    }

    #[test]
    fn test_parse_fragment() {
        let doc = Document::parse_str(r#"<mrk mtype="term">Haus</mrk>"#).unwrap();
        assert_eq!(doc.name(doc.root()), Some("mrk"));
        assert_eq!(doc.first_attribute(doc.root()), Some(("mtype", "term")));
    }

    #[test]
    fn test_malformed_markup_fails() {
        assert!(matches!(
            Document::parse_str("<g id=\"1\">open"),
            Err(PedError::Xml(_))
        ));
        assert!(matches!(
            Document::parse_str("<a></b>"),
            Err(PedError::Xml(_))
        ));
        assert!(matches!(Document::parse_str("just text"), Err(PedError::Xml(_))));
        assert!(matches!(
            Document::parse_str("<a/><b/>"),
            Err(PedError::Xml(_))
        ));
    }
}
