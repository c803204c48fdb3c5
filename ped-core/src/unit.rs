//! Tree record adapter
//!
//! A [`TransUnit`] is a handle to one `trans-unit` element. Its source segment is
//! read as flattened text (or as raw markup), its target segment as an ordered
//! list of text fragments that are edited in place, so inline tags survive.

use regex::Regex;

use crate::error::{PedError, PedResult};
use crate::tree::{Document, Fragment, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransUnit {
    node: NodeId,
}

impl TransUnit {
    pub fn new(node: NodeId) -> Self {
        TransUnit { node }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Unit id attribute, for reporting
    pub fn id<'a>(&self, document: &'a Document) -> Option<&'a str> {
        document.attribute(self.node, "id")
    }

    /// Source segment: `seg-source` when present, otherwise `source`
    pub fn source(&self, document: &Document) -> PedResult<NodeId> {
        document
            .find_child(self.node, "seg-source")
            .or_else(|| document.find_child(self.node, "source"))
            .ok_or_else(|| self.mismatch(document, "has no source element"))
    }

    pub fn target(&self, document: &Document) -> PedResult<NodeId> {
        document
            .find_child(self.node, "target")
            .ok_or_else(|| self.mismatch(document, "has no target element"))
    }

    fn mismatch(&self, document: &Document, what: &str) -> PedError {
        PedError::StructuralMismatch(format!(
            "trans-unit '{}' {}",
            self.id(document).unwrap_or("?"),
            what
        ))
    }

    /// All descendant text of the source segment
    pub fn source_text(&self, document: &Document) -> PedResult<String> {
        Ok(document.text_content(self.source(document)?))
    }

    /// Serialized source segment, tags included
    pub fn source_markup(&self, document: &Document) -> PedResult<String> {
        Ok(document.serialize_node(self.source(document)?, false))
    }

    pub fn target_text(&self, document: &Document) -> PedResult<String> {
        Ok(document.text_content(self.target(document)?))
    }

    pub fn target_fragments(&self, document: &Document) -> PedResult<Vec<Fragment>> {
        Ok(document.fragments(self.target(document)?))
    }

    /// Regex-replace inside each target fragment independently
    ///
    /// A match can never span two fragments. Returns the number of fragments
    /// that changed.
    pub fn replace_in_fragments(
        &self,
        document: &mut Document,
        pattern: &Regex,
        replacement: &str,
    ) -> PedResult<usize> {
        let mut changed = 0;
        for fragment in self.target_fragments(document)? {
            let text = document.fragment_text(fragment);
            if !pattern.is_match(text) {
                continue;
            }
            let replaced = pattern.replace_all(text, replacement).into_owned();
            document.set_fragment_text(fragment, replaced);
            changed += 1;
        }
        Ok(changed)
    }

    /// Transform the first `n` code points of the target, across fragments
    ///
    /// Characters are consumed fragment by fragment until `n` is exhausted; the
    /// rest of the last consumed fragment is left as is. The transform sees the
    /// whole consumed prefix at once and its result is distributed back over the
    /// fragments by their original character counts. If the transform changes
    /// the character count, each fragment's share is transformed on its own.
    /// Returns the number of fragments that changed.
    pub fn prefix_transform<F>(&self, document: &mut Document, n: usize, transform: F) -> PedResult<usize>
    where
        F: Fn(&str) -> String,
    {
        if n == 0 {
            return Ok(0);
        }

        // (fragment, consumed prefix, untouched rest)
        let mut shares: Vec<(Fragment, String, String)> = Vec::new();
        let mut remaining = n;
        for fragment in self.target_fragments(document)? {
            if remaining == 0 {
                break;
            }
            let text = document.fragment_text(fragment);
            let split = text
                .char_indices()
                .nth(remaining)
                .map_or(text.len(), |(i, _)| i);
            let head = &text[..split];
            remaining -= head.chars().count();
            shares.push((fragment, head.to_string(), text[split..].to_string()));
        }

        let prefix: String = shares.iter().map(|(_, head, _)| head.as_str()).collect();
        let transformed = transform(&prefix);
        let heads: Vec<String> = if transformed.chars().count() == prefix.chars().count() {
            let mut chars = transformed.chars();
            shares
                .iter()
                .map(|(_, head, _)| chars.by_ref().take(head.chars().count()).collect())
                .collect()
        } else {
            shares.iter().map(|(_, head, _)| transform(head)).collect()
        };

        let mut changed = 0;
        for ((fragment, head, rest), new_head) in shares.into_iter().zip(heads) {
            if new_head != head {
                document.set_fragment_text(fragment, new_head + &rest);
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Try to splice `template` into the target at `anchor`
    ///
    /// Fragments are tried in document order and the first successful
    /// insertion ends the attempt.
    pub fn insert_structural_node(
        &self,
        document: &mut Document,
        template: &Document,
        anchor: &str,
    ) -> PedResult<bool> {
        for fragment in self.target_fragments(document)? {
            if document.insert_structural_node(fragment, template, anchor) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether the target already holds an element equivalent to `template`'s root
    pub fn target_contains_equivalent(
        &self,
        document: &Document,
        template: &Document,
    ) -> PedResult<bool> {
        let target = self.target(document)?;
        Ok(document
            .descendants(target)
            .into_iter()
            .any(|node| document.is_equivalent(node, template, template.root())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn unit_doc(target: &str) -> (Document, TransUnit) {
        let xml = format!(
            r#"<trans-unit id="7"><source>Open the <g id="1">File</g> menu</source><target>{}</target></trans-unit>"#,
            target
        );
        let doc = Document::parse_str(&xml).unwrap();
        let unit = TransUnit::new(doc.root());
        (doc, unit)
    }

    #[test]
    fn test_source_text_and_markup() {
        let (doc, unit) = unit_doc("x");
        assert_eq!(unit.source_text(&doc).unwrap(), "Open the File menu");
        assert_eq!(
            unit.source_markup(&doc).unwrap(),
            r#"<source>Open the <g id="1">File</g> menu</source>"#
        );
        assert_eq!(unit.id(&doc), Some("7"));
    }

    #[test]
    fn test_seg_source_preferred() {
        let doc = Document::parse_str(
            "<trans-unit><source>raw</source><seg-source><mrk>seg</mrk></seg-source><target/></trans-unit>",
        )
        .unwrap();
        let unit = TransUnit::new(doc.root());
        assert_eq!(unit.source_text(&doc).unwrap(), "seg");
    }

    #[test]
    fn test_missing_target_is_structural_mismatch() {
        let doc = Document::parse_str(r#"<trans-unit id="3"><source>a</source></trans-unit>"#).unwrap();
        let unit = TransUnit::new(doc.root());
        let err = unit.target_text(&doc).unwrap_err();
        assert!(matches!(err, PedError::StructuralMismatch(_)));
        assert!(err.to_string().contains("'3'"));
    }

    #[test]
    fn test_replace_does_not_cross_fragments() {
        let (mut doc, unit) = unit_doc(r#"Öffnen Sie das <g id="1">Datei</g>menü"#);
        let pattern = Regex::new("Dateimenü").unwrap();
        assert_eq!(unit.replace_in_fragments(&mut doc, &pattern, "X").unwrap(), 0);

        let pattern = Regex::new("menü").unwrap();
        assert_eq!(unit.replace_in_fragments(&mut doc, &pattern, "Menü").unwrap(), 1);
        assert_eq!(unit.target_text(&doc).unwrap(), "Öffnen Sie das DateiMenü");
        assert_eq!(doc.find_descendants(doc.root(), "g").len(), 2);
    }

    #[test]
    fn test_prefix_transform_spans_fragments() {
        let (mut doc, unit) = unit_doc(r#"ab<g id="1">cd</g>ef"#);
        let changed = unit
            .prefix_transform(&mut doc, 3, |s| s.to_uppercase())
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(unit.target_text(&doc).unwrap(), "ABCdef");
        let target = unit.target(&doc).unwrap();
        assert_eq!(doc.node(target).text.as_deref(), Some("AB"));
    }

    #[test]
    fn test_prefix_transform_sees_whole_prefix() {
        let (mut doc, unit) = unit_doc(r#"he<g id="1">llo</g> world"#);
        let title = |s: &str| {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        };
        unit.prefix_transform(&mut doc, 5, title).unwrap();
        assert_eq!(unit.target_text(&doc).unwrap(), "Hello world");
    }

    #[test]
    fn test_prefix_transform_zero_is_noop() {
        let (mut doc, unit) = unit_doc("abc");
        let before = doc.clone();
        assert_eq!(
            unit.prefix_transform(&mut doc, 0, |s| s.to_uppercase()).unwrap(),
            0
        );
        assert_eq!(doc, before);
    }

    #[test]
    fn test_prefix_longer_than_target() {
        let (mut doc, unit) = unit_doc("abc");
        unit.prefix_transform(&mut doc, 10, |s| s.to_uppercase()).unwrap();
        assert_eq!(unit.target_text(&doc).unwrap(), "ABC");
    }

    #[test]
    fn test_insert_and_detect_equivalent() {
        let (mut doc, unit) = unit_doc("Öffnen Sie das Datei Menü");
        let template = Document::parse_str(r#"<g id="1"/>"#).unwrap();
        assert!(!unit.target_contains_equivalent(&doc, &template).unwrap());
        assert!(unit.insert_structural_node(&mut doc, &template, "Datei").unwrap());
        assert!(unit.target_contains_equivalent(&doc, &template).unwrap());
        let target = unit.target(&doc).unwrap();
        assert_eq!(
            doc.serialize_node(target, false),
            r#"<target>Öffnen Sie das <g id="1">Datei</g> Menü</target>"#
        );
    }

    proptest! {
        #[test]
        fn prop_unmatched_replace_keeps_concatenation(
            head in "[a-z ]{0,8}",
            inner in "[a-z ]{0,8}",
            tail in "[a-z ]{0,8}",
        ) {
            let (mut doc, unit) = unit_doc(&format!(r#"{}<g id="1">{}</g>{}"#, head, inner, tail));
            let before = unit.target_text(&doc).unwrap();
            let pattern = Regex::new("[0-9]+").unwrap();
            unit.replace_in_fragments(&mut doc, &pattern, "#").unwrap();
            prop_assert_eq!(unit.target_text(&doc).unwrap(), before);
        }
    }
}
