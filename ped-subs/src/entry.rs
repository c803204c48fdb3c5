//! Rule entries
//!
//! An [`Entry`] is one search/replace/transform rule together with its
//! bookkeeping (who wrote it, for which language pair, and its last measured
//! effect on PED). Each of the four rule kinds works on both dataset
//! representations: tabular records and XLIFF translation units.

use icu_locale::Locale;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ped_core::{
    Column, Document, PedError, PedResult, RecordStore, TransUnit, compile_pattern,
};

use crate::case::CaseMode;

/// Discriminator of the persisted form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    #[serde(rename = "SearchMT", alias = "SearchMTEntry")]
    SearchMt,
    #[serde(alias = "SearchSourceEntry")]
    SearchSource,
    #[serde(alias = "ToggleCaseEntry")]
    ToggleCase,
    #[serde(alias = "ApplyTagEntry")]
    ApplyTag,
}

#[derive(Debug, Clone)]
pub enum Rule {
    /// Replace `search` with `replacement` in every MT string
    SearchMt { search: Regex, replacement: String },
    /// Same as `SearchMt`, restricted to segments whose source matches `source_filter`
    SearchSource {
        search: Regex,
        replacement: String,
        source_filter: Regex,
    },
    /// Give the first `length` MT characters the case the source prefix already has
    ToggleCase { length: usize, mode: CaseMode },
    /// Copy inline tags matched in the source markup into the target
    ApplyTag {
        source_filter: Regex,
        replacement: Option<String>,
    },
}

/// Descriptive fields of an entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryInfo {
    pub created_by: String,
    pub description: String,
    pub source_language: String,
    pub target_language: String,
}

/// Dataset a rule can be applied to
pub enum Dataset<'a> {
    Table(&'a mut RecordStore),
    Tree {
        document: &'a mut Document,
        units: &'a [TransUnit],
    },
}

/// A translation unit a rule could not be applied to
#[derive(Debug)]
pub struct UnitFailure {
    /// Position of the unit in the unit list
    pub unit: usize,
    pub unit_id: Option<String>,
    pub error: PedError,
}

#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Rows invalidated (tabular) or units changed (tree)
    pub changed: usize,
    pub failures: Vec<UnitFailure>,
}

#[derive(Debug, Clone)]
pub struct Entry {
    id: usize,
    info: EntryInfo,
    effect: Option<f64>,
    rule: Rule,
}

/// Validate a language code and bring it into canonical BCP-47 form
///
/// An empty code means the entry is not tied to a language.
pub fn normalize_language(code: &str) -> PedResult<String> {
    let code = code.trim();
    if code.is_empty() {
        return Ok(String::new());
    }
    let locale: Locale = code
        .parse()
        .map_err(|e| PedError::Config(format!("invalid language code '{}': {}", code, e)))?;
    Ok(locale.to_string())
}

impl Entry {
    fn from_rule(rule: Rule) -> Self {
        Entry {
            id: 0,
            info: EntryInfo::default(),
            effect: None,
            rule,
        }
    }

    pub fn search_mt(search: &str, replacement: &str) -> PedResult<Self> {
        Ok(Self::from_rule(Rule::SearchMt {
            search: compile_pattern(search)?,
            replacement: replacement.to_string(),
        }))
    }

    pub fn search_source(search: &str, replacement: &str, source_filter: &str) -> PedResult<Self> {
        if source_filter.is_empty() {
            return Err(PedError::Config(
                "SearchSource entries need a non-empty source filter".to_string(),
            ));
        }
        Ok(Self::from_rule(Rule::SearchSource {
            search: compile_pattern(search)?,
            replacement: replacement.to_string(),
            source_filter: compile_pattern(source_filter)?,
        }))
    }

    pub fn toggle_case(length: usize, mode: CaseMode) -> Self {
        Self::from_rule(Rule::ToggleCase { length, mode })
    }

    pub fn apply_tag(source_filter: &str, replacement: Option<&str>) -> PedResult<Self> {
        if source_filter.is_empty() {
            return Err(PedError::Config(
                "ApplyTag entries need a non-empty source filter".to_string(),
            ));
        }
        Ok(Self::from_rule(Rule::ApplyTag {
            source_filter: compile_pattern(source_filter)?,
            replacement: replacement.map(str::to_string),
        }))
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub fn with_effect(mut self, effect: Option<f64>) -> Self {
        self.effect = effect;
        self
    }

    /// Attach descriptive fields
    ///
    /// Language codes are kept as written so a rule set saves back unchanged.
    /// Codes that are not valid BCP-47 are logged, not rejected.
    pub fn with_info(mut self, info: EntryInfo) -> Self {
        for code in [&info.source_language, &info.target_language] {
            if let Err(error) = normalize_language(code) {
                warn!(%error, "Keeping unrecognized language code");
            }
        }
        self.info = info;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Canonical BCP-47 form of the source language, empty when unspecified
    pub fn source_locale(&self) -> PedResult<String> {
        normalize_language(&self.info.source_language)
    }

    /// Canonical BCP-47 form of the target language, empty when unspecified
    pub fn target_locale(&self) -> PedResult<String> {
        normalize_language(&self.info.target_language)
    }

    pub fn effect(&self) -> Option<f64> {
        self.effect
    }

    pub fn info(&self) -> &EntryInfo {
        &self.info
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn kind(&self) -> EntryKind {
        match self.rule {
            Rule::SearchMt { .. } => EntryKind::SearchMt,
            Rule::SearchSource { .. } => EntryKind::SearchSource,
            Rule::ToggleCase { .. } => EntryKind::ToggleCase,
            Rule::ApplyTag { .. } => EntryKind::ApplyTag,
        }
    }

    /// Short label for logs: the description, or the kind when there is none
    pub fn label(&self) -> String {
        if self.info.description.is_empty() {
            format!("{:?}", self.kind())
        } else {
            self.info.description.clone()
        }
    }

    pub(crate) fn set_id(&mut self, id: usize) {
        self.id = id;
    }

    pub(crate) fn set_effect(&mut self, effect: f64) {
        self.effect = Some(effect);
    }

    /// Apply to either dataset kind
    pub fn apply(&self, dataset: &mut Dataset<'_>) -> PedResult<ApplyOutcome> {
        match dataset {
            Dataset::Table(store) => Ok(ApplyOutcome {
                changed: self.apply_to_table(store)?,
                failures: Vec::new(),
            }),
            Dataset::Tree { document, units } => Ok(self.apply_to_units(document, units)),
        }
    }

    /// Apply to tabular records; returns the number of rows invalidated
    pub fn apply_to_table(&self, store: &mut RecordStore) -> PedResult<usize> {
        let invalidated = match &self.rule {
            Rule::SearchMt {
                search,
                replacement,
            } => store
                .replace_in_column(Column::Mt, search, replacement, None)
                .len(),
            Rule::SearchSource {
                search,
                replacement,
                source_filter,
            } => {
                let eligible = store.filter_by_regex(Column::Source, source_filter);
                store
                    .replace_in_column(Column::Mt, search, replacement, Some(&eligible))
                    .len()
            }
            Rule::ToggleCase { length, mode } => {
                let eligible: Vec<usize> = store
                    .slice_prefix(Column::Source, *length, None)
                    .iter()
                    .enumerate()
                    .filter(|(_, prefix)| mode.matches(prefix))
                    .map(|(row, _)| row)
                    .collect();
                let values: Vec<String> = store
                    .slice_prefix(Column::Mt, *length, Some(&eligible))
                    .iter()
                    .zip(&eligible)
                    .map(|(prefix, &row)| {
                        let mt = store.records()[row].mt.as_str();
                        format!("{}{}", mode.apply(prefix), &mt[prefix.len()..])
                    })
                    .collect();
                store.write_back(Column::Mt, &eligible, values)?;
                eligible.len()
            }
            // Tabular rows carry no tag structure
            Rule::ApplyTag { .. } => 0,
        };
        debug!(entry = %self.label(), invalidated, "Applied entry to records");
        Ok(invalidated)
    }

    /// Apply to translation units of one document
    ///
    /// A unit that cannot be processed is reported and skipped; the other
    /// units are still processed.
    pub fn apply_to_units(&self, document: &mut Document, units: &[TransUnit]) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        for (index, unit) in units.iter().enumerate() {
            match self.apply_to_unit(document, unit) {
                Ok(true) => outcome.changed += 1,
                Ok(false) => {}
                Err(error) => {
                    let unit_id = unit.id(document).map(str::to_string);
                    warn!(entry = %self.label(), unit = ?unit_id, %error, "Skipping translation unit");
                    outcome.failures.push(UnitFailure {
                        unit: index,
                        unit_id,
                        error,
                    });
                }
            }
        }
        debug!(entry = %self.label(), changed = outcome.changed, "Applied entry to units");
        outcome
    }

    /// Apply to a single unit; returns whether its target changed
    pub fn apply_to_unit(&self, document: &mut Document, unit: &TransUnit) -> PedResult<bool> {
        match &self.rule {
            Rule::SearchMt {
                search,
                replacement,
            } => Ok(unit.replace_in_fragments(document, search, replacement)? > 0),
            Rule::SearchSource {
                search,
                replacement,
                source_filter,
            } => {
                if !source_filter.is_match(&unit.source_text(document)?) {
                    return Ok(false);
                }
                Ok(unit.replace_in_fragments(document, search, replacement)? > 0)
            }
            Rule::ToggleCase { length, mode } => {
                let prefix: String = unit.source_text(document)?.chars().take(*length).collect();
                if !mode.matches(&prefix) {
                    return Ok(false);
                }
                Ok(unit.prefix_transform(document, *length, |s| mode.apply(s))? > 0)
            }
            Rule::ApplyTag {
                source_filter,
                replacement,
            } => apply_tag_to_unit(document, unit, source_filter, replacement.as_deref()),
        }
    }
}

/// Copy the first not-yet-present tag matched in the source markup into the target
fn apply_tag_to_unit(
    document: &mut Document,
    unit: &TransUnit,
    source_filter: &Regex,
    replacement: Option<&str>,
) -> PedResult<bool> {
    let markup = unit.source_markup(document)?;
    for captures in source_filter.captures_iter(&markup) {
        let Some(captured) = captures.get(1).or_else(|| captures.get(0)) else {
            continue;
        };
        let captured = captured.as_str();
        let mut candidate = Document::parse_str(captured).map_err(|e| {
            PedError::StructuralMismatch(format!(
                "captured markup '{}' is not a single element: {}",
                captured, e
            ))
        })?;
        if let Some(text) = replacement {
            let root = candidate.root();
            candidate.node_mut(root).text = Some(text.to_string());
        }

        if unit.target_contains_equivalent(document, &candidate)? {
            continue;
        }
        let anchor = candidate.text_content(candidate.root());
        if unit.insert_structural_node(document, &candidate, &anchor)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ped_core::SegmentRecord;

    fn unit_doc(source: &str, target: &str) -> (Document, Vec<TransUnit>) {
        let xml = format!(
            r#"<trans-unit id="1"><source>{}</source><target>{}</target></trans-unit>"#,
            source, target
        );
        let doc = Document::parse_str(&xml).unwrap();
        let units = vec![TransUnit::new(doc.root())];
        (doc, units)
    }

    fn target_of(doc: &Document, units: &[TransUnit]) -> String {
        let target = units[0].target(doc).unwrap();
        doc.serialize_node(target, false)
    }

    #[test]
    fn test_invalid_pattern_fails_at_construction() {
        assert!(matches!(
            Entry::search_mt("([a-z]", "x"),
            Err(PedError::Pattern { .. })
        ));
        assert!(matches!(
            Entry::search_source("a", "b", "(("),
            Err(PedError::Pattern { .. })
        ));
    }

    #[test]
    fn test_search_source_requires_filter() {
        assert!(matches!(
            Entry::search_source("a", "b", ""),
            Err(PedError::Config(_))
        ));
    }

    #[test]
    fn test_language_codes_kept_as_written() {
        let entry = Entry::search_mt("a", "b").unwrap().with_info(EntryInfo {
            source_language: "EN".to_string(),
            target_language: "de-de".to_string(),
            ..Default::default()
        });
        assert_eq!(entry.info().source_language, "EN");
        assert_eq!(entry.info().target_language, "de-de");
        assert_eq!(entry.source_locale().unwrap(), "en");
        assert_eq!(entry.target_locale().unwrap(), "de-DE");

        let entry = Entry::search_mt("a", "b").unwrap().with_info(EntryInfo {
            target_language: "not a language".to_string(),
            ..Default::default()
        });
        assert_eq!(entry.info().target_language, "not a language");
        assert_eq!(entry.source_locale().unwrap(), "");
        assert!(matches!(entry.target_locale(), Err(PedError::Config(_))));
    }

    #[test]
    fn test_search_mt_table() {
        let mut store = RecordStore::new(vec![
            SegmentRecord::new("x", "foo baz"),
            SegmentRecord::new("y", "nothing"),
        ]);
        store.refresh();
        let entry = Entry::search_mt("foo", "bar").unwrap();
        assert_eq!(entry.apply_to_table(&mut store).unwrap(), 1);
        assert_eq!(store.records()[0].mt, "bar baz");
        assert!(!store.records()[0].is_scored());
        assert!(store.records()[1].is_scored());
    }

    #[test]
    fn test_search_source_table() {
        let mut store = RecordStore::new(vec![
            SegmentRecord::new("Click OK", "Klicken Sie auf Ok"),
            SegmentRecord::new("Press", "Ok"),
        ]);
        let entry = Entry::search_source(r"\bOk\b", "OK", r"\bOK\b").unwrap();
        assert_eq!(entry.apply_to_table(&mut store).unwrap(), 1);
        assert_eq!(store.records()[0].mt, "Klicken Sie auf OK");
        assert_eq!(store.records()[1].mt, "Ok");
    }

    #[test]
    fn test_toggle_case_table() {
        let mut store = RecordStore::new(vec![
            SegmentRecord::new("ABCdef", "xyzdef"),
            SegmentRecord::new("ABxdef", "xyzdef"),
        ]);
        store.refresh();
        let entry = Entry::toggle_case(3, CaseMode::Upper);
        assert_eq!(entry.apply_to_table(&mut store).unwrap(), 1);
        assert_eq!(store.records()[0].mt, "XYZdef");
        assert_eq!(store.records()[1].mt, "xyzdef");
        assert!(!store.records()[0].is_scored());
        assert!(store.records()[1].is_scored());
    }

    #[test]
    fn test_toggle_case_table_multibyte_prefix() {
        let mut store = RecordStore::new(vec![SegmentRecord::new("Über alles", "über alles")]);
        let entry = Entry::toggle_case(4, CaseMode::Title);
        assert_eq!(entry.apply_to_table(&mut store).unwrap(), 1);
        assert_eq!(store.records()[0].mt, "Über alles");
    }

    #[test]
    fn test_toggle_case_zero_length_is_noop() {
        let mut store = RecordStore::new(vec![SegmentRecord::new("ABC", "abc")]);
        let entry = Entry::toggle_case(0, CaseMode::Upper);
        assert_eq!(entry.apply_to_table(&mut store).unwrap(), 0);
        assert_eq!(store.records()[0].mt, "abc");
    }

    #[test]
    fn test_apply_tag_table_is_noop() {
        let mut store = RecordStore::new(vec![SegmentRecord::new("<g>a</g>", "a")]);
        let before = store.clone();
        let entry = Entry::apply_tag("(<g>.*?</g>)", None).unwrap();
        assert_eq!(entry.apply_to_table(&mut store).unwrap(), 0);
        assert_eq!(store, before);
    }

    #[test]
    fn test_search_mt_tree_keeps_tags() {
        let (mut doc, units) = unit_doc("Save file", r#"Speichern <g id="1">foo</g> foo"#);
        let entry = Entry::search_mt("foo", "Datei").unwrap();
        let outcome = entry.apply_to_units(&mut doc, &units);
        assert_eq!(outcome.changed, 1);
        assert_eq!(
            target_of(&doc, &units),
            r#"<target>Speichern <g id="1">Datei</g> Datei</target>"#
        );
    }

    #[test]
    fn test_search_source_tree_filters_on_flattened_source() {
        let (mut doc, units) = unit_doc(r#"Click <g id="1">OK</g>"#, "Klicken Sie auf Ok");
        let entry = Entry::search_source("Ok", "OK", "Click OK").unwrap();
        assert_eq!(entry.apply_to_units(&mut doc, &units).changed, 1);
        assert_eq!(units[0].target_text(&doc).unwrap(), "Klicken Sie auf OK");

        let entry = Entry::search_source("OK", "Okay", "Cancel").unwrap();
        assert_eq!(entry.apply_to_units(&mut doc, &units).changed, 0);
    }

    #[test]
    fn test_toggle_case_tree() {
        let (mut doc, units) = unit_doc("ABCdef", r#"x<g id="1">yz</g>def"#);
        let entry = Entry::toggle_case(3, CaseMode::Upper);
        assert_eq!(entry.apply_to_units(&mut doc, &units).changed, 1);
        assert_eq!(
            target_of(&doc, &units),
            r#"<target>X<g id="1">YZ</g>def</target>"#
        );

        let (mut doc, units) = unit_doc("ABxdef", "xyzdef");
        assert_eq!(entry.apply_to_units(&mut doc, &units).changed, 0);
        assert_eq!(units[0].target_text(&doc).unwrap(), "xyzdef");
    }

    #[test]
    fn test_apply_tag_inserts_once() {
        let (mut doc, units) = unit_doc(
            r#"Open <g id="5">File</g> now"#,
            "Öffnen Sie jetzt Datei",
        );
        let entry = Entry::apply_tag(r#"(<g id="5">.*?</g>)"#, Some("Datei")).unwrap();

        assert_eq!(entry.apply_to_units(&mut doc, &units).changed, 1);
        let once = target_of(&doc, &units);
        assert_eq!(once, r#"<target>Öffnen Sie jetzt <g id="5">Datei</g></target>"#);

        // Second run finds the tag already present
        assert_eq!(entry.apply_to_units(&mut doc, &units).changed, 0);
        assert_eq!(target_of(&doc, &units), once);
    }

    #[test]
    fn test_apply_tag_without_replacement_uses_source_text() {
        let (mut doc, units) = unit_doc(r#"Press <ph id="2">Enter</ph>"#, "Drücken Sie Enter");
        let entry = Entry::apply_tag(r#"<ph id="2">Enter</ph>"#, None).unwrap();
        assert_eq!(entry.apply_to_units(&mut doc, &units).changed, 1);
        assert_eq!(
            target_of(&doc, &units),
            r#"<target>Drücken Sie <ph id="2">Enter</ph></target>"#
        );
    }

    #[test]
    fn test_apply_tag_no_anchor_in_target() {
        let (mut doc, units) = unit_doc(r#"Open <g id="5">File</g>"#, "Öffnen");
        let entry = Entry::apply_tag(r#"(<g id="5">.*?</g>)"#, None).unwrap();
        assert_eq!(entry.apply_to_units(&mut doc, &units).changed, 0);
        assert_eq!(units[0].target_text(&doc).unwrap(), "Öffnen");
    }

    #[test]
    fn test_apply_tag_missing_target_is_unit_failure() {
        let doc_xml = r#"<body><trans-unit id="a"><source><g id="1">X</g></source></trans-unit><trans-unit id="b"><source><g id="1">X</g></source><target>X</target></trans-unit></body>"#;
        let mut doc = Document::parse_str(doc_xml).unwrap();
        let units: Vec<TransUnit> = doc
            .find_descendants(doc.root(), "trans-unit")
            .into_iter()
            .map(TransUnit::new)
            .collect();
        let entry = Entry::apply_tag(r#"(<g id="1">.*?</g>)"#, None).unwrap();

        let outcome = entry.apply_to_units(&mut doc, &units);
        assert_eq!(outcome.changed, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].unit, 0);
        assert_eq!(outcome.failures[0].unit_id.as_deref(), Some("a"));
        assert!(matches!(
            outcome.failures[0].error,
            PedError::StructuralMismatch(_)
        ));
    }

    #[test]
    fn test_apply_tag_unparseable_capture() {
        let (mut doc, units) = unit_doc(r#"<g id="1">X</g>"#, "X");
        let entry = Entry::apply_tag(r#"(<g id="1">)"#, None).unwrap();
        let outcome = entry.apply_to_units(&mut doc, &units);
        assert_eq!(outcome.changed, 0);
        assert_eq!(outcome.failures.len(), 1);
    }

    #[test]
    fn test_apply_dispatches_by_dataset() {
        let entry = Entry::search_mt("a", "b").unwrap();

        let mut store = RecordStore::new(vec![SegmentRecord::new("", "aa")]);
        let outcome = entry.apply(&mut Dataset::Table(&mut store)).unwrap();
        assert_eq!(outcome.changed, 1);
        assert_eq!(store.records()[0].mt, "bb");

        let (mut doc, units) = unit_doc("", "aa");
        let outcome = entry
            .apply(&mut Dataset::Tree {
                document: &mut doc,
                units: &units,
            })
            .unwrap();
        assert_eq!(outcome.changed, 1);
        assert_eq!(units[0].target_text(&doc).unwrap(), "bb");
    }
}
