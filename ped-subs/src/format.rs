//! Persisted rule-set schema
//!
//! Rule sets are stored as JSON. Older exports name their fields
//! differently (`__class__`, `ID`, `desc`, `s_lid`, ...); those names are
//! accepted as aliases when reading, and unknown keys are ignored.

use serde::{Deserialize, Deserializer, Serialize};

use ped_core::{PedError, PedResult};

use crate::case::CaseMode;
use crate::entry::{Entry, EntryInfo, EntryKind, Rule};

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSetVersion {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Default for RuleSetVersion {
    fn default() -> Self {
        RuleSetVersion::Int(1)
    }
}

/// The `search` field: a pattern, or a prefix length for case toggling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchField {
    Length(u64),
    Pattern(String),
    /// Anything else (negative or fractional numbers, ...), rejected on conversion
    Other(serde_json::Value),
}

impl SearchField {
    fn as_pattern(&self) -> Option<String> {
        match self {
            SearchField::Length(n) => Some(n.to_string()),
            SearchField::Pattern(pattern) => Some(pattern.clone()),
            SearchField::Other(_) => None,
        }
    }

    fn as_length(&self) -> Option<usize> {
        match self {
            SearchField::Length(n) => usize::try_from(*n).ok(),
            SearchField::Pattern(text) => text.trim().parse().ok(),
            SearchField::Other(_) => None,
        }
    }
}

impl std::fmt::Display for SearchField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchField::Length(n) => write!(f, "{}", n),
            SearchField::Pattern(text) => write!(f, "'{}'", text),
            SearchField::Other(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    #[serde(alias = "__class__")]
    pub kind: EntryKind,
    #[serde(default, alias = "ID", deserialize_with = "null_as_default")]
    pub id: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_by: String,
    #[serde(default, alias = "desc", deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, alias = "effect")]
    pub ped_effect: Option<f64>,
    #[serde(default, alias = "s_lid", deserialize_with = "null_as_default")]
    pub source_language: String,
    #[serde(default, alias = "t_lid", deserialize_with = "null_as_default")]
    pub target_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchField>,
    #[serde(default, alias = "replace", skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(default, alias = "source", skip_serializing_if = "Option::is_none")]
    pub source_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleSetDocument {
    #[serde(default)]
    pub version: RuleSetVersion,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_by: String,
    #[serde(default, alias = "desc", deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub ped_effect: Option<f64>,
    #[serde(default)]
    pub entries: Vec<EntryRecord>,
}

impl EntryRecord {
    fn missing(&self, field: &str) -> PedError {
        PedError::Config(format!(
            "{:?} entry {} has no '{}'",
            self.kind, self.id, field
        ))
    }

    fn search_field(&self) -> PedResult<&SearchField> {
        self.search.as_ref().ok_or_else(|| self.missing("search"))
    }

    fn search_pattern(&self) -> PedResult<String> {
        let search = self.search_field()?;
        search.as_pattern().ok_or_else(|| {
            PedError::Config(format!(
                "{:?} entry {} needs a pattern as 'search', got {}",
                self.kind, self.id, search
            ))
        })
    }

    fn prefix_length(&self) -> PedResult<usize> {
        let search = self.search_field()?;
        search.as_length().ok_or_else(|| {
            PedError::Config(format!(
                "{:?} entry {} needs a non-negative prefix length as 'search', got {}",
                self.kind, self.id, search
            ))
        })
    }

    fn replacement_text(&self) -> PedResult<&str> {
        self.replacement
            .as_deref()
            .ok_or_else(|| self.missing("replacement"))
    }
}

impl TryFrom<EntryRecord> for Entry {
    type Error = PedError;

    fn try_from(record: EntryRecord) -> PedResult<Entry> {
        let entry = match record.kind {
            EntryKind::SearchMt => {
                Entry::search_mt(&record.search_pattern()?, record.replacement_text()?)?
            }
            EntryKind::SearchSource => Entry::search_source(
                &record.search_pattern()?,
                record.replacement_text()?,
                record.source_filter.as_deref().unwrap_or_default(),
            )?,
            EntryKind::ToggleCase => {
                let length = record.prefix_length()?;
                let mode: CaseMode = record.replacement_text()?.parse()?;
                Entry::toggle_case(length, mode)
            }
            EntryKind::ApplyTag => Entry::apply_tag(
                record.source_filter.as_deref().unwrap_or_default(),
                record.replacement.as_deref(),
            )?,
        };

        Ok(entry
            .with_id(record.id)
            .with_effect(record.ped_effect)
            .with_info(EntryInfo {
                created_by: record.created_by,
                description: record.description,
                source_language: record.source_language,
                target_language: record.target_language,
            }))
    }
}

impl From<&Entry> for EntryRecord {
    fn from(entry: &Entry) -> Self {
        let (search, replacement, source_filter) = match entry.rule() {
            Rule::SearchMt {
                search,
                replacement,
            } => (
                Some(SearchField::Pattern(search.as_str().to_string())),
                Some(replacement.clone()),
                None,
            ),
            Rule::SearchSource {
                search,
                replacement,
                source_filter,
            } => (
                Some(SearchField::Pattern(search.as_str().to_string())),
                Some(replacement.clone()),
                Some(source_filter.as_str().to_string()),
            ),
            Rule::ToggleCase { length, mode } => (
                Some(SearchField::Length(*length as u64)),
                Some(mode.to_string()),
                None,
            ),
            Rule::ApplyTag {
                source_filter,
                replacement,
            } => (
                None,
                replacement.clone(),
                Some(source_filter.as_str().to_string()),
            ),
        };

        let info = entry.info();
        EntryRecord {
            kind: entry.kind(),
            id: entry.id(),
            created_by: info.created_by.clone(),
            description: info.description.clone(),
            ped_effect: entry.effect(),
            source_language: info.source_language.clone(),
            target_language: info.target_language.clone(),
            search,
            replacement,
            source_filter,
        }
    }
}
