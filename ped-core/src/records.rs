//! Record store adapter
//!
//! A uniform view over tabular segment rows (`source`, `target`, `mt` plus the
//! cached score columns). Any change to a column a row is scored against clears
//! that row's cache, and only that row's, so re-scoring stays incremental.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde_json::{Map, Value};

use crate::distance::{self, RowScore};
use crate::error::{PedError, PedResult};

/// String columns of a segment row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Source,
    Target,
    Mt,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Source => "source",
            Column::Target => "target",
            Column::Mt => "mt",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = PedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "source" => Ok(Column::Source),
            "target" => Ok(Column::Target),
            "mt" => Ok(Column::Mt),
            other => Err(PedError::Config(format!(
                "unknown column '{}', expected source, target or mt",
                other
            ))),
        }
    }
}

/// One segment row
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SegmentRecord {
    pub source: String,
    /// Human-corrected reference; rows without one are scored against `source`
    pub target: Option<String>,
    pub mt: String,
    /// Score the row carried when it was archived, if any
    pub archived_score: Option<f64>,
    /// Metadata columns carried through unchanged (project, document, ...)
    pub extra: Map<String, Value>,
    score: Option<RowScore>,
}

impl SegmentRecord {
    pub fn new(source: &str, mt: &str) -> Self {
        SegmentRecord {
            source: source.to_string(),
            mt: mt.to_string(),
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self.score = None;
        self
    }

    /// The string the MT is scored against
    pub fn reference(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.source)
    }

    pub fn value(&self, column: Column) -> &str {
        match column {
            Column::Source => &self.source,
            Column::Target => self.target.as_deref().unwrap_or(""),
            Column::Mt => &self.mt,
        }
    }

    fn set_value(&mut self, column: Column, value: String) {
        match column {
            Column::Source => self.source = value,
            Column::Target => self.target = Some(value),
            Column::Mt => self.mt = value,
        }
    }

    /// Whether a change to `column` changes this row's score
    pub fn scored_on(&self, column: Column) -> bool {
        match column {
            Column::Mt | Column::Target => true,
            Column::Source => self.target.is_none(),
        }
    }

    pub fn is_scored(&self) -> bool {
        self.score.is_some()
    }

    pub fn score(&self) -> Option<RowScore> {
        self.score
    }

    pub fn virtual_score(&self) -> Option<f64> {
        self.score.map(|s| s.virtual_score)
    }

    pub fn set_score(&mut self, score: RowScore) {
        self.score = Some(score);
    }

    pub fn invalidate(&mut self) {
        self.score = None;
    }

    /// Seed the cache from an archived score instead of recomputing it
    ///
    /// The edit distance is derived back from the ratio, so it is only as
    /// accurate as the archived score.
    pub fn seed_from_archived_score(&mut self, archived: f64) {
        let max_char = self
            .reference()
            .chars()
            .count()
            .max(self.mt.chars().count());
        self.archived_score = Some(archived);
        self.score = Some(RowScore {
            virtual_score: archived,
            max_char,
            edit_distance: (archived * max_char as f64).round() as usize,
        });
    }
}

/// Tabular dataset of segment rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordStore {
    records: Vec<SegmentRecord>,
}

impl RecordStore {
    pub fn new(records: Vec<SegmentRecord>) -> Self {
        RecordStore { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SegmentRecord] {
        &self.records
    }

    pub fn get(&self, row: usize) -> Option<&SegmentRecord> {
        self.records.get(row)
    }

    pub fn push(&mut self, record: SegmentRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, other: RecordStore) {
        self.records.extend(other.records);
    }

    pub fn into_records(self) -> Vec<SegmentRecord> {
        self.records
    }

    /// Rows whose `column` matches `pattern`
    pub fn filter_by_regex(&self, column: Column, pattern: &Regex) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| pattern.is_match(record.value(column)))
            .map(|(row, _)| row)
            .collect()
    }

    /// Replace every non-overlapping match of `pattern` in `column`
    ///
    /// Only rows in `subset` are considered (all rows when `None`). Returns the
    /// rows in which the pattern matched; those rows lose their cached score
    /// if `column` is one they are scored on.
    pub fn replace_in_column(
        &mut self,
        column: Column,
        pattern: &Regex,
        replacement: &str,
        subset: Option<&[usize]>,
    ) -> Vec<usize> {
        let rows: Vec<usize> = match subset {
            Some(rows) => rows.to_vec(),
            None => (0..self.records.len()).collect(),
        };

        let mut matched = Vec::new();
        for row in rows {
            let Some(record) = self.records.get_mut(row) else {
                continue;
            };
            let current = record.value(column);
            if !pattern.is_match(current) {
                continue;
            }
            let replaced = pattern.replace_all(current, replacement).into_owned();
            record.set_value(column, replaced);
            if record.scored_on(column) {
                record.invalidate();
            }
            matched.push(row);
        }
        matched
    }

    /// First `n` code points of `column` for each row in `subset`
    ///
    /// Values shorter than `n` are returned whole.
    pub fn slice_prefix(&self, column: Column, n: usize, subset: Option<&[usize]>) -> Vec<String> {
        let prefix =
            |record: &SegmentRecord| -> String { record.value(column).chars().take(n).collect() };
        match subset {
            Some(rows) => rows
                .iter()
                .filter_map(|&row| self.records.get(row))
                .map(prefix)
                .collect(),
            None => self.records.iter().map(prefix).collect(),
        }
    }

    /// Overwrite `column` for exactly the rows in `subset`
    ///
    /// Rows outside the subset keep both their values and their cached score.
    pub fn write_back(
        &mut self,
        column: Column,
        subset: &[usize],
        values: Vec<String>,
    ) -> PedResult<()> {
        if subset.len() != values.len() {
            return Err(PedError::LengthMismatch {
                expected: subset.len(),
                actual: values.len(),
            });
        }
        let len = self.records.len();
        if let Some(&row) = subset.iter().find(|&&row| row >= len) {
            return Err(PedError::RowOutOfRange { row, len });
        }

        for (&row, value) in subset.iter().zip(values) {
            let record = &mut self.records[row];
            record.set_value(column, value);
            if record.scored_on(column) {
                record.invalidate();
            }
        }
        Ok(())
    }

    /// Clear the cached score of the given rows
    pub fn invalidate(&mut self, subset: &[usize]) {
        for &row in subset {
            if let Some(record) = self.records.get_mut(row) {
                record.invalidate();
            }
        }
    }

    /// Score rows whose cache is unset, see [`distance::refresh`]
    pub fn refresh(&mut self) -> usize {
        distance::refresh(&mut self.records)
    }

    /// Document PED over the current cache
    ///
    /// Rows that are not scored yet are scored on the fly without being cached.
    pub fn document_score(&self) -> PedResult<f64> {
        let scores: Vec<RowScore> = self
            .records
            .iter()
            .map(|record| {
                record
                    .score()
                    .unwrap_or_else(|| distance::row_score(record.reference(), &record.mt))
            })
            .collect();
        distance::document_score(&scores)
    }

    /// Refresh the cache, then compute the document PED
    pub fn score(&mut self) -> PedResult<f64> {
        self.refresh();
        self.document_score()
    }
}

impl From<Vec<SegmentRecord>> for RecordStore {
    fn from(records: Vec<SegmentRecord>) -> Self {
        RecordStore::new(records)
    }
}
