//! Substitution sets
//!
//! A [`SubstitutionSet`] is an ordered list of entries. On tabular records
//! the set is scored before and after every entry, each entry's effect is
//! recorded, and the entries are re-ranked so the most effective one runs
//! first next time. On XLIFF files the entries are applied without scoring.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use ped_core::{Document, PedError, PedResult, RecordStore, TransUnit, TreeProvider};

use crate::entry::{Dataset, Entry, UnitFailure};
use crate::format::{EntryRecord, RuleSetDocument, RuleSetVersion};

#[derive(Debug, Clone, Default)]
pub struct SubstitutionSet {
    pub version: RuleSetVersion,
    pub created_by: String,
    pub description: String,
    aggregate_effect: Option<f64>,
    entries: Vec<Entry>,
}

/// Effect of one entry during a table run
#[derive(Debug, Clone, PartialEq)]
pub struct EntryEffect {
    /// Id the entry had while it was applied
    pub id: usize,
    pub label: String,
    pub invalidated: usize,
    pub effect: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRun {
    /// Document PED after each step, baseline first
    pub scores: Vec<f64>,
    pub effects: Vec<EntryEffect>,
    pub aggregate_effect: f64,
}

impl TableRun {
    pub fn baseline(&self) -> Option<f64> {
        self.scores.first().copied()
    }

    pub fn final_score(&self) -> Option<f64> {
        self.scores.last().copied()
    }
}

/// Result of applying a set to the units of one document
#[derive(Debug, Default)]
pub struct TreeRun {
    pub units: usize,
    /// Units whose target differs from before the run
    pub changed: usize,
    /// Flattened target text per unit after the run, `None` without a target
    pub targets: Vec<Option<String>>,
    pub failures: Vec<UnitFailure>,
}

#[derive(Debug)]
pub enum RunReport {
    Table(TableRun),
    Tree(TreeRun),
}

#[derive(Debug, Default)]
pub struct FileReport {
    pub run: TreeRun,
    pub written: bool,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub files: BTreeMap<PathBuf, FileReport>,
    /// Files that could not be read, parsed or written
    pub failed: Vec<(PathBuf, PedError)>,
}

impl BatchReport {
    pub fn changed_units(&self) -> usize {
        self.files.values().map(|file| file.run.changed).sum()
    }

    pub fn unit_failures(&self) -> usize {
        self.files.values().map(|file| file.run.failures.len()).sum()
    }
}

impl SubstitutionSet {
    pub fn new(description: &str, created_by: &str) -> Self {
        SubstitutionSet {
            description: description.to_string(),
            created_by: created_by.to_string(),
            ..Default::default()
        }
    }

    pub fn from_entries(entries: Vec<Entry>) -> Self {
        SubstitutionSet {
            entries,
            ..Default::default()
        }
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Entries in application order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// PED improvement of the last table run, baseline minus final score
    pub fn aggregate_effect(&self) -> Option<f64> {
        self.aggregate_effect
    }

    pub fn apply_to_dataset(&mut self, dataset: Dataset<'_>) -> PedResult<RunReport> {
        match dataset {
            Dataset::Table(store) => Ok(RunReport::Table(self.apply_to_table(store)?)),
            Dataset::Tree { document, units } => {
                Ok(RunReport::Tree(self.apply_to_units(document, units)))
            }
        }
    }

    /// Apply every entry to the records, measuring each one's effect
    ///
    /// Entries run in list order. Afterwards they are re-ranked by effect,
    /// see [`SubstitutionSet::rerank`]. An empty set leaves the records
    /// untouched and scores nothing.
    ///
    /// # Errors
    /// `InsufficientData` when the records cannot be scored. Entries applied
    /// before the failure keep their changes.
    pub fn apply_to_table(&mut self, store: &mut RecordStore) -> PedResult<TableRun> {
        if self.entries.is_empty() {
            info!("Rule set is empty, nothing to apply");
            return Ok(TableRun::default());
        }

        store.refresh();
        let baseline = store.document_score()?;
        info!(baseline, rows = store.len(), entries = self.entries.len(), "Scored records");

        let mut run = TableRun {
            scores: vec![baseline],
            ..Default::default()
        };
        let mut previous = baseline;
        for entry in &mut self.entries {
            let invalidated = entry.apply_to_table(store)?;
            let rescored = store.refresh();
            let score = store.document_score()?;
            let effect = previous - score;
            entry.set_effect(effect);
            debug!(
                entry = %entry.label(),
                invalidated,
                rescored,
                score,
                effect,
                "Entry applied"
            );

            run.effects.push(EntryEffect {
                id: entry.id(),
                label: entry.label(),
                invalidated,
                effect,
            });
            run.scores.push(score);
            previous = score;
        }

        run.aggregate_effect = baseline - previous;
        self.aggregate_effect = Some(run.aggregate_effect);
        info!(
            baseline,
            final_score = previous,
            aggregate_effect = run.aggregate_effect,
            "Applied rule set to records"
        );

        self.rerank();
        Ok(run)
    }

    /// Apply every entry, in order, to the units of one document
    ///
    /// A unit that fails under one entry is reported once and left out of
    /// the remaining entries; the other units carry on.
    pub fn apply_to_units(&self, document: &mut Document, units: &[TransUnit]) -> TreeRun {
        let snapshot = |document: &Document| -> Vec<Option<String>> {
            units
                .iter()
                .map(|unit| {
                    unit.target(document)
                        .ok()
                        .map(|target| document.serialize_node(target, false))
                })
                .collect()
        };

        let before = snapshot(document);
        let mut failures: Vec<UnitFailure> = Vec::new();
        // (position in `units`, unit) still being processed
        let mut active: Vec<(usize, TransUnit)> = units.iter().copied().enumerate().collect();
        for entry in &self.entries {
            if active.is_empty() {
                break;
            }
            let batch: Vec<TransUnit> = active.iter().map(|&(_, unit)| unit).collect();
            let mut failed = BTreeSet::new();
            for mut failure in entry.apply_to_units(document, &batch).failures {
                failure.unit = active[failure.unit].0;
                failed.insert(failure.unit);
                failures.push(failure);
            }
            active.retain(|(index, _)| !failed.contains(index));
        }
        let after = snapshot(document);

        TreeRun {
            units: units.len(),
            changed: before.iter().zip(&after).filter(|(b, a)| b != a).count(),
            targets: units
                .iter()
                .map(|unit| unit.target_text(document).ok())
                .collect(),
            failures,
        }
    }

    /// Apply the set to a batch of files
    ///
    /// With `write` set, files that changed are written back through the
    /// provider. A file that cannot be read or written is reported and the
    /// batch moves on.
    pub fn apply_to_tree_batch<P: TreeProvider>(
        &self,
        paths: &[PathBuf],
        provider: &P,
        write: bool,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for path in paths {
            let (mut document, units) = match provider.parse(path) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping file");
                    report.failed.push((path.clone(), e));
                    continue;
                }
            };

            let run = self.apply_to_units(&mut document, &units);
            let mut written = false;
            if write && run.changed > 0 {
                match provider.serialize(&document, path) {
                    Ok(()) => written = true,
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Failed to write file");
                        report.failed.push((path.clone(), e));
                    }
                }
            }
            debug!(
                file = %path.display(),
                units = run.units,
                changed = run.changed,
                failures = run.failures.len(),
                written,
                "Processed file"
            );
            report.files.insert(path.clone(), FileReport { run, written });
        }

        info!(
            files = report.files.len(),
            failed = report.failed.len(),
            changed_units = report.changed_units(),
            "Applied rule set to files"
        );
        report
    }

    /// Rank entries by their last effect, best first, and renumber them
    ///
    /// The sort is stable so equal effects keep their relative order. Entries
    /// never scored go last. Ids become `0..len` and the list order follows
    /// the ids, which makes the new ranking the next application order.
    pub fn rerank(&mut self) {
        self.entries.sort_by(|a, b| {
            let a = a.effect().unwrap_or(f64::NEG_INFINITY);
            let b = b.effect().unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });
        for (id, entry) in self.entries.iter_mut().enumerate() {
            entry.set_id(id);
        }
    }

    pub fn to_document(&self) -> RuleSetDocument {
        RuleSetDocument {
            version: self.version.clone(),
            created_by: self.created_by.clone(),
            description: self.description.clone(),
            ped_effect: self.aggregate_effect,
            entries: self.entries.iter().map(EntryRecord::from).collect(),
        }
    }

    /// Build a set from its persisted form, validating every entry
    pub fn from_document(document: RuleSetDocument) -> PedResult<Self> {
        let entries = document
            .entries
            .into_iter()
            .map(Entry::try_from)
            .collect::<PedResult<Vec<_>>>()?;
        Ok(SubstitutionSet {
            version: document.version,
            created_by: document.created_by,
            description: document.description,
            aggregate_effect: document.ped_effect,
            entries,
        })
    }

    pub fn from_json_str(json: &str) -> PedResult<Self> {
        Self::from_document(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> PedResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    pub fn load_from_json(path: &Path) -> PedResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| PedError::io(path, e))?;
        let set = Self::from_json_str(&content)?;
        info!(file = %path.display(), entries = set.len(), "Loaded rule set");
        Ok(set)
    }

    pub fn save_to_json(&self, path: &Path) -> PedResult<()> {
        let json = self.to_json_string()?;
        fs::write(path, json).map_err(|e| PedError::io(path, e))
    }
}
