//! Rule-based substitutions for machine-translated text
//!
//! This crate runs ordered sets of search/replace rules over MT output and
//! measures what each rule does to post-edit density (PED).
//! # Workflow Example
//!
//! ```
//! use ped_subs::{Entry, RecordStore, SegmentRecord, SubstitutionSet};
//!
//! let mut store = RecordStore::new(vec![
//!     SegmentRecord::new("Click OK", "Klicken Sie auf Ok").with_target("Klicken Sie auf OK"),
//! ]);
//!
//! let mut set = SubstitutionSet::new("German button labels", "qa");
//! set.push(Entry::search_source(r"\bOk\b", "OK", r"\bOK\b")?);
//!
//! // Scores before and after every entry, then re-ranks by effect
//! let run = set.apply_to_table(&mut store)?;
//! assert_eq!(run.final_score(), Some(0.0));
//! assert!(set.entries()[0].effect().unwrap() > 0.0);
//! # Ok::<(), ped_subs::PedError>(())
//! ```

pub mod case;
pub mod entry;
pub mod format;
pub mod subs;


pub use case::CaseMode;
pub use entry::{ApplyOutcome, Dataset, Entry, EntryInfo, EntryKind, Rule, UnitFailure};
pub use format::{EntryRecord, RuleSetDocument, RuleSetVersion, SearchField};
pub use subs::{BatchReport, EntryEffect, FileReport, RunReport, SubstitutionSet, TableRun, TreeRun};

// Re-export the core types rules work on
pub use ped_core::{
    Column, Document, PedError, PedResult, RecordStore, SegmentRecord, TransUnit, TreeProvider,
    XliffProvider,
};
