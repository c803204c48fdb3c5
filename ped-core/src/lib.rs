//! Post-edit density (PED) scoring for machine-translated segments
//!
//! This crate holds the pieces the substitution engine works on:
//!
//! 1. **Distance scorer** - code-point edit distance, per-row and document PED,
//!    incremental re-scoring of invalidated rows
//! 2. **Record store** - tabular segment rows with regex filter/replace and
//!    write-back that keeps the score cache consistent
//! 3. **XML tree** - an arena tree using the text/tail model, read and written
//!    with quick-xml
//! 4. **Translation units** - source text and target fragments of XLIFF units,
//!    edited in place so inline tags are preserved
//!
//! # Example
//!
//! ```
//! use ped_core::{RecordStore, SegmentRecord};
//!
//! let mut store = RecordStore::new(vec![
//!     SegmentRecord::new("ab", "ab"),
//!     SegmentRecord::new("ab", "a"),
//! ]);
//! assert_eq!(store.score().unwrap(), 0.25);
//! ```

pub mod distance;
pub mod error;
pub mod loader;
pub mod records;
pub mod tree;
pub mod unit;
pub mod xliff;
pub mod xml;

pub use distance::{RowScore, document_score, edit_distance, refresh, row_score};
pub use error::{PedError, PedResult, compile_pattern};
pub use loader::{
    load_records, load_records_from_dir, load_records_from_file, parse_records, parse_records_csv,
    save_records_to_file,
};
pub use records::{Column, RecordStore, SegmentRecord};
pub use tree::{Document, Fragment, NodeId, NodeKind, Slot};
pub use unit::TransUnit;
pub use xliff::{TreeProvider, XliffProvider};
