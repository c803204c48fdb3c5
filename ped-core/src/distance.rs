//! Distance scorer
//!
//! Post-edit density (PED) is the edit distance between a reference string and
//! the MT string, normalized by the longer of the two. Lengths are counted in
//! Unicode code points throughout, never in bytes.

use tracing::debug;

use crate::error::{PedError, PedResult};
use crate::records::SegmentRecord;

/// Cached score for one segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowScore {
    /// `edit_distance / max_char`, or 0.0 when both strings are empty
    pub virtual_score: f64,
    pub max_char: usize,
    pub edit_distance: usize,
}

/// Levenshtein distance over code points, unit cost for insert/delete/substitute
///
/// # Example
/// ```
/// use ped_core::distance::edit_distance;
/// assert_eq!(edit_distance("kitten", "sitting"), 3);
/// assert_eq!(edit_distance("", "abc"), 3);
/// ```
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    // Keep the shorter sequence in the row
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return long.len();
    }

    let mut previous_row: Vec<usize> = (0..=short.len()).collect();
    let mut current_row: Vec<usize> = vec![0; short.len() + 1];

    for (i, c1) in long.iter().enumerate() {
        current_row[0] = i + 1;
        for (j, c2) in short.iter().enumerate() {
            let insertion = previous_row[j + 1] + 1;
            let deletion = current_row[j] + 1;
            let substitution = previous_row[j] + usize::from(c1 != c2);
            current_row[j + 1] = insertion.min(deletion).min(substitution);
        }
        std::mem::swap(&mut previous_row, &mut current_row);
    }

    previous_row[short.len()]
}

/// Score a single reference/MT pair
pub fn row_score(reference: &str, mt: &str) -> RowScore {
    let max_char = reference.chars().count().max(mt.chars().count());
    let edit_distance = edit_distance(reference, mt);
    // Two empty strings need no edits
    let virtual_score = if max_char == 0 {
        0.0
    } else {
        edit_distance as f64 / max_char as f64
    };

    RowScore {
        virtual_score,
        max_char,
        edit_distance,
    }
}

/// Document-level PED: total edit distance over total length
///
/// # Errors
/// `InsufficientData` when there are no rows, or when every row is empty
/// (the denominator would be zero).
pub fn document_score<'a, I>(rows: I) -> PedResult<f64>
where
    I: IntoIterator<Item = &'a RowScore>,
{
    let mut count = 0usize;
    let mut total_distance = 0usize;
    let mut total_chars = 0usize;

    for row in rows {
        count += 1;
        total_distance += row.edit_distance;
        total_chars += row.max_char;
    }

    if count == 0 {
        return Err(PedError::InsufficientData(
            "cannot compute PED for an empty dataset".to_string(),
        ));
    }
    if total_chars == 0 {
        return Err(PedError::InsufficientData(format!(
            "all {} rows are empty, PED is undefined",
            count
        )));
    }

    Ok(total_distance as f64 / total_chars as f64)
}

/// Score every record whose cache is unset and leave the others untouched
///
/// Returns the number of rows that were re-scored.
pub fn refresh(records: &mut [SegmentRecord]) -> usize {
    let mut rescored = 0;
    for record in records.iter_mut().filter(|r| !r.is_scored()) {
        let score = row_score(record.reference(), &record.mt);
        record.set_score(score);
        rescored += 1;
    }
    debug!(rescored, total = records.len(), "Refreshed virtual scores");
    rescored
}
