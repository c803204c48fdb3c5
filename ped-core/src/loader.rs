use crate::error::{PedError, PedResult};
use crate::records::{RecordStore, SegmentRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Scores as stored in archived analysis exports
#[derive(Debug, Deserialize)]
struct PedDetails {
    #[serde(default)]
    score: Option<f64>,
    source: String,
    #[serde(default)]
    target: Option<String>,
    mt: String,
}

/// A flat row, as written by [`save_records_to_file`]
#[derive(Debug, Serialize, Deserialize)]
struct FlatRow {
    source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    mt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
    #[serde(rename = "virtual", default)]
    virtual_score: Option<f64>,
    #[serde(default)]
    max_char: Option<usize>,
    #[serde(default)]
    edit_distance: Option<usize>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredRow {
    Archived {
        ped_details: PedDetails,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Flat(FlatRow),
}

impl From<StoredRow> for SegmentRecord {
    fn from(row: StoredRow) -> Self {
        match row {
            StoredRow::Archived { ped_details, extra } => {
                let mut record = SegmentRecord::new(&ped_details.source, &ped_details.mt);
                record.target = ped_details.target;
                record.extra = extra;
                if let Some(score) = ped_details.score {
                    record.seed_from_archived_score(score);
                }
                record
            }
            StoredRow::Flat(row) => {
                let mut record = SegmentRecord::new(&row.source, &row.mt);
                record.target = row.target;
                record.extra = row.extra;
                record.archived_score = row.score;
                match (row.virtual_score, row.max_char, row.edit_distance) {
                    (Some(virtual_score), Some(max_char), Some(edit_distance)) => {
                        record.set_score(crate::distance::RowScore {
                            virtual_score,
                            max_char,
                            edit_distance,
                        });
                    }
                    _ => {
                        if let Some(score) = row.score {
                            record.seed_from_archived_score(score);
                        }
                    }
                }
                record
            }
        }
    }
}

impl From<&SegmentRecord> for FlatRow {
    fn from(record: &SegmentRecord) -> Self {
        let score = record.score();
        FlatRow {
            source: record.source.clone(),
            target: record.target.clone(),
            mt: record.mt.clone(),
            score: record.archived_score,
            virtual_score: score.map(|s| s.virtual_score),
            max_char: score.map(|s| s.max_char),
            edit_distance: score.map(|s| s.edit_distance),
            extra: record.extra.clone(),
        }
    }
}

/// Parse segment rows from a JSON array
///
/// Accepts flat rows (`source`, `target`, `mt`, optional cached score columns)
/// and archived rows that keep their strings under `ped_details`. Any other
/// key is kept as metadata.
pub fn parse_records(content: &str) -> PedResult<RecordStore> {
    let rows: Vec<StoredRow> = serde_json::from_str(content)?;
    Ok(RecordStore::new(
        rows.into_iter().map(SegmentRecord::from).collect(),
    ))
}

/// Columns holding cached scores, read from CSV cells as numbers
const FLOAT_COLUMNS: [&str; 2] = ["score", "virtual"];
const COUNT_COLUMNS: [&str; 2] = ["max_char", "edit_distance"];

fn csv_cell(header: &str, cell: &str, row: usize) -> PedResult<Value> {
    let number = if FLOAT_COLUMNS.contains(&header) {
        cell.trim().parse::<f64>().ok().and_then(Number::from_f64)
    } else if COUNT_COLUMNS.contains(&header) {
        // Counts may have been written as floats ("7.0")
        cell.trim()
            .parse::<f64>()
            .ok()
            .filter(|n| *n >= 0.0 && n.fract() == 0.0)
            .map(|n| Number::from(n as u64))
    } else {
        return Ok(Value::String(cell.to_string()));
    };
    number.map(Value::Number).ok_or_else(|| {
        PedError::Config(format!(
            "CSV row {}: column '{}' is not a number: '{}'",
            row + 1,
            header,
            cell
        ))
    })
}

/// Parse flat segment rows from CSV with a header row
///
/// A leading unnamed column (a written-out row index) is skipped. Empty
/// `target` and score cells count as missing; other columns are kept as
/// text.
pub fn parse_records_csv(content: &str) -> PedResult<RecordStore> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let cells = result?;
        let mut object = Map::new();
        for (column, (header, cell)) in headers.iter().zip(cells.iter()).enumerate() {
            if column == 0 && header.is_empty() {
                continue;
            }
            let optional = header == "target"
                || FLOAT_COLUMNS.contains(&header)
                || COUNT_COLUMNS.contains(&header);
            if optional && cell.trim().is_empty() {
                continue;
            }
            object.insert(header.to_string(), csv_cell(header, cell, row)?);
        }
        let stored: StoredRow = serde_json::from_value(Value::Object(object))?;
        records.push(SegmentRecord::from(stored));
    }
    Ok(RecordStore::new(records))
}

fn is_record_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("json") | Some("csv")
    )
}

/// Load segment rows from a single JSON or CSV file
///
/// Files ending in `.csv` are read as CSV, anything else as JSON.
///
/// # Errors
/// - File not found
/// - Invalid JSON/CSV or rows without `source`/`mt`
pub fn load_records_from_file(path: &Path) -> PedResult<RecordStore> {
    let content = fs::read_to_string(path).map_err(|e| PedError::io(path, e))?;
    let store = if path.extension().and_then(|ext| ext.to_str()) == Some("csv") {
        parse_records_csv(&content)?
    } else {
        parse_records(&content)?
    };
    info!(file = %path.display(), rows = store.len(), "Loaded records");
    Ok(store)
}

/// Load and concatenate every `*.json` and `*.csv` file in a directory, in name order
pub fn load_records_from_dir(dir: &Path) -> PedResult<RecordStore> {
    if !dir.is_dir() {
        return Err(PedError::Config(format!(
            "Path is not a directory: {}",
            dir.display()
        )));
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| PedError::io(dir, e))? {
        let path = entry.map_err(|e| PedError::io(dir, e))?.path();
        if is_record_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    if paths.is_empty() {
        warn!(directory = %dir.display(), "No JSON or CSV files found");
    }

    let mut store = RecordStore::default();
    for path in paths {
        store.extend(load_records_from_file(&path)?);
    }
    Ok(store)
}

/// Load from a file, or from every JSON/CSV file when given a directory
pub fn load_records(path: &Path) -> PedResult<RecordStore> {
    if path.is_dir() {
        load_records_from_dir(path)
    } else {
        load_records_from_file(path)
    }
}

pub fn records_to_json(store: &RecordStore) -> PedResult<String> {
    let rows: Vec<FlatRow> = store.records().iter().map(FlatRow::from).collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

/// Write rows as flat JSON, cached score columns included
pub fn save_records_to_file(store: &RecordStore, path: &Path) -> PedResult<()> {
    let json = records_to_json(store)?;
    fs::write(path, json).map_err(|e| PedError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_rows() {
        let store = parse_records(
            r#"[
                {"source": "Hello", "target": "Hallo", "mt": "Helo"},
                {"source": "ab", "mt": "a", "Project": "P1"}
            ]"#,
        )
        .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].reference(), "Hallo");
        assert!(!store.records()[0].is_scored());
        assert_eq!(store.records()[1].reference(), "ab");
        assert_eq!(store.records()[1].extra["Project"], "P1");
    }

    #[test]
    fn test_parse_archived_rows_seed_scores() {
        let store = parse_records(
            r#"[{
                "Project": "P1", "s_lid": "EN", "t_lid": "DE",
                "ped_details": {"score": 0.5, "source": "ab", "target": "ab", "mt": "a?"}
            }]"#,
        )
        .unwrap();
        let record = &store.records()[0];
        assert_eq!(record.mt, "a?");
        assert_eq!(record.virtual_score(), Some(0.5));
        assert_eq!(record.score().unwrap().edit_distance, 1);
        assert_eq!(record.extra["t_lid"], "DE");
    }

    #[test]
    fn test_cached_scores_are_kept() {
        let store = parse_records(
            r#"[{"source": "x", "mt": "y", "virtual": 0.75, "max_char": 4, "edit_distance": 3}]"#,
        )
        .unwrap();
        let score = store.records()[0].score().unwrap();
        assert_eq!(score.virtual_score, 0.75);
        assert_eq!(score.max_char, 4);
    }

    #[test]
    fn test_missing_mt_is_rejected() {
        assert!(matches!(
            parse_records(r#"[{"source": "x"}]"#),
            Err(PedError::Json(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");

        let mut store = parse_records(
            r#"[{"source": "kitten", "mt": "sitting", "Document": "d1"}]"#,
        )
        .unwrap();
        store.refresh();
        save_records_to_file(&store, &path).unwrap();

        let reloaded = load_records(&path).unwrap();
        assert_eq!(reloaded, store);
        assert_eq!(reloaded.records()[0].score().unwrap().edit_distance, 3);
    }

    #[test]
    fn test_load_dir_concatenates_json_and_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("c.json"), r#"[{"source": "c", "mt": "c"}]"#).unwrap();
        fs::write(dir.path().join("a.json"), r#"[{"source": "a", "mt": "a"}]"#).unwrap();
        fs::write(dir.path().join("b.csv"), ",source,mt\n0,b,x\n").unwrap();
        fs::write(dir.path().join("skip.txt"), "source,mt").unwrap();

        let store = load_records(dir.path()).unwrap();
        let sources: Vec<&str> = store.records().iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["a", "b", "c"]);
        assert_eq!(store.records()[1].mt, "x");
    }

    #[test]
    fn test_parse_csv_rows() {
        let store = parse_records_csv(
            ",source,target,mt,score,Project\n\
             0,Hello,Hallo,Helo,0.25,P1\n\
             1,ab,,a,,\"P2, archived\"\n",
        )
        .unwrap();
        assert_eq!(store.len(), 2);

        let first = &store.records()[0];
        assert_eq!(first.reference(), "Hallo");
        assert_eq!(first.archived_score, Some(0.25));
        assert_eq!(first.virtual_score(), Some(0.25));
        assert_eq!(first.extra["Project"], "P1");
        assert!(!first.extra.contains_key(""));

        let second = &store.records()[1];
        assert_eq!(second.target, None);
        assert_eq!(second.reference(), "ab");
        assert!(!second.is_scored());
        assert_eq!(second.extra["Project"], "P2, archived");
    }

    #[test]
    fn test_csv_cached_scores_and_bad_numbers() {
        let store =
            parse_records_csv("source,mt,virtual,max_char,edit_distance\nx,y,1.0,1.0,1\n").unwrap();
        let score = store.records()[0].score().unwrap();
        assert_eq!(score.max_char, 1);
        assert_eq!(score.edit_distance, 1);

        assert!(matches!(
            parse_records_csv("source,mt,score\nx,y,high\n"),
            Err(PedError::Config(_))
        ));
        assert!(matches!(
            parse_records_csv("source,target\nx,y\n"),
            Err(PedError::Json(_))
        ));
    }
}
