//! XLIFF tree provider
//!
//! Reads bilingual XLIFF/SDLXLIFF files into a [`Document`] and picks out the
//! translation units that carry machine-translated content.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PedError, PedResult};
use crate::tree::Document;
use crate::unit::TransUnit;

/// Source of parsed trees and sink for mutated ones
pub trait TreeProvider {
    /// Parse a file and return its tree with the units to work on
    fn parse(&self, path: &Path) -> PedResult<(Document, Vec<TransUnit>)>;

    /// Write a (possibly mutated) tree back to `path`
    fn serialize(&self, document: &Document, path: &Path) -> PedResult<()>;
}

#[derive(Debug, Clone)]
pub struct XliffProvider {
    /// Attribute (local name) that marks the origin of a segment
    pub origin_attribute: String,
    /// Value of that attribute for machine-translated segments
    pub origin_value: String,
    /// File extensions picked up when a directory is expanded
    pub extensions: Vec<String>,
}

impl Default for XliffProvider {
    fn default() -> Self {
        XliffProvider {
            origin_attribute: "origin".to_string(),
            origin_value: "mt".to_string(),
            extensions: vec![
                "sdlxliff".to_string(),
                "xliff".to_string(),
                "xlf".to_string(),
            ],
        }
    }
}

impl XliffProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// `trans-unit` elements containing at least one MT-origin descendant
    pub fn machine_translated_units(&self, document: &Document) -> Vec<TransUnit> {
        document
            .find_descendants(document.root(), "trans-unit")
            .into_iter()
            .filter(|&unit| {
                document.descendants(unit).into_iter().any(|node| {
                    document.attribute_local(node, &self.origin_attribute)
                        == Some(self.origin_value.as_str())
                })
            })
            .map(TransUnit::new)
            .collect()
    }

    /// Expand directories into the matching files they contain
    ///
    /// Plain file paths are passed through; directory listings are sorted.
    pub fn expand_paths(&self, paths: &[PathBuf]) -> PedResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in paths {
            if !path.is_dir() {
                files.push(path.clone());
                continue;
            }
            let entries = fs::read_dir(path).map_err(|e| PedError::io(path, e))?;
            let mut found = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|e| PedError::io(path, e))?;
                let file = entry.path();
                let matches = file
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        self.extensions
                            .iter()
                            .any(|wanted| wanted.eq_ignore_ascii_case(ext))
                    });
                if matches && file.is_file() {
                    found.push(file);
                }
            }
            if found.is_empty() {
                warn!(directory = %path.display(), "No XLIFF files found");
            }
            found.sort();
            files.extend(found);
        }
        Ok(files)
    }
}

impl TreeProvider for XliffProvider {
    fn parse(&self, path: &Path) -> PedResult<(Document, Vec<TransUnit>)> {
        let content = fs::read_to_string(path).map_err(|e| PedError::io(path, e))?;
        let document = Document::parse_str(&content).map_err(|e| match e {
            PedError::Xml(msg) => PedError::Xml(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        let units = self.machine_translated_units(&document);
        debug!(file = %path.display(), units = units.len(), "Parsed XLIFF file");
        Ok((document, units))
    }

    fn serialize(&self, document: &Document, path: &Path) -> PedResult<()> {
        fs::write(path, document.to_xml_string()).map_err(|e| PedError::io(path, e))
    }
}
