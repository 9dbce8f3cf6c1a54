//! Input model: category-labeled documents read from JSON Lines files.
//!
//! Tokenization, case folding and stopword removal happen upstream; each line is
//! already `{"category": "...", "tokens": ["...", ...]}`.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};

/// One labeled document. Only term presence matters, so terms are a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(
        default,
        rename = "tokens",
        alias = "terms",
        deserialize_with = "null_as_default"
    )]
    pub terms: BTreeSet<String>,
}

/// `null` reads like a missing field, so it surfaces as a [`Malformed`] document
/// instead of an unparsable line.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Why a document was left out of aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    MissingCategory,
    EmptyTerms,
}

impl Document {
    pub fn new<C, I, T>(category: C, terms: I) -> Self
    where
        C: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Document {
            category: category.into(),
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }

    /// `None` if the document can be aggregated.
    pub fn defect(&self) -> Option<Malformed> {
        if self.category.is_empty() {
            Some(Malformed::MissingCategory)
        } else if self.terms.is_empty() {
            Some(Malformed::EmptyTerms)
        } else {
            None
        }
    }
}

/// Documents parsed from one or more files, plus what had to be skipped.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    /// Lines that were not valid document JSON.
    pub malformed_lines: usize,
    /// Files that could not be read at all, with the reason.
    pub failed_files: Vec<(String, String)>,
}

/// Parse a JSON Lines file. Blank lines are ignored; unparsable lines, including
/// lines that are not valid UTF-8, are counted and skipped.
pub fn read_documents(path: &Path) -> Result<(Vec<Document>, usize)> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut documents = Vec::new();
    let mut malformed = 0usize;
    for (line_no, line) in reader.split(b'\n').enumerate() {
        let line = line.map_err(|e| PipelineError::io(path, e))?;
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_slice::<Document>(trimmed) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                warn!("{}:{}: skipping malformed line: {}", path.display(), line_no + 1, e);
                malformed += 1;
            }
        }
    }
    debug!(
        "{}: {} documents, {} malformed lines",
        path.display(),
        documents.len(),
        malformed
    );
    Ok((documents, malformed))
}

/// A file yields itself; a directory yields every `.json`/`.jsonl` file below it, sorted.
pub fn collect_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("jsonl"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Load every input file under `path` into one corpus.
///
/// A file that cannot be read is recorded in [`LoadReport::failed_files`] and the
/// rest of the corpus still loads. Finding no files at all is an error.
pub fn load_corpus(path: &Path) -> Result<LoadReport> {
    let files = collect_files(path);
    if files.is_empty() {
        return Err(PipelineError::NoInput(path.to_path_buf()));
    }

    let mut report = LoadReport::default();
    for file in files {
        match read_documents(&file) {
            Ok((docs, malformed)) => {
                report.documents.extend(docs);
                report.malformed_lines += malformed;
            }
            Err(e) => {
                warn!("Failed to read {}: {}", file.display(), e);
                report
                    .failed_files
                    .push((file.display().to_string(), e.to_string()));
            }
        }
    }
    Ok(report)
}
