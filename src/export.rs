//! Rendering and saving of pipeline reports.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::prelude::*;
use clap::ValueEnum;
use csv::WriterBuilder;
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::pipeline::{PipelineReport, RunStats};
use crate::topk::Selection;

/// Decimal places used for scores unless the caller asks otherwise.
pub const DEFAULT_PRECISION: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// One line per category, `category term:score ...`, then the vocabulary line.
    Txt,
    Csv,
    Tsv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        }
    }
}

/// Neutralize cells a spreadsheet would read as a formula.
pub fn csv_safe_cell(cell: String) -> String {
    match cell.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{cell}"),
        _ => cell,
    }
}

pub fn format_score(score: f64, precision: usize) -> String {
    format!("{score:.precision$}")
}

fn round_score(score: f64, precision: usize) -> f64 {
    // parsing the fixed-precision rendering keeps JSON and text output identical
    format_score(score, precision).parse().unwrap_or(score)
}

/// Text framing: `category term:score term:score ...` per category, sorted by
/// category, then one line with the space-joined vocabulary.
pub fn render_txt(selection: &Selection, precision: usize) -> String {
    let mut out = String::new();
    for (category, list) in &selection.categories {
        out.push_str(category);
        for entry in list {
            out.push(' ');
            out.push_str(&entry.term);
            out.push(':');
            out.push_str(&format_score(entry.score(), precision));
        }
        out.push('\n');
    }
    out.push_str(&selection.vocabulary.join(" "));
    out.push('\n');
    out
}

/// `category,rank,term,score` rows, rank starting at 1.
pub fn render_delimited(selection: &Selection, delimiter: u8, precision: usize) -> Result<String> {
    let mut wtr = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    wtr.write_record(["category", "rank", "term", "score"])?;
    for (category, list) in &selection.categories {
        for (rank, entry) in list.iter().enumerate() {
            wtr.write_record([
                csv_safe_cell(category.clone()),
                (rank + 1).to_string(),
                csv_safe_cell(entry.term.clone()),
                format_score(entry.score(), precision),
            ])?;
        }
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| PipelineError::io("<csv buffer>", e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Serialize)]
struct JsonTerm<'a> {
    term: &'a str,
    score: f64,
}

#[derive(Serialize)]
struct JsonCategory<'a> {
    category: &'a str,
    terms: Vec<JsonTerm<'a>>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    categories: Vec<JsonCategory<'a>>,
    vocabulary: &'a [String],
    stats: &'a RunStats,
}

pub fn render_json(report: &PipelineReport, precision: usize) -> Result<String> {
    let categories = report
        .selection
        .categories
        .iter()
        .map(|(category, list)| JsonCategory {
            category,
            terms: list
                .iter()
                .map(|e| JsonTerm {
                    term: &e.term,
                    score: round_score(e.score(), precision),
                })
                .collect(),
        })
        .collect();
    let json = JsonReport {
        categories,
        vocabulary: &report.selection.vocabulary,
        stats: &report.stats,
    };
    Ok(serde_json::to_string_pretty(&json)?)
}

pub fn render(report: &PipelineReport, format: ExportFormat, precision: usize) -> Result<String> {
    match format {
        ExportFormat::Txt => Ok(render_txt(&report.selection, precision)),
        ExportFormat::Csv => render_delimited(&report.selection, b',', precision),
        ExportFormat::Tsv => render_delimited(&report.selection, b'\t', precision),
        ExportFormat::Json => render_json(report, precision),
    }
}

/// Write the rendered report into `dir` under a timestamped name. Returns the path.
pub fn save_report(
    report: &PipelineReport,
    dir: &Path,
    format: ExportFormat,
    precision: usize,
) -> Result<PathBuf> {
    let rendered = render(report, format, precision)?;

    let local: DateTime<Local> = Local::now();
    let filename = format!(
        "{}_chi_squared.{}",
        local.format("%Y_%m_%d_%H_%M_%S"),
        format.extension()
    );
    let path = dir.join(filename);

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .map_err(|e| PipelineError::io(&path, e))?;
    file.write_all(rendered.as_bytes())
        .map_err(|e| PipelineError::io(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::pipeline::{PipelineOptions, run_pipeline};

    fn report() -> PipelineReport {
        let docs = vec![
            Document::new("A", ["x", "y"]),
            Document::new("A", ["x"]),
            Document::new("B", ["y"]),
        ];
        run_pipeline(&docs, &PipelineOptions::default()).unwrap()
    }

    #[test]
    fn txt_framing() {
        let out = render_txt(&report().selection, 5);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec!["A x:3.00000 y:0.75000", "B y:0.75000", "x y"]
        );
    }

    #[test]
    fn csv_rows_and_sanitizing() {
        let r = report();
        let out = render(&r, ExportFormat::Csv, 2).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("category,rank,term,score"));
        assert_eq!(lines.next(), Some("A,1,x,3.00"));
        assert_eq!(lines.next(), Some("A,2,y,0.75"));
        assert_eq!(lines.next(), Some("B,1,y,0.75"));

        assert_eq!(csv_safe_cell("=SUM(A1)".into()), "'=SUM(A1)");
        assert_eq!(csv_safe_cell("-x".into()), "'-x");
        assert_eq!(csv_safe_cell("'@safe".into()), "'@safe");
        assert_eq!(csv_safe_cell("plain".into()), "plain");
    }

    #[test]
    fn tsv_uses_tabs() {
        let out = render(&report(), ExportFormat::Tsv, 1).unwrap();
        assert!(out.lines().nth(1).unwrap().starts_with("A\t1\tx\t3.0"));
    }

    #[test]
    fn json_shape() {
        let out = render(&report(), ExportFormat::Json, 3).unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["categories"][0]["category"], "A");
        assert_eq!(v["categories"][0]["terms"][1]["score"], 0.75);
        assert_eq!(v["vocabulary"], serde_json::json!(["x", "y"]));
        assert_eq!(v["stats"]["aggregated"], 3);
    }

    #[test]
    fn save_writes_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_report(&report(), dir.path(), ExportFormat::Txt, 5).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_chi_squared.txt"));
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("A x:3.00000"));
    }
}
