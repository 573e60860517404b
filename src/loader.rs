//! Data loading: delimited text, JSON documents, and the default source.
//!
//! Every entry point returns a fully typed [`Table`]; column kinds are
//! resolved here once and never re-inferred by the planner.

use crate::config::DashboardConfig;
use crate::data::{RawRecords, Table};
use crate::sample;
use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Keys searched, in order, for an array of records inside a JSON object.
const RECORD_KEYS: &[&str] = &["metrics", "data", "rows", "items", "records", "results"];

/// CSV file name never picked up by discovery.
const IGNORED_CSV: &str = "sample_data.csv";

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} contains no records")]
    Empty(String),

    #[error("unsupported document shape: {0}")]
    UnsupportedShape(String),
}

/// On-disk encodings the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Delimited text; `None` detects the delimiter from the content
    Delimited(Option<u8>),
    Json,
}

impl Format {
    /// Pick a format from the file extension, sniffing the content when the
    /// extension is unknown.
    pub fn detect(path: Option<&Path>, content: &str) -> Self {
        let ext = path
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Format::Json,
            Some("tsv") => Format::Delimited(Some(b'\t')),
            Some("csv") | Some("txt") => Format::Delimited(None),
            _ => match content.trim_start().chars().next() {
                Some('{') | Some('[') => Format::Json,
                _ => Format::Delimited(None),
            },
        }
    }
}

/// A loaded table together with a short description of where it came from.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub table: Table,
    pub label: String,
}

/// Load a data file, choosing the parser from its extension or content.
pub fn load(path: &Path) -> Result<Loaded, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let format = Format::detect(Some(path), &content);
    let label = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("data")
        .to_string();

    debug!(path = %path.display(), ?format, "loading data file");
    let table = load_str(&content, format, &label)?;
    info!(
        source = %label,
        rows = table.row_count(),
        columns = table.column_count(),
        "loaded table"
    );
    Ok(Loaded { table, label })
}

/// Parse in-memory content. `label` names the source in error messages.
pub fn load_str(content: &str, format: Format, label: &str) -> Result<Table, LoadError> {
    let records = match format {
        Format::Json => parse_json(content)?,
        Format::Delimited(delimiter) => {
            let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(content));
            parse_delimited(content, delimiter)?
        }
    };

    if records.headers.is_empty() || records.rows.is_empty() {
        return Err(LoadError::Empty(label.to_string()));
    }
    Ok(Table::from_raw(records))
}

/// Read delimited text with a header row.
pub fn parse_delimited(content: &str, delimiter: u8) -> Result<RawRecords, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(String::from).collect());
    }

    Ok(RawRecords::new(headers, rows))
}

/// Choose the delimiter that appears most often in the first lines.
/// Ties fall back to a comma.
pub fn detect_delimiter(content: &str) -> u8 {
    let head: String = content.lines().take(5).collect::<Vec<_>>().join("\n");
    let comma = head.matches(',').count();
    let tab = head.matches('\t').count();
    let semicolon = head.matches(';').count();

    if tab > comma && tab > semicolon {
        b'\t'
    } else if semicolon > comma && semicolon > tab {
        b';'
    } else {
        b','
    }
}

/// Read a JSON document into records: a named array of records, a bare array
/// of records, or a single object as one row.
pub fn parse_json(content: &str) -> Result<RawRecords, LoadError> {
    let value: Value = serde_json::from_str(content)?;
    match &value {
        Value::Array(items) => records_from_array(items),
        Value::Object(obj) => match record_array(obj) {
            Some(items) => records_from_array(items),
            None => Ok(RawRecords::from_json_object(obj)),
        },
        _ => Err(LoadError::UnsupportedShape(
            "expected an object or an array of objects".to_string(),
        )),
    }
}

fn records_from_array(items: &[Value]) -> Result<RawRecords, LoadError> {
    RawRecords::from_json_records(items).ok_or_else(|| {
        LoadError::UnsupportedShape("array elements must be objects".to_string())
    })
}

/// Find the field holding the records: a well-known key first, then any
/// field whose value is a non-empty array of objects. An empty array under a
/// well-known key is used only when no other field holds records.
fn record_array(obj: &Map<String, Value>) -> Option<&Vec<Value>> {
    let known = || RECORD_KEYS.iter().filter_map(|key| obj.get(*key).and_then(Value::as_array));
    known()
        .find(|items| is_record_array(items))
        .or_else(|| {
            obj.values()
                .filter_map(Value::as_array)
                .find(|items| is_record_array(items))
        })
        .or_else(|| known().find(|items| items.is_empty()))
}

fn is_record_array(items: &[Value]) -> bool {
    !items.is_empty() && items.iter().all(Value::is_object)
}

/// List `*.csv` files in `dir`, sorted by name. Unreadable directories yield
/// an empty list.
pub fn discover_csv_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot scan for CSV files");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .filter(|path| path.file_name().and_then(|n| n.to_str()) != Some(IGNORED_CSV))
        .collect();
    files.sort();
    files
}

/// Load whatever the data directory offers: the first discovered CSV file,
/// then the metrics document, and finally a freshly synthesized sample which
/// is written out as the metrics document for future loads.
pub fn load_default(config: &DashboardConfig, now: DateTime<Local>) -> Result<Loaded, LoadError> {
    if let Some(first) = discover_csv_files(&config.data_dir).into_iter().next() {
        return load(&first);
    }

    let metrics_path = config.metrics_path();
    if metrics_path.exists() {
        return load(&metrics_path);
    }

    info!(path = %metrics_path.display(), "no data found, synthesizing sample metrics");
    let doc = sample::generate(now, config.sample_seed);
    let text = serde_json::to_string_pretty(&doc)?;
    if let Err(e) = std::fs::write(&metrics_path, &text) {
        warn!(path = %metrics_path.display(), error = %e, "could not persist sample metrics");
    }

    let table = load_str(&text, Format::Json, &config.metrics_file)?;
    Ok(Loaded {
        table,
        label: config.metrics_file.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Cell, ColumnKind};

    #[test]
    fn test_detect_format() {
        assert_eq!(Format::detect(Some(Path::new("a.json")), ""), Format::Json);
        assert_eq!(Format::detect(Some(Path::new("a.TSV")), ""), Format::Delimited(Some(b'\t')));
        assert_eq!(Format::detect(Some(Path::new("a.csv")), "[1]"), Format::Delimited(None));
        assert_eq!(Format::detect(None, "  [{\"a\": 1}]"), Format::Json);
        assert_eq!(Format::detect(Some(Path::new("data")), "a,b\n1,2"), Format::Delimited(None));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), b',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), b'\t');
        assert_eq!(detect_delimiter("a;b;c\n1,5;2;3"), b';');
    }

    #[test]
    fn test_load_csv_infers_kinds() {
        let csv = "Week,date,revenue,region\nWeek 1,2024-01-01,100,North\nWeek 2,2024-01-08,,South\n";
        let table = load_str(csv, Format::Delimited(None), "inline").unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("Week").unwrap().kind(), ColumnKind::Categorical);
        assert_eq!(table.column("date").unwrap().kind(), ColumnKind::Date);
        assert_eq!(table.column("revenue").unwrap().kind(), ColumnKind::Numeric);
        assert_eq!(table.column("revenue").unwrap().cells()[1], Cell::Missing);
    }

    #[test]
    fn test_load_csv_short_row_is_padded() {
        let table = load_str("a,b,c\n1,2,x\n3\n4,5,y,extra\n", Format::Delimited(None), "inline").unwrap();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column_names(), vec!["a", "b", "c"]);
        assert_eq!(table.column("b").unwrap().kind(), ColumnKind::Numeric);
        assert_eq!(table.column("b").unwrap().cells()[1], Cell::Missing);
        assert_eq!(table.column("c").unwrap().cells()[1], Cell::Missing);
        assert_eq!(table.column("b").unwrap().cells()[2], Cell::Number(5.0));
    }

    #[test]
    fn test_load_csv_header_only_is_empty() {
        let result = load_str("x,y\n", Format::Delimited(None), "inline.csv");
        let err = result.unwrap_err();
        assert!(matches!(err, LoadError::Empty(_)));
        assert!(err.to_string().contains("inline.csv"));
    }

    #[test]
    fn test_json_named_field() {
        let doc = r#"{"metadata": {"source": "x"}, "metrics": [{"date": "2024-01-01", "revenue": 100}]}"#;
        let table = load_str(doc, Format::Json, "doc").unwrap();
        assert_eq!(table.column_names(), vec!["date", "revenue"]);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_json_any_record_field() {
        let doc = r#"{"name": "export", "entries": [{"v": 1}, {"v": 2}]}"#;
        let table = load_str(doc, Format::Json, "doc").unwrap();
        assert_eq!(table.column_names(), vec!["v"]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_json_known_key_without_records_falls_through() {
        let doc = r#"{"data": [1, 2], "entries": [{"v": 1}, {"v": 2}]}"#;
        let table = load_str(doc, Format::Json, "doc").unwrap();
        assert_eq!(table.column_names(), vec!["v"]);
        assert_eq!(table.row_count(), 2);

        let doc = r#"{"data": [], "metrics_v2": [{"v": 1}]}"#;
        let table = load_str(doc, Format::Json, "doc").unwrap();
        assert_eq!(table.column_names(), vec!["v"]);
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_json_bare_array() {
        let table = load_str(r#"[{"a": 1}, {"a": 2}, {"a": 3}]"#, Format::Json, "doc").unwrap();
        assert_eq!(table.row_count(), 3);
    }

    #[test]
    fn test_json_single_object() {
        let table = load_str(r#"{"a": 1, "b": "x"}"#, Format::Json, "doc").unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.column_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_json_errors() {
        assert!(matches!(load_str("{not json", Format::Json, "doc"), Err(LoadError::Json(_))));
        assert!(matches!(load_str("42", Format::Json, "doc"), Err(LoadError::UnsupportedShape(_))));
        assert!(matches!(load_str("[1, 2]", Format::Json, "doc"), Err(LoadError::UnsupportedShape(_))));
        assert!(matches!(load_str(r#"{"metrics": []}"#, Format::Json, "doc"), Err(LoadError::Empty(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load(Path::new("/nonexistent/metrics.json")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/metrics.json"));
    }
}
