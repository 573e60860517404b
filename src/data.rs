use crate::labels;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Raw cell values treated as missing when inferring and parsing columns.
pub const MISSING_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "<NA>", "#N/A",
];

/// Untyped records straight out of a file: one header row plus string cells.
#[derive(Debug, Clone, Default)]
pub struct RawRecords {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawRecords {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Flatten a slice of JSON objects into records. Columns are the union of
    /// the object keys in first-seen order; absent keys become empty cells.
    /// Returns `None` if any element is not an object.
    pub fn from_json_records(items: &[Value]) -> Option<Self> {
        let mut headers: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for item in items {
            for key in item.as_object()?.keys() {
                if seen.insert(key.as_str()) {
                    headers.push(key.clone());
                }
            }
        }

        let rows = items
            .iter()
            .filter_map(Value::as_object)
            .map(|obj| record_cells(obj, &headers))
            .collect();

        Some(Self { headers, rows })
    }

    /// Wrap a single JSON object as a one-row record set.
    pub fn from_json_object(obj: &Map<String, Value>) -> Self {
        let headers: Vec<String> = obj.keys().cloned().collect();
        let row = record_cells(obj, &headers);
        Self {
            headers,
            rows: vec![row],
        }
    }
}

fn record_cells(obj: &Map<String, Value>, headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .map(|header| match obj.get(header) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Null) | None => String::new(),
            Some(nested) => nested.to_string(),
        })
        .collect()
}

/// Kind of a column, resolved once when the table is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Date,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Date => "date",
        };
        f.write_str(name)
    }
}

/// A typed cell. The variant always agrees with the owning column's kind,
/// except for `Missing` which may appear in any column.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
    Date(NaiveDateTime),
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Display text for a present cell, `None` when missing.
    pub fn label(&self) -> Option<String> {
        if self.is_missing() {
            None
        } else {
            Some(self.to_string())
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Missing => f.write_str("NaN"),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => f.write_str(s),
            Cell::Date(d) => f.write_str(&format_date(d)),
        }
    }
}

/// Render a date/time without a time part when it falls on midnight.
pub fn format_date(d: &NaiveDateTime) -> String {
    if d.time() == chrono::NaiveTime::MIN {
        d.format("%Y-%m-%d").to_string()
    } else {
        d.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

pub fn is_missing(raw: &str) -> bool {
    let trimmed = raw.trim();
    MISSING_MARKERS.contains(&trimmed)
}

/// Parse a finite number. `inf` and `NaN` spellings are not numbers here.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parse the date and date/time spellings the loader understands.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Infer the kind of a column from its name and raw values.
///
/// Numeric wins when every present value is a number. Otherwise the column is
/// date-like when every present value is a date, or when the name carries a
/// `date` word and at least one value parses. Everything else is categorical.
pub fn infer_kind<S: AsRef<str>>(name: &str, values: &[S]) -> ColumnKind {
    let present: Vec<&str> = values
        .iter()
        .map(|v| v.as_ref())
        .filter(|v| !is_missing(v))
        .collect();

    if present.is_empty() {
        return ColumnKind::Categorical;
    }
    if present.iter().all(|v| parse_number(v).is_some()) {
        return ColumnKind::Numeric;
    }

    let dates = present.iter().filter(|v| parse_date(v).is_some()).count();
    if dates == present.len() || (dates > 0 && labels::has_date_token(name)) {
        return ColumnKind::Date;
    }
    ColumnKind::Categorical
}

fn parse_cell(raw: &str, kind: ColumnKind) -> Cell {
    if is_missing(raw) {
        return Cell::Missing;
    }
    match kind {
        ColumnKind::Numeric => parse_number(raw).map(Cell::Number).unwrap_or(Cell::Missing),
        ColumnKind::Date => parse_date(raw).map(Cell::Date).unwrap_or(Cell::Missing),
        ColumnKind::Categorical => Cell::Text(raw.trim().to_string()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    kind: ColumnKind,
    cells: Vec<Cell>,
}

impl Column {
    /// Build a column from raw strings, inferring its kind.
    pub fn from_raw<S: AsRef<str>>(name: impl Into<String>, values: &[S]) -> Self {
        let name = name.into();
        let kind = infer_kind(&name, values);
        let cells = values.iter().map(|v| parse_cell(v.as_ref(), kind)).collect();
        Self { name, kind, cells }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == ColumnKind::Numeric
    }

    /// Re-run kind inference over the column's current contents.
    pub fn reinfer_kind(&self) -> ColumnKind {
        let raw: Vec<String> = self
            .cells
            .iter()
            .map(|c| c.label().unwrap_or_default())
            .collect();
        infer_kind(&self.name, &raw)
    }

    pub fn mean(&self) -> Option<f64> {
        let values: Vec<f64> = self.cells.iter().filter_map(Cell::as_f64).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

/// In-memory columnar table. All columns have the same length and unique names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Build a typed table from raw records. Short rows are padded with
    /// missing cells, long rows truncated, and duplicate headers renamed
    /// `name.1`, `name.2`, ...
    pub fn from_raw(raw: RawRecords) -> Self {
        let headers = dedupe_headers(&raw.headers);
        let rows = raw.rows.len();
        let columns = headers
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let values: Vec<&str> = raw
                    .rows
                    .iter()
                    .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                    .collect();
                Column::from_raw(name, &values)
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns_of_kind(&self, kind: ColumnKind) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(move |c| c.kind == kind)
    }

    pub fn first_of_kind(&self, kind: ColumnKind) -> Option<&Column> {
        self.columns_of_kind(kind).next()
    }
}

fn dedupe_headers(headers: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    headers
        .iter()
        .map(|h| {
            let base = h.trim().to_string();
            let mut name = base.clone();
            let mut n = 1;
            while taken.contains(&name) {
                name = format!("{}.{}", base, n);
                n += 1;
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(headers: &[&str], rows: &[&[&str]]) -> RawRecords {
        RawRecords::new(
            headers.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_infer_numeric_with_missing() {
        assert_eq!(infer_kind("revenue", &["1", "", "2.5", "NA"]), ColumnKind::Numeric);
    }

    #[test]
    fn test_infer_date_by_values() {
        assert_eq!(infer_kind("when", &["2024-01-01", "2024-01-02"]), ColumnKind::Date);
    }

    #[test]
    fn test_infer_date_by_name_with_partial_values() {
        assert_eq!(infer_kind("order_date", &["2024-01-01", "soon"]), ColumnKind::Date);
        assert_eq!(infer_kind("status", &["2024-01-01", "soon"]), ColumnKind::Categorical);
    }

    #[test]
    fn test_infer_date_name_alone_is_not_enough() {
        assert_eq!(infer_kind("candidate", &["alice", "bob"]), ColumnKind::Categorical);
        assert_eq!(infer_kind("date", &["alice", "bob"]), ColumnKind::Categorical);
    }

    #[test]
    fn test_infer_all_missing_is_categorical() {
        assert_eq!(infer_kind("x", &["", "NaN"]), ColumnKind::Categorical);
    }

    #[test]
    fn test_non_finite_tokens_are_not_numbers() {
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("-Infinity"), None);
        assert_eq!(parse_number("NAN"), None);
        assert_eq!(parse_number(" 1e3 "), Some(1000.0));
        assert_eq!(infer_kind("score", &["1", "inf", "2"]), ColumnKind::Categorical);
    }

    #[test]
    fn test_numeric_beats_date_name() {
        assert_eq!(infer_kind("date", &["20240101", "20240102"]), ColumnKind::Numeric);
    }

    #[test]
    fn test_reinfer_is_stable() {
        let table = Table::from_raw(raw(
            &["date", "Week", "revenue"],
            &[&["2024-01-01", "Week 1", "10"], &["2024-01-08", "Week 2", ""]],
        ));
        for column in table.columns() {
            assert_eq!(column.reinfer_kind(), column.kind());
        }
    }

    #[test]
    fn test_from_raw_pads_and_dedupes() {
        let table = Table::from_raw(raw(&["a", "a", "b"], &[&["1", "2"], &["3", "4", "x"]]));
        assert_eq!(table.column_names(), vec!["a", "a.1", "b"]);
        assert_eq!(table.row_count(), 2);
        for column in table.columns() {
            assert_eq!(column.len(), 2);
        }
        assert_eq!(table.column("b").unwrap().cells()[0], Cell::Missing);
    }

    #[test]
    fn test_from_json_records_unions_keys() {
        let items = vec![
            json!({"date": "2024-01-01", "revenue": 100}),
            json!({"date": "2024-01-02", "users": 3, "flag": true, "tags": [1, 2]}),
        ];
        let records = RawRecords::from_json_records(&items).unwrap();
        assert_eq!(records.headers, vec!["date", "revenue", "users", "flag", "tags"]);
        assert_eq!(records.rows[0], vec!["2024-01-01", "100", "", "", ""]);
        assert_eq!(records.rows[1], vec!["2024-01-02", "", "3", "true", "[1,2]"]);
    }

    #[test]
    fn test_from_json_records_rejects_scalars() {
        let items = vec![json!({"a": 1}), json!(5)];
        assert!(RawRecords::from_json_records(&items).is_none());
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(Cell::Number(100.0).to_string(), "100");
        assert_eq!(Cell::Number(0.15).to_string(), "0.15");
        let d = parse_date("2024-01-02").unwrap();
        assert_eq!(Cell::Date(d).to_string(), "2024-01-02");
        let dt = parse_date("2024-01-02T10:30:00").unwrap();
        assert_eq!(Cell::Date(dt).to_string(), "2024-01-02 10:30:00");
    }

    #[test]
    fn test_mean_skips_missing() {
        let column = Column::from_raw("v", &["1", "", "3"]);
        assert_eq!(column.mean(), Some(2.0));
    }
}
