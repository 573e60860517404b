//! Chart planning: turn a table and the user's selections into a
//! renderer-ready [`ChartPlan`].
//!
//! [`plan`] is a pure function. It never looks at anything but its arguments,
//! so the same table and selections always produce the same plan.

use crate::data::{format_date, Cell, Column, ColumnKind, Table};
use crate::labels::{cmp_ordinal, is_week_column, title_case};
use crate::xaxis::{resolve_line_axis, AxisContext, LineAxis, WEEK_COLUMN};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Ungrouped bar charts show at most this many trailing rows.
pub const RECENT_BAR_ROWS: usize = 20;
/// Number of equal-width ranges used for an ungrouped numeric pie.
pub const PIE_BUCKETS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Line,
    Bar,
    Scatter,
    Pie,
    Histogram,
    Box,
}

impl ChartKind {
    pub const ALL: [ChartKind; 6] = [
        ChartKind::Line,
        ChartKind::Bar,
        ChartKind::Scatter,
        ChartKind::Pie,
        ChartKind::Histogram,
        ChartKind::Box,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ChartKind::Line => "line",
            ChartKind::Bar => "bar",
            ChartKind::Scatter => "scatter",
            ChartKind::Pie => "pie",
            ChartKind::Histogram => "histogram",
            ChartKind::Box => "box",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown chart kind '{0}' (expected line, bar, scatter, pie, histogram or box)")]
pub struct UnknownChartKind(pub String);

impl FromStr for ChartKind {
    type Err = UnknownChartKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownChartKind(s.to_string()))
    }
}

/// What the user picked: chart kind plus the columns to plot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Selections {
    pub chart: ChartKind,
    pub primary: Option<String>,
    /// Only consulted by scatter plots
    pub secondary: Option<String>,
    pub group_by: Option<String>,
}

impl Selections {
    pub fn new(chart: ChartKind) -> Self {
        Self {
            chart,
            ..Self::default()
        }
    }

    pub fn with_primary(mut self, column: &str) -> Self {
        self.primary = Some(column.to_string());
        self
    }

    pub fn with_secondary(mut self, column: &str) -> Self {
        self.secondary = Some(column.to_string());
        self
    }

    /// Set the group-by column; "none" (any case) or an empty string clears it.
    pub fn with_group_by(mut self, column: &str) -> Self {
        self.group_by = parse_group_by(column);
        self
    }

    /// Sensible starting selections for a freshly loaded table: the first two
    /// numeric columns as metrics, grouped by a week column if there is one,
    /// otherwise by the first categorical column.
    pub fn defaults_for(table: &Table, chart: ChartKind) -> Self {
        let mut numeric = table.columns_of_kind(ColumnKind::Numeric);
        let primary = numeric.next().map(|c| c.name().to_string());
        let secondary = numeric.next().map(|c| c.name().to_string());

        let group_by = table
            .columns()
            .iter()
            .find(|c| c.name() == WEEK_COLUMN)
            .or_else(|| table.columns().iter().find(|c| c.name() == "week"))
            .or_else(|| table.first_of_kind(ColumnKind::Categorical))
            .map(|c| c.name().to_string());

        Self {
            chart,
            primary,
            secondary,
            group_by,
        }
    }
}

/// Normalize a group-by choice, mapping the "none" sentinel to `None`.
pub fn parse_group_by(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("column '{0}' is not numeric")]
    NotNumeric(String),
}

/// A single x position: a number, a point in time, or a category label.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum XValue {
    Number(f64),
    Date(NaiveDateTime),
    Label(String),
}

impl fmt::Display for XValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XValue::Number(n) => write!(f, "{}", n),
            XValue::Date(d) => f.write_str(&format_date(d)),
            XValue::Label(s) => f.write_str(s),
        }
    }
}

/// One drawable series. `x` and `y` always have the same length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: Option<String>,
    pub x: Vec<XValue>,
    pub y: Vec<f64>,
}

impl Series {
    fn new(label: Option<String>) -> Self {
        Self {
            label,
            x: Vec::new(),
            y: Vec::new(),
        }
    }

    fn push(&mut self, x: XValue, y: f64) {
        self.x.push(x);
        self.y.push(y);
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Fully resolved description of one chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPlan {
    pub kind: ChartKind,
    pub series: Vec<Series>,
    pub x_axis_label: String,
    pub y_axis_label: String,
    pub title: String,
    pub legend: bool,
}

impl ChartPlan {
    /// A plan with nothing to draw.
    pub fn empty(kind: ChartKind) -> Self {
        Self {
            kind,
            series: Vec::new(),
            x_axis_label: String::new(),
            y_axis_label: String::new(),
            title: String::new(),
            legend: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(Series::is_empty)
    }
}

/// Build the chart plan for `selections` over `table`.
///
/// A missing primary metric yields an empty plan, as does a scatter plot
/// without a secondary metric. The secondary metric is ignored by every
/// other chart kind.
pub fn plan(table: &Table, selections: &Selections) -> Result<ChartPlan, PlanError> {
    let primary = match selections.primary.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => lookup(table, name)?,
        _ => return Ok(ChartPlan::empty(selections.chart)),
    };
    let group = selections
        .group_by
        .as_deref()
        .and_then(parse_group_by)
        .map(|name| lookup(table, &name))
        .transpose()?;

    match selections.chart {
        ChartKind::Line => plan_line(table, numeric(primary)?, group),
        ChartKind::Bar => plan_bar(table, numeric(primary)?, group),
        ChartKind::Scatter => {
            let secondary = match selections.secondary.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => numeric(lookup(table, name)?)?,
                _ => return Ok(ChartPlan::empty(ChartKind::Scatter)),
            };
            plan_scatter(numeric(primary)?, secondary, group)
        }
        ChartKind::Pie => plan_pie(primary, group),
        ChartKind::Histogram => Ok(plan_histogram(numeric(primary)?)),
        ChartKind::Box => Ok(plan_box(numeric(primary)?, group)),
    }
}

fn lookup<'a>(table: &'a Table, name: &str) -> Result<&'a Column, PlanError> {
    table
        .column(name)
        .ok_or_else(|| PlanError::ColumnNotFound(name.to_string()))
}

fn numeric(column: &Column) -> Result<&Column, PlanError> {
    if column.is_numeric() {
        Ok(column)
    } else {
        Err(PlanError::NotNumeric(column.name().to_string()))
    }
}

/// Partition row indices by group value, in order of first appearance.
/// Rows with a missing group value are left out.
fn partition(group: &Column) -> Vec<(String, Vec<usize>)> {
    let mut order: Vec<(String, Vec<usize>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (row, cell) in group.cells().iter().enumerate() {
        let Some(key) = cell.label() else { continue };
        match index.get(&key) {
            Some(&slot) => order[slot].1.push(row),
            None => {
                index.insert(key.clone(), order.len());
                order.push((key, vec![row]));
            }
        }
    }
    order
}

fn sum_rows(metric: &Column, rows: &[usize]) -> f64 {
    rows.iter()
        .filter_map(|&r| metric.cells()[r].as_f64())
        .sum()
}

fn cmp_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

// =============================================================================
// Line
// =============================================================================

fn plan_line(table: &Table, metric: &Column, group: Option<&Column>) -> Result<ChartPlan, PlanError> {
    let metric_label = title_case(metric.name());
    let values = metric.cells();
    let axis = resolve_line_axis(AxisContext { table, group_by: group });
    // Week grouping plots a single ordered series instead of one per group.
    let grouped = group.filter(|_| !matches!(axis, LineAxis::WeekLabels(_)));

    let (series, x_axis_label) = match axis {
        LineAxis::WeekLabels(weeks) => {
            let mut rows: Vec<usize> = (0..table.row_count())
                .filter(|&r| !weeks.cells()[r].is_missing() && values[r].as_f64().is_some())
                .collect();
            rows.sort_by(|&a, &b| cmp_ordinal(&weeks.cells()[a].to_string(), &weeks.cells()[b].to_string()));

            let mut series = Series::new(Some(metric_label.clone()));
            for r in rows {
                if let (Some(week), Some(y)) = (weeks.cells()[r].label(), values[r].as_f64()) {
                    series.push(XValue::Label(week), y);
                }
            }
            (vec![series], title_case(weeks.name()))
        }
        LineAxis::DateColumn(dates) => {
            let build = |label: Option<String>, rows: &[usize]| {
                let mut points: Vec<(NaiveDateTime, f64)> = rows
                    .iter()
                    .filter_map(|&r| Some((dates.cells()[r].as_date()?, values[r].as_f64()?)))
                    .collect();
                points.sort_by_key(|(d, _)| *d);

                let mut series = Series::new(label);
                for (d, y) in points {
                    series.push(XValue::Date(d), y);
                }
                series
            };
            let series = match grouped {
                Some(g) => partition(g)
                    .into_iter()
                    .map(|(key, rows)| build(Some(key), &rows))
                    .collect(),
                None => {
                    let all: Vec<usize> = (0..table.row_count()).collect();
                    vec![build(None, &all)]
                }
            };
            (series, title_case(dates.name()))
        }
        LineAxis::GroupPosition(g) => {
            let series = partition(g)
                .into_iter()
                .map(|(key, rows)| {
                    let mut series = Series::new(Some(key));
                    for (pos, &r) in rows.iter().enumerate() {
                        if let Some(y) = values[r].as_f64() {
                            series.push(XValue::Number(pos as f64), y);
                        }
                    }
                    series
                })
                .collect();
            (series, "Index".to_string())
        }
        LineAxis::WeekColumn(weeks) => {
            let mut series = Series::new(None);
            for (week, cell) in weeks.cells().iter().zip(values) {
                if let (Some(week), Some(y)) = (week.label(), cell.as_f64()) {
                    series.push(XValue::Label(week), y);
                }
            }
            (vec![series], title_case(weeks.name()))
        }
        LineAxis::RowIndex => {
            let mut series = Series::new(None);
            for (r, cell) in values.iter().enumerate() {
                if let Some(y) = cell.as_f64() {
                    series.push(XValue::Number(r as f64), y);
                }
            }
            (vec![series], "Index".to_string())
        }
    };

    Ok(ChartPlan {
        kind: ChartKind::Line,
        series,
        x_axis_label,
        y_axis_label: metric_label.clone(),
        title: format!("{} Over Time", metric_label),
        legend: grouped.is_some(),
    })
}

// =============================================================================
// Bar
// =============================================================================

fn plan_bar(table: &Table, metric: &Column, group: Option<&Column>) -> Result<ChartPlan, PlanError> {
    let metric_label = title_case(metric.name());
    let values = metric.cells();

    let (series, x_axis_label, period) = match group {
        Some(g) => {
            let mut totals: Vec<(String, f64)> = partition(g)
                .into_iter()
                .map(|(key, rows)| {
                    let total = sum_rows(metric, &rows);
                    (key, total)
                })
                .collect();
            if is_week_column(g.name()) {
                totals.sort_by(|a, b| cmp_ordinal(&a.0, &b.0));
            } else {
                totals.sort_by(|a, b| cmp_desc(a.1, b.1));
            }

            let mut series = Series::new(None);
            for (key, total) in totals {
                series.push(XValue::Label(key), total);
            }
            let group_label = title_case(g.name());
            (series, group_label.clone(), group_label)
        }
        None if table.row_count() > RECENT_BAR_ROWS => {
            let start = table.row_count() - RECENT_BAR_ROWS;
            let mut series = Series::new(None);
            for (r, cell) in values.iter().enumerate().skip(start) {
                if let Some(y) = cell.as_f64() {
                    series.push(XValue::Number(r as f64), y);
                }
            }
            (series, "Recent Records".to_string(), "Period".to_string())
        }
        None => {
            let weeks = table.column(WEEK_COLUMN);
            let mut series = Series::new(None);
            for (r, cell) in values.iter().enumerate() {
                let Some(y) = cell.as_f64() else { continue };
                let x = match weeks {
                    Some(w) => XValue::Label(w.cells()[r].label().unwrap_or_default()),
                    None => XValue::Number(r as f64),
                };
                series.push(x, y);
            }
            let x_label = if weeks.is_some() { WEEK_COLUMN } else { "Records" };
            (series, x_label.to_string(), "Period".to_string())
        }
    };

    Ok(ChartPlan {
        kind: ChartKind::Bar,
        series: vec![series],
        x_axis_label,
        y_axis_label: metric_label.clone(),
        title: format!("{} by {}", metric_label, period),
        legend: false,
    })
}

// =============================================================================
// Scatter
// =============================================================================

fn plan_scatter(x_metric: &Column, y_metric: &Column, group: Option<&Column>) -> Result<ChartPlan, PlanError> {
    let build = |label: Option<String>, rows: &[usize]| {
        let mut series = Series::new(label);
        for &r in rows {
            if let (Some(x), Some(y)) = (x_metric.cells()[r].as_f64(), y_metric.cells()[r].as_f64()) {
                series.push(XValue::Number(x), y);
            }
        }
        series
    };

    let series: Vec<Series> = match group {
        Some(g) => partition(g)
            .into_iter()
            .map(|(key, rows)| build(Some(key), &rows))
            .filter(|s| !s.is_empty())
            .collect(),
        None => {
            let all: Vec<usize> = (0..x_metric.len()).collect();
            vec![build(None, &all)]
        }
    };

    let x_label = title_case(x_metric.name());
    let y_label = title_case(y_metric.name());
    Ok(ChartPlan {
        kind: ChartKind::Scatter,
        series,
        title: format!("{} vs {}", x_label, y_label),
        x_axis_label: x_label,
        y_axis_label: y_label,
        legend: group.is_some(),
    })
}

// =============================================================================
// Pie
// =============================================================================

fn plan_pie(metric: &Column, group: Option<&Column>) -> Result<ChartPlan, PlanError> {
    let metric_label = title_case(metric.name());

    let (slices, title) = match group {
        Some(g) => {
            let metric = numeric(metric)?;
            let slices: Vec<(String, f64)> = partition(g)
                .into_iter()
                .map(|(key, rows)| (key, sum_rows(metric, &rows)))
                .collect();
            (slices, format!("{} by {}", metric_label, title_case(g.name())))
        }
        None if metric.is_numeric() => {
            let values: Vec<f64> = metric.cells().iter().filter_map(Cell::as_f64).collect();
            (bucket_counts(&values), format!("{} Distribution", metric_label))
        }
        None => (value_counts(metric), format!("{} Distribution", metric_label)),
    };

    let mut series = Series::new(None);
    for (label, value) in slices {
        series.push(XValue::Label(label), value);
    }

    Ok(ChartPlan {
        kind: ChartKind::Pie,
        series: vec![series],
        x_axis_label: String::new(),
        y_axis_label: String::new(),
        title,
        legend: false,
    })
}

/// Count each distinct value, most frequent first; ties keep first-seen order.
fn value_counts(column: &Column) -> Vec<(String, f64)> {
    let mut counts: Vec<(String, f64)> = partition(column)
        .into_iter()
        .map(|(key, rows)| (key, rows.len() as f64))
        .collect();
    counts.sort_by(|a, b| cmp_desc(a.1, b.1));
    counts
}

/// Split values into `PIE_BUCKETS` equal-width, right-closed ranges over
/// [min, max] and count each non-empty range. The first range also
/// includes `min`.
fn bucket_counts(values: &[f64]) -> Vec<(String, f64)> {
    let Some(min) = values.iter().copied().reduce(f64::min) else {
        return Vec::new();
    };
    let max = values.iter().copied().fold(min, f64::max);

    if min == max {
        return vec![(format!("[{}, {}]", fmt_edge(min), fmt_edge(max)), values.len() as f64)];
    }

    let width = (max - min) / PIE_BUCKETS as f64;
    let mut counts = [0usize; PIE_BUCKETS];
    for &v in values {
        let slot = ((v - min) / width).ceil() as isize - 1;
        counts[slot.clamp(0, PIE_BUCKETS as isize - 1) as usize] += 1;
    }

    counts
        .iter()
        .enumerate()
        .filter(|(_, n)| **n > 0)
        .map(|(i, &n)| {
            let lo = min + width * i as f64;
            let hi = if i + 1 == PIE_BUCKETS { max } else { min + width * (i + 1) as f64 };
            let open = if i == 0 { '[' } else { '(' };
            (format!("{}{}, {}]", open, fmt_edge(lo), fmt_edge(hi)), n as f64)
        })
        .collect()
}

fn fmt_edge(v: f64) -> String {
    let s = format!("{:.2}", v);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

// =============================================================================
// Histogram & Box
// =============================================================================

fn plan_histogram(metric: &Column) -> ChartPlan {
    let metric_label = title_case(metric.name());
    let mut series = Series::new(None);
    for (r, cell) in metric.cells().iter().enumerate() {
        if let Some(v) = cell.as_f64() {
            series.push(XValue::Number(r as f64), v);
        }
    }

    ChartPlan {
        kind: ChartKind::Histogram,
        series: vec![series],
        x_axis_label: metric_label.clone(),
        y_axis_label: "Frequency".to_string(),
        title: format!("{} Histogram", metric_label),
        legend: false,
    }
}

fn plan_box(metric: &Column, group: Option<&Column>) -> ChartPlan {
    let metric_label = title_case(metric.name());
    let build = |label: String, rows: &[usize]| {
        let mut series = Series::new(Some(label.clone()));
        for &r in rows {
            if let Some(v) = metric.cells()[r].as_f64() {
                series.push(XValue::Label(label.clone()), v);
            }
        }
        series
    };

    let (series, x_axis_label) = match group {
        Some(g) => {
            let series = partition(g)
                .into_iter()
                .map(|(key, rows)| build(key, &rows))
                .filter(|s| !s.is_empty())
                .collect();
            (series, title_case(g.name()))
        }
        None => {
            let all: Vec<usize> = (0..metric.len()).collect();
            (vec![build(metric_label.clone(), &all)], String::new())
        }
    };

    ChartPlan {
        kind: ChartKind::Box,
        series,
        x_axis_label,
        y_axis_label: metric_label.clone(),
        title: format!("{} Box Plot", metric_label),
        legend: false,
    }
}
