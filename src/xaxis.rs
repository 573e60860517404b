// X-axis selection for line charts.
//
// Rules are tried in order; the first one that matches decides the axis.
// Anything left over falls back to the row index.

use crate::data::{Column, ColumnKind, Table};
use crate::labels;

/// Name of the column used for week tick labels when nothing is grouped.
pub const WEEK_COLUMN: &str = "Week";

#[derive(Debug, Clone, Copy)]
pub struct AxisContext<'a> {
    pub table: &'a Table,
    pub group_by: Option<&'a Column>,
}

/// Where a line chart takes its x values from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineAxis<'a> {
    /// Group-by names the week column: one series, ordered by week number
    WeekLabels(&'a Column),
    /// Parsed dates from the first date-like column
    DateColumn(&'a Column),
    /// One series per group, x is the row position within the group
    GroupPosition(&'a Column),
    /// Ungrouped data with a `Week` column: its labels in row order
    WeekColumn(&'a Column),
    RowIndex,
}

pub type AxisRule = for<'a> fn(AxisContext<'a>) -> Option<LineAxis<'a>>;

pub const LINE_RULES: &[(&str, AxisRule)] = &[
    ("week labels", week_labels),
    ("date column", date_column),
    ("group position", group_position),
    ("week column", week_column),
];

pub fn resolve_line_axis(ctx: AxisContext<'_>) -> LineAxis<'_> {
    LINE_RULES
        .iter()
        .find_map(|(_, rule)| rule(ctx))
        .unwrap_or(LineAxis::RowIndex)
}

fn week_labels(ctx: AxisContext<'_>) -> Option<LineAxis<'_>> {
    ctx.group_by
        .filter(|g| labels::is_week_column(g.name()))
        .map(LineAxis::WeekLabels)
}

fn date_column(ctx: AxisContext<'_>) -> Option<LineAxis<'_>> {
    ctx.table.first_of_kind(ColumnKind::Date).map(LineAxis::DateColumn)
}

fn group_position(ctx: AxisContext<'_>) -> Option<LineAxis<'_>> {
    ctx.group_by.map(LineAxis::GroupPosition)
}

fn week_column(ctx: AxisContext<'_>) -> Option<LineAxis<'_>> {
    ctx.table.column(WEEK_COLUMN).map(LineAxis::WeekColumn)
}
