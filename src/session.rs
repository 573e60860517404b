//! Dashboard session state: the current table, the user's selections and the
//! last chart that planned successfully.

use crate::config::DashboardConfig;
use crate::data::Table;
use crate::loader::{self, LoadError, Loaded};
use crate::plan::{self, ChartKind, ChartPlan, PlanError, Selections};
use chrono::{DateTime, Local};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct Session {
    table: Option<Table>,
    source: Option<String>,
    selections: Selections,
    last_plan: Option<ChartPlan>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> Option<&Table> {
        self.table.as_ref()
    }

    /// Short description of where the current table came from.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn selections(&self) -> &Selections {
        &self.selections
    }

    pub fn last_plan(&self) -> Option<&ChartPlan> {
        self.last_plan.as_ref()
    }

    /// Load a data file, replacing the current table. On failure the
    /// existing table and selections stay as they were.
    pub fn load_file(&mut self, path: &Path) -> Result<&Table, LoadError> {
        match loader::load(path) {
            Ok(loaded) => Ok(self.install(loaded)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "load failed, keeping current data");
                Err(e)
            }
        }
    }

    /// Load the default source for `config`; see [`loader::load_default`].
    pub fn load_default(
        &mut self,
        config: &DashboardConfig,
        now: DateTime<Local>,
    ) -> Result<&Table, LoadError> {
        match loader::load_default(config, now) {
            Ok(loaded) => Ok(self.install(loaded)),
            Err(e) => {
                warn!(error = %e, "default load failed, keeping current data");
                Err(e)
            }
        }
    }

    /// Swap in a freshly loaded table and reset selections to its defaults,
    /// keeping the chart kind.
    fn install(&mut self, loaded: Loaded) -> &Table {
        let Loaded { table, label } = loaded;
        self.selections = Selections::defaults_for(&table, self.selections.chart);
        self.last_plan = None;
        info!(
            source = %label,
            rows = table.row_count(),
            columns = table.column_count(),
            primary = ?self.selections.primary,
            group_by = ?self.selections.group_by,
            "session data replaced"
        );
        self.source = Some(label);
        self.table.insert(table)
    }

    pub fn set_chart(&mut self, chart: ChartKind) {
        self.selections.chart = chart;
    }

    /// Replace the selections wholesale.
    pub fn select(&mut self, selections: Selections) {
        self.selections = selections;
    }

    /// Plan the current selections. Without a table the result is an empty
    /// plan. On error the previously planned chart is kept.
    pub fn replan(&mut self) -> Result<&ChartPlan, PlanError> {
        let planned = match &self.table {
            Some(table) => plan::plan(table, &self.selections),
            None => Ok(ChartPlan::empty(self.selections.chart)),
        };

        match planned {
            Ok(p) => {
                debug!(kind = %p.kind, series = p.series.len(), "planned chart");
                let p: &ChartPlan = self.last_plan.insert(p);
                Ok(p)
            }
            Err(e) => {
                warn!(error = %e, "planning failed, keeping previous chart");
                Err(e)
            }
        }
    }
}
