use crate::RenderOptions;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Settings for a dashboard session. Every field has a default, so a config
/// file only needs the keys it wants to change.
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Directory searched for CSV files and holding the default metrics document
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_metrics_file")]
    pub metrics_file: String,
    /// Seed for the synthesized sample data
    #[serde(default = "default_seed")]
    pub sample_seed: u64,
    #[serde(default)]
    pub render: RenderOptions,
}

fn default_data_dir() -> PathBuf { PathBuf::from(".") }
fn default_metrics_file() -> String { "metrics.json".to_string() }
fn default_seed() -> u64 { 42 }

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            metrics_file: default_metrics_file(),
            sample_seed: default_seed(),
            render: RenderOptions::default(),
        }
    }
}

impl DashboardConfig {
    /// Read a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.data_dir.join(&self.metrics_file)
    }
}
