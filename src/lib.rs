// Library exports for dashplot

pub mod config;
pub mod data;
pub mod export;
pub mod graph;
pub mod labels;
pub mod loader;
pub mod plan;
pub mod sample;
pub mod session;
pub mod summary;
pub mod xaxis;

pub use config::DashboardConfig;
pub use data::{Cell, Column, ColumnKind, Table};
pub use loader::LoadError;
pub use plan::{plan, ChartKind, ChartPlan, PlanError, Selections, Series, XValue};
pub use session::Session;

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum OutputFormat {
    #[serde(rename = "png")]
    #[default]
    Png,
    #[serde(rename = "svg")]
    Svg,
    #[serde(rename = "pdf")]
    Pdf,
}

impl OutputFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
            OutputFormat::Pdf => "pdf",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unsupported output format '{0}' (expected png, svg or pdf)")]
pub struct UnknownFormat(pub String);

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "svg" => Ok(OutputFormat::Svg),
            "pdf" => Ok(OutputFormat::Pdf),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Figure geometry. Width and height are in inches.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderOptions {
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    /// Forces the output format regardless of the target extension
    #[serde(default, rename = "type")]
    pub format: Option<OutputFormat>,
}

fn default_width() -> f64 { 8.0 }
fn default_height() -> f64 { 6.0 }
fn default_dpi() -> u32 { 300 }

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            dpi: default_dpi(),
            format: None,
        }
    }
}

impl RenderOptions {
    /// Figure size in pixels at the configured resolution.
    pub fn pixel_size(&self) -> (u32, u32) {
        let dpi = self.dpi as f64;
        (
            (self.width * dpi).round().max(1.0) as u32,
            (self.height * dpi).round().max(1.0) as u32,
        )
    }

    /// Drawing scale relative to a 100 DPI baseline, used for fonts and strokes.
    pub fn scale(&self) -> f64 {
        (self.dpi as f64 / 100.0).max(0.1)
    }

    /// Output format for `path`: the explicit override, then the extension,
    /// then PNG.
    pub fn format_for(&self, path: &Path) -> OutputFormat {
        self.format
            .or_else(|| OutputFormat::from_path(path))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pixel_size() {
        assert_eq!(RenderOptions::default().pixel_size(), (2400, 1800));
    }

    #[test]
    fn test_format_for_path() {
        let opts = RenderOptions::default();
        assert_eq!(opts.format_for(Path::new("chart.PDF")), OutputFormat::Pdf);
        assert_eq!(opts.format_for(Path::new("chart.svg")), OutputFormat::Svg);
        assert_eq!(opts.format_for(Path::new("chart")), OutputFormat::Png);

        let forced = RenderOptions {
            format: Some(OutputFormat::Svg),
            ..RenderOptions::default()
        };
        assert_eq!(forced.format_for(Path::new("chart.png")), OutputFormat::Svg);
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("Png".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert!("gif".parse::<OutputFormat>().is_err());
    }
}
