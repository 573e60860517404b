use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use dashplot::plan::parse_group_by;
use dashplot::{export, loader, sample, summary};
use dashplot::{ChartKind, DashboardConfig, OutputFormat, Selections, Session};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "dashplot")]
#[command(about = "Plan and render dashboard charts from CSV or JSON metrics", long_about = None)]
struct Args {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory searched for data files (overrides the config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct ChartArgs {
    /// Data file; defaults to the first CSV in the data directory, then the metrics document
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// line, bar, scatter, pie, histogram or box
    #[arg(short, long, default_value = "line")]
    chart: ChartKind,

    /// Primary metric column
    #[arg(short, long)]
    primary: Option<String>,

    /// Secondary metric column (scatter only)
    #[arg(short, long)]
    secondary: Option<String>,

    /// Group-by column, or "none"
    #[arg(short, long)]
    group_by: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a chart to PNG, SVG or PDF
    Plot {
        #[command(flatten)]
        chart: ChartArgs,

        /// Output file; the extension picks the format
        #[arg(short, long)]
        output: PathBuf,

        /// Force the output format
        #[arg(long)]
        format: Option<OutputFormat>,

        /// Override the configured resolution
        #[arg(long)]
        dpi: Option<u32>,
    },
    /// Print the chart plan as JSON
    Plan {
        #[command(flatten)]
        chart: ChartArgs,
    },
    /// Print a data preview and summary statistics
    Preview {
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// List CSV files found in the data directory
    Files,
    /// Write a synthesized sample metrics document
    Sample {
        /// Defaults to the configured metrics file
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dashplot=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DashboardConfig::from_file(path)?,
        None => DashboardConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    match args.command {
        Command::Plot {
            chart,
            output,
            format,
            dpi,
        } => {
            let session = planned_session(&config, &chart)?;
            let plan = session.last_plan().context("No chart was planned")?;

            let mut options = config.render.clone();
            if format.is_some() {
                options.format = format;
            }
            if let Some(dpi) = dpi {
                options.dpi = dpi;
            }
            let format = export::export(plan, &output, &options)
                .with_context(|| format!("Failed to export chart to {}", output.display()))?;
            println!("Wrote {} chart to {}", format.extension(), output.display());
        }
        Command::Plan { chart } => {
            let session = planned_session(&config, &chart)?;
            let plan = session.last_plan().context("No chart was planned")?;
            let json = serde_json::to_string_pretty(plan).context("Failed to serialize plan")?;
            write_stdout(json.as_bytes())?;
        }
        Command::Preview { input } => {
            let session = load_session(&config, input.as_deref())?;
            let table = session.table().context("No data loaded")?;
            let source = session.source().unwrap_or("data");
            let mut text = summary::preview(table, source);
            text.push('\n');
            text.push_str(&summary::info(&format!("Loaded data from {}", source), Some(table)));
            write_stdout(text.as_bytes())?;
        }
        Command::Files => {
            let mut listing = String::new();
            for path in loader::discover_csv_files(&config.data_dir) {
                listing.push_str(&path.display().to_string());
                listing.push('\n');
            }
            write_stdout(listing.as_bytes())?;
        }
        Command::Sample { output, seed } => {
            let path = output.unwrap_or_else(|| config.metrics_path());
            let doc = sample::generate(Local::now(), seed.unwrap_or(config.sample_seed));
            let json = serde_json::to_string_pretty(&doc).context("Failed to serialize sample")?;
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write sample to {}", path.display()))?;
            println!("Wrote {} sample rows to {}", doc.metrics.len(), path.display());
        }
    }

    Ok(())
}

fn load_session(config: &DashboardConfig, input: Option<&Path>) -> Result<Session> {
    let mut session = Session::new();
    let loaded = match input {
        Some(path) => session.load_file(path).map(|_| ()),
        None => session.load_default(config, Local::now()).map(|_| ()),
    };
    loaded.context("Failed to load data")?;
    Ok(session)
}

/// Load the data and plan the chart described by `args`, starting from the
/// table's default selections.
fn planned_session(config: &DashboardConfig, args: &ChartArgs) -> Result<Session> {
    let mut session = load_session(config, args.input.as_deref())?;
    let table = session.table().context("No data loaded")?;

    let mut selections = Selections::defaults_for(table, args.chart);
    if let Some(primary) = &args.primary {
        selections.primary = Some(primary.clone());
    }
    if let Some(secondary) = &args.secondary {
        selections.secondary = Some(secondary.clone());
    }
    if let Some(group_by) = &args.group_by {
        selections.group_by = parse_group_by(group_by);
    }

    session.select(selections);
    session.replan().context("Failed to plan chart")?;
    Ok(session)
}

fn write_stdout(bytes: &[u8]) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(bytes)
        .context("Failed to write to stdout")?;
    handle.flush().context("Failed to flush stdout")?;
    Ok(())
}
