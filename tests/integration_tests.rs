use dashplot::data::{Column, ColumnKind};
use dashplot::loader::{self, Format};
use dashplot::{plan, ChartKind, Selections, XValue};
use proptest::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("test").join(name)
}

/// Helper function to run dashplot with the given arguments
fn run_dashplot(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dashplot"))
        .args(args)
        .env("RUST_LOG", "dashplot=warn")
        .output()
        .expect("Failed to spawn dashplot")
}

fn run_ok(args: &[&str]) -> String {
    let output = run_dashplot(args);
    assert!(
        output.status.success(),
        "dashplot {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn plan_json(args: &[&str]) -> Value {
    let mut full = vec!["plan"];
    full.extend_from_slice(args);
    serde_json::from_str(&run_ok(&full)).expect("plan output is not JSON")
}

/// Check if bytes are a valid PNG
fn is_valid_png(bytes: &[u8]) -> bool {
    bytes.len() > 8 && bytes[0..8] == [137, 80, 78, 71, 13, 10, 26, 10]
}

// =============================================================================
// Library
// =============================================================================

#[test]
fn test_metrics_document_line_chart() {
    let loaded = loader::load(&fixture("metrics.json")).unwrap();
    assert_eq!(loaded.label, "metrics.json");

    let sel = Selections::new(ChartKind::Line)
        .with_primary("revenue")
        .with_group_by("None");
    let chart = plan(&loaded.table, &sel).unwrap();

    assert_eq!(chart.series.len(), 1);
    let x: Vec<String> = chart.series[0].x.iter().map(|x| x.to_string()).collect();
    assert_eq!(x, vec!["2024-01-01", "2024-01-02"]);
    assert!(matches!(chart.series[0].x[0], XValue::Date(_)));
    assert_eq!(chart.series[0].y, vec![100.0, 150.0]);
    assert!(chart.title.contains("Revenue"));
}

#[test]
fn test_tab_separated_pie_counts() {
    let loaded = loader::load(&fixture("sales.tsv")).unwrap();
    let chart = plan(
        &loaded.table,
        &Selections::new(ChartKind::Pie).with_primary("product"),
    )
    .unwrap();

    let slices = &chart.series[0];
    assert_eq!(slices.len(), 3);
    assert_eq!(slices.y.iter().sum::<f64>(), loaded.table.row_count() as f64);
    assert_eq!(slices.x[0].to_string(), "apple");
}

#[test]
fn test_default_load_prefers_csv() {
    let dir = tempfile::tempdir().unwrap();
    fs::copy(fixture("weekly.csv"), dir.path().join("weekly.csv")).unwrap();
    fs::write(dir.path().join("sample_data.csv"), "a\n1\n").unwrap();
    fs::copy(fixture("metrics.json"), dir.path().join("metrics.json")).unwrap();

    let config = dashplot::DashboardConfig {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let loaded = loader::load_default(&config, chrono::Local::now()).unwrap();
    assert_eq!(loaded.label, "weekly.csv");
}

#[test]
fn test_default_load_synthesizes_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let config = dashplot::DashboardConfig {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    };

    let first = loader::load_default(&config, chrono::Local::now()).unwrap();
    assert_eq!(first.table.row_count(), 30);
    assert!(config.metrics_path().exists());

    // The persisted document is what the next load picks up.
    let second = loader::load_default(&config, chrono::Local::now()).unwrap();
    assert_eq!(first.table, second.table);
    assert_eq!(second.table.column("date").unwrap().kind(), ColumnKind::Date);
}

// =============================================================================
// CLI
// =============================================================================

#[test]
fn test_cli_bar_week_order() {
    let weekly = fixture("weekly.csv");
    let json = plan_json(&["-i", weekly.to_str().unwrap(), "-c", "bar", "-p", "revenue", "-g", "Week"]);

    let x: Vec<&str> = json["series"][0]["x"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(x, vec!["Week 1", "Week 2", "Week 3", "Week 4", "Week 10", "Week 11"]);
    assert_eq!(json["kind"], "bar");
    assert_eq!(json["title"], "Revenue by Week");
}

#[test]
fn test_cli_line_week_order() {
    let weekly = fixture("weekly.csv");
    let json = plan_json(&["-i", weekly.to_str().unwrap(), "-p", "revenue", "-g", "Week"]);

    let series = json["series"].as_array().unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0]["x"][0], "Week 1");
    assert_eq!(series[0]["x"][5], "Week 11");
    assert_eq!(json["legend"], false);
}

#[test]
fn test_cli_defaults_group_by_week() {
    let weekly = fixture("weekly.csv");
    let json = plan_json(&["-i", weekly.to_str().unwrap(), "-c", "bar"]);
    assert_eq!(json["x_axis_label"], "Week");
    assert_eq!(json["y_axis_label"], "Revenue");
}

#[test]
fn test_cli_scatter_without_secondary_is_empty() {
    let metrics = fixture("metrics.json");
    let json = plan_json(&["-i", metrics.to_str().unwrap(), "-c", "scatter"]);
    assert_eq!(json["series"].as_array().unwrap().len(), 0);
}

#[test]
fn test_cli_unknown_column_fails() {
    let weekly = fixture("weekly.csv");
    let output = run_dashplot(&["plan", "-i", weekly.to_str().unwrap(), "-p", "profit"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("profit"));
}

#[test]
fn test_cli_non_numeric_metric_fails() {
    let weekly = fixture("weekly.csv");
    let output = run_dashplot(&["plan", "-i", weekly.to_str().unwrap(), "-c", "histogram", "-p", "region"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not numeric"));
}

#[test]
fn test_cli_unknown_chart_kind_fails() {
    let output = run_dashplot(&["plan", "-c", "area"]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_plot_png() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("chart.png");
    let weekly = fixture("weekly.csv");
    run_ok(&[
        "plot",
        "-i",
        weekly.to_str().unwrap(),
        "-c",
        "line",
        "-g",
        "region",
        "--dpi",
        "50",
        "-o",
        out.to_str().unwrap(),
    ]);
    assert!(is_valid_png(&fs::read(&out).unwrap()));
}

#[test]
fn test_cli_plot_every_kind() {
    let dir = tempfile::tempdir().unwrap();
    let weekly = fixture("weekly.csv");
    for kind in ["line", "bar", "scatter", "pie", "histogram", "box"] {
        let out = dir.path().join(format!("{}.svg", kind));
        run_ok(&[
            "plot",
            "-i",
            weekly.to_str().unwrap(),
            "-c",
            kind,
            "--dpi",
            "50",
            "-o",
            out.to_str().unwrap(),
        ]);
        assert!(fs::read_to_string(&out).unwrap().contains("<svg"), "{} chart", kind);
    }
}

#[test]
fn test_cli_plot_pdf_forced_format() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("chart.out");
    let metrics = fixture("metrics.json");
    run_ok(&[
        "plot",
        "-i",
        metrics.to_str().unwrap(),
        "--format",
        "pdf",
        "--dpi",
        "50",
        "-o",
        out.to_str().unwrap(),
    ]);
    let bytes = fs::read(&out).unwrap();
    assert!(bytes.starts_with(b"%PDF-1.4"));
}

#[test]
fn test_cli_plot_oversized_dpi_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("huge.png");
    let weekly = fixture("weekly.csv");
    let output = run_dashplot(&[
        "plot",
        "-i",
        weekly.to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
        "--dpi",
        "6000",
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pixel limit"), "unexpected stderr: {}", stderr);
    assert!(!stderr.contains("panicked"));
    assert!(!out.exists());
}

#[test]
fn test_cli_sample_then_preview() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();

    let stdout = run_ok(&["--data-dir", data_dir, "sample", "--seed", "3"]);
    assert!(stdout.contains("30 sample rows"));

    let doc: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("metrics.json")).unwrap()).unwrap();
    assert_eq!(doc["metrics"].as_array().unwrap().len(), 30);
    assert_eq!(doc["metadata"]["source"], "Sample Dashboard Data");

    let preview = run_ok(&["--data-dir", data_dir, "preview"]);
    assert!(preview.starts_with("File: metrics.json"));
    assert!(preview.contains("Shape: (30, 6)"));
    assert!(preview.contains("revenue: μ="));
}

#[test]
fn test_cli_default_source_synthesizes_sample() {
    let dir = tempfile::tempdir().unwrap();
    let json = plan_json(&["--data-dir", dir.path().to_str().unwrap()]);

    assert_eq!(json["title"], "Revenue Over Time");
    assert_eq!(json["series"][0]["y"].as_array().unwrap().len(), 30);
    assert!(dir.path().join("metrics.json").exists());
}

#[test]
fn test_cli_config_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::copy(fixture("weekly.csv"), dir.path().join("weekly.csv")).unwrap();
    let config = dir.path().join("dash.json");
    fs::write(
        &config,
        format!(
            r#"{{"data_dir": {:?}, "render": {{"dpi": 40, "type": "svg"}}}}"#,
            dir.path().to_str().unwrap()
        ),
    )
    .unwrap();

    let out = dir.path().join("chart.png");
    let stdout = run_ok(&["--config", config.to_str().unwrap(), "plot", "-o", out.to_str().unwrap()]);
    assert!(stdout.starts_with("Wrote svg chart"));
    assert!(fs::read_to_string(&out).unwrap().contains("<svg"));
}

#[test]
fn test_cli_files_lists_csv() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("b.csv"), "x\n1\n").unwrap();
    fs::write(dir.path().join("a.csv"), "x\n1\n").unwrap();
    fs::write(dir.path().join("sample_data.csv"), "x\n1\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "x").unwrap();

    let stdout = run_ok(&["--data-dir", dir.path().to_str().unwrap(), "files"]);
    let names: Vec<&str> = stdout
        .lines()
        .map(|l| Path::new(l).file_name().unwrap().to_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a.csv", "b.csv"]);
}

#[test]
fn test_cli_missing_input_fails() {
    let output = run_dashplot(&["preview", "-i", "/nonexistent/data.csv"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load data"));
}

// =============================================================================
// Properties
// =============================================================================

fn weekly_csv(rows: &[(u8, Option<u16>, u8)]) -> String {
    let mut csv = String::from("Week,revenue,region\n");
    for (week, revenue, region) in rows {
        let revenue = revenue.map(|r| r.to_string()).unwrap_or_default();
        csv.push_str(&format!("Week {},{},{}\n", week, revenue, ["North", "South", "East"][*region as usize]));
    }
    csv
}

fn rows_strategy() -> impl Strategy<Value = Vec<(u8, Option<u16>, u8)>> {
    prop::collection::vec((1u8..30, prop::option::weighted(0.8, 0u16..5000), 0u8..3), 1..40)
}

proptest! {
    #[test]
    fn prop_plan_is_deterministic(rows in rows_strategy(), kind_idx in 0usize..6, grouped in any::<bool>()) {
        let table = loader::load_str(&weekly_csv(&rows), Format::Delimited(None), "prop").unwrap();
        let kind = ChartKind::ALL[kind_idx];
        let mut sel = Selections::new(kind).with_primary("revenue").with_secondary("revenue");
        if grouped {
            sel = sel.with_group_by("region");
        }
        prop_assert_eq!(plan(&table, &sel), plan(&table, &sel));
    }

    #[test]
    fn prop_bar_weeks_are_ordered(rows in rows_strategy()) {
        let table = loader::load_str(&weekly_csv(&rows), Format::Delimited(None), "prop").unwrap();
        prop_assume!(table.column("revenue").unwrap().is_numeric());
        let sel = Selections::new(ChartKind::Bar).with_primary("revenue").with_group_by("Week");
        let chart = plan(&table, &sel).unwrap();
        let weeks: Vec<u64> = chart.series[0]
            .x
            .iter()
            .map(|x| x.to_string()[5..].parse().unwrap())
            .collect();
        prop_assert!(weeks.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn prop_histogram_keeps_present_values(rows in rows_strategy()) {
        let table = loader::load_str(&weekly_csv(&rows), Format::Delimited(None), "prop").unwrap();
        prop_assume!(table.column("revenue").unwrap().is_numeric());
        let chart = plan(&table, &Selections::new(ChartKind::Histogram).with_primary("revenue")).unwrap();
        let present = rows.iter().filter(|r| r.1.is_some()).count();
        prop_assert_eq!(chart.series[0].len(), present);
    }

    #[test]
    fn prop_kind_inference_is_idempotent(
        name in "[a-z_]{1,10}",
        values in prop::collection::vec("[a-z]{1,5}|[0-9]{1,4}(\\.[0-9]{1,2})?|2024-0[1-9]-1[0-9]|NA|", 1..20),
    ) {
        let column = Column::from_raw(name, &values);
        prop_assert_eq!(column.reinfer_kind(), column.kind());
    }
}
