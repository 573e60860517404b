use crate::plan::{ChartKind, ChartPlan, Series, XValue};
use crate::RenderOptions;
use anyhow::{Context, Result};
use chrono::DateTime;
use image::ImageEncoder;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::element::Pie;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{FontDesc, FontFamily, FontStyle, FontTransform};
use std::collections::HashMap;
use std::ops::Range;

/// Number of equal-width bins in a histogram.
pub const HISTOGRAM_BINS: usize = 20;

/// Largest canvas accepted, in pixels (100 megapixels).
pub const MAX_CANVAS_PIXELS: u64 = 100_000_000;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Series colours, cycled in order.
const PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

fn series_color(idx: usize) -> RGBColor {
    PALETTE[idx % PALETTE.len()]
}

/// Pixel canvas for a single chart
pub struct Canvas {
    width: u32,
    height: u32,
    scale: f64,
}

impl Canvas {
    /// `scale` multiplies font sizes, strokes and margins.
    pub fn new(width: u32, height: u32, scale: f64) -> Result<Self> {
        if width == 0 || height == 0 {
            anyhow::bail!("Cannot create a {}x{} canvas", width, height);
        }
        if u64::from(width) * u64::from(height) > MAX_CANVAS_PIXELS {
            anyhow::bail!(
                "Canvas of {}x{} pixels exceeds the {} pixel limit; lower the DPI or figure size",
                width,
                height,
                MAX_CANVAS_PIXELS
            );
        }
        Ok(Canvas {
            width,
            height,
            scale,
        })
    }

    pub fn from_options(options: &RenderOptions) -> Result<Self> {
        let (width, height) = options.pixel_size();
        Canvas::new(width, height, options.scale())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Draw the plan into a raw RGB8 buffer.
    pub fn render_rgb(&self, plan: &ChartPlan) -> Result<Vec<u8>> {
        let len = (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|px| px.checked_mul(3))
            .context("Canvas buffer size overflows")?;
        let mut buffer = vec![0u8; len];
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (self.width, self.height))
                .into_drawing_area();
            draw_plan(&root, plan, self.scale)?;
            root.present().context("Failed to present drawing")?;
        }
        Ok(buffer)
    }

    /// Draw the plan and encode it as PNG
    pub fn render_png(&self, plan: &ChartPlan) -> Result<Vec<u8>> {
        let buffer = self.render_rgb(plan)?;
        let mut png_bytes = Vec::new();
        {
            let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
            encoder
                .write_image(&buffer, self.width, self.height, image::ColorType::Rgb8)
                .context("Failed to encode PNG")?;
        }

        Ok(png_bytes)
    }

    /// Draw the plan as an SVG document
    pub fn render_svg(&self, plan: &ChartPlan) -> Result<String> {
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (self.width, self.height))
                .into_drawing_area();
            draw_plan(&root, plan, self.scale)?;
            root.present().context("Failed to present drawing")?;
        }
        Ok(svg)
    }
}

/// Sizes scaled to the output resolution.
#[derive(Debug, Clone, Copy)]
struct Style {
    scale: f64,
}

impl Style {
    fn font(&self, points: f64) -> FontDesc<'static> {
        FontDesc::new(FontFamily::SansSerif, points * self.scale, FontStyle::Normal)
    }

    fn px(&self, base: f64) -> u32 {
        (base * self.scale).round().max(1.0) as u32
    }
}

/// Draw a chart plan onto any plotters backend.
pub fn draw_plan<DB>(root: &DrawingArea<DB, Shift>, plan: &ChartPlan, scale: f64) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let style = Style { scale };
    root.fill(&WHITE).context("Failed to fill background")?;

    if plan.is_empty() {
        return draw_placeholder(root, plan, style);
    }

    match plan.kind {
        ChartKind::Line => draw_line(root, plan, style),
        ChartKind::Bar => draw_bar(root, plan, style),
        ChartKind::Scatter => draw_scatter(root, plan, style),
        ChartKind::Pie => draw_pie(root, plan, style),
        ChartKind::Histogram => draw_histogram(root, plan, style),
        ChartKind::Box => draw_box(root, plan, style),
    }
}

fn draw_placeholder<DB>(root: &DrawingArea<DB, Shift>, plan: &ChartPlan, style: Style) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (w, h) = root.dim_in_pixel();
    let text = TextStyle::from(style.font(14.0)).pos(Pos::new(HPos::Center, VPos::Center));
    let message = if plan.title.is_empty() {
        "No data to display".to_string()
    } else {
        format!("{}: no data to display", plan.title)
    };
    root.draw_text(&message, &text, (w as i32 / 2, h as i32 / 2))
        .context("Failed to draw placeholder text")?;
    Ok(())
}

// =============================================================================
// Axis helpers
// =============================================================================

/// How x values map onto the horizontal axis.
#[derive(Debug, Clone, PartialEq)]
enum XScale {
    Numeric,
    /// Days since the Unix epoch
    Dates,
    /// Category index into the label list
    Labels(Vec<String>),
}

impl XScale {
    fn format(&self, v: f64) -> String {
        match self {
            XScale::Numeric => format_tick(v),
            XScale::Dates => DateTime::from_timestamp((v * SECONDS_PER_DAY).round() as i64, 0)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            XScale::Labels(labels) => category_label(labels, v),
        }
    }
}

fn category_label(labels: &[String], v: f64) -> String {
    let idx = v.round();
    if (v - idx).abs() > 1e-6 || idx < 0.0 {
        return String::new();
    }
    labels.get(idx as usize).cloned().unwrap_or_default()
}

fn format_tick(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        let s = format!("{:.2}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Place every series on a common x scale. Labels get positions in
/// first-seen order across all series.
fn x_layout(series: &[Series]) -> (XScale, Vec<Vec<f64>>) {
    let first = series.iter().flat_map(|s| s.x.iter()).next();
    match first {
        Some(XValue::Label(_)) => {
            let mut labels: Vec<String> = Vec::new();
            let mut index: HashMap<String, usize> = HashMap::new();
            let coords: Vec<Vec<f64>> = series
                .iter()
                .map(|s| {
                    s.x.iter()
                        .map(|x| {
                            let key = x.to_string();
                            let slot = *index.entry(key.clone()).or_insert_with(|| {
                                labels.push(key);
                                labels.len() - 1
                            });
                            slot as f64
                        })
                        .collect::<Vec<f64>>()
                })
                .collect();
            (XScale::Labels(labels), coords)
        }
        Some(XValue::Date(_)) => (XScale::Dates, numeric_coords(series)),
        _ => (XScale::Numeric, numeric_coords(series)),
    }
}

fn numeric_coords(series: &[Series]) -> Vec<Vec<f64>> {
    series
        .iter()
        .map(|s| s.x.iter().map(numeric_x).collect())
        .collect()
}

fn numeric_x(x: &XValue) -> f64 {
    match x {
        XValue::Number(n) => *n,
        XValue::Date(d) => d.and_utc().timestamp() as f64 / SECONDS_PER_DAY,
        XValue::Label(_) => f64::NAN,
    }
}

/// Range spanning `values` with 5% padding on both sides.
fn padded_range(values: impl IntoIterator<Item = f64>) -> Range<f64> {
    let (min, max) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    if !min.is_finite() {
        return 0.0..1.0;
    }
    if min == max {
        (min - 1.0)..(max + 1.0)
    } else {
        let padding = (max - min) * 0.05;
        (min - padding)..(max + padding)
    }
}

/// Value range for bars, always including the zero baseline.
fn baseline_range(values: impl IntoIterator<Item = f64>) -> Range<f64> {
    let (min, max) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if min == max {
        return 0.0..1.0;
    }
    let padding = (max - min) * 0.05;
    let lo = if min < 0.0 { min - padding } else { 0.0 };
    let hi = if max > 0.0 { max + padding } else { 0.0 };
    lo..hi
}

fn category_range(count: usize) -> Range<f64> {
    -0.5..(count.max(1) as f64 - 0.5)
}

type Chart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Build a cartesian chart with title, axis descriptions and a light grid.
fn cartesian<'a, DB>(
    root: &'a DrawingArea<DB, Shift>,
    plan: &ChartPlan,
    style: Style,
    x_scale: &XScale,
    x_range: Range<f64>,
    y_range: Range<f64>,
    rotate_x_labels: bool,
) -> Result<Chart<'a, DB>>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let x_label_area = if rotate_x_labels { 110.0 } else { 45.0 };
    let mut chart = ChartBuilder::on(root)
        .margin(style.px(12.0))
        .caption(&plan.title, style.font(18.0))
        .x_label_area_size(style.px(x_label_area))
        .y_label_area_size(style.px(65.0))
        .build_cartesian_2d(x_range, y_range)
        .context("Failed to build chart")?;

    let formatter = |v: &f64| x_scale.format(*v);
    let tick_font = if rotate_x_labels {
        style.font(10.0).transform(FontTransform::Rotate90)
    } else {
        style.font(10.0)
    };
    let x_ticks = match x_scale {
        XScale::Labels(labels) => labels.len().clamp(1, 40),
        _ => 10,
    };

    chart
        .configure_mesh()
        .x_labels(x_ticks)
        .x_label_formatter(&formatter)
        .y_label_formatter(&|v| format_tick(*v))
        .x_label_style(tick_font)
        .y_label_style(style.font(10.0))
        .x_desc(plan.x_axis_label.as_str())
        .y_desc(plan.y_axis_label.as_str())
        .axis_desc_style(style.font(12.0))
        .bold_line_style(&BLACK.mix(0.12))
        .light_line_style(&BLACK.mix(0.04))
        .draw()
        .context("Failed to draw mesh")?;

    Ok(chart)
}

fn draw_legend<'a, DB>(chart: &mut Chart<'a, DB>, style: Style) -> Result<()>
where
    DB: DrawingBackend + 'a,
    DB::ErrorType: 'static,
{
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK.mix(0.3))
        .label_font(style.font(11.0))
        .position(SeriesLabelPosition::UpperRight)
        .draw()
        .context("Failed to draw legend")?;
    Ok(())
}

// =============================================================================
// Chart kinds
// =============================================================================

fn draw_line<DB>(root: &DrawingArea<DB, Shift>, plan: &ChartPlan, style: Style) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (x_scale, xs) = x_layout(&plan.series);
    let x_range = match &x_scale {
        XScale::Labels(labels) => category_range(labels.len()),
        _ => padded_range(xs.iter().flatten().copied()),
    };
    let y_range = padded_range(plan.series.iter().flat_map(|s| s.y.iter().copied()));
    let rotate = matches!(&x_scale, XScale::Labels(l) if l.len() > 8) || x_scale == XScale::Dates;
    let mut chart = cartesian(root, plan, style, &x_scale, x_range, y_range, rotate)?;

    let stroke = style.px(2.0);
    let marker = style.px(3.0) as i32;
    for (idx, (series, x)) in plan.series.iter().zip(&xs).enumerate() {
        let color = series_color(idx);
        let points: Vec<(f64, f64)> = x.iter().copied().zip(series.y.iter().copied()).collect();

        let anno = chart
            .draw_series(LineSeries::new(points.clone(), color.stroke_width(stroke)))
            .context("Failed to draw line series")?;
        if let Some(label) = &series.label {
            anno.label(label.as_str()).legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(stroke))
            });
        }

        chart
            .draw_series(points.iter().map(|&p| Circle::new(p, marker, color.filled())))
            .context("Failed to draw line markers")?;
    }

    if plan.legend {
        draw_legend(&mut chart, style)?;
    }
    Ok(())
}

fn draw_bar<DB>(root: &DrawingArea<DB, Shift>, plan: &ChartPlan, style: Style) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let series = &plan.series[0];
    let categories: Vec<String> = series.x.iter().map(|x| x.to_string()).collect();
    let x_scale = XScale::Labels(categories.clone());
    let y_range = baseline_range(series.y.iter().copied());
    let mut chart = cartesian(
        root,
        plan,
        style,
        &x_scale,
        category_range(categories.len()),
        y_range,
        true,
    )?;

    let color = series_color(0);
    let bar_width = 0.8;
    chart
        .draw_series(series.y.iter().enumerate().map(|(idx, &y_val)| {
            let x_center = idx as f64;
            Rectangle::new(
                [
                    (x_center - bar_width / 2.0, 0.0),
                    (x_center + bar_width / 2.0, y_val),
                ],
                color.mix(0.85).filled(),
            )
        }))
        .context("Failed to draw bars")?;

    Ok(())
}

fn draw_scatter<DB>(root: &DrawingArea<DB, Shift>, plan: &ChartPlan, style: Style) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (x_scale, xs) = x_layout(&plan.series);
    let x_range = padded_range(xs.iter().flatten().copied());
    let y_range = padded_range(plan.series.iter().flat_map(|s| s.y.iter().copied()));
    let mut chart = cartesian(root, plan, style, &x_scale, x_range, y_range, false)?;

    let size = style.px(4.0) as i32;
    for (idx, (series, x)) in plan.series.iter().zip(&xs).enumerate() {
        let color = series_color(idx);
        let anno = chart
            .draw_series(
                x.iter()
                    .zip(&series.y)
                    .map(|(&x, &y)| Circle::new((x, y), size, color.mix(0.7).filled())),
            )
            .context("Failed to draw point series")?;
        if let Some(label) = &series.label {
            anno.label(label.as_str())
                .legend(move |(x, y)| Circle::new((x + 10, y), size, color.filled()));
        }
    }

    if plan.legend {
        draw_legend(&mut chart, style)?;
    }
    Ok(())
}

fn draw_pie<DB>(root: &DrawingArea<DB, Shift>, plan: &ChartPlan, style: Style) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let area = root
        .titled(&plan.title, style.font(18.0))
        .context("Failed to draw title")?;

    // Slices must have a positive size to be drawn.
    let slices: Vec<(String, f64)> = plan.series[0]
        .x
        .iter()
        .zip(&plan.series[0].y)
        .filter(|(_, v)| **v > 0.0 && v.is_finite())
        .map(|(x, &v)| (x.to_string(), v))
        .collect();
    if slices.is_empty() {
        return draw_placeholder(root, plan, style);
    }

    let (w, h) = area.dim_in_pixel();
    let center = (w as i32 / 2, h as i32 / 2);
    let radius = w.min(h) as f64 * 0.35;
    let sizes: Vec<f64> = slices.iter().map(|(_, v)| *v).collect();
    let labels: Vec<String> = slices.iter().map(|(l, _)| l.clone()).collect();
    let colors: Vec<RGBColor> = (0..slices.len()).map(series_color).collect();

    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.start_angle(90.0);
    pie.label_style(style.font(11.0));
    pie.percentages(TextStyle::from(style.font(10.0)).color(&WHITE));
    area.draw(&pie).context("Failed to draw pie")?;

    Ok(())
}

fn draw_histogram<DB>(root: &DrawingArea<DB, Shift>, plan: &ChartPlan, style: Style) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let bins = histogram_bins(&plan.series[0].y, HISTOGRAM_BINS);
    let x_range = padded_range(bins.iter().flat_map(|b| [b.start, b.end]));
    let y_range = baseline_range(bins.iter().map(|b| b.count as f64));
    let mut chart = cartesian(root, plan, style, &XScale::Numeric, x_range, y_range, false)?;

    let color = series_color(0);
    chart
        .draw_series(bins.iter().map(|b| {
            Rectangle::new([(b.start, 0.0), (b.end, b.count as f64)], color.mix(0.7).filled())
        }))
        .context("Failed to draw histogram bars")?;
    chart
        .draw_series(bins.iter().map(|b| {
            Rectangle::new([(b.start, 0.0), (b.end, b.count as f64)], BLACK.mix(0.6).stroke_width(1))
        }))
        .context("Failed to draw histogram outlines")?;

    Ok(())
}

fn draw_box<DB>(root: &DrawingArea<DB, Shift>, plan: &ChartPlan, style: Style) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let boxes: Vec<(String, BoxStats)> = plan
        .series
        .iter()
        .filter_map(|s| {
            let stats = BoxStats::from_values(&s.y)?;
            Some((s.label.clone().unwrap_or_default(), stats))
        })
        .collect();
    let labels: Vec<String> = boxes.iter().map(|(l, _)| l.clone()).collect();
    let y_range = padded_range(boxes.iter().flat_map(|(_, b)| [b.min, b.max]));
    let x_scale = XScale::Labels(labels);
    let mut chart = cartesian(
        root,
        plan,
        style,
        &x_scale,
        category_range(boxes.len()),
        y_range,
        boxes.len() > 8,
    )?;

    let stroke = style.px(1.5);
    let half = 0.3;
    for (idx, (_, b)) in boxes.iter().enumerate() {
        let color = series_color(idx);
        let x = idx as f64;
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(x - half, b.q1), (x + half, b.q3)],
                color.mix(0.5).filled(),
            )))
            .context("Failed to draw box")?;

        let outline = BLACK.stroke_width(stroke);
        let segments = vec![
            // box outline, median, whiskers and caps
            vec![(x - half, b.q1), (x + half, b.q1), (x + half, b.q3), (x - half, b.q3), (x - half, b.q1)],
            vec![(x - half, b.median), (x + half, b.median)],
            vec![(x, b.q1), (x, b.min)],
            vec![(x, b.q3), (x, b.max)],
            vec![(x - half / 2.0, b.min), (x + half / 2.0, b.min)],
            vec![(x - half / 2.0, b.max), (x + half / 2.0, b.max)],
        ];
        chart
            .draw_series(segments.into_iter().map(|points| PathElement::new(points, outline)))
            .context("Failed to draw box whiskers")?;
    }

    Ok(())
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Bin {
    start: f64,
    end: f64,
    count: usize,
}

/// Split the value range into `bins` equal-width bins. The last bin is
/// closed on the right so the maximum is counted.
fn histogram_bins(values: &[f64], bins: usize) -> Vec<Bin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let Some(min) = finite.iter().copied().reduce(f64::min) else {
        return Vec::new();
    };
    let max = finite.iter().copied().fold(min, f64::max);
    let (lo, hi) = if min == max { (min - 0.5, max + 0.5) } else { (min, max) };
    let bins = bins.max(1);
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in finite {
        let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| Bin {
            start: lo + width * i as f64,
            end: lo + width * (i + 1) as f64,
            count,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
struct BoxStats {
    min: f64,
    q1: f64,
    median: f64,
    q3: f64,
    max: f64,
}

impl BoxStats {
    fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));
        Some(BoxStats {
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }
}

/// Linear-interpolated quantile of sorted, non-empty data.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}
