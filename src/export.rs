//! Writing rendered charts to disk as PNG, SVG or single-page PDF.

use crate::graph::Canvas;
use crate::plan::ChartPlan;
use crate::{OutputFormat, RenderOptions};
use anyhow::{Context, Result};
use image::ImageEncoder;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

const JPEG_QUALITY: u8 = 92;
const POINTS_PER_INCH: f64 = 72.0;

/// Render `plan` in the given format and return the encoded bytes.
pub fn render(plan: &ChartPlan, options: &RenderOptions, format: OutputFormat) -> Result<Vec<u8>> {
    let canvas = Canvas::from_options(options)?;
    debug!(?format, size = ?canvas.size(), kind = %plan.kind, "rendering chart");

    match format {
        OutputFormat::Png => canvas.render_png(plan),
        OutputFormat::Svg => canvas.render_svg(plan).map(String::into_bytes),
        OutputFormat::Pdf => {
            let rgb = canvas.render_rgb(plan)?;
            let (width, height) = canvas.size();
            let jpeg = encode_jpeg(&rgb, width, height)?;
            let page = (options.width * POINTS_PER_INCH, options.height * POINTS_PER_INCH);
            Ok(pdf_document(&jpeg, (width, height), page))
        }
    }
}

/// Render `plan` to `path`. The format comes from the options override or
/// the file extension, defaulting to PNG.
pub fn export(plan: &ChartPlan, path: &Path, options: &RenderOptions) -> Result<OutputFormat> {
    let format = options.format_for(path);
    let bytes = render(plan, options, format)?;
    std::fs::write(path, &bytes)
        .with_context(|| format!("Failed to write chart to {}", path.display()))?;

    info!(path = %path.display(), ?format, bytes = bytes.len(), "exported chart");
    Ok(format)
}

fn encode_jpeg(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .write_image(rgb, width, height, image::ColorType::Rgb8)
        .context("Failed to encode JPEG")?;
    Ok(jpeg)
}

/// Build a one-page PDF showing a JPEG image scaled to fill the page.
/// `page` is the page size in points.
fn pdf_document(jpeg: &[u8], (px_w, px_h): (u32, u32), (page_w, page_h): (f64, f64)) -> Vec<u8> {
    let content = format!("q {:.2} 0 0 {:.2} 0 0 cm /Im0 Do Q\n", page_w, page_h);

    let mut out: Vec<u8> = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(5);

    let mut object = |out: &mut Vec<u8>, body: &[u8]| {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", offsets.len()).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    };

    object(&mut out, b"<< /Type /Catalog /Pages 2 0 R >>");
    object(&mut out, b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    object(
        &mut out,
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
             /Resources << /XObject << /Im0 4 0 R >> >> /Contents 5 0 R >>",
            page_w, page_h
        )
        .as_bytes(),
    );

    let mut image = format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB \
         /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>\nstream\n",
        px_w,
        px_h,
        jpeg.len()
    )
    .into_bytes();
    image.extend_from_slice(jpeg);
    image.extend_from_slice(b"\nendstream");
    object(&mut out, &image);

    object(
        &mut out,
        format!("<< /Length {} >>\nstream\n{}endstream", content.len(), content).as_bytes(),
    );

    let xref_at = out.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", offsets.len() + 1);
    for offset in &offsets {
        let _ = write!(xref, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        offsets.len() + 1,
        xref_at
    );
    out.extend_from_slice(xref.as_bytes());
    out
}
