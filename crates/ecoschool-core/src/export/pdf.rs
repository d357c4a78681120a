use super::{group_thousands, ReportSummary, REPORT_TITLE};
use crate::{EcoError, Result};
use log::{debug, warn};
use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
};
use std::io::Cursor;
use std::path::Path;

const A4_SHORT_MM: f32 = 210.0;
const A4_LONG_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;

/// Capture target size; at 96 DPI one pixel is 0.264583 mm.
pub const TARGET_WIDTH_PX: f32 = 1900.0;
pub const TARGET_HEIGHT_PX: f32 = 1200.0;
pub const MM_PER_PX: f32 = 0.264583;
const IMAGE_DPI: f32 = 96.0;

fn pdf_err(e: impl std::fmt::Display) -> EcoError {
    EcoError::Pdf(e.to_string())
}

fn load_font(doc: &PdfDocumentReference, font: Option<&Path>) -> Result<IndirectFontRef> {
    if let Some(path) = font {
        match std::fs::read(path) {
            Ok(bytes) => match doc.add_external_font(Cursor::new(bytes)) {
                Ok(font) => return Ok(font),
                Err(e) => warn!(
                    "Report font unusable, falling back to Helvetica — path={} error={}",
                    path.display(),
                    e
                ),
            },
            Err(e) => warn!(
                "Report font unreadable, falling back to Helvetica — path={} error={}",
                path.display(),
                e
            ),
        }
    }
    doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

/// Text lines of the report, top to bottom: (font size, indent mm, gap after mm, text).
pub fn report_lines(summary: &ReportSummary) -> Vec<(f32, f32, f32, String)> {
    let mut lines = vec![
        (12.0, 0.0, 8.0, "학교 정보".to_string()),
        (10.0, 0.0, 6.0, format!("학교명: {}", or_dash(&summary.school_name))),
        (10.0, 0.0, 6.0, format!("학생수: {}명", or_dash(&summary.student_count))),
        (10.0, 0.0, 6.0, format!("교직원수: {}명", or_dash(&summary.staff_count))),
        (10.0, 0.0, 12.0, format!("학교면적: {}m²", or_dash(&summary.school_area_m2))),
        (12.0, 0.0, 8.0, "탄소배출량".to_string()),
    ];

    let total = summary.total_rounded().filter(|t| *t > 0);
    let total_text = total
        .map(|t| format!("{} kgCO₂eq", group_thousands(t)))
        .unwrap_or_else(|| "-".to_string());
    lines.push((10.0, 0.0, 6.0, format!("총 탄소배출량: {}", total_text)));

    match (total, summary.emission.breakdown()) {
        (Some(_), Some(b)) => {
            lines.push((10.0, 10.0, 6.0, format!("전기: {:.1} kgCO₂eq", b.electric_kg)));
            lines.push((10.0, 10.0, 6.0, format!("가스: {:.1} kgCO₂eq", b.gas_kg)));
            lines.push((10.0, 10.0, 12.0, format!("물: {:.1} kgCO₂eq", b.water_kg)));
        }
        _ => {
            if let Some(last) = lines.last_mut() {
                last.2 += 6.0;
            }
        }
    }

    lines.push((12.0, 0.0, 8.0, "실천현황".to_string()));
    for p in &summary.progress {
        lines.push((
            10.0,
            0.0,
            6.0,
            format!(
                "{}: {}/{} ({}%)",
                p.category.short_title(),
                p.selected,
                p.total,
                p.percent
            ),
        ));
    }
    lines
}

/// A4 portrait summary. `font` should be a TTF with Hangul glyphs; without
/// one the built-in Helvetica is used.
pub fn render_report_pdf(summary: &ReportSummary, font: Option<&Path>) -> Result<Vec<u8>> {
    let (doc, page, layer) =
        PdfDocument::new(REPORT_TITLE, Mm(A4_SHORT_MM), Mm(A4_LONG_MM), "Layer 1");
    let font = load_font(&doc, font)?;
    let layer = doc.get_page(page).get_layer(layer);

    // printpdf measures from the bottom edge
    let mut y = MARGIN_MM + 10.0;
    layer.use_text(
        REPORT_TITLE,
        18.0,
        Mm(A4_SHORT_MM / 2.0 - 30.0),
        Mm(A4_LONG_MM - y),
        &font,
    );
    y += 15.0;

    for (size, indent, gap, text) in report_lines(summary) {
        layer.use_text(text, size, Mm(MARGIN_MM + indent), Mm(A4_LONG_MM - y), &font);
        y += gap;
    }

    let bytes = doc.save_to_bytes().map_err(pdf_err)?;
    debug!("Report PDF rendered — school={} bytes={}", summary.school_name, bytes.len());
    Ok(bytes)
}

/// Placement of an image on a page, in millimetres from the bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Fits an image against the 1900x1200 px target, then shrinks it to the
/// page if it still overflows, and centers it.
pub fn fit_image(img_w: f32, img_h: f32, page_w: f32, page_h: f32) -> Placement {
    let target_w = TARGET_WIDTH_PX * MM_PER_PX;
    let target_h = TARGET_HEIGHT_PX * MM_PER_PX;
    let img_ratio = if img_h > 0.0 { img_w / img_h } else { 1.0 };

    let (width, height) = if img_ratio > target_w / target_h {
        let w = page_w.min(target_w);
        (w, w / img_ratio)
    } else {
        let h = page_h.min(target_h);
        (h * img_ratio, h)
    };
    let shrink = (page_w / width).min(page_h / height).min(1.0);
    let (width, height) = (width * shrink, height * shrink);

    Placement {
        x: (page_w - width) / 2.0,
        y: (page_h - height) / 2.0,
        width,
        height,
    }
}

/// Wraps a PNG screenshot in a landscape A4 page.
pub fn png_to_pdf(png: &[u8]) -> Result<Vec<u8>> {
    let (doc, page, layer) =
        PdfDocument::new(REPORT_TITLE, Mm(A4_LONG_MM), Mm(A4_SHORT_MM), "Layer 1");
    let layer = doc.get_page(page).get_layer(layer);

    let decoder = PngDecoder::new(Cursor::new(png)).map_err(pdf_err)?;
    let image = Image::try_from(decoder).map_err(pdf_err)?;
    let px_w = image.image.width.0 as f32;
    let px_h = image.image.height.0 as f32;

    let place = fit_image(px_w, px_h, A4_LONG_MM, A4_SHORT_MM);
    let natural_w = px_w * 25.4 / IMAGE_DPI;
    let natural_h = px_h * 25.4 / IMAGE_DPI;

    image.add_to_layer(
        layer,
        ImageTransform {
            translate_x: Some(Mm(place.x)),
            translate_y: Some(Mm(place.y)),
            scale_x: Some(place.width / natural_w),
            scale_y: Some(place.height / natural_h),
            dpi: Some(IMAGE_DPI),
            ..Default::default()
        },
    );

    doc.save_to_bytes().map_err(pdf_err)
}
