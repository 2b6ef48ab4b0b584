//! Page re-import tier: rasterize and rebuild.
//!
//! Renders every page of the restricted document to a bitmap via PDFium,
//! then embeds the bitmaps into a freshly authored document. The rebuilt
//! file carries no encryption dictionary at all, which makes this tier
//! effective against restriction schemes the external tools cannot touch.
//! The trade-off is inherent: text becomes pixels, so selectable text,
//! bookmarks, and annotations are lost.
//!
//! The PDFium dynamic library is discovered at attempt time
//! (`PDFIUM_DYNAMIC_LIB_PATH`, alongside the executable, then the system
//! search path). A host without the library yields a normal strategy
//! failure, never an error that stops the cascade.

use std::fs;
use std::io::{BufWriter, Cursor};
use std::path::Path;

use image::ImageOutputFormat;
use pdfium_render::prelude::*;
use printpdf::{ImageTransform, Mm, PdfDocument};

use crate::pipeline::strategy::{StrategyContext, UnlockOutcome, UnlockStrategy, verify_output};

/// Upper bound on either rendered dimension. Guards against absurd page
/// sizes or DPI settings producing multi-gigabyte bitmaps.
const MAX_DIMENSION_PX: u32 = 4096;

const POINTS_PER_INCH: f32 = 72.0;
const MM_PER_POINT: f32 = 25.4 / 72.0;

/// Compute pixel dimensions for a page render, clamped to
/// `[1, MAX_DIMENSION_PX]` with aspect ratio preserved when capping.
fn render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let max_dim = raw_w.max(raw_h);
    if max_dim > MAX_DIMENSION_PX as f32 {
        let ratio = MAX_DIMENSION_PX as f32 / max_dim;
        let w = ((raw_w * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        let h = ((raw_h * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
        (w, h)
    } else {
        (raw_w as u32, raw_h as u32)
    }
}

/// Load the PDFium dynamic library.
///
/// Discovery order: explicit `PDFIUM_DYNAMIC_LIB_PATH`, alongside the
/// running executable, then the system library search path.
fn load_pdfium() -> Result<Pdfium, String> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| format!("pdfium load from {path} failed: {e}"))?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe()
        && let Some(exe_dir) = exe.parent()
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| format!("pdfium library not found: {e}"))?;
    Ok(Pdfium::new(bindings))
}

/// Rebuild `input` as a fresh image-only document at `dpi`.
fn rebuild_as_images(input: &Path, dpi: u32) -> Result<Vec<u8>, String> {
    let pdfium = load_pdfium()?;
    let bytes = fs::read(input).map_err(|e| format!("read failed: {e}"))?;
    let document = pdfium
        .load_pdf_from_byte_slice(&bytes, None)
        .map_err(|e| format!("pdfium could not open document: {e}"))?;

    let pages = document.pages();
    if pages.is_empty() {
        return Err("document has no pages".into());
    }

    let mut rebuilt: Option<printpdf::PdfDocumentReference> = None;
    for (index, page) in pages.iter().enumerate() {
        let width_points = page.width().value;
        let height_points = page.height().value;
        let (target_w, target_h) = render_dimensions(width_points, height_points, dpi);

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| format!("render of page {index} failed: {e}"))?;

        // Round-trip through PNG bytes: pdfium hands back an image-0.23
        // bitmap while printpdf embeds via its own re-exported image crate.
        let mut png = Cursor::new(Vec::new());
        bitmap
            .as_image()
            .write_to(&mut png, ImageOutputFormat::Png)
            .map_err(|e| format!("png encode of page {index} failed: {e}"))?;
        let decoded = printpdf::image_crate::load_from_memory(&png.into_inner())
            .map_err(|e| format!("png decode of page {index} failed: {e}"))?;

        let page_mm = (
            Mm(width_points * MM_PER_POINT),
            Mm(height_points * MM_PER_POINT),
        );
        let layer = match &rebuilt {
            None => {
                let (doc, first_page, first_layer) =
                    PdfDocument::new("", page_mm.0, page_mm.1, "Layer 1");
                let layer = doc.get_page(first_page).get_layer(first_layer);
                rebuilt = Some(doc);
                layer
            }
            Some(doc) => {
                let (page_idx, layer_idx) = doc.add_page(page_mm.0, page_mm.1, "Layer 1");
                doc.get_page(page_idx).get_layer(layer_idx)
            }
        };

        let embedded = printpdf::Image::from_dynamic_image(&decoded);
        embedded.add_to_layer(
            layer,
            ImageTransform {
                dpi: Some(dpi as f32),
                ..ImageTransform::default()
            },
        );
    }

    let doc = rebuilt.ok_or_else(|| "no pages rebuilt".to_string())?;
    let mut writer = BufWriter::new(Vec::new());
    doc.save(&mut writer)
        .map_err(|e| format!("document save failed: {e}"))?;
    writer
        .into_inner()
        .map_err(|e| format!("document buffer failed: {e}"))
}

/// Tier 2: lossy page re-import via PDFium rendering.
#[derive(Debug, Default)]
pub struct PageReimport;

impl UnlockStrategy for PageReimport {
    fn name(&self) -> &'static str {
        "reimport"
    }

    fn attempt(&self, input: &Path, output: &Path, cx: &StrategyContext<'_>) -> UnlockOutcome {
        let bytes = match rebuild_as_images(input, cx.config.reimport_dpi) {
            Ok(bytes) => bytes,
            Err(reason) => return UnlockOutcome::failure(self.name(), reason),
        };
        if let Err(e) = fs::write(output, &bytes) {
            return UnlockOutcome::failure(self.name(), format!("write failed: {e}"));
        }
        if let Some(reason) = verify_output(output) {
            return UnlockOutcome::failure(self.name(), reason);
        }
        UnlockOutcome::success(
            self.name(),
            "pages rasterized and re-imported; text layer not preserved",
        )
    }
}
