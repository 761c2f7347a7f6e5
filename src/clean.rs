use std::path::Path;

use lopdf::Document;
use tracing::info;

use crate::error::PdfLightenError;
use crate::geometry::{self, BoxKind};

/// Per-page record of which geometry box the resolver picked.
#[derive(Debug, Clone, Copy)]
pub struct BoxReport {
    /// 1-based page number.
    pub page: u32,
    pub source: BoxKind,
}

/// Rewrite every page's geometry so that all four boxes equal the rectangle
/// chosen by the box resolver. Returns one report per page naming the source
/// box (diagnostics only, never control flow).
///
/// Setting all four boxes to the same rectangle makes the pass idempotent:
/// on a second run the TrimBox is present and equal to the target, so the
/// resolver picks it with zero margin.
pub fn clean_document(doc: &mut Document, bleed_mm: f64) -> crate::error::Result<Vec<BoxReport>> {
    let pages = doc.get_pages();
    let mut reports = Vec::with_capacity(pages.len());

    for (&page_num, &page_id) in &pages {
        let resolved = geometry::resolve_page_box(doc, page_id, page_num, bleed_mm)?;

        let page_dict = doc.get_dictionary_mut(page_id)?;
        for kind in [BoxKind::Media, BoxKind::Crop, BoxKind::Trim, BoxKind::Bleed] {
            page_dict.set(kind.key(), resolved.rect.to_object());
        }

        info!(
            page = page_num,
            source = resolved.source.name(),
            "page boxes rewritten"
        );
        reports.push(BoxReport {
            page: page_num,
            source: resolved.source,
        });
    }

    Ok(reports)
}

/// File-level wrapper: load, clean, save.
pub fn clean_pdf(
    input: &Path,
    output: &Path,
    bleed_mm: f64,
) -> crate::error::Result<Vec<BoxReport>> {
    let mut doc = Document::load(input)
        .map_err(|e| PdfLightenError::document_read(format!("{}: {e}", input.display())))?;

    let reports = clean_document(&mut doc, bleed_mm)?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    doc.save(output)
        .map_err(|e| PdfLightenError::document_write(format!("{}: {e}", output.display())))?;

    Ok(reports)
}
