use std::path::Path;

use lopdf::Document;
use tracing::info;

use crate::config::profile::CompressionStrategy;
use crate::error::PdfLightenError;
use crate::process::chain::{Attempt, run_fallback_chain};
use crate::process::ghostscript::{self, VectorCompressOptions};
use crate::process::qpdf;
use crate::process::tools::ToolPaths;
use crate::raster::{self, RasterOptions};
use crate::recompress::{self, RecompressOptions};

/// Route one cleaned document to its terminal strategy and produce the
/// output artifact. Returns a short description of how the artifact was
/// produced (the winning strategy's label), for per-artifact reporting.
pub fn run_strategy(
    input: &Path,
    output: &Path,
    strategy: &CompressionStrategy,
    tools: &ToolPaths,
) -> crate::error::Result<String> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match *strategy {
        CompressionStrategy::Copy => {
            std::fs::copy(input, output)?;
            Ok("copy".to_string())
        }

        CompressionStrategy::RecompressImages { quality, scale } => {
            run_recompress_ladder(input, output, quality, scale, tools)
        }

        CompressionStrategy::VectorPreserving {
            image_dpi,
            jpeg_quality,
            normalize_color,
        } => {
            let opts = VectorCompressOptions {
                image_dpi,
                jpeg_quality,
                normalize_color,
            };
            ghostscript::compress_pdf(input, output, &opts, tools)
        }

        CompressionStrategy::Rasterize {
            dpi,
            quality,
            format,
            normalize_color,
        } => {
            let opts = RasterOptions {
                dpi,
                quality,
                format,
                normalize_color,
            };
            let pages = raster::rasterize_pdf(input, output, &opts, tools)?;
            Ok(format!("rasterized {pages} pages at {dpi} dpi"))
        }
    }
}

/// The safest-first ladder for image-only compression:
/// in-place recompression cannot corrupt vector content but needs the
/// codec to cope with the input; qpdf is more forgiving but only
/// recompresses stream data; the verbatim copy always succeeds.
fn run_recompress_ladder(
    input: &Path,
    output: &Path,
    quality: u8,
    scale: f32,
    tools: &ToolPaths,
) -> crate::error::Result<String> {
    let attempts: Vec<Attempt<'_, ()>> = vec![
        (
            "in-place image recompression".into(),
            Box::new(move || {
                let result = recompress_in_place(input, output, quality, scale);
                if result.is_err() {
                    // Drop any partial artifact before the next rung runs.
                    let _ = std::fs::remove_file(output);
                }
                result
            }),
        ),
        (
            "qpdf stream compression".into(),
            Box::new(move || {
                let qpdf_bin = tools.require_qpdf()?;
                qpdf::compress_streams(qpdf_bin, input, output)
            }),
        ),
        (
            "verbatim copy".into(),
            Box::new(move || {
                std::fs::copy(input, output)?;
                Ok(())
            }),
        ),
    ];

    let outcome = run_fallback_chain("image recompression", attempts)?;
    Ok(outcome.label)
}

fn recompress_in_place(
    input: &Path,
    output: &Path,
    quality: u8,
    scale: f32,
) -> crate::error::Result<()> {
    let mut doc = Document::load(input)
        .map_err(|e| PdfLightenError::document_read(format!("{}: {e}", input.display())))?;

    let opts = RecompressOptions { quality, scale };
    let changed = recompress::recompress_images(&mut doc, &opts)?;
    recompress::compress_plain_streams(&mut doc);

    doc.save(output)
        .map_err(|e| PdfLightenError::document_write(format!("{}: {e}", output.display())))?;

    // Validate the artifact before declaring success.
    let check = Document::load(output)
        .map_err(|e| PdfLightenError::document_write(format!("output failed validation: {e}")))?;
    let pages = check.get_pages().len();
    info!(
        images = changed,
        pages,
        output = %output.display(),
        "in-place recompression done"
    );
    Ok(())
}
