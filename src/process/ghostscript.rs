use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::error::PdfLightenError;
use crate::process::chain::{Attempt, check_produced, run_fallback_chain};
use crate::process::qpdf;
use crate::process::tools::ToolPaths;

/// Parameters for a vector-preserving compression run.
#[derive(Debug, Clone, Copy)]
pub struct VectorCompressOptions {
    /// Target resolution for downsampled images.
    pub image_dpi: u32,
    /// JPEG quality for re-encoded images, 1-95.
    pub jpeg_quality: u8,
    /// Convert remaining colour to sRGB. Off by default for print work.
    pub normalize_color: bool,
}

/// One labelled Ghostscript parameter set.
#[derive(Debug, Clone)]
pub struct GsStrategy {
    pub label: &'static str,
    pub args: Vec<String>,
}

/// Base flags every pdfwrite invocation carries.
fn base_args(compatibility: &str) -> Vec<String> {
    vec![
        "-dBATCH".into(),
        "-dNOPAUSE".into(),
        "-dSAFER".into(),
        "-sDEVICE=pdfwrite".into(),
        format!("-dCompatibilityLevel={compatibility}"),
        "-dAutoRotatePages=/None".into(),
    ]
}

/// Compression strategies, most feature-preserving first.
///
/// Some inputs trip Ghostscript-internal errors (rangecheck on malformed
/// content streams) under rich parameter sets yet pass under degraded
/// ones, hence the ladder.
pub fn compression_strategies(opts: &VectorCompressOptions) -> Vec<GsStrategy> {
    let mut full = base_args("1.5");
    full.extend([
        "-dDetectDuplicateImages=true".into(),
        "-dSubsetFonts=true".into(),
        "-dEmbedAllFonts=true".into(),
        "-dCompressFonts=true".into(),
        "-dTextAlphaBits=4".into(),
        "-dGraphicsAlphaBits=4".into(),
        "-dDownsampleColorImages=true".into(),
        "-dDownsampleGrayImages=true".into(),
        "-dColorImageDownsampleType=/Bicubic".into(),
        "-dGrayImageDownsampleType=/Bicubic".into(),
        format!("-dColorImageResolution={}", opts.image_dpi),
        format!("-dGrayImageResolution={}", opts.image_dpi),
        format!("-dJPEGQ={}", opts.jpeg_quality),
    ]);
    if opts.normalize_color {
        full.push("-sColorConversionStrategy=sRGB".into());
        full.push("-dProcessColorModel=/DeviceRGB".into());
    }

    let mut reduced = base_args("1.5");
    reduced.extend([
        "-dCompressFonts=true".into(),
        "-dDownsampleColorImages=true".into(),
        format!("-dColorImageResolution={}", opts.image_dpi),
        format!("-dJPEGQ={}", opts.jpeg_quality),
    ]);

    let mut minimal = base_args("1.4");
    minimal.extend(["-dCompressFonts=true".into(), "-dCompressStreams=true".into()]);

    vec![
        GsStrategy {
            label: "gs full",
            args: full,
        },
        GsStrategy {
            label: "gs reduced",
            args: reduced,
        },
        GsStrategy {
            label: "gs minimal",
            args: minimal,
        },
    ]
}

/// Run one pdfwrite invocation. Non-zero exit or a missing output file is
/// an error carrying the processor's diagnostic text.
pub fn run_pdfwrite(
    gs: &Path,
    args: &[String],
    input: &Path,
    output: &Path,
) -> crate::error::Result<()> {
    let result = Command::new(gs)
        .args(args)
        .arg(format!("-sOutputFile={}", output.display()))
        .arg(input)
        .output()
        .map_err(|e| PdfLightenError::processor_unavailable(format!("failed to execute gs: {e}")))?;

    if !result.status.success() {
        // A failed run may leave a partial file behind; it must not be
        // mistaken for a produced artifact by the next strategy.
        let _ = std::fs::remove_file(output);
        let stderr = String::from_utf8_lossy(&result.stderr);
        let detail = if stderr.trim().is_empty() {
            format!(
                "exit code {}",
                result.status.code().map_or("unknown".into(), |c| c.to_string())
            )
        } else {
            stderr.trim().to_string()
        };
        return Err(PdfLightenError::processor_failed("gs", vec![detail]));
    }

    let stderr = String::from_utf8_lossy(&result.stderr);
    check_produced(output, stderr.trim(), result.status.code())
}

/// Vector-preserving compression through the fallback ladder.
///
/// Returns the label of the winning strategy. After a successful run that
/// requested colour normalization, a best-effort qpdf rewrite pass is
/// attempted; its failure never downgrades the result.
pub fn compress_pdf(
    input: &Path,
    output: &Path,
    opts: &VectorCompressOptions,
    tools: &ToolPaths,
) -> crate::error::Result<String> {
    let gs = tools.require_ghostscript()?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let strategies = compression_strategies(opts);
    let attempts: Vec<Attempt<'_, ()>> = strategies
        .into_iter()
        .map(|s| {
            let label = s.label.to_string();
            let args = s.args;
            let attempt: Attempt<'_, ()> = (
                label,
                Box::new(move || run_pdfwrite(gs, &args, input, output)),
            );
            attempt
        })
        .collect();

    let outcome = run_fallback_chain("vector compression", attempts)?;
    info!(strategy = %outcome.label, output = %output.display(), "vector compression done");

    if opts.normalize_color
        && let Some(qpdf_bin) = tools.qpdf.as_deref()
        && let Err(e) = qpdf::rewrite_in_place(qpdf_bin, output)
    {
        debug!(error = %e, "optional qpdf colour cleanup pass failed, keeping gs output");
    }

    Ok(outcome.label)
}

/// Convert a document's colour to RGB (rasterizer pre-pass).
pub fn convert_to_rgb(
    gs: &Path,
    input: &Path,
    output: &Path,
) -> crate::error::Result<()> {
    let mut args = base_args("1.5");
    args.push("-dProcessColorModel=/DeviceRGB".into());
    args.push("-sColorConversionStrategy=RGB".into());
    run_pdfwrite(gs, &args, input, output)
}
