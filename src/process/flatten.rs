use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tracing::info;

use crate::error::PdfLightenError;
use crate::process::chain::{Attempt, run_fallback_chain};
use crate::process::ghostscript::run_pdfwrite;
use crate::process::qpdf;
use crate::process::tools::ToolPaths;

/// Bound on the qpdf pre-rewrite sub-step. A qpdf stuck on a pathological
/// input is treated as a failed strategy, not a hang.
const QPDF_REWRITE_TIMEOUT: Duration = Duration::from_secs(120);

fn flatten_base(compatibility: &str) -> Vec<String> {
    vec![
        "-dBATCH".into(),
        "-dNOPAUSE".into(),
        "-dSAFER".into(),
        "-sDEVICE=pdfwrite".into(),
        format!("-dCompatibilityLevel={compatibility}"),
        "-dAutoRotatePages=/None".into(),
    ]
}

/// Flatten transparency while keeping text and vectors sharp.
///
/// PDF 1.3 has no transparency model, so pdfwrite targeting 1.3 merges
/// transparency groups into opaque content. The chain degrades from the
/// full parameter set down to two input-rewriting detours for documents
/// whose content streams Ghostscript rejects outright:
///
/// 1. `gs compat 1.3` — full parameters, anti-aliasing preserved;
/// 2. `gs flatten reduced` — 1.3 with rendering controls dropped;
/// 3. `gs flatten minimal` — 1.4 with minimal safe parameters;
/// 4. normalize the input through qpdf, retry the minimal set;
/// 5. convert to PostScript via pdftops, retry the minimal set on that.
///
/// Returns the label of the strategy that succeeded.
pub fn flatten_pdf(
    input: &Path,
    output: &Path,
    tools: &ToolPaths,
) -> crate::error::Result<String> {
    let gs = tools.require_ghostscript()?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut full = flatten_base("1.3");
    full.extend([
        "-dTextAlphaBits=4".into(),
        "-dGraphicsAlphaBits=4".into(),
        "-sColorConversionStrategy=LeaveColorUnchanged".into(),
    ]);
    let reduced = flatten_base("1.3");
    let minimal = flatten_base("1.4");

    let minimal_for_qpdf = minimal.clone();
    let minimal_for_ps = minimal.clone();

    let attempts: Vec<Attempt<'_, ()>> = vec![
        (
            "gs compat 1.3".into(),
            Box::new(move || run_pdfwrite(gs, &full, input, output)),
        ),
        (
            "gs flatten reduced".into(),
            Box::new(move || run_pdfwrite(gs, &reduced, input, output)),
        ),
        (
            "gs flatten minimal".into(),
            Box::new(move || run_pdfwrite(gs, &minimal, input, output)),
        ),
        (
            "qpdf rewrite + gs minimal".into(),
            Box::new(move || {
                let qpdf_bin = tools.require_qpdf()?;
                let workdir = tempfile::tempdir()?;
                let rewritten = workdir.path().join("rewritten.pdf");
                qpdf::rewrite_streams(qpdf_bin, input, &rewritten, QPDF_REWRITE_TIMEOUT)?;
                run_pdfwrite(gs, &minimal_for_qpdf, &rewritten, output)
                // workdir and its artifacts are removed on drop, on every
                // exit path of this closure.
            }),
        ),
        (
            "pdftops roundtrip + gs minimal".into(),
            Box::new(move || {
                let pdftops = tools.require_pdftops()?;
                let workdir = tempfile::tempdir()?;
                let ps_path = workdir.path().join("intermediate.ps");
                pdf_to_postscript(pdftops, input, &ps_path)?;
                run_pdfwrite(gs, &minimal_for_ps, &ps_path, output)
            }),
        ),
    ];

    let outcome = run_fallback_chain("transparency flattening", attempts)?;
    info!(strategy = %outcome.label, output = %output.display(), "flattening done");
    Ok(outcome.label)
}

/// Convert a PDF to an intermediate PostScript file via pdftops.
fn pdf_to_postscript(pdftops: &Path, input: &Path, output: &Path) -> crate::error::Result<()> {
    let result = Command::new(pdftops)
        .arg(input)
        .arg(output)
        .output()
        .map_err(|e| {
            PdfLightenError::processor_unavailable(format!("failed to execute pdftops: {e}"))
        })?;

    if !result.status.success() || !output.exists() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(PdfLightenError::processor_failed(
            "pdftops",
            vec![format!(
                "exit code {}: {}",
                result.status.code().map_or("unknown".into(), |c| c.to_string()),
                stderr.trim()
            )],
        ));
    }
    Ok(())
}
