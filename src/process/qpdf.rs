use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::error::PdfLightenError;
use crate::process::chain::run_with_timeout;

/// qpdf exit code 3 means "completed with warnings" and counts as success.
const EXIT_WARNINGS: i32 = 3;

/// Recompress stream data: `qpdf --stream-data=compress -- in out`.
pub fn compress_streams(qpdf: &Path, input: &Path, output: &Path) -> crate::error::Result<()> {
    let result = Command::new(qpdf)
        .arg("--stream-data=compress")
        .arg("--")
        .arg(input)
        .arg(output)
        .output()
        .map_err(|e| {
            PdfLightenError::processor_unavailable(format!("failed to execute qpdf: {e}"))
        })?;

    match result.status.code() {
        Some(0) | Some(EXIT_WARNINGS) => Ok(()),
        code => {
            let stderr = String::from_utf8_lossy(&result.stderr);
            Err(PdfLightenError::processor_failed(
                "qpdf stream compression",
                vec![format!(
                    "exit code {}: {}",
                    code.map_or("unknown".into(), |c| c.to_string()),
                    stderr.trim()
                )],
            ))
        }
    }
}

/// Normalize a possibly malformed document by rewriting all streams.
///
/// Used as a pre-pass before retrying Ghostscript on inputs that trip
/// processor-internal errors. Runs under a bounded wait: a stuck qpdf is
/// a failure, not a hang.
pub fn rewrite_streams(
    qpdf: &Path,
    input: &Path,
    output: &Path,
    timeout: Duration,
) -> crate::error::Result<()> {
    let mut cmd = Command::new(qpdf);
    cmd.arg("--stream-data=uncompress").arg("--").arg(input).arg(output);

    let out = run_with_timeout(&mut cmd, timeout)?;
    match out.code {
        Some(0) | Some(EXIT_WARNINGS) => Ok(()),
        code => Err(PdfLightenError::processor_failed(
            "qpdf stream rewrite",
            vec![format!(
                "exit code {}: {}",
                code.map_or("unknown".into(), |c| c.to_string()),
                out.stderr
            )],
        )),
    }
}

/// In-place stream rewrite via a sibling temp file. Best-effort helper for
/// the post-compression colour cleanup pass.
pub fn rewrite_in_place(qpdf: &Path, path: &Path) -> crate::error::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::Builder::new()
        .prefix(".qpdf-rewrite-")
        .suffix(".pdf")
        .tempfile_in(dir)?;

    compress_streams(qpdf, path, tmp.path())?;
    tmp.persist(path)
        .map_err(|e| PdfLightenError::IoError(e.error))?;
    Ok(())
}
