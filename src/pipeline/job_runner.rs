// Job level: clean -> optional flatten -> one artifact per profile

use std::path::PathBuf;

use lopdf::Document;
use tracing::{info, warn};

use crate::config::profile::{ColorPolicy, CompressionProfile};
use crate::dispatch::run_strategy;
use crate::error::PdfLightenError;
use crate::process::flatten::flatten_pdf;
use crate::process::tools::ToolPaths;

/// Configuration for a single job (one input document).
pub struct JobConfig {
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    /// Bleed margin to trim, in millimetres.
    pub bleed_mm: f64,
    pub color: ColorPolicy,
    pub profiles: Vec<CompressionProfile>,
    /// Also emit a transparency-flattened variant of the cleaned file.
    pub flatten: bool,
}

/// Outcome of one requested artifact.
pub enum ArtifactOutcome {
    /// Produced, with a short description of the path taken.
    Produced { via: String },
    Failed { error: PdfLightenError },
}

pub struct ArtifactReport {
    /// Profile name, or "flatten" for the flattened variant.
    pub label: String,
    pub path: PathBuf,
    pub outcome: ArtifactOutcome,
}

/// Result of processing a single job. Individual artifacts may have
/// failed; only a failure to read or clean the input fails the job.
pub struct JobResult {
    pub input_path: PathBuf,
    pub pages: usize,
    pub artifacts: Vec<ArtifactReport>,
}

/// Run one document through the full pipeline.
///
/// The cleaned intermediate is written once into a scratch directory and
/// every profile compresses from it, so box resolution and bleed
/// trimming happen exactly once per input. Artifact failures are
/// collected per profile rather than aborting the rest of the job.
pub fn run_job(config: &JobConfig, tools: &ToolPaths) -> crate::error::Result<JobResult> {
    let base = config
        .input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();

    std::fs::create_dir_all(&config.output_dir)?;
    // Scratch space for the cleaned intermediate, removed on every exit
    // path when the guard drops.
    let workdir = tempfile::tempdir()?;

    // Clean: resolve page boxes and trim bleed. Unreadable input or
    // degenerate geometry is fatal for the whole job.
    let mut doc = Document::load(&config.input_path).map_err(|e| {
        PdfLightenError::document_read(format!("{}: {e}", config.input_path.display()))
    })?;
    let reports = crate::clean::clean_document(&mut doc, config.bleed_mm)?;
    let pages = reports.len();
    info!(
        input = %config.input_path.display(),
        pages,
        "document cleaned"
    );

    let cleaned_path = workdir.path().join("cleaned.pdf");
    doc.save(&cleaned_path).map_err(|e| {
        PdfLightenError::document_write(format!("{}: {e}", cleaned_path.display()))
    })?;

    let mut artifacts: Vec<ArtifactReport> = Vec::new();

    if config.flatten {
        let flat_path = config.output_dir.join(format!("{base}-flat.pdf"));
        let outcome = match flatten_pdf(&cleaned_path, &flat_path, tools) {
            Ok(via) => ArtifactOutcome::Produced { via },
            Err(error) => {
                warn!(input = %config.input_path.display(), error = %error, "flatten failed");
                ArtifactOutcome::Failed { error }
            }
        };
        artifacts.push(ArtifactReport {
            label: "flatten".into(),
            path: flat_path,
            outcome,
        });
    }

    for profile in &config.profiles {
        let out_path = config
            .output_dir
            .join(format!("{base}-{}.pdf", profile.name));
        let strategy = profile.to_strategy(config.color);
        let outcome = match run_strategy(&cleaned_path, &out_path, &strategy, tools) {
            Ok(via) => {
                info!(profile = %profile.name, via = %via, output = %out_path.display(), "artifact produced");
                ArtifactOutcome::Produced { via }
            }
            Err(error) => {
                warn!(profile = %profile.name, error = %error, "artifact failed");
                ArtifactOutcome::Failed { error }
            }
        };
        artifacts.push(ArtifactReport {
            label: profile.name.clone(),
            path: out_path,
            outcome,
        });
    }

    Ok(JobResult {
        input_path: config.input_path.clone(),
        pages,
        artifacts,
    })
}
