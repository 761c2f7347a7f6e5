use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::PdfLightenError;

/// Optional explicit tool locations from the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolOverrides {
    pub ghostscript: Option<PathBuf>,
    pub qpdf: Option<PathBuf>,
    pub pdftoppm: Option<PathBuf>,
    pub pdftops: Option<PathBuf>,
}

/// Resolved external tool paths.
///
/// Discovery runs once at startup and the result is passed into every
/// invoker; nothing re-probes the environment mid-operation. A `None`
/// entry means the tool is absent, which fails only the profiles that
/// need it.
#[derive(Debug, Clone, Default)]
pub struct ToolPaths {
    pub ghostscript: Option<PathBuf>,
    pub qpdf: Option<PathBuf>,
    pub pdftoppm: Option<PathBuf>,
    pub pdftops: Option<PathBuf>,
}

/// Conventional install locations probed after PATH.
const EXTRA_DIRS: &[&str] = &["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin"];

impl ToolPaths {
    pub fn discover(overrides: &ToolOverrides) -> Self {
        ToolPaths {
            ghostscript: find_tool("gs", overrides.ghostscript.as_deref()),
            qpdf: find_tool("qpdf", overrides.qpdf.as_deref()),
            pdftoppm: find_tool("pdftoppm", overrides.pdftoppm.as_deref()),
            pdftops: find_tool("pdftops", overrides.pdftops.as_deref()),
        }
    }

    pub fn require_ghostscript(&self) -> crate::error::Result<&Path> {
        self.ghostscript.as_deref().ok_or_else(|| {
            PdfLightenError::processor_unavailable("ghostscript (gs) not found in PATH")
        })
    }

    pub fn require_qpdf(&self) -> crate::error::Result<&Path> {
        self.qpdf
            .as_deref()
            .ok_or_else(|| PdfLightenError::processor_unavailable("qpdf not found in PATH"))
    }

    pub fn require_pdftoppm(&self) -> crate::error::Result<&Path> {
        self.pdftoppm.as_deref().ok_or_else(|| {
            PdfLightenError::processor_unavailable("pdftoppm (poppler) not found in PATH")
        })
    }

    pub fn require_pdftops(&self) -> crate::error::Result<&Path> {
        self.pdftops.as_deref().ok_or_else(|| {
            PdfLightenError::processor_unavailable("pdftops (poppler) not found in PATH")
        })
    }
}

/// Locate a tool: explicit override first, then PATH, then conventional
/// install directories.
fn find_tool(name: &str, override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = override_path {
        if p.exists() {
            return Some(p.to_path_buf());
        }
        return None;
    }

    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    for dir in EXTRA_DIRS {
        let candidate = Path::new(dir).join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    None
}
