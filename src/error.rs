use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfLightenError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("PDF read error: {0}")]
    DocumentReadError(String),

    #[error("PDF write error: {0}")]
    DocumentWriteError(String),

    // Field cannot be called `source`: thiserror reserves that name for
    // the error-source chain.
    #[error("Invalid geometry on page {page}: bleed margin inverts the {source_box} rectangle")]
    InvalidGeometry { page: u32, source_box: String },

    #[error("External processor not available: {0}")]
    ProcessorUnavailable(String),

    #[error("{operation} failed after {} strategies: {}", attempts.len(), attempts.join("; "))]
    ProcessorFailed {
        operation: String,
        attempts: Vec<String>,
    },

    #[error("Image codec error: {0}")]
    ImageCodecError(String),

    #[error("Raster error: {0}")]
    RasterError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Generates factory methods for [`PdfLightenError`] variants that wrap a `String`.
macro_rules! error_constructors {
    ($(
        $(#[doc = $doc:expr])*
        $method:ident => $variant:ident
    ),* $(,)?) => {
        impl PdfLightenError {
            $(
                $(#[doc = $doc])*
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    /// Create a configuration error.
    config => ConfigError,
    /// Create a PDF read error.
    document_read => DocumentReadError,
    /// Create a PDF write error.
    document_write => DocumentWriteError,
    /// Create a processor-unavailable error.
    processor_unavailable => ProcessorUnavailable,
    /// Create an image codec error.
    image_codec => ImageCodecError,
    /// Create a raster error.
    raster => RasterError,
}

impl PdfLightenError {
    /// Degenerate page rectangle after margin adjustment.
    pub fn invalid_geometry(page: u32, source_box: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            page,
            source_box: source_box.into(),
        }
    }

    /// Every strategy of a fallback chain was exhausted.
    pub fn processor_failed(operation: impl Into<String>, attempts: Vec<String>) -> Self {
        Self::ProcessorFailed {
            operation: operation.into(),
            attempts,
        }
    }
}

impl From<lopdf::Error> for PdfLightenError {
    fn from(e: lopdf::Error) -> Self {
        Self::DocumentReadError(e.to_string())
    }
}

impl From<serde_yml::Error> for PdfLightenError {
    fn from(e: serde_yml::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

impl From<image::ImageError> for PdfLightenError {
    fn from(e: image::ImageError) -> Self {
        Self::ImageCodecError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PdfLightenError>;
