pub mod clean;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod process;
pub mod raster;
pub mod recompress;

pub use error::{PdfLightenError, Result};
