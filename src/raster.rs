use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::{Document, Object, Stream, dictionary};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::PdfLightenError;
use crate::process::ghostscript;
use crate::process::tools::ToolPaths;

/// Raster encodings embeddable in a PDF image XObject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    /// DCTDecode at the requested quality.
    #[default]
    Jpeg,
    /// FlateDecode over raw RGB pixels.
    Lossless,
}

#[derive(Debug, Clone, Copy)]
pub struct RasterOptions {
    pub dpi: u32,
    /// JPEG quality, 1-95. Ignored for `Lossless`.
    pub quality: u8,
    pub format: RasterFormat,
    /// Run a Ghostscript RGB conversion pre-pass before rasterizing.
    pub normalize_color: bool,
}

/// Convert every page to a full-page raster image in a fresh document.
///
/// Pages are rendered independently with single-page ranges, so one
/// failing page is skipped rather than aborting the rest. Page physical
/// size is preserved: `pixels ÷ dpi × 72` points.
///
/// Returns the number of pages written.
pub fn rasterize_pdf(
    input: &Path,
    output: &Path,
    opts: &RasterOptions,
    tools: &ToolPaths,
) -> crate::error::Result<usize> {
    let pdftoppm = tools.require_pdftoppm()?;

    let source = Document::load(input)
        .map_err(|e| PdfLightenError::document_read(format!("{}: {e}", input.display())))?;
    let page_count = source.get_pages().len() as u32;
    drop(source);

    let workdir = tempfile::tempdir()?;

    // Optional CMYK -> RGB pre-pass; the original file is used when the
    // conversion fails or Ghostscript is absent.
    let mut render_input: PathBuf = input.to_path_buf();
    if opts.normalize_color
        && let Some(gs) = tools.ghostscript.as_deref()
    {
        let rgb_path = workdir.path().join("rgb.pdf");
        match ghostscript::convert_to_rgb(gs, input, &rgb_path) {
            Ok(()) => render_input = rgb_path,
            Err(e) => warn!(error = %e, "RGB pre-conversion failed, rasterizing original"),
        }
    }

    let mut writer = RasterPageWriter::new();
    for page in 1..=page_count {
        let image = match render_single_page(pdftoppm, &render_input, workdir.path(), page, opts.dpi)
        {
            Ok(Some(img)) => img,
            Ok(None) => {
                warn!(page, "rasterizer produced no image, skipping page");
                continue;
            }
            Err(e) => {
                warn!(page, error = %e, "page rasterization failed, skipping page");
                continue;
            }
        };

        let rgb = image.to_rgb8();
        let (px_w, px_h) = rgb.dimensions();
        let encoded = match opts.format {
            RasterFormat::Jpeg => {
                let mut buf = std::io::Cursor::new(Vec::new());
                let encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, opts.quality);
                rgb.write_with_encoder(encoder)?;
                buf.into_inner()
            }
            RasterFormat::Lossless => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(rgb.as_raw())?;
                encoder.finish()?
            }
        };

        writer.add_page(&encoded, px_w, px_h, opts.dpi, opts.format);
        info!(page, total = page_count, dpi = opts.dpi, "page rasterized");
    }

    let pages_written = writer.page_count();
    if pages_written == 0 {
        return Err(PdfLightenError::raster(
            "no page could be rasterized from the input",
        ));
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    writer.save(output)?;
    Ok(pages_written)
}

/// Render one page via pdftoppm with a single-page range. `Ok(None)`
/// means the tool succeeded but produced nothing for this page.
fn render_single_page(
    pdftoppm: &Path,
    input: &Path,
    workdir: &Path,
    page: u32,
    dpi: u32,
) -> crate::error::Result<Option<image::DynamicImage>> {
    let prefix = workdir.join(format!("page-{page}"));
    let result = Command::new(pdftoppm)
        .arg("-png")
        .arg("-r")
        .arg(dpi.to_string())
        .arg("-f")
        .arg(page.to_string())
        .arg("-l")
        .arg(page.to_string())
        .arg("-singlefile")
        .arg(input)
        .arg(&prefix)
        .output()
        .map_err(|e| {
            PdfLightenError::processor_unavailable(format!("failed to execute pdftoppm: {e}"))
        })?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(PdfLightenError::raster(format!(
            "pdftoppm exit code {}: {}",
            result.status.code().map_or("unknown".into(), |c| c.to_string()),
            stderr.trim()
        )));
    }

    let rendered = prefix.with_extension("png");
    if !rendered.exists() {
        return Ok(None);
    }

    let img = image::open(&rendered)
        .map_err(|e| PdfLightenError::raster(format!("cannot decode rendered page: {e}")))?;
    Ok(Some(img))
}

/// Assembles a document of full-page image pages.
struct RasterPageWriter {
    doc: Document,
    pages_id: lopdf::ObjectId,
    kids: Vec<Object>,
}

impl RasterPageWriter {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    fn page_count(&self) -> usize {
        self.kids.len()
    }

    fn add_page(&mut self, encoded: &[u8], px_w: u32, px_h: u32, dpi: u32, format: RasterFormat) {
        let width_pt = px_w as f64 / dpi as f64 * 72.0;
        let height_pt = px_h as f64 / dpi as f64 * 72.0;

        let filter = match format {
            RasterFormat::Jpeg => "DCTDecode",
            RasterFormat::Lossless => "FlateDecode",
        };
        let image_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => px_w as i64,
            "Height" => px_h as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => filter,
        };
        let image_id = self
            .doc
            .add_object(Object::Stream(Stream::new(image_dict, encoded.to_vec())));

        let mut xobjects = lopdf::Dictionary::new();
        xobjects.set("Im0", Object::Reference(image_id));
        let resources_id = self.doc.add_object(dictionary! {
            "XObject" => Object::Dictionary(xobjects),
        });

        let content = format!("q {width_pt:.4} 0 0 {height_pt:.4} 0 0 cm /Im0 Do Q").into_bytes();
        let content_id = self
            .doc
            .add_object(Object::Stream(Stream::new(dictionary! {}, content)));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(width_pt as f32),
                Object::Real(height_pt as f32),
            ],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
    }

    fn save(mut self, output: &Path) -> crate::error::Result<()> {
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids.clone(),
            "Count" => self.kids.len() as i64,
        };
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        self.doc
            .save(output)
            .map_err(|e| PdfLightenError::document_write(format!("{}: {e}", output.display())))?;
        Ok(())
    }
}
