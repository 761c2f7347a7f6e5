use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use lopdf::{Document, Object, ObjectId};
use tracing::{debug, warn};

use crate::error::PdfLightenError;

/// Images with either dimension below this are icons/logos, presumed
/// intentionally small, and are never touched.
const MIN_DIMENSION: u32 = 100;

#[derive(Debug, Clone, Copy)]
pub struct RecompressOptions {
    /// JPEG quality, 1-95.
    pub quality: u8,
    /// Downscale factor; 1.0 means no resize.
    pub scale: f32,
}

/// Metadata read from an image XObject stream dictionary.
#[derive(Debug, Clone)]
struct ImageMeta {
    width: u32,
    height: u32,
    bits_per_component: u8,
    color_space: Option<String>,
    filter: Option<String>,
    predictor: Predictor,
}

/// Row predictor declared in `DecodeParms`. Flate images almost always
/// carry one; inflated bytes are row-filtered, not raw pixels, until the
/// predictor is reversed.
#[derive(Debug, Clone, Copy)]
struct Predictor {
    /// 1 = none, 2 = TIFF horizontal differencing, >= 10 = PNG filters.
    kind: i64,
    colors: usize,
    columns: usize,
    bits_per_component: i64,
}

impl Predictor {
    fn none() -> Self {
        Predictor {
            kind: 1,
            colors: 1,
            columns: 1,
            bits_per_component: 8,
        }
    }
}

/// Decoded pixel payload. CMYK gets its own representation because the
/// JPEG pipeline is RGB/Gray only and CMYK must never be converted.
enum Decoded {
    Dynamic(DynamicImage),
    Cmyk { data: Vec<u8>, width: u32, height: u32 },
}

/// Planned in-place replacement for one image stream.
struct Replacement {
    data: Vec<u8>,
    filter: &'static str,
    color_space: &'static str,
    width: u32,
    height: u32,
    resized: bool,
}

/// Re-encode every eligible raster image stream in place and return the
/// number of streams changed.
///
/// The walk covers *all* indirect objects, not only page-level resources:
/// raster images are frequently nested inside reusable form XObjects.
/// Per-object failures are logged and skipped; they never abort the pass.
pub fn recompress_images(
    doc: &mut Document,
    opts: &RecompressOptions,
) -> crate::error::Result<usize> {
    if !(1..=95).contains(&opts.quality) {
        return Err(PdfLightenError::image_codec(format!(
            "JPEG quality must be 1-95, got {}",
            opts.quality
        )));
    }

    let ids: Vec<ObjectId> = doc.objects.keys().copied().collect();
    let mut count = 0usize;

    for id in ids {
        let replacement = {
            let Some(Object::Stream(stream)) = doc.objects.get(&id) else {
                continue;
            };
            match plan_replacement(stream, opts) {
                Ok(Some(r)) => r,
                Ok(None) => continue,
                Err(e) => {
                    debug!(object = ?id, error = %e, "skipping image stream");
                    continue;
                }
            }
        };

        let Some(Object::Stream(stream)) = doc.objects.get_mut(&id) else {
            continue;
        };
        apply_replacement(stream, replacement);
        count += 1;
    }

    Ok(count)
}

/// Decide whether a stream is an eligible image and, if so, produce its
/// re-encoded payload. `Ok(None)` means "leave untouched".
fn plan_replacement(
    stream: &lopdf::Stream,
    opts: &RecompressOptions,
) -> crate::error::Result<Option<Replacement>> {
    let is_image = stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map(|n| n == b"Image")
        .unwrap_or(false);
    if !is_image {
        return Ok(None);
    }

    let meta = read_image_meta(stream)?;
    if meta.width < MIN_DIMENSION || meta.height < MIN_DIMENSION {
        return Ok(None);
    }

    let original_size = stream.content.len();
    let decoded = decode_image_stream(stream, &meta)?;

    // The SMask reference (if any) stays on the dictionary untouched;
    // only the main pixel payload is replaced below.
    let replacement = match decoded {
        Decoded::Dynamic(img) => encode_dynamic(img, opts)?,
        Decoded::Cmyk {
            data,
            width,
            height,
        } => encode_cmyk(data, width, height, opts)?,
    };

    // Keep the original bytes unless the re-encoding is strictly smaller.
    if replacement.data.len() >= original_size {
        return Ok(None);
    }

    Ok(Some(replacement))
}

fn apply_replacement(stream: &mut lopdf::Stream, r: Replacement) {
    stream.set_content(r.data);
    stream.dict.set("Filter", r.filter);
    stream.dict.set("ColorSpace", r.color_space);
    stream.dict.set("BitsPerComponent", 8);
    if r.resized {
        stream.dict.set("Width", r.width as i64);
        stream.dict.set("Height", r.height as i64);
    }
    // Stale keys from the previous encoding.
    stream.dict.remove(b"DecodeParms");
    stream.dict.remove(b"Decode");
}

/// RGB/Gray path: optional downscale, then JPEG at the requested quality.
fn encode_dynamic(
    img: DynamicImage,
    opts: &RecompressOptions,
) -> crate::error::Result<Replacement> {
    // JPEG-safe modes are RGB and Luma; everything else (indexed, alpha
    // variants) is converted to RGB first.
    let mut img = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };

    let mut resized = false;
    if opts.scale < 1.0 {
        let new_w = ((img.width() as f32 * opts.scale).floor() as u32).max(1);
        let new_h = ((img.height() as f32 * opts.scale).floor() as u32).max(1);
        if new_w < img.width() {
            img = img.resize_exact(new_w, new_h, FilterType::Lanczos3);
            resized = true;
        }
    }

    let (data, color_space) = match &img {
        DynamicImage::ImageLuma8(gray) => (encode_gray_jpeg(gray, opts.quality)?, "DeviceGray"),
        _ => (encode_rgb_jpeg(&img.to_rgb8(), opts.quality)?, "DeviceRGB"),
    };

    Ok(Replacement {
        data,
        filter: "DCTDecode",
        color_space,
        width: img.width(),
        height: img.height(),
        resized,
    })
}

/// CMYK path: never converted to RGB. The pipeline's JPEG encoder cannot
/// produce CMYK output, so the stream is re-encoded losslessly with
/// FlateDecode at best compression after the optional downscale.
fn encode_cmyk(
    data: Vec<u8>,
    width: u32,
    height: u32,
    opts: &RecompressOptions,
) -> crate::error::Result<Replacement> {
    let (data, width, height, resized) = if opts.scale < 1.0 {
        let new_w = ((width as f32 * opts.scale).floor() as u32).max(1);
        let new_h = ((height as f32 * opts.scale).floor() as u32).max(1);
        if new_w < width {
            // RgbaImage is used purely as a 4-interleaved-channel container
            // so the resampler operates on C/M/Y/K channels directly.
            let img = RgbaImage::from_raw(width, height, data).ok_or_else(|| {
                PdfLightenError::image_codec("CMYK buffer size mismatch during resize")
            })?;
            let small = image::imageops::resize(&img, new_w, new_h, FilterType::Lanczos3);
            (small.into_raw(), new_w, new_h, true)
        } else {
            (data, width, height, false)
        }
    } else {
        (data, width, height, false)
    };

    let compressed = flate_encode(&data, Compression::best())?;

    Ok(Replacement {
        data: compressed,
        filter: "FlateDecode",
        color_space: "DeviceCMYK",
        width,
        height,
        resized,
    })
}

fn read_image_meta(stream: &lopdf::Stream) -> crate::error::Result<ImageMeta> {
    let dict = &stream.dict;

    let width = dict_get_u32(dict, b"Width")?;
    let height = dict_get_u32(dict, b"Height")?;
    let bits_per_component = match dict.get(b"BitsPerComponent") {
        Ok(_) => dict_get_u32(dict, b"BitsPerComponent")? as u8,
        Err(_) => 8,
    };

    // Only a direct name is usable for raw decoding; ICCBased/Indexed
    // arrays are left as None and resolved per filter below.
    let color_space = match dict.get(b"ColorSpace") {
        Ok(Object::Name(name)) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    };

    let filter = match dict.get(b"Filter") {
        Ok(Object::Name(name)) => Some(String::from_utf8_lossy(name).into_owned()),
        Ok(Object::Array(arr)) => arr.first().and_then(|obj| {
            if let Object::Name(name) = obj {
                Some(String::from_utf8_lossy(name).into_owned())
            } else {
                None
            }
        }),
        _ => None,
    };

    let predictor = match dict.get(b"DecodeParms") {
        Ok(Object::Dictionary(parms)) => read_predictor(parms),
        Ok(Object::Array(arr)) => match arr.first() {
            Some(Object::Dictionary(parms)) => read_predictor(parms),
            _ => Predictor::none(),
        },
        _ => Predictor::none(),
    };

    Ok(ImageMeta {
        width,
        height,
        bits_per_component,
        color_space,
        filter,
        predictor,
    })
}

/// Predictor parameters with their defaults (Predictor 1, Colors 1,
/// Columns 1, BitsPerComponent 8).
fn read_predictor(parms: &lopdf::Dictionary) -> Predictor {
    let get = |key: &[u8], default: i64| -> i64 {
        parms.get(key).ok().and_then(|o| o.as_i64().ok()).unwrap_or(default)
    };
    Predictor {
        kind: get(b"Predictor", 1),
        colors: get(b"Colors", 1).max(0) as usize,
        columns: get(b"Columns", 1).max(0) as usize,
        bits_per_component: get(b"BitsPerComponent", 8),
    }
}

fn dict_get_u32(dict: &lopdf::Dictionary, key: &[u8]) -> crate::error::Result<u32> {
    match dict.get(key) {
        Ok(Object::Integer(i)) if (0..=u32::MAX as i64).contains(i) => Ok(*i as u32),
        Ok(other) => Err(PdfLightenError::image_codec(format!(
            "expected non-negative integer for {:?}, got {:?}",
            String::from_utf8_lossy(key),
            other
        ))),
        Err(_) => Err(PdfLightenError::image_codec(format!(
            "missing required key: {:?}",
            String::from_utf8_lossy(key)
        ))),
    }
}

/// Decode the pixel payload.
///
/// Supported encodings: DCTDecode (JPEG), FlateDecode over raw pixels,
/// and uncompressed raw pixels. Anything else is an error, which the
/// caller turns into a skip.
fn decode_image_stream(
    stream: &lopdf::Stream,
    meta: &ImageMeta,
) -> crate::error::Result<Decoded> {
    match meta.filter.as_deref() {
        Some("DCTDecode") => decode_jpeg(&stream.content).map(Decoded::Dynamic),
        Some("FlateDecode") => {
            let mut decoder = ZlibDecoder::new(stream.content.as_slice());
            let mut raw = Vec::new();
            decoder
                .read_to_end(&mut raw)
                .map_err(|e| PdfLightenError::image_codec(format!("FlateDecode error: {e}")))?;
            let raw = unpredict(raw, &meta.predictor)?;
            decode_raw(&raw, meta)
        }
        None => decode_raw(&stream.content, meta),
        Some(other) => Err(PdfLightenError::image_codec(format!(
            "unsupported image filter: {other}"
        ))),
    }
}

fn decode_jpeg(data: &[u8]) -> crate::error::Result<DynamicImage> {
    let reader = image::ImageReader::new(std::io::Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| PdfLightenError::image_codec(format!("JPEG decode error: {e}")))?;
    reader
        .decode()
        .map_err(|e| PdfLightenError::image_codec(format!("JPEG decode error: {e}")))
}

/// Reverse the `DecodeParms` row predictor over inflated bytes.
///
/// Only 8-bit components are handled, matching the raw decode paths
/// below; anything else errors and the caller skips the stream.
fn unpredict(data: Vec<u8>, p: &Predictor) -> crate::error::Result<Vec<u8>> {
    if p.kind <= 1 {
        return Ok(data);
    }
    if p.bits_per_component != 8 {
        return Err(PdfLightenError::image_codec(format!(
            "unsupported predictor bit depth: {}",
            p.bits_per_component
        )));
    }
    let bpp = p.colors.max(1);
    let row_len = bpp * p.columns;
    if row_len == 0 {
        return Err(PdfLightenError::image_codec("predictor with zero-width rows"));
    }

    match p.kind {
        2 => Ok(unpredict_tiff(data, bpp, row_len)),
        10..=15 => unpredict_png(&data, bpp, row_len),
        other => Err(PdfLightenError::image_codec(format!(
            "unsupported predictor: {other}"
        ))),
    }
}

/// TIFF horizontal differencing: each sample is a delta against the same
/// component one pixel to the left.
fn unpredict_tiff(mut data: Vec<u8>, bpp: usize, row_len: usize) -> Vec<u8> {
    for row in data.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    data
}

/// PNG row unfiltering: each row is prefixed with a filter-type byte
/// (None/Sub/Up/Average/Paeth) and decoded against the previous row.
fn unpredict_png(data: &[u8], bpp: usize, row_len: usize) -> crate::error::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        if chunk.len() != row_len + 1 {
            return Err(PdfLightenError::image_codec(
                "truncated PNG-predicted row",
            ));
        }
        let filter = chunk[0];
        let mut row = chunk[1..].to_vec();
        match filter {
            0 => {}
            1 => {
                for i in bpp..row_len {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            2 => {
                for i in 0..row_len {
                    row[i] = row[i].wrapping_add(prev[i]);
                }
            }
            3 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                    row[i] = row[i].wrapping_add(((left + prev[i] as u16) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    let upper_left = if i >= bpp { prev[i - bpp] } else { 0 };
                    row[i] = row[i].wrapping_add(paeth(left, prev[i], upper_left));
                }
            }
            other => {
                return Err(PdfLightenError::image_codec(format!(
                    "invalid PNG filter type: {other}"
                )));
            }
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn decode_raw(data: &[u8], meta: &ImageMeta) -> crate::error::Result<Decoded> {
    let w = meta.width;
    let h = meta.height;
    let pixels = (w as usize) * (h as usize);

    match (meta.color_space.as_deref(), meta.bits_per_component) {
        (Some("DeviceRGB"), 8) => {
            let expected = pixels * 3;
            let slice = checked_slice(data, expected, "RGB")?;
            let img = RgbImage::from_raw(w, h, slice.to_vec()).ok_or_else(|| {
                PdfLightenError::image_codec("failed to build RGB image from raw data")
            })?;
            Ok(Decoded::Dynamic(DynamicImage::ImageRgb8(img)))
        }
        (Some("DeviceGray"), 8) => {
            let slice = checked_slice(data, pixels, "Gray")?;
            let img = GrayImage::from_raw(w, h, slice.to_vec()).ok_or_else(|| {
                PdfLightenError::image_codec("failed to build Gray image from raw data")
            })?;
            Ok(Decoded::Dynamic(DynamicImage::ImageLuma8(img)))
        }
        (Some("DeviceCMYK"), 8) => {
            let expected = pixels * 4;
            let slice = checked_slice(data, expected, "CMYK")?;
            Ok(Decoded::Cmyk {
                data: slice.to_vec(),
                width: w,
                height: h,
            })
        }
        (cs, bpc) => Err(PdfLightenError::image_codec(format!(
            "unsupported color space / BPC combination: {:?} / {bpc}",
            cs
        ))),
    }
}

fn checked_slice<'a>(
    data: &'a [u8],
    expected: usize,
    label: &str,
) -> crate::error::Result<&'a [u8]> {
    if data.len() < expected {
        return Err(PdfLightenError::image_codec(format!(
            "{label} data too short: expected {expected}, got {}",
            data.len()
        )));
    }
    Ok(&data[..expected])
}

fn encode_rgb_jpeg(rgb: &RgbImage, quality: u8) -> crate::error::Result<Vec<u8>> {
    let mut buf = std::io::Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

fn encode_gray_jpeg(gray: &GrayImage, quality: u8) -> crate::error::Result<Vec<u8>> {
    let mut buf = std::io::Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    gray.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

fn flate_encode(data: &[u8], level: Compression) -> crate::error::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder
        .write_all(data)
        .map_err(|e| PdfLightenError::image_codec(format!("Flate encode error: {e}")))?;
    encoder
        .finish()
        .map_err(|e| PdfLightenError::image_codec(format!("Flate encode error: {e}")))
}

/// Apply FlateDecode to streams that carry no filter at all.
///
/// Runs after image recompression so content streams and other plain
/// streams shrink too. Streams that already have a filter are left alone.
pub fn compress_plain_streams(doc: &mut Document) {
    let ids: Vec<ObjectId> = doc.objects.keys().copied().collect();

    for id in ids {
        let needs_compression = {
            let Some(Object::Stream(stream)) = doc.objects.get(&id) else {
                continue;
            };
            stream.dict.get(b"Filter").is_err() && !stream.content.is_empty()
        };

        if needs_compression {
            let Some(Object::Stream(stream)) = doc.objects.get_mut(&id) else {
                continue;
            };

            let Ok(compressed) = flate_encode(&stream.content, Compression::default()) else {
                warn!(object = ?id, "failed to flate-compress stream, leaving as-is");
                continue;
            };
            if compressed.len() >= stream.content.len() {
                continue;
            }

            stream.dict.set("Filter", "FlateDecode");
            stream.set_content(compressed);
        }
    }
}
