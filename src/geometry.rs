use lopdf::{Document, Object};

use crate::error::PdfLightenError;

/// Millimetres to PDF points.
pub const MM_TO_PT: f64 = 72.0 / 25.4;

/// Page rectangle in points: (left, bottom, right, top).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl Rect {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Shrink the rectangle symmetrically by `margin_pt` on every side.
    pub fn inset(&self, margin_pt: f64) -> Rect {
        Rect {
            left: self.left + margin_pt,
            bottom: self.bottom + margin_pt,
            right: self.right - margin_pt,
            top: self.top - margin_pt,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.right <= self.left || self.top <= self.bottom
    }

    /// PDF array representation `[left bottom right top]`.
    pub fn to_object(&self) -> Object {
        Object::Array(vec![
            Object::Real(self.left as f32),
            Object::Real(self.bottom as f32),
            Object::Real(self.right as f32),
            Object::Real(self.top as f32),
        ])
    }
}

/// The four page geometry boxes, tightest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxKind {
    Trim,
    Bleed,
    Crop,
    Media,
}

impl BoxKind {
    pub fn key(&self) -> &'static [u8] {
        match self {
            BoxKind::Trim => b"TrimBox",
            BoxKind::Bleed => b"BleedBox",
            BoxKind::Crop => b"CropBox",
            BoxKind::Media => b"MediaBox",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BoxKind::Trim => "TrimBox",
            BoxKind::Bleed => "BleedBox",
            BoxKind::Crop => "CropBox",
            BoxKind::Media => "MediaBox",
        }
    }
}

impl std::fmt::Display for BoxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of box resolution for one page.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedBox {
    pub rect: Rect,
    pub source: BoxKind,
}

/// Choose the authoritative page rectangle:
/// TrimBox if present (already the final size, margin 0), otherwise the
/// first of BleedBox/CropBox/MediaBox, shrunk by the bleed margin.
///
/// `page_num` is 1-based and only used for error reporting.
pub fn resolve_page_box(
    doc: &Document,
    page_id: lopdf::ObjectId,
    page_num: u32,
    bleed_mm: f64,
) -> crate::error::Result<ResolvedBox> {
    let page_dict = doc.get_dictionary(page_id)?;

    let (base, source, margin_pt) = if let Some(rect) = find_box(doc, page_dict, BoxKind::Trim)? {
        (rect, BoxKind::Trim, 0.0)
    } else if let Some(rect) = find_box(doc, page_dict, BoxKind::Bleed)? {
        (rect, BoxKind::Bleed, bleed_mm * MM_TO_PT)
    } else if let Some(rect) = find_box(doc, page_dict, BoxKind::Crop)? {
        (rect, BoxKind::Crop, bleed_mm * MM_TO_PT)
    } else if let Some(rect) = find_box(doc, page_dict, BoxKind::Media)? {
        (rect, BoxKind::Media, bleed_mm * MM_TO_PT)
    } else {
        return Err(PdfLightenError::document_read(format!(
            "page {page_num}: no geometry box found (MediaBox missing)"
        )));
    };

    let rect = base.inset(margin_pt);
    if rect.is_degenerate() {
        return Err(PdfLightenError::invalid_geometry(page_num, source.name()));
    }

    Ok(ResolvedBox { rect, source })
}

/// A well-formed page tree is shallow; anything deeper than this is a
/// malformed document, most likely a Parent cycle.
const MAX_PARENT_DEPTH: usize = 64;

/// Look up a geometry box on the page dictionary, following Parent
/// inheritance (MediaBox and CropBox are commonly inherited from the
/// page tree). The walk is depth-capped so a Parent cycle in a
/// malformed tree is an error rather than unbounded recursion.
fn find_box(
    doc: &Document,
    dict: &lopdf::Dictionary,
    kind: BoxKind,
) -> crate::error::Result<Option<Rect>> {
    let mut current = dict;
    for _ in 0..MAX_PARENT_DEPTH {
        if let Ok(obj) = current.get(kind.key()) {
            return Ok(Some(parse_rect(doc, obj)?));
        }
        match current.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => {
                current = doc.get_dictionary(*parent_id)?;
            }
            _ => return Ok(None),
        }
    }
    Err(PdfLightenError::document_read(
        "page tree Parent chain exceeds depth limit (cycle?)",
    ))
}

/// Parse a `[left bottom right top]` array. Values may be integers,
/// reals, or an indirect reference to the array.
fn parse_rect(doc: &Document, obj: &Object) -> crate::error::Result<Rect> {
    let arr = match obj {
        Object::Reference(id) => doc.get_object(*id).and_then(Object::as_array)?,
        other => other.as_array()?,
    };
    if arr.len() < 4 {
        return Err(PdfLightenError::document_read(
            "geometry box array has fewer than 4 elements",
        ));
    }

    let to_f64 = |obj: &Object| -> crate::error::Result<f64> {
        match obj {
            Object::Integer(i) => Ok(*i as f64),
            Object::Real(f) => Ok(*f as f64),
            _ => Err(PdfLightenError::document_read(
                "geometry box value is not numeric",
            )),
        }
    };

    Ok(Rect {
        left: to_f64(&arr[0])?,
        bottom: to_f64(&arr[1])?,
        right: to_f64(&arr[2])?,
        top: to_f64(&arr[3])?,
    })
}
