use serde::Deserialize;

use crate::raster::RasterFormat;

/// Colour handling for profiles that run through an external processor.
///
/// Print-oriented input keeps CMYK untouched by default; normalization
/// to sRGB is a deliberate, global opt-in rather than something inferred
/// per profile name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorPolicy {
    #[default]
    Preserve,
    Srgb,
}

/// A named compression configuration. Profiles are data; the dispatcher
/// interprets them by converting to a [`CompressionStrategy`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompressionProfile {
    pub name: String,
    /// Target image resolution; 0 means unset/irrelevant.
    pub dpi: u32,
    /// Target encoding quality, 1-95 (0 when irrelevant, e.g. plain copy).
    pub quality: u8,
    /// Compress through the external processor, keeping vectors and text.
    pub preserve_vectors: bool,
    /// Recompress embedded images in place; never rasterize.
    pub image_only: bool,
    /// Downscale factor for in-place image recompression; 1.0 = no resize.
    pub downscale: f32,
    /// Page encoding for rasterization profiles.
    pub format: RasterFormat,
}

impl Default for CompressionProfile {
    fn default() -> Self {
        CompressionProfile {
            name: String::new(),
            dpi: 0,
            quality: 0,
            preserve_vectors: false,
            image_only: false,
            downscale: 1.0,
            format: RasterFormat::Jpeg,
        }
    }
}

/// One terminal path of the dispatcher, carrying only the parameters it
/// needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompressionStrategy {
    /// Verbatim byte copy of the cleaned document.
    Copy,
    /// In-place image recompression with the qpdf/copy fallback ladder.
    RecompressImages { quality: u8, scale: f32 },
    /// Ghostscript pdfwrite through the strategy chain.
    VectorPreserving {
        image_dpi: u32,
        jpeg_quality: u8,
        normalize_color: bool,
    },
    /// Full page rasterization.
    Rasterize {
        dpi: u32,
        quality: u8,
        format: RasterFormat,
        normalize_color: bool,
    },
}

impl CompressionProfile {
    /// Map profile data to its terminal strategy.
    pub fn to_strategy(&self, color: ColorPolicy) -> CompressionStrategy {
        let normalize_color = color == ColorPolicy::Srgb;
        if self.image_only {
            CompressionStrategy::RecompressImages {
                quality: self.quality,
                scale: self.downscale,
            }
        } else if self.preserve_vectors {
            CompressionStrategy::VectorPreserving {
                image_dpi: self.dpi,
                jpeg_quality: self.quality,
                normalize_color,
            }
        } else if self.dpi > 0 {
            CompressionStrategy::Rasterize {
                dpi: self.dpi,
                quality: self.quality,
                format: self.format,
                normalize_color,
            }
        } else {
            CompressionStrategy::Copy
        }
    }

    /// Cleaned document copied as-is, no compression at all.
    pub fn clean() -> Self {
        CompressionProfile {
            name: "clean".into(),
            ..Default::default()
        }
    }

    /// In-place image recompression at moderate quality, no downscale.
    pub fn moderate() -> Self {
        CompressionProfile {
            name: "moderate".into(),
            quality: 75,
            image_only: true,
            ..Default::default()
        }
    }

    /// Aggressive in-place recompression with a fixed 50% downscale.
    pub fn maximum() -> Self {
        CompressionProfile {
            name: "maximum".into(),
            quality: 45,
            image_only: true,
            downscale: 0.5,
            ..Default::default()
        }
    }

    /// Vector-preserving Ghostscript compression.
    pub fn vector() -> Self {
        CompressionProfile {
            name: "vector".into(),
            dpi: 150,
            quality: 80,
            preserve_vectors: true,
            ..Default::default()
        }
    }

    /// Full rasterization, for callers that accept pixelated text.
    pub fn raster() -> Self {
        CompressionProfile {
            name: "raster".into(),
            dpi: 150,
            quality: 78,
            ..Default::default()
        }
    }
}

/// The built-in profile set, used when the settings file defines none.
pub fn builtin_profiles() -> Vec<CompressionProfile> {
    vec![
        CompressionProfile::clean(),
        CompressionProfile::moderate(),
        CompressionProfile::maximum(),
        CompressionProfile::vector(),
        CompressionProfile::raster(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_map_to_expected_strategies() {
        let strategies: Vec<CompressionStrategy> = builtin_profiles()
            .iter()
            .map(|p| p.to_strategy(ColorPolicy::Preserve))
            .collect();

        assert_eq!(strategies[0], CompressionStrategy::Copy);
        assert_eq!(
            strategies[1],
            CompressionStrategy::RecompressImages {
                quality: 75,
                scale: 1.0
            }
        );
        assert_eq!(
            strategies[2],
            CompressionStrategy::RecompressImages {
                quality: 45,
                scale: 0.5
            }
        );
        assert!(matches!(
            strategies[3],
            CompressionStrategy::VectorPreserving {
                normalize_color: false,
                ..
            }
        ));
        assert!(matches!(strategies[4], CompressionStrategy::Rasterize { .. }));
    }

    #[test]
    fn raster_format_is_selectable() {
        let profile = CompressionProfile {
            name: "archive".into(),
            dpi: 300,
            format: RasterFormat::Lossless,
            ..Default::default()
        };
        assert!(matches!(
            profile.to_strategy(ColorPolicy::Preserve),
            CompressionStrategy::Rasterize {
                format: RasterFormat::Lossless,
                ..
            }
        ));
        // The built-in raster profile defaults to lossy pages.
        assert!(matches!(
            CompressionProfile::raster().to_strategy(ColorPolicy::Preserve),
            CompressionStrategy::Rasterize {
                format: RasterFormat::Jpeg,
                ..
            }
        ));
    }

    #[test]
    fn srgb_policy_flows_into_processor_strategies() {
        let strategy = CompressionProfile::vector().to_strategy(ColorPolicy::Srgb);
        assert!(matches!(
            strategy,
            CompressionStrategy::VectorPreserving {
                normalize_color: true,
                ..
            }
        ));
    }
}
