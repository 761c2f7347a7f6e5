use std::path::Path;

use serde::Deserialize;

use crate::config::profile::{ColorPolicy, CompressionProfile, builtin_profiles};
use crate::process::tools::ToolOverrides;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bleed margin to trim, in millimetres.
    pub bleed_mm: f64,
    /// Also produce a transparency-flattened variant per input.
    pub flatten: bool,
    pub color: ColorPolicy,
    /// Profile set; empty means the built-in profiles.
    pub profiles: Vec<CompressionProfile>,
    pub tools: ToolOverrides,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bleed_mm: 3.0,
            flatten: false,
            color: ColorPolicy::Preserve,
            profiles: Vec::new(),
            tools: ToolOverrides::default(),
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yml::from_str(yaml).map_err(|e| {
            crate::error::PdfLightenError::config(format!("Failed to parse settings YAML: {e}"))
        })
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// The effective profile list: configured profiles, or the built-ins.
    pub fn effective_profiles(&self) -> Vec<CompressionProfile> {
        if self.profiles.is_empty() {
            builtin_profiles()
        } else {
            self.profiles.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.bleed_mm, 3.0);
        assert!(!s.flatten);
        assert_eq!(s.color, ColorPolicy::Preserve);
        assert_eq!(s.effective_profiles().len(), 5);
    }

    #[test]
    fn yaml_overrides_defaults() {
        let yaml = r#"
bleed_mm: 5.0
flatten: true
color: srgb
profiles:
  - name: email
    quality: 40
    image_only: true
    downscale: 0.5
"#;
        let s = Settings::from_yaml(yaml).expect("parse settings");
        assert_eq!(s.bleed_mm, 5.0);
        assert!(s.flatten);
        assert_eq!(s.color, ColorPolicy::Srgb);
        let profiles = s.effective_profiles();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name, "email");
        assert_eq!(profiles[0].quality, 40);
        assert_eq!(profiles[0].downscale, 0.5);
    }

    #[test]
    fn raster_format_parses_from_yaml() {
        let yaml = r#"
profiles:
  - name: archive
    dpi: 300
    quality: 90
    format: lossless
"#;
        let s = Settings::from_yaml(yaml).expect("parse settings");
        let profiles = s.effective_profiles();
        assert_eq!(
            profiles[0].format,
            crate::raster::RasterFormat::Lossless
        );
    }

    #[test]
    fn invalid_yaml_is_a_config_error() {
        let err = Settings::from_yaml(": not yaml [").unwrap_err();
        assert!(matches!(
            err,
            crate::error::PdfLightenError::ConfigError(_)
        ));
    }
}
