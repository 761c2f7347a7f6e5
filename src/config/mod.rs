pub mod profile;
pub mod settings;

use std::path::Path;

use settings::Settings;

/// Load `settings.yaml` from the given directory if present, otherwise
/// fall back to defaults.
pub fn load_settings_from_dir(dir: &Path) -> crate::error::Result<Settings> {
    let settings_path = dir.join("settings.yaml");
    if settings_path.exists() {
        Settings::from_file(&settings_path)
    } else {
        Ok(Settings::default())
    }
}
