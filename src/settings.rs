use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name of the compiler settings inside a config directory.
pub const SETTINGS_FILE: &str = "stackscript.json";

const SETTINGS_VERSION: u32 = 1;

#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "I/O error: {e}"),
            SettingsError::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<std::io::Error> for SettingsError {
    fn from(e: std::io::Error) -> Self {
        SettingsError::Io(e)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(e: serde_json::Error) -> Self {
        SettingsError::Json(e)
    }
}

// ── Compiler settings ────────────────────────────────────────────

/// Options applied when producing executable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerSettings {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Append `@line,column,"origin"` to every operation.
    #[serde(default = "default_debug_info")]
    pub debug_info: bool,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_debug_info() -> bool {
    true
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            debug_info: true,
        }
    }
}

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE)
}

/// Load settings from `config_dir`. Returns None if no settings file exists
/// or it cannot be read.
pub fn load_settings(config_dir: &Path) -> Option<CompilerSettings> {
    let path = settings_path(config_dir);
    if !path.exists() {
        return None;
    }
    read_json(&path).ok()
}

/// Save settings to `config_dir`, creating the directory if needed.
pub fn save_settings(config_dir: &Path, settings: &CompilerSettings) -> Result<(), SettingsError> {
    fs::create_dir_all(config_dir)?;
    write_json(&settings_path(config_dir), settings)
}

// ── JSON helpers ─────────────────────────────────────────────────

/// Write `data` to a sibling temp file, fsync it, then rename over `path`.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), SettingsError> {
    let mut tmp_name = OsString::from(path.file_name().unwrap_or_default());
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(&tmp_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SettingsError> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, SettingsError> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn fresh_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = fresh_dir("stackscript_test_settings");

        let settings = CompilerSettings {
            debug_info: false,
            ..CompilerSettings::default()
        };
        save_settings(&dir, &settings).unwrap();

        let loaded = load_settings(&dir).expect("should load");
        assert_eq!(loaded, settings);
        assert!(!dir.join("stackscript.json.tmp").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = fresh_dir("stackscript_test_missing");
        assert!(load_settings(&dir).is_none());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = fresh_dir("stackscript_test_defaults");
        fs::create_dir_all(&dir).unwrap();
        fs::write(settings_path(&dir), "{}").unwrap();

        let loaded = load_settings(&dir).unwrap();
        assert_eq!(loaded, CompilerSettings::default());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_malformed_file_is_none() {
        let dir = fresh_dir("stackscript_test_malformed");
        fs::create_dir_all(&dir).unwrap();
        fs::write(settings_path(&dir), "{ not json").unwrap();

        assert!(load_settings(&dir).is_none());
        assert!(matches!(
            read_json::<CompilerSettings>(&settings_path(&dir)),
            Err(SettingsError::Json(_))
        ));

        let _ = fs::remove_dir_all(&dir);
    }
}
