//! Durable user preferences
//!
//! A small JSON file under the user config directory. Read once at
//! startup, written on every change. A missing or corrupt file falls
//! back to defaults rather than failing startup.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Startup volume when no preference has been saved yet.
pub const DEFAULT_VOLUME: u8 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsData {
    /// Master volume percent, 0-100.
    volume: u8,
}

impl Default for SettingsData {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
        }
    }
}

/// Preference store bound to a settings file.
#[derive(Debug)]
pub struct Settings {
    path: PathBuf,
    data: SettingsData,
}

impl Settings {
    /// Load from the default location (~/.config/termboard/settings.json).
    pub fn load_default() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("termboard")
            .join("settings.json");
        Self::load_from(path)
    }

    /// Load from a specific path, tolerating absence and corruption.
    pub fn load_from(path: PathBuf) -> Self {
        let data = fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self { path, data }
    }

    pub fn volume(&self) -> u8 {
        self.data.volume
    }

    /// Persist a new volume. The caller is responsible for clamping.
    pub fn set_volume(&mut self, volume: u8) -> io::Result<()> {
        self.data.volume = volume;
        self.save()
    }

    fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path().join("settings.json"));
        assert_eq!(settings.volume(), DEFAULT_VOLUME);
    }

    #[test]
    fn test_volume_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::load_from(path.clone());
        settings.set_volume(35).unwrap();

        let reloaded = Settings::load_from(path);
        assert_eq!(reloaded.volume(), 35);
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json {").unwrap();

        let settings = Settings::load_from(path);
        assert_eq!(settings.volume(), DEFAULT_VOLUME);
    }
}
