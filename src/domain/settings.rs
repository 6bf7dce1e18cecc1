use crate::domain::rotation::MAX_ROTATION_EVENTS_PER_SEC;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "nuimo_emulator".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Name the adapter advertises while the emulator is powered on
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Rotation notifications allowed per second
    #[serde(default = "default_max_rotation_events")]
    pub max_rotation_events_per_sec: u32,

    /// Enable the emulator as soon as the shell starts
    #[serde(default = "default_true")]
    pub auto_enable: bool,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            max_rotation_events_per_sec: default_max_rotation_events(),
            auto_enable: default_true(),
            log_settings: LogSettings::default(),
        }
    }
}

fn default_device_name() -> String {
    "Nuimo".to_string()
}
fn default_max_rotation_events() -> u32 {
    MAX_ROTATION_EVENTS_PER_SEC
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load from an explicit path, falling back to defaults if it can't be read
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("NuimoEmulator");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    /// Write the current settings back, filling in any missing fields
    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.device_name, "Nuimo");
        assert_eq!(settings.max_rotation_events_per_sec, 10);
        assert!(settings.auto_enable);
        assert_eq!(settings.log_settings.level, "info");
        assert_eq!(settings.log_settings.rotation, "daily");
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{ "device_name": "Nuimo-Test", "log_settings": { "level": "debug" } }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.device_name, "Nuimo-Test");
        assert_eq!(settings.log_settings.level, "debug");
        assert!(settings.log_settings.console_logging_enabled);
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!(
            "nuimo_emulator_settings_{}.json",
            std::process::id()
        ));
        fs::write(&path, r#"{ "max_rotation_events_per_sec": 20 }"#).unwrap();

        let service = SettingsService::from_path(path.clone());
        service.save().unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["max_rotation_events_per_sec"], 20);
        assert_eq!(saved["device_name"], "Nuimo");
        assert_eq!(saved["log_settings"]["level"], "info");

        let reloaded = SettingsService::from_path(path.clone());
        assert_eq!(reloaded.get().max_rotation_events_per_sec, 20);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let service = SettingsService::from_path(PathBuf::from("/nonexistent/nuimo/settings.json"));
        assert_eq!(service.get().device_name, "Nuimo");
    }
}
