//! Settings loading and saving
//!
//! The monitor remembers its last connection and display preferences in a
//! JSON file in the user's home directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serial_line_decoder::DisplayMode;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name of the settings file inside the home directory
pub const SETTINGS_FILE_NAME: &str = ".serial_monitor.json";

/// Persistent monitor settings (loaded from ~/.serial_monitor.json)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub port: String,
    pub baudrate: u32,
    pub bytesize: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
    pub display_mode: DisplayMode,
    pub dtr_default: bool,
    pub rts_default: bool,
    /// Session log file; empty disables logging
    pub log_path: String,
    /// Delay between lines when replaying a file
    pub send_delay_ms: u64,
    /// Parser config file; empty disables parsing
    pub parser_path: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baudrate: 9600,
            bytesize: 8,
            parity: Parity::None,
            stop_bits: 1,
            timeout_ms: 50,
            display_mode: DisplayMode::Utf8,
            dtr_default: true,
            rts_default: true,
            log_path: String::new(),
            send_delay_ms: 50,
            parser_path: String::new(),
        }
    }
}

impl MonitorSettings {
    /// Session log file, if one is configured
    pub fn log_file(&self) -> Option<PathBuf> {
        non_empty_path(&self.log_path)
    }

    /// Parser config file, if one is configured
    pub fn parser_file(&self) -> Option<PathBuf> {
        non_empty_path(&self.parser_path)
    }

    /// Set a single setting from its textual form
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "port" => self.port = value.to_string(),
            "baudrate" => self.baudrate = parse_value(key, value)?,
            "bytesize" => self.bytesize = parse_value(key, value)?,
            "parity" => self.parity = value.parse().map_err(anyhow::Error::msg)?,
            "stop_bits" => self.stop_bits = parse_value(key, value)?,
            "timeout_ms" => self.timeout_ms = parse_value(key, value)?,
            "display_mode" => self.display_mode = value.parse().map_err(anyhow::Error::msg)?,
            "dtr_default" => self.dtr_default = parse_value(key, value)?,
            "rts_default" => self.rts_default = parse_value(key, value)?,
            "log_path" => self.log_path = value.to_string(),
            "send_delay_ms" => self.send_delay_ms = parse_value(key, value)?,
            "parser_path" => self.parser_path = value.to_string(),
            _ => anyhow::bail!("Unknown setting: {}", key),
        }
        Ok(())
    }
}

fn non_empty_path(path: &str) -> Option<PathBuf> {
    if path.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", key, value))
}

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum Parity {
    #[default]
    #[serde(rename = "N")]
    None,
    #[serde(rename = "E")]
    Even,
    #[serde(rename = "O")]
    Odd,
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parity::None => write!(f, "N"),
            Parity::Even => write!(f, "E"),
            Parity::Odd => write!(f, "O"),
        }
    }
}

impl FromStr for Parity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" | "NONE" => Ok(Parity::None),
            "E" | "EVEN" => Ok(Parity::Even),
            "O" | "ODD" => Ok(Parity::Odd),
            _ => Err(format!("unknown parity {:?} (expected N, E or O)", s)),
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
        }
    }
}

/// Location of the settings file in the home directory
pub fn default_settings_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(SETTINGS_FILE_NAME))
}

/// Load settings from a JSON file, or the defaults if it does not exist
pub fn load_settings(path: &Path) -> Result<MonitorSettings> {
    if !path.exists() {
        log::debug!("No settings file at {:?}, using defaults", path);
        return Ok(MonitorSettings::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {:?}", path))?;

    let settings: MonitorSettings = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {:?}", path))?;

    Ok(settings)
}

/// Write settings to a JSON file
pub fn save_settings(path: &Path, settings: &MonitorSettings) -> Result<()> {
    let content = serde_json::to_string_pretty(settings)?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write settings file: {:?}", path))?;
    log::debug!("Settings saved to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");

        let settings = MonitorSettings {
            port: "COM5".into(),
            baudrate: 115200,
            display_mode: DisplayMode::Hex,
            dtr_default: false,
            rts_default: true,
            ..Default::default()
        };
        save_settings(&path, &settings).unwrap();

        let loaded = load_settings(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.port, "COM5");
        assert_eq!(loaded.display_mode, DisplayMode::Hex);
        assert!(!loaded.dtr_default);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_settings(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, MonitorSettings::default());
        assert_eq!(loaded.baudrate, 9600);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let json = r#"{"port": "/dev/ttyUSB0", "baudrate": 115200, "bytesize": 8, "display_mode": "UTF-8"}"#;
        let settings: MonitorSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.port, "/dev/ttyUSB0");
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.send_delay_ms, 50);
        assert!(settings.rts_default);
        assert!(settings.log_file().is_none());
    }

    #[test]
    fn test_set_by_key() {
        let mut settings = MonitorSettings::default();
        settings.set("baudrate", "57600").unwrap();
        settings.set("parity", "e").unwrap();
        settings.set("display_mode", "BIN").unwrap();
        settings.set("log_path", "out.log").unwrap();

        assert_eq!(settings.baudrate, 57600);
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.display_mode, DisplayMode::Bin);
        assert_eq!(settings.log_file(), Some(PathBuf::from("out.log")));

        assert!(settings.set("baudrate", "fast").is_err());
        assert!(settings.set("colour", "red").is_err());
        assert!(settings.set("display_mode", "OCTAL").is_err());
    }
}
