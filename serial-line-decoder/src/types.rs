//! Core types for the serial line decoder library
//!
//! This module defines the values the decoder hands back to its callers: the
//! display mode selector, the typed field values extracted by the line parser,
//! and the ordered record that holds them.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// Errors that can occur while building a line parser
///
/// Per-line problems are never errors: a line that does not match just yields
/// an empty [`ParsedRecord`].
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Invalid regular expression {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to parse parser config: {0}")]
    ConfigParse(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// How a line is rendered for the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisplayMode {
    /// Pass-through
    #[default]
    Utf8,
    /// UTF-8 bytes reinterpreted as Latin-1
    Ansi,
    /// Uppercase hex code points
    Hex,
    /// Decimal code points
    Dec,
    /// Binary code points, 8 digits minimum
    Bin,
}

impl DisplayMode {
    /// All modes, in the order a mode picker lists them
    pub const ALL: [DisplayMode; 5] = [
        DisplayMode::Utf8,
        DisplayMode::Ansi,
        DisplayMode::Hex,
        DisplayMode::Dec,
        DisplayMode::Bin,
    ];

    /// Canonical name of the mode
    pub fn name(&self) -> &'static str {
        match self {
            DisplayMode::Utf8 => "UTF-8",
            DisplayMode::Ansi => "ANSI",
            DisplayMode::Hex => "HEX",
            DisplayMode::Dec => "DEC",
            DisplayMode::Bin => "BIN",
        }
    }

    /// Resolve a mode name, falling back to [`DisplayMode::Utf8`]
    ///
    /// Never fails: unknown names are rendered as pass-through.
    pub fn from_name(name: &str) -> Self {
        Self::lookup(name).unwrap_or_else(|| {
            log::debug!("Unknown display mode {:?}, using UTF-8", name);
            DisplayMode::Utf8
        })
    }

    fn lookup(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("UTF8") {
            return Some(DisplayMode::Utf8);
        }
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DisplayMode {
    type Err = String;

    /// Strict lookup, for validating user input
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::lookup(s).ok_or_else(|| {
            format!(
                "unknown display mode {:?} (expected one of UTF-8, ANSI, HEX, DEC, BIN)",
                s
            )
        })
    }
}

impl Serialize for DisplayMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for DisplayMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(DisplayMode::from_name(&name))
    }
}

/// A single value extracted from a line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Signed integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// Anything that did not parse as a number
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value, `None` for text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    /// Check if this value can be plotted
    pub fn is_numeric(&self) -> bool {
        !matches!(self, FieldValue::Text(_))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{:?}", v),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

/// Fields extracted from one line, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRecord {
    fields: Vec<(String, FieldValue)>,
}

impl ParsedRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field; an existing key keeps its position and takes the new value
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.fields.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over `(name, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    /// Iterate over the fields that carry a number
    pub fn numeric_fields(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields
            .iter()
            .filter_map(|(key, value)| value.as_f64().map(|v| (key.as_str(), v)))
    }
}

impl Serialize for ParsedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mode_names() {
        assert_eq!(DisplayMode::from_name("UTF-8"), DisplayMode::Utf8);
        assert_eq!(DisplayMode::from_name("utf8"), DisplayMode::Utf8);
        assert_eq!(DisplayMode::from_name(" hex "), DisplayMode::Hex);
        assert_eq!(DisplayMode::from_name("BIN"), DisplayMode::Bin);
        assert_eq!(format!("{}", DisplayMode::Ansi), "ANSI");
    }

    #[test]
    fn test_unknown_display_mode_falls_back() {
        assert_eq!(DisplayMode::from_name("EBCDIC"), DisplayMode::Utf8);
        assert_eq!(DisplayMode::from_name(""), DisplayMode::Utf8);
        assert!("EBCDIC".parse::<DisplayMode>().is_err());
        assert_eq!("dec".parse::<DisplayMode>(), Ok(DisplayMode::Dec));
    }

    #[test]
    fn test_display_mode_serde() {
        assert_eq!(serde_json::to_string(&DisplayMode::Hex).unwrap(), "\"HEX\"");
        let mode: DisplayMode = serde_json::from_str("\"OCTAL\"").unwrap();
        assert_eq!(mode, DisplayMode::Utf8);
    }

    #[test]
    fn test_field_value_conversions() {
        assert_eq!(FieldValue::Integer(42).as_f64(), Some(42.0));
        assert_eq!(FieldValue::Float(3.5).as_f64(), Some(3.5));
        assert_eq!(FieldValue::Text("on".into()).as_f64(), None);
        assert!(!FieldValue::Text("on".into()).is_numeric());

        assert_eq!(format!("{}", FieldValue::Integer(60)), "60");
        assert_eq!(format!("{}", FieldValue::Float(60.0)), "60.0");
    }

    #[test]
    fn test_record_keeps_insertion_order() {
        let mut record = ParsedRecord::new();
        record.insert("TEMP", FieldValue::Float(23.5));
        record.insert("HUM", FieldValue::Integer(60));
        record.insert("TEMP", FieldValue::Float(24.0));

        assert_eq!(record.len(), 2);
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["TEMP", "HUM"]);
        assert_eq!(record.get("TEMP"), Some(&FieldValue::Float(24.0)));
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"TEMP":24.0,"HUM":60}"#
        );
    }
}
