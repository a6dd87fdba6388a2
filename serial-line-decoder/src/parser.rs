//! Declarative line parser
//!
//! Extracts named fields from a text line, either through a regular expression
//! with named capture groups or by splitting on a fixed delimiter. The parser
//! is configured once and then only read, so a single instance can be shared
//! between threads.

use crate::types::{DecoderError, FieldValue, ParsedRecord, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Declarative parser configuration, as stored in a parser file
///
/// ```json
/// {"type": "regex", "pattern": "TEMP:(?<TEMP>[0-9.]+) HUM:(?<HUM>[0-9.]+)"}
/// {"type": "csv", "delimiter": ",", "fields": ["TEMP", "HUM"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParserConfig {
    /// Search the line with a pattern; named groups become fields
    #[serde(rename = "regex")]
    Regex { pattern: String },

    /// Split the line on a literal delimiter; parts are named positionally
    #[serde(rename = "csv")]
    Delimited {
        #[serde(default = "default_delimiter")]
        delimiter: String,
        #[serde(default)]
        fields: Vec<String>,
    },
}

fn default_delimiter() -> String {
    ",".to_string()
}

impl ParserConfig {
    /// Create a regex configuration
    pub fn regex(pattern: impl Into<String>) -> Self {
        ParserConfig::Regex {
            pattern: pattern.into(),
        }
    }

    /// Create a delimited configuration
    pub fn delimited<I, S>(delimiter: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParserConfig::Delimited {
            delimiter: delimiter.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a configuration from its JSON form
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DecoderError::ConfigParse(e.to_string()))
    }

    /// Read a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        log::debug!("Reading parser config: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content).map_err(|e| match e {
            DecoderError::ConfigParse(msg) => {
                DecoderError::ConfigParse(format!("{:?}: {}", path, msg))
            }
            other => other,
        })
    }
}

/// Compiled form of a [`ParserConfig`]
#[derive(Debug, Clone)]
enum Strategy {
    Regex(Regex),
    Delimited {
        delimiter: String,
        fields: Vec<String>,
    },
}

/// A ready-to-use line parser
#[derive(Debug, Clone)]
pub struct LineParser {
    strategy: Strategy,
}

impl LineParser {
    /// Validate and compile a configuration
    ///
    /// The only failure is a regex pattern that does not compile. Delimited
    /// configurations are accepted as-is, including an empty field list.
    pub fn compile(config: ParserConfig) -> Result<Self> {
        let strategy = match config {
            ParserConfig::Regex { pattern } => {
                let regex = Regex::new(&pattern)
                    .map_err(|source| DecoderError::InvalidPattern { pattern, source })?;
                log::debug!(
                    "Compiled regex parser with {} named group(s)",
                    regex.capture_names().flatten().count()
                );
                Strategy::Regex(regex)
            }
            ParserConfig::Delimited { delimiter, fields } => {
                log::debug!(
                    "Delimited parser: delimiter {:?}, {} field(s)",
                    delimiter,
                    fields.len()
                );
                Strategy::Delimited { delimiter, fields }
            }
        };

        Ok(Self { strategy })
    }

    /// Declared field names, in order
    pub fn field_names(&self) -> Vec<&str> {
        match &self.strategy {
            Strategy::Regex(regex) => regex.capture_names().flatten().collect(),
            Strategy::Delimited { fields, .. } => fields.iter().map(String::as_str).collect(),
        }
    }

    /// Extract fields from a line
    ///
    /// Never fails: a line that does not match yields an empty record.
    pub fn parse(&self, line: &str) -> ParsedRecord {
        let line = line.trim();
        match &self.strategy {
            Strategy::Regex(regex) => parse_regex(regex, line),
            Strategy::Delimited { delimiter, fields } => parse_delimited(delimiter, fields, line),
        }
    }
}

fn parse_regex(regex: &Regex, line: &str) -> ParsedRecord {
    let mut record = ParsedRecord::new();
    let Some(captures) = regex.captures(line) else {
        log::trace!("No match: {:?}", line);
        return record;
    };

    // Groups that did not take part in the match stay absent
    for name in regex.capture_names().flatten() {
        if let Some(m) = captures.name(name) {
            record.insert(name, coerce(m.as_str()));
        }
    }
    record
}

fn parse_delimited(delimiter: &str, fields: &[String], line: &str) -> ParsedRecord {
    let mut record = ParsedRecord::new();
    if delimiter.is_empty() {
        log::trace!("Empty delimiter, nothing to split on");
        return record;
    }

    let parts: Vec<&str> = line.split(delimiter).collect();
    if parts.len() != fields.len() {
        log::trace!(
            "Expected {} field(s), got {}: {:?}",
            fields.len(),
            parts.len(),
            line
        );
        return record;
    }

    for (field, part) in fields.iter().zip(parts) {
        record.insert(field.as_str(), coerce(part));
    }
    record
}

/// Convert an extracted string into the narrowest matching value
///
/// A value containing `.` is tried as a float first, then everything is tried
/// as an integer, and whatever is left stays text. Surrounding whitespace is
/// ignored for the numeric attempts; text keeps the original string. An
/// integer too large for `i64` becomes a float so it can still be plotted.
pub fn coerce(value: &str) -> FieldValue {
    let token = value.trim();

    if value.contains('.') {
        if let Ok(v) = token.parse::<f64>() {
            return FieldValue::Float(v);
        }
    }

    if let Ok(v) = token.parse::<i64>() {
        return FieldValue::Integer(v);
    }

    if is_integer_literal(token) {
        if let Ok(v) = token.parse::<f64>() {
            return FieldValue::Float(v);
        }
    }

    FieldValue::Text(value.to_string())
}

/// Optional sign followed by decimal digits only
fn is_integer_literal(token: &str) -> bool {
    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Load a parser configuration file and compile it
pub fn load_parser(path: &Path) -> Result<LineParser> {
    log::debug!("Loading parser: {:?}", path);
    LineParser::compile(ParserConfig::load(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: &str = r"TEMP:(?<TEMP>[0-9.]+) HUM:(?<HUM>[0-9.]+)";

    fn regex_parser() -> LineParser {
        LineParser::compile(ParserConfig::regex(PATTERN)).unwrap()
    }

    fn csv_parser() -> LineParser {
        LineParser::compile(ParserConfig::delimited(",", ["TEMP", "HUM"])).unwrap()
    }

    #[test]
    fn test_regex_parse() {
        let record = regex_parser().parse("TEMP:23.5 HUM:60");
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["TEMP", "HUM"]);
        assert_eq!(record.get("TEMP"), Some(&FieldValue::Float(23.5)));
        assert_eq!(record.get("HUM"), Some(&FieldValue::Integer(60)));
    }

    #[test]
    fn test_regex_searches_trimmed_line() {
        let record = regex_parser().parse("  >> TEMP:1.0 HUM:2.5 <<\r\n");
        assert_eq!(record.get("TEMP"), Some(&FieldValue::Float(1.0)));
        assert_eq!(record.get("HUM"), Some(&FieldValue::Float(2.5)));
    }

    #[test]
    fn test_regex_no_match() {
        assert!(regex_parser().parse("garbage").is_empty());
        assert!(regex_parser().parse("").is_empty());
    }

    #[test]
    fn test_regex_optional_group_is_absent() {
        let parser =
            LineParser::compile(ParserConfig::regex(r"V=(?P<V>\d+)(?: I=(?P<I>\d+))?")).unwrap();

        let record = parser.parse("V=12");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("V"), Some(&FieldValue::Integer(12)));
        assert_eq!(record.get("I"), None);

        let record = parser.parse("V=12 I=3");
        assert_eq!(record.get("I"), Some(&FieldValue::Integer(3)));
    }

    #[test]
    fn test_regex_without_named_groups() {
        let parser = LineParser::compile(ParserConfig::regex(r"\d+")).unwrap();
        assert!(parser.parse("123").is_empty());
        assert!(parser.field_names().is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = LineParser::compile(ParserConfig::regex("(unclosed")).unwrap_err();
        assert!(matches!(err, DecoderError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn test_delimited_parse() {
        let record = csv_parser().parse("23.5,60");
        assert_eq!(record.get("TEMP"), Some(&FieldValue::Float(23.5)));
        assert_eq!(record.get("HUM"), Some(&FieldValue::Integer(60)));
    }

    #[test]
    fn test_delimited_field_count_must_match() {
        let parser = csv_parser();
        assert!(parser.parse("23.5").is_empty());
        assert!(parser.parse("23.5,60,7").is_empty());
        // Two empty parts still count as two fields
        let record = parser.parse(",");
        assert_eq!(record.get("TEMP"), Some(&FieldValue::Text(String::new())));
    }

    #[test]
    fn test_delimited_multichar_delimiter() {
        let parser = LineParser::compile(ParserConfig::delimited(" | ", ["A", "B", "C"])).unwrap();
        let record = parser.parse("1 | two | 3.25");
        assert_eq!(record.get("A"), Some(&FieldValue::Integer(1)));
        assert_eq!(record.get("B"), Some(&FieldValue::Text("two".into())));
        assert_eq!(record.get("C"), Some(&FieldValue::Float(3.25)));
    }

    #[test]
    fn test_delimited_empty_fields_and_delimiter() {
        let no_fields = LineParser::compile(ParserConfig::delimited(",", Vec::<String>::new())).unwrap();
        assert!(no_fields.parse("1,2").is_empty());
        assert!(no_fields.parse("").is_empty());

        let no_delimiter = LineParser::compile(ParserConfig::delimited("", ["A"])).unwrap();
        assert!(no_delimiter.parse("1").is_empty());
    }

    #[test]
    fn test_coerce_chain() {
        assert_eq!(coerce("23.5"), FieldValue::Float(23.5));
        assert_eq!(coerce("60"), FieldValue::Integer(60));
        assert_eq!(coerce("-7"), FieldValue::Integer(-7));
        assert_eq!(coerce(" 60"), FieldValue::Integer(60));
        assert_eq!(coerce("1.2.3"), FieldValue::Text("1.2.3".into()));
        assert_eq!(coerce("abc"), FieldValue::Text("abc".into()));
        // No '.', so no float attempt
        assert_eq!(coerce("1e3"), FieldValue::Text("1e3".into()));
        assert_eq!(coerce("1.5e3"), FieldValue::Float(1500.0));
        assert_eq!(coerce("99999999999999999999"), FieldValue::Float(1e20));
        assert_eq!(coerce("-99999999999999999999"), FieldValue::Float(-1e20));
        assert_eq!(coerce("+"), FieldValue::Text("+".into()));
        assert_eq!(coerce("12ab"), FieldValue::Text("12ab".into()));
    }

    #[test]
    fn test_parse_is_repeatable() {
        let parser = regex_parser();
        let first = parser.parse("TEMP:23.5 HUM:60");
        let second = parser.parse("TEMP:23.5 HUM:60");
        assert_eq!(first, second);
    }

    #[test]
    fn test_config_from_json() {
        let config = ParserConfig::from_json_str(r#"{"type": "csv", "fields": ["A", "B"]}"#).unwrap();
        assert_eq!(config, ParserConfig::delimited(",", ["A", "B"]));

        let config = ParserConfig::from_json_str(r#"{"type": "regex", "pattern": "x"}"#).unwrap();
        assert_eq!(config, ParserConfig::regex("x"));

        assert!(matches!(
            ParserConfig::from_json_str(r#"{"type": "xml"}"#),
            Err(DecoderError::ConfigParse(_))
        ));
        assert!(matches!(
            ParserConfig::from_json_str(r#"{"pattern": "x"}"#),
            Err(DecoderError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_field_names() {
        assert_eq!(regex_parser().field_names(), vec!["TEMP", "HUM"]);
        assert_eq!(csv_parser().field_names(), vec!["TEMP", "HUM"]);
    }

    #[test]
    fn test_cloned_parser_matches_original() {
        let parser = csv_parser();
        let copy = parser.clone();
        drop(parser);

        let record = copy.parse("23.5,60");
        assert_eq!(record.get("TEMP"), Some(&FieldValue::Float(23.5)));
        assert_eq!(copy.field_names(), vec!["TEMP", "HUM"]);
    }
}
