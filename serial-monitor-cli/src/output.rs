//! Console and session log output
//!
//! Formats traffic in the selected display mode, mirrors it to an optional
//! session log, and feeds parsed records into the plot history.

use chrono::{Local, Utc};
use serial_line_decoder::{encode, DisplayMode, LineParser, ParsedRecord, SeriesStore};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Timestamp format for session log lines
const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub struct OutputController<W: Write> {
    console: W,
    log_file: Option<BufWriter<File>>,
    mode: DisplayMode,
    parser: Option<LineParser>,
    series: SeriesStore,
}

impl<W: Write> OutputController<W> {
    pub fn new(console: W, mode: DisplayMode) -> Self {
        Self {
            console,
            log_file: None,
            mode,
            parser: None,
            series: SeriesStore::default(),
        }
    }

    /// Append every output line to a session log file
    pub fn with_log_file(mut self, path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        log::info!("Logging session to {:?}", path);
        self.log_file = Some(BufWriter::new(file));
        Ok(self)
    }

    /// Parse received lines and keep their numeric fields
    pub fn with_parser(mut self, parser: LineParser) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
    }

    pub fn series(&self) -> &SeriesStore {
        &self.series
    }

    /// Show a line that came in from the port
    ///
    /// Returns the parsed record, empty when no parser is set or nothing matched.
    pub fn display_received(&mut self, raw: &str) -> io::Result<ParsedRecord> {
        let line = encode(self.mode, raw);
        self.emit(&format!("[Receive]: {}", line))?;

        let record = match &self.parser {
            Some(parser) => parser.parse(raw),
            None => return Ok(ParsedRecord::new()),
        };

        if !record.is_empty() {
            self.series.push(Utc::now(), &record);
            let json = serde_json::to_string(&record)?;
            self.emit(&format!("[Parsed]: {}", json))?;
        }
        Ok(record)
    }

    /// Show a line that was sent to the port
    pub fn display_sent(&mut self, raw: &str) -> io::Result<()> {
        let line = encode(self.mode, raw);
        self.emit(&format!("[Send]: {}", line))
    }

    /// Show a status message (not encoded)
    pub fn display_info(&mut self, text: &str) -> io::Result<()> {
        self.emit(&format!("[Info]: {}", text))
    }

    fn emit(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.console, "{}", text)?;
        self.console.flush()?;

        if let Some(log_file) = self.log_file.as_mut() {
            writeln!(log_file, "{} {}", Local::now().format(LOG_TIME_FORMAT), text)?;
            log_file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_line_decoder::{FieldValue, ParserConfig};

    fn console_text(output: OutputController<Vec<u8>>) -> String {
        String::from_utf8(output.console).unwrap()
    }

    #[test]
    fn test_received_and_sent_lines() {
        let mut output = OutputController::new(Vec::new(), DisplayMode::Hex);
        output.display_received("A").unwrap();
        output.set_mode(DisplayMode::Utf8);
        output.display_sent("Ping").unwrap();

        assert_eq!(console_text(output), "[Receive]: 41\n[Send]: Ping\n");
    }

    #[test]
    fn test_parsed_records_reach_series() {
        let parser = LineParser::compile(ParserConfig::delimited(",", ["TEMP", "HUM"])).unwrap();
        let mut output = OutputController::new(Vec::new(), DisplayMode::Utf8).with_parser(parser);

        let record = output.display_received("23.5,60").unwrap();
        assert_eq!(record.get("HUM"), Some(&FieldValue::Integer(60)));
        assert!(output.display_received("noise").unwrap().is_empty());

        assert_eq!(output.series().series("TEMP").unwrap().len(), 1);
        assert_eq!(
            console_text(output),
            "[Receive]: 23.5,60\n[Parsed]: {\"TEMP\":23.5,\"HUM\":60}\n[Receive]: noise\n"
        );
    }

    #[test]
    fn test_session_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");

        let mut output = OutputController::new(io::sink(), DisplayMode::Dec)
            .with_log_file(&path)
            .unwrap();
        output.display_sent("A").unwrap();
        output.display_info("connected").unwrap();
        drop(output);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" [Send]: 65"));
        assert!(lines[1].ends_with(" [Info]: connected"));
    }
}
