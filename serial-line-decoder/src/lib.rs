//! Serial Line Decoder Library
//!
//! A stateless, reusable library that turns text lines received over a serial
//! link into something a monitor can show and plot.
//!
//! # Architecture
//!
//! This library is intentionally minimal:
//! - Renders a line for the console in one of five display modes
//! - Extracts typed fields from a line with a declarative parser (regex or delimited)
//! - Keeps a rolling history of numeric fields for plotting
//!
//! The library does NOT:
//! - Open or read serial ports
//! - Schedule reads or own any threads
//! - Render anything
//!
//! All of that lives in the application layer (serial-monitor-cli).
//!
//! # Example Usage
//!
//! ```
//! use serial_line_decoder::{encode, DisplayMode, FieldValue, LineParser, ParserConfig};
//!
//! let parser = LineParser::compile(ParserConfig::regex(
//!     r"TEMP:(?<TEMP>[0-9.]+) HUM:(?<HUM>[0-9.]+)",
//! ))
//! .unwrap();
//!
//! let line = "TEMP:23.5 HUM:60";
//! println!("{}", encode(DisplayMode::Hex, line));
//!
//! let record = parser.parse(line);
//! assert_eq!(record.get("TEMP"), Some(&FieldValue::Float(23.5)));
//! assert_eq!(record.get("HUM"), Some(&FieldValue::Integer(60)));
//! ```

// Public modules
pub mod encoder;
pub mod parser;
pub mod series;
pub mod types;

// Re-export main types for convenience
pub use encoder::{encode, encode_named};
pub use parser::{coerce, load_parser, LineParser, ParserConfig};
pub use series::{Series, SeriesStore};
pub use types::{DecoderError, DisplayMode, FieldValue, ParsedRecord, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
