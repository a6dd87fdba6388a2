//! Display encoder
//!
//! Renders a received (or sent) line in one of the console display modes.
//! Every transform is total and works per Unicode code point, except ANSI
//! which works on the UTF-8 bytes of the line.

use crate::types::DisplayMode;

/// Render `line` in the given display mode
///
/// # Example
/// ```
/// use serial_line_decoder::{encode, DisplayMode};
///
/// assert_eq!(encode(DisplayMode::Hex, "AB"), "41 42");
/// assert_eq!(encode(DisplayMode::Bin, "A"), "01000001");
/// ```
pub fn encode(mode: DisplayMode, line: &str) -> String {
    match mode {
        DisplayMode::Utf8 => line.to_string(),
        DisplayMode::Ansi => to_latin1(line),
        DisplayMode::Hex => join_code_points(line, |cp| format!("{:02X}", cp)),
        DisplayMode::Dec => join_code_points(line, |cp| cp.to_string()),
        DisplayMode::Bin => join_code_points(line, |cp| format!("{:08b}", cp)),
    }
}

/// Render `line` using a mode name; unknown names render as UTF-8
pub fn encode_named(mode: &str, line: &str) -> String {
    encode(DisplayMode::from_name(mode), line)
}

/// Each UTF-8 byte becomes the Latin-1 character with the same value
fn to_latin1(line: &str) -> String {
    line.bytes().map(char::from).collect()
}

fn join_code_points<F>(line: &str, render: F) -> String
where
    F: Fn(u32) -> String,
{
    line.chars()
        .map(|c| render(c as u32))
        .collect::<Vec<_>>()
        .join(" ")
}
