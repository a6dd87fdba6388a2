//! Serial connection handling
//!
//! Opens the port, runs the background reader thread that turns incoming
//! bytes into lines, and exposes the write side (data, DTR, RTS) to the
//! monitor loop. Lines travel from the reader to the monitor over a single
//! producer/single consumer channel that the monitor drains on every tick.

use crate::config::MonitorSettings;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Result type for serial operations
pub type Result<T> = std::result::Result<T, SerialError>;

/// Errors raised by the serial layer
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Serial port error: {0}")]
    Port(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid port setting: {0}")]
    InvalidSetting(String),
}

/// Everything needed to open a port
#[derive(Debug, Clone, PartialEq)]
pub struct PortSettings {
    pub port: String,
    pub baudrate: u32,
    pub data_bits: serialport::DataBits,
    pub parity: serialport::Parity,
    pub stop_bits: serialport::StopBits,
    pub timeout: Duration,
    pub dtr: bool,
    pub rts: bool,
}

impl TryFrom<&MonitorSettings> for PortSettings {
    type Error = SerialError;

    fn try_from(settings: &MonitorSettings) -> Result<Self> {
        if settings.port.is_empty() {
            return Err(SerialError::InvalidSetting("no port selected".to_string()));
        }

        let data_bits = match settings.bytesize {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(SerialError::InvalidSetting(format!(
                    "unsupported byte size {}",
                    other
                )))
            }
        };

        let stop_bits = match settings.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(SerialError::InvalidSetting(format!(
                    "unsupported stop bits {}",
                    other
                )))
            }
        };

        Ok(Self {
            port: settings.port.clone(),
            baudrate: settings.baudrate,
            data_bits,
            parity: settings.parity.into(),
            stop_bits,
            timeout: Duration::from_millis(settings.timeout_ms),
            dtr: settings.dtr_default,
            rts: settings.rts_default,
        })
    }
}

/// Write side of a connection: data plus the modem control lines
pub trait PortControl: Write + Send {
    fn set_dtr(&mut self, level: bool) -> Result<()>;
    fn set_rts(&mut self, level: bool) -> Result<()>;
}

impl PortControl for Box<dyn SerialPort> {
    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.write_data_terminal_ready(level)?;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.write_request_to_send(level)?;
        Ok(())
    }
}

/// An open connection with its reader thread
pub struct SerialHandler {
    control: Box<dyn PortControl>,
    lines: Receiver<String>,
    stop_flag: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialHandler {
    /// Open a serial port and start reading from it
    pub fn open(settings: &PortSettings) -> Result<Self> {
        log::info!(
            "Opening {} at {} baud ({:?}, {:?}, {:?})",
            settings.port,
            settings.baudrate,
            settings.data_bits,
            settings.parity,
            settings.stop_bits
        );

        let mut port = serialport::new(&settings.port, settings.baudrate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .timeout(settings.timeout)
            .open()?;

        port.set_dtr(settings.dtr)?;
        port.set_rts(settings.rts)?;

        let reader = port.try_clone()?;
        Ok(Self::start(reader, Box::new(port)))
    }

    /// Start the reader thread over any byte source
    pub fn start<R>(reader: R, control: Box<dyn PortControl>) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = channel();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_flag);

        let reader = thread::spawn(move || {
            read_loop(reader, &tx, &thread_stop);
            log::debug!("Reader thread finished");
        });

        Self {
            control,
            lines: rx,
            stop_flag,
            reader: Some(reader),
        }
    }

    /// Names of the serial ports present on this machine
    pub fn available_ports() -> Result<Vec<String>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    /// Take every line received since the last call, without blocking
    pub fn read_lines(&self) -> Vec<String> {
        self.lines.try_iter().collect()
    }

    /// Whether the reader thread is still running
    pub fn is_reading(&self) -> bool {
        self.reader
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Send a line; a newline terminator is appended
    pub fn send(&mut self, data: &str) -> Result<()> {
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.extend_from_slice(data.as_bytes());
        frame.push(b'\n');

        self.control.write_all(&frame)?;
        self.control.flush()?;
        log::trace!("Sent {} byte(s)", frame.len());
        Ok(())
    }

    pub fn set_dtr(&mut self, level: bool) -> Result<()> {
        log::debug!("DTR -> {}", level);
        self.control.set_dtr(level)
    }

    pub fn set_rts(&mut self, level: bool) -> Result<()> {
        log::debug!("RTS -> {}", level);
        self.control.set_rts(level)
    }

    /// Stop the reader thread and wait for it to exit
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                log::error!("Reader thread panicked");
            }
        }
    }
}

impl Drop for SerialHandler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Longest line kept before it is handed on without a terminator
pub const MAX_LINE_BYTES: usize = 4096;

/// Read from `reader` until stopped, pushing lines onto `tx`
///
/// A read timeout hands on whatever partial line has arrived so far, so
/// prompts without a newline still show up. End of stream does the same and
/// ends the loop; any other read error ends the loop.
pub fn read_loop<R: Read>(mut reader: R, tx: &Sender<String>, stop_flag: &AtomicBool) {
    let mut assembler = LineAssembler::default();
    let mut buf = [0u8; 256];

    while !stop_flag.load(Ordering::SeqCst) {
        match reader.read(&mut buf) {
            Ok(0) => {
                log::debug!("Serial stream closed");
                if let Some(line) = assembler.flush() {
                    let _ = tx.send(line);
                }
                return;
            }
            Ok(n) => {
                for line in assembler.feed(&buf[..n]) {
                    if tx.send(line).is_err() {
                        log::debug!("Line receiver dropped, stopping reader");
                        return;
                    }
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                if let Some(line) = assembler.flush() {
                    if tx.send(line).is_err() {
                        log::debug!("Line receiver dropped, stopping reader");
                        return;
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                log::error!("Serial read failed: {}", e);
                return;
            }
        }
    }
}

/// Splits a byte stream into trimmed, non-empty text lines
///
/// A line longer than [`MAX_LINE_BYTES`] is cut at that length.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    /// Add bytes and return the lines they complete
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                lines.extend(self.flush());
                continue;
            }
            self.pending.push(byte);
            if self.pending.len() >= MAX_LINE_BYTES {
                log::trace!("Line exceeds {} bytes, cutting", MAX_LINE_BYTES);
                lines.extend(self.flush());
            }
        }
        lines
    }

    /// Hand on the partial line, if there is one
    pub fn flush(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        decode_line(&raw)
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Test doubles shared with the monitor loop tests
#[cfg(test)]
pub mod testing {
    use super::{PortControl, Result};
    use std::io::{self, Read, Write};
    use std::sync::{Arc, Mutex};

    /// Records writes and control line changes
    #[derive(Clone, Default)]
    pub struct RecordingPort {
        pub written: Arc<Mutex<Vec<u8>>>,
        pub dtr: Arc<Mutex<Option<bool>>>,
        pub rts: Arc<Mutex<Option<bool>>>,
    }

    impl Write for RecordingPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl PortControl for RecordingPort {
        fn set_dtr(&mut self, level: bool) -> Result<()> {
            *self.dtr.lock().unwrap() = Some(level);
            Ok(())
        }

        fn set_rts(&mut self, level: bool) -> Result<()> {
            *self.rts.lock().unwrap() = Some(level);
            Ok(())
        }
    }

    /// One step of a scripted byte source
    pub enum Step {
        Data(&'static [u8]),
        Timeout,
    }

    /// Plays back data chunks and read timeouts, then reports end of stream
    pub struct ScriptedReader {
        steps: Vec<Step>,
    }

    impl ScriptedReader {
        pub fn new(steps: Vec<Step>) -> Self {
            Self { steps }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.steps.is_empty() {
                return Ok(0);
            }
            match self.steps.remove(0) {
                Step::Data(chunk) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                Step::Timeout => Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
            }
        }
    }
}
