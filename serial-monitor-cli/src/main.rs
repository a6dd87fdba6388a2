//! Serial Monitor CLI Application
//!
//! This is the terminal front end of the serial monitor.
//! It uses the serial-line-decoder library and adds:
//! - Serial port access (background reader thread + line queue)
//! - Typed input and file replay
//! - Console output in the selected display mode, with an optional session log
//! - Persistent settings (~/.serial_monitor.json)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serial_line_decoder::{encode_named, load_parser, DisplayMode};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

mod config;
mod output;
mod replay;
mod serial;

use config::{MonitorSettings, Parity};
use output::OutputController;
use serial::{PortSettings, SerialHandler};

/// Serial Monitor - stream, decode and parse serial port traffic
#[derive(Parser, Debug)]
#[command(name = "serial-monitor")]
#[command(about = "Monitor a serial port and decode its lines", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Settings file (default: ~/.serial_monitor.json)
    #[arg(long, value_name = "FILE", global = true)]
    settings: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available serial ports
    Ports,

    /// Connect to a port and stream its lines
    Monitor(MonitorArgs),

    /// Render text in a display mode (arguments, or stdin lines if none)
    Encode {
        /// Display mode: UTF-8, ANSI, HEX, DEC or BIN
        #[arg(short, long, default_value = "UTF-8")]
        mode: String,

        text: Vec<String>,
    },

    /// Parse lines with a parser config and print one JSON record per line
    Parse {
        /// Parser config file (JSON)
        #[arg(long, value_name = "FILE")]
        parser: PathBuf,

        lines: Vec<String>,
    },

    /// Show or edit the saved settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print the current settings
    Show,

    /// Change one setting and save
    Set { key: String, value: String },
}

#[derive(clap::Args, Debug)]
struct MonitorArgs {
    /// Serial port (e.g. /dev/ttyUSB0, COM3)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Data bits (5-8)
    #[arg(long)]
    bytesize: Option<u8>,

    /// Parity: N, E or O
    #[arg(long)]
    parity: Option<Parity>,

    /// Stop bits (1 or 2)
    #[arg(long)]
    stop_bits: Option<u8>,

    /// Display mode: UTF-8, ANSI, HEX, DEC or BIN
    #[arg(short, long)]
    mode: Option<DisplayMode>,

    /// Parser config file (JSON)
    #[arg(long, value_name = "FILE")]
    parser: Option<PathBuf>,

    /// DTR level after connecting
    #[arg(long, value_name = "BOOL")]
    dtr: Option<bool>,

    /// RTS level after connecting
    #[arg(long, value_name = "BOOL")]
    rts: Option<bool>,

    /// Session log file
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Send the lines of this file after connecting
    #[arg(long, value_name = "FILE")]
    send_file: Option<PathBuf>,

    /// Delay between replayed lines in milliseconds
    #[arg(long, value_name = "MS")]
    send_delay_ms: Option<u64>,

    /// Stop after this many seconds (default: run until the port closes)
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Output refresh interval in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 200)]
    tick_ms: u64,

    /// Do not send stdin lines to the port
    #[arg(long)]
    no_stdin: bool,

    /// Save the resulting settings for next time
    #[arg(long)]
    save: bool,
}

impl MonitorArgs {
    /// Override saved settings with whatever was given on the command line
    fn apply(&self, settings: &mut MonitorSettings) {
        if let Some(port) = &self.port {
            settings.port = port.clone();
        }
        if let Some(baud) = self.baud {
            settings.baudrate = baud;
        }
        if let Some(bytesize) = self.bytesize {
            settings.bytesize = bytesize;
        }
        if let Some(parity) = self.parity {
            settings.parity = parity;
        }
        if let Some(stop_bits) = self.stop_bits {
            settings.stop_bits = stop_bits;
        }
        if let Some(mode) = self.mode {
            settings.display_mode = mode;
        }
        if let Some(parser) = &self.parser {
            settings.parser_path = parser.display().to_string();
        }
        if let Some(dtr) = self.dtr {
            settings.dtr_default = dtr;
        }
        if let Some(rts) = self.rts {
            settings.rts_default = rts;
        }
        if let Some(log) = &self.log {
            settings.log_path = log.display().to_string();
        }
        if let Some(delay) = self.send_delay_ms {
            settings.send_delay_ms = delay;
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::debug!("Serial Monitor CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using decoder library v{}", serial_line_decoder::VERSION);

    let settings_path = match &args.settings {
        Some(path) => path.clone(),
        None => config::default_settings_path()?,
    };

    match &args.command {
        Command::Ports => list_ports(),
        Command::Monitor(monitor_args) => run_monitor(monitor_args, &settings_path),
        Command::Encode { mode, text } => run_encode(mode, text),
        Command::Parse { parser, lines } => run_parse(parser, lines),
        Command::Settings(command) => run_settings(command, &settings_path),
    }
}

fn list_ports() -> Result<()> {
    let ports = SerialHandler::available_ports().context("Failed to list serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

/// Monitor mode - connect, then drain incoming and outgoing lines every tick
fn run_monitor(args: &MonitorArgs, settings_path: &Path) -> Result<()> {
    let mut settings = config::load_settings(settings_path)?;
    args.apply(&mut settings);

    if args.save {
        config::save_settings(settings_path, &settings)?;
        log::info!("Settings saved to {:?}", settings_path);
    }

    let port_settings = PortSettings::try_from(&settings)?;

    let mut output = OutputController::new(io::stdout(), settings.display_mode);
    if let Some(path) = settings.log_file() {
        output = output
            .with_log_file(&path)
            .with_context(|| format!("Failed to open log file: {:?}", path))?;
    }
    if let Some(path) = settings.parser_file() {
        match load_parser(&path) {
            Ok(parser) => output = output.with_parser(parser),
            // Keep monitoring without a parser
            Err(e) => log::warn!("Parser not loaded from {:?}: {}", path, e),
        }
    }

    let mut handler = SerialHandler::open(&port_settings)
        .with_context(|| format!("Failed to open {}", port_settings.port))?;
    output.display_info(&format!(
        "Connected to {} at {} baud",
        port_settings.port, port_settings.baudrate
    ))?;

    let stop_flag = Arc::new(AtomicBool::new(false));
    let (outgoing_tx, outgoing_rx) = channel::<String>();
    let (input_tx, input_rx) = channel::<Input>();

    if !args.no_stdin {
        spawn_stdin_reader(input_tx);
    } else {
        drop(input_tx);
    }

    let replay = match &args.send_file {
        Some(path) => Some(replay::spawn_file_replay(
            path,
            Duration::from_millis(settings.send_delay_ms),
            outgoing_tx.clone(),
            Arc::clone(&stop_flag),
        )?),
        None => None,
    };
    drop(outgoing_tx);

    let tick_interval = Duration::from_millis(args.tick_ms.max(1));
    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs(secs));

    loop {
        let reading = tick(&mut handler, &mut output, &input_rx, &outgoing_rx)?;
        if !reading {
            output.display_info("Port closed")?;
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            log::debug!("Monitor duration elapsed");
            break;
        }

        thread::sleep(tick_interval);
    }

    stop_flag.store(true, Ordering::SeqCst);
    handler.stop();
    for line in handler.read_lines() {
        output.display_received(&line)?;
    }
    if let Some(replay) = replay {
        match replay.join() {
            Ok(sent) => log::info!("Replayed {} line(s)", sent),
            Err(_) => log::error!("Replay thread panicked"),
        }
    }

    print_series_summary(&output);
    Ok(())
}

/// One pass of the monitor loop: route typed input and replayed lines to the
/// port, then show everything received
///
/// Returns whether the reader was still running when the pass started. Lines
/// the reader queued before exiting are shown in the same pass.
fn tick<W: Write>(
    handler: &mut SerialHandler,
    output: &mut OutputController<W>,
    inputs: &Receiver<Input>,
    outgoing: &Receiver<String>,
) -> Result<bool> {
    let reading = handler.is_reading();

    for input in inputs.try_iter() {
        match input {
            Input::Line(line) => {
                handler.send(&line)?;
                output.display_sent(&line)?;
            }
            Input::Mode(mode) => {
                output.set_mode(mode);
                output.display_info(&format!("Display mode: {}", output.mode()))?;
            }
            Input::Dtr(level) => {
                handler.set_dtr(level)?;
                output.display_info(&format!("DTR: {}", on_off(level)))?;
            }
            Input::Rts(level) => {
                handler.set_rts(level)?;
                output.display_info(&format!("RTS: {}", on_off(level)))?;
            }
            Input::Invalid(message) => output.display_info(&message)?,
        }
    }

    for line in outgoing.try_iter() {
        handler.send(&line)?;
        output.display_sent(&line)?;
    }

    for line in handler.read_lines() {
        output.display_received(&line)?;
    }

    Ok(reading)
}

/// A line typed on stdin
#[derive(Debug, PartialEq)]
enum Input {
    /// Text to send
    Line(String),
    /// `:mode NAME`
    Mode(DisplayMode),
    /// `:dtr on|off`
    Dtr(bool),
    /// `:rts on|off`
    Rts(bool),
    /// A console command that could not be understood
    Invalid(String),
}

impl Input {
    /// Lines starting with `:` are console commands, everything else is sent
    fn parse(line: String) -> Self {
        let Some(command) = line.strip_prefix(':') else {
            return Input::Line(line);
        };

        let mut words = command.split_whitespace();
        match (words.next(), words.next()) {
            (Some("mode"), Some(name)) => match name.parse() {
                Ok(mode) => Input::Mode(mode),
                Err(e) => Input::Invalid(e),
            },
            (Some("dtr"), Some(level)) => parse_level(level).map_or_else(Input::Invalid, Input::Dtr),
            (Some("rts"), Some(level)) => parse_level(level).map_or_else(Input::Invalid, Input::Rts),
            // "::text" sends ":text"
            (Some(_), _) if command.starts_with(':') => Input::Line(command.to_string()),
            _ => Input::Invalid(format!(
                "Unknown command {:?} (try :mode HEX, :dtr on, :rts off)",
                line
            )),
        }
    }
}

fn parse_level(level: &str) -> std::result::Result<bool, String> {
    match level.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        _ => Err(format!("Expected on or off, got {:?}", level)),
    }
}

fn on_off(level: bool) -> &'static str {
    if level {
        "on"
    } else {
        "off"
    }
}

/// Forward stdin lines to the monitor loop until stdin closes
fn spawn_stdin_reader(sink: Sender<Input>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if sink.send(Input::parse(line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
        log::debug!("Stdin closed");
    });
}

fn print_series_summary<W: Write>(output: &OutputController<W>) {
    let series = output.series();
    if series.is_empty() {
        return;
    }

    log::info!("Parsed series:");
    for name in series.names() {
        let count = series.series(name).map(|s| s.len()).unwrap_or(0);
        match series.latest(name) {
            Some((_, value)) => log::info!("  {}: {} sample(s), last {}", name, count, value),
            None => log::info!("  {}: {} sample(s)", name, count),
        }
    }
}

fn run_encode(mode: &str, text: &[String]) -> Result<()> {
    if !text.is_empty() {
        println!("{}", encode_named(mode, &text.join(" ")));
        return Ok(());
    }

    for line in io::stdin().lock().lines() {
        println!("{}", encode_named(mode, &line?));
    }
    Ok(())
}

fn run_parse(parser_path: &Path, lines: &[String]) -> Result<()> {
    let parser = load_parser(parser_path)
        .with_context(|| format!("Failed to load parser: {:?}", parser_path))?;

    let mut stdout = io::stdout().lock();
    let mut print = |line: &str| -> Result<()> {
        let record = parser.parse(line);
        writeln!(stdout, "{}", serde_json::to_string(&record)?)?;
        Ok(())
    };

    if !lines.is_empty() {
        for line in lines {
            print(line)?;
        }
        return Ok(());
    }

    for line in io::stdin().lock().lines() {
        print(&line?)?;
    }
    Ok(())
}

fn run_settings(command: &SettingsCommand, settings_path: &Path) -> Result<()> {
    let mut settings = config::load_settings(settings_path)?;

    match command {
        SettingsCommand::Show => {
            println!("# {}", settings_path.display());
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsCommand::Set { key, value } => {
            settings.set(key, value)?;
            config::save_settings(settings_path, &settings)?;
            log::info!("{} = {}", key, value);
        }
    }
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
