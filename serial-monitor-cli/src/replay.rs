//! File replay
//!
//! Sends the lines of a text file one by one with a fixed delay, from a
//! background thread, so the monitor loop keeps draining incoming data.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Start replaying `path` into `sink`, one trimmed line every `delay`
///
/// The file is read up front, so a missing or unreadable file is reported
/// here rather than from the thread. Replay ends early when `stop_flag` is
/// set or the receiving side of `sink` is gone.
pub fn spawn_file_replay(
    path: &Path,
    delay: Duration,
    sink: Sender<String>,
    stop_flag: Arc<AtomicBool>,
) -> Result<JoinHandle<usize>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read file to send: {:?}", path))?;
    let lines: Vec<String> = String::from_utf8_lossy(&bytes)
        .lines()
        .map(|line| line.trim().to_string())
        .collect();

    log::info!("Replaying {} line(s) from {:?}", lines.len(), path);

    let handle = thread::spawn(move || {
        let mut sent = 0;
        for line in lines {
            if stop_flag.load(Ordering::SeqCst) {
                log::debug!("Replay stopped after {} line(s)", sent);
                break;
            }
            if sink.send(line).is_err() {
                log::debug!("Replay sink closed after {} line(s)", sent);
                break;
            }
            sent += 1;
            thread::sleep(delay);
        }
        sent
    });

    Ok(handle)
}
