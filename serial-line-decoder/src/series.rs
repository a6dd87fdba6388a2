//! Rolling per-field sample history
//!
//! Keeps the numeric fields of parsed records as time series for a live plot.
//! Only the data is managed here; drawing is up to the caller.

use crate::types::ParsedRecord;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Default number of samples kept per field
pub const DEFAULT_MAX_POINTS: usize = 1000;

/// Default rolling window shown by a live plot, in seconds
pub const DEFAULT_WINDOW_SECS: i64 = 10;

/// One numeric sample
pub type Sample = (DateTime<Utc>, f64);

/// A named series of samples
#[derive(Debug, Clone)]
pub struct Series {
    name: String,
    samples: VecDeque<Sample>,
}

impl Series {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples from oldest to newest
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}

/// Sample history for every numeric field seen so far
#[derive(Debug, Clone)]
pub struct SeriesStore {
    max_points: usize,
    /// Series in first-seen order
    series: Vec<Series>,
}

impl Default for SeriesStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS)
    }
}

impl SeriesStore {
    /// Create a store that keeps at most `max_points` samples per field
    pub fn new(max_points: usize) -> Self {
        Self {
            max_points: max_points.max(1),
            series: Vec::new(),
        }
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Append the numeric fields of `record`, stamped with `timestamp`
    ///
    /// Text fields are skipped. Returns the number of samples added.
    pub fn push(&mut self, timestamp: DateTime<Utc>, record: &ParsedRecord) -> usize {
        let mut added = 0;
        for (name, value) in record.numeric_fields() {
            let max_points = self.max_points;
            let series = self.series_mut(name);
            series.samples.push_back((timestamp, value));
            while series.samples.len() > max_points {
                series.samples.pop_front();
            }
            added += 1;
        }
        added
    }

    fn series_mut(&mut self, name: &str) -> &mut Series {
        let index = match self.series.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                log::debug!("New series: {}", name);
                self.series.push(Series {
                    name: name.to_string(),
                    samples: VecDeque::new(),
                });
                self.series.len() - 1
            }
        };
        &mut self.series[index]
    }

    /// Look up a series by field name
    pub fn series(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.name == name)
    }

    /// Field names in first-seen order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|s| s.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Newest sample of a series
    pub fn latest(&self, name: &str) -> Option<Sample> {
        self.series(name).and_then(|s| s.samples.back().copied())
    }

    /// Samples of a series taken at or after `since`
    pub fn window(&self, name: &str, since: DateTime<Utc>) -> Vec<Sample> {
        self.series(name)
            .map(|s| {
                s.samples
                    .iter()
                    .filter(|(ts, _)| *ts >= since)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Samples of a series within the last `secs` seconds before `now`
    ///
    /// A window that does not fit the representable time range yields nothing.
    pub fn recent(&self, name: &str, now: DateTime<Utc>, secs: i64) -> Vec<Sample> {
        match Duration::try_seconds(secs).and_then(|d| now.checked_sub_signed(d)) {
            Some(since) => self.window(name, since),
            None => {
                log::debug!("Window of {}s before {} is out of range", secs, now);
                Vec::new()
            }
        }
    }

    /// Drop all series
    pub fn clear(&mut self) {
        self.series.clear();
    }
}
