use std::fs::{self, OpenOptions};
use std::path::Path;
use std::time::Duration;

use chrono::Local;

use crate::error::Result;

/// Wall-clock durations of repeated runs over the same input.
#[derive(Debug, Clone, Default)]
pub struct RunTimes {
    times: Vec<Duration>,
}

impl RunTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, elapsed: Duration) {
        self.times.push(elapsed);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn seconds(&self) -> impl Iterator<Item = f64> + '_ {
        self.times.iter().map(Duration::as_secs_f64)
    }

    pub fn avg(&self) -> f64 {
        if self.times.is_empty() {
            return 0.0;
        }
        self.seconds().sum::<f64>() / self.times.len() as f64
    }

    pub fn min(&self) -> f64 {
        self.seconds().reduce(f64::min).unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.seconds().reduce(f64::max).unwrap_or(0.0)
    }

    /// Appends one line per invocation:
    /// `timestamp,version,input,loops,avg,min,max,[t1 t2 ...]`.
    pub fn append_csv(&self, path: &Path, input: &str) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut wtr = csv::Writer::from_writer(file);

        let all = self
            .seconds()
            .map(|s| format!("{s:.3}"))
            .collect::<Vec<_>>()
            .join(" ");
        wtr.write_record([
            Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
            input.to_string(),
            self.len().to_string(),
            format!("{:.3}", self.avg()),
            format!("{:.3}", self.min()),
            format!("{:.3}", self.max()),
            format!("[{all}]"),
        ])?;
        wtr.flush()?;
        Ok(())
    }
}
