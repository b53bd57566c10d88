use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::stats::{FinalResult, FinalStats};

pub const HEADER: [&str; 4] = ["location", "min", "max", "avg"];

/// Rows ordered by the raw bytes of the key.
pub fn sorted_rows(result: &FinalResult) -> Vec<(&[u8], FinalStats)> {
    let mut rows: Vec<(&[u8], FinalStats)> = result
        .iter()
        .map(|(key, stats)| (&key[..], *stats))
        .collect();
    rows.sort_unstable_by(|a, b| a.0.cmp(b.0));
    rows
}

pub fn write_csv<W: Write>(result: &FinalResult, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(HEADER)?;
    for (key, stats) in sorted_rows(result) {
        let min = format!("{:.1}", stats.min);
        let max = format!("{:.1}", stats.max);
        let avg = format!("{:.1}", stats.avg);
        wtr.write_record([key, min.as_bytes(), max.as_bytes(), avg.as_bytes()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the CSV to `path`, creating missing parent directories.
pub fn write_csv_file(result: &FinalResult, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_csv(result, BufWriter::new(file))
}
