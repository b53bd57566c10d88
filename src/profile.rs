use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::worker::ChunkTrace;

/// Destination for per-chunk and per-worker timings of a run.
#[derive(Debug, Clone)]
pub struct Profiler {
    dir: PathBuf,
    postfix: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct WorkerTotals {
    chunks: u64,
    bytes: u64,
    read: Duration,
    fold: Duration,
}

impl Profiler {
    /// Creates `root/name`, reusing it if it already exists.
    pub fn create(root: &Path, name: &str, postfix: &str) -> Result<Self> {
        let dir = root.join(name);
        if dir.is_dir() {
            log::info!("profile directory {} exists, reusing it", dir.display());
        }
        fs::create_dir_all(&dir)?;
        Ok(Profiler {
            dir,
            postfix: postfix.to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, stem: &str) -> PathBuf {
        if self.postfix.is_empty() {
            self.dir.join(format!("{stem}.csv"))
        } else {
            self.dir.join(format!("{stem}_{}.csv", self.postfix))
        }
    }

    pub fn write(&self, traces: &[ChunkTrace]) -> Result<()> {
        let chunks = self.write_chunks(traces)?;
        let workers = self.write_workers(traces)?;
        log::info!("profile written to {} and {}", chunks.display(), workers.display());
        Ok(())
    }

    pub fn write_chunks(&self, traces: &[ChunkTrace]) -> Result<PathBuf> {
        let path = self.file("chunks");
        let mut wtr = csv::Writer::from_path(&path)?;
        wtr.write_record(["ordinal", "worker", "offset", "len", "read_us", "fold_us"])?;
        for t in traces {
            wtr.write_record([
                t.ordinal.to_string(),
                t.worker.to_string(),
                t.offset.to_string(),
                t.len.to_string(),
                t.read.as_micros().to_string(),
                t.fold.as_micros().to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(path)
    }

    pub fn write_workers(&self, traces: &[ChunkTrace]) -> Result<PathBuf> {
        let mut totals: BTreeMap<usize, WorkerTotals> = BTreeMap::new();
        for t in traces {
            let w = totals.entry(t.worker).or_default();
            w.chunks += 1;
            w.bytes += t.len as u64;
            w.read += t.read;
            w.fold += t.fold;
        }

        let path = self.file("workers");
        let mut wtr = csv::Writer::from_path(&path)?;
        wtr.write_record(["worker", "chunks", "bytes", "read_us", "fold_us"])?;
        for (worker, w) in totals {
            wtr.write_record([
                worker.to_string(),
                w.chunks.to_string(),
                w.bytes.to_string(),
                w.read.as_micros().to_string(),
                w.fold.as_micros().to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(path)
    }
}
