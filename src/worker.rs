use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::reader::{Chunk, ChunkReader};
use crate::record::Diagnostics;
use crate::stats::{fold_records, PartialResult};
use crate::stitch::{split_chunk, BoundaryFragment, ChunkShape};

/// Per-chunk timing, kept for the profiling output.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkTrace {
    pub ordinal: u64,
    pub worker: usize,
    pub offset: u64,
    pub len: usize,
    pub read: Duration,
    pub fold: Duration,
}

/// Everything a worker owned, handed over in one piece when it is done.
#[derive(Debug, Default)]
pub struct WorkerReport {
    pub worker: usize,
    pub partial: PartialResult,
    pub diagnostics: Diagnostics,
    pub traces: Vec<ChunkTrace>,
    pub bytes: u64,
}

#[derive(Debug)]
pub enum Message {
    Fragment(BoundaryFragment),
    Published(Box<WorkerReport>),
    Failed(Error),
}

/// Folds the complete records of `chunk` into `partial` and returns the
/// pieces that belong to neighbouring chunks.
pub fn process_chunk(
    chunk: &Chunk<'_>,
    config: &Config,
    partial: &mut PartialResult,
    diagnostics: &mut Diagnostics,
) -> Result<BoundaryFragment> {
    let shape = split_chunk(&chunk.data);
    match &shape {
        ChunkShape::Terminated(split) => {
            let base = chunk.offset + split.interior_start as u64;
            fold_records(partial, diagnostics, base, split.interior);
        }
        ChunkShape::Unterminated(data) => {
            // A full chunk with no terminator can only sit inside a record
            // that is longer than the chunk itself.
            if !chunk.last && data.len() >= config.chunk_size && !config.allow_long_records {
                return Err(Error::ChunkTooSmall {
                    ordinal: chunk.ordinal,
                    offset: chunk.offset,
                    chunk_size: config.chunk_size,
                });
            }
        }
    }
    Ok(BoundaryFragment::from_chunk(chunk, &shape))
}

pub struct AggregationWorker<'a> {
    id: usize,
    reader: &'a ChunkReader,
    config: &'a Config,
    cancel: &'a AtomicBool,
    tx: Sender<Message>,
}

impl<'a> AggregationWorker<'a> {
    pub fn new(
        id: usize,
        reader: &'a ChunkReader,
        config: &'a Config,
        cancel: &'a AtomicBool,
        tx: Sender<Message>,
    ) -> Self {
        AggregationWorker {
            id,
            reader,
            config,
            cancel,
            tx,
        }
    }

    /// Pulls chunks until the input is exhausted or the run is cancelled,
    /// then publishes the local aggregate. Errors are published too.
    pub fn run(self) {
        if let Err(err) = self.work() {
            self.cancel.store(true, Ordering::Release);
            log::error!("worker {} failed: {err}", self.id);
            // The merger only goes away when the whole run is torn down.
            let _ = self.tx.send(Message::Failed(err));
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn work(&self) -> Result<()> {
        let mut report = WorkerReport {
            worker: self.id,
            diagnostics: Diagnostics::with_limit(self.config.max_samples),
            ..WorkerReport::default()
        };

        while !self.cancelled() {
            let started = Instant::now();
            let Some(chunk) = self.reader.next_chunk()? else {
                break;
            };
            let read = started.elapsed();
            if self.cancelled() {
                break;
            }

            let started = Instant::now();
            let fragment = process_chunk(
                &chunk,
                self.config,
                &mut report.partial,
                &mut report.diagnostics,
            )?;
            let fold = started.elapsed();

            log::debug!(
                "worker {} folded chunk {} ({} bytes at {}) in {:?}",
                self.id,
                chunk.ordinal,
                chunk.data.len(),
                chunk.offset,
                fold
            );
            report.bytes += chunk.data.len() as u64;
            report.traces.push(ChunkTrace {
                ordinal: chunk.ordinal,
                worker: self.id,
                offset: chunk.offset,
                len: chunk.data.len(),
                read,
                fold,
            });
            if self.tx.send(Message::Fragment(fragment)).is_err() {
                return Ok(());
            }
        }

        if self.cancelled() {
            log::debug!("worker {} stopped early", self.id);
            return Ok(());
        }
        let _ = self.tx.send(Message::Published(Box::new(report)));
        Ok(())
    }
}
