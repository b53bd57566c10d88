use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::Diagnostics;
use crate::stats::{finalize, fold_record, merge_maps, FinalResult, PartialResult};
use crate::stitch::{BoundaryFragment, BoundaryStitcher, StitchedRecord};
use crate::worker::{ChunkTrace, Message, WorkerReport};

/// Outcome of one full pass over the input.
#[derive(Debug)]
pub struct Summary {
    pub result: FinalResult,
    pub diagnostics: Diagnostics,
    pub chunks: u64,
    pub bytes: u64,
    pub traces: Vec<ChunkTrace>,
}

/// Single owner of the combined mapping and of the stitcher's pending table.
pub struct Merger {
    stitcher: BoundaryStitcher,
    chunk_size: usize,
    allow_long_records: bool,
    combined: PartialResult,
    boundary: PartialResult,
    diagnostics: Diagnostics,
    traces: Vec<ChunkTrace>,
    bytes: u64,
    reports: usize,
}

impl Merger {
    pub fn new(config: &Config) -> Self {
        Merger {
            stitcher: BoundaryStitcher::new(),
            chunk_size: config.chunk_size,
            allow_long_records: config.allow_long_records,
            combined: PartialResult::default(),
            boundary: PartialResult::default(),
            diagnostics: Diagnostics::with_limit(config.max_samples),
            traces: Vec::new(),
            bytes: 0,
            reports: 0,
        }
    }

    pub fn absorb(&mut self, message: Message) -> Result<()> {
        match message {
            Message::Fragment(fragment) => self.add_fragment(fragment),
            Message::Published(report) => {
                self.add_report(*report);
                Ok(())
            }
            Message::Failed(err) => Err(err),
        }
    }

    pub fn add_fragment(&mut self, fragment: BoundaryFragment) -> Result<()> {
        for record in self.stitcher.insert(fragment)? {
            self.check_length(&record, 1)?;
            self.fold_stitched(record);
        }
        Ok(())
    }

    pub fn add_report(&mut self, report: WorkerReport) {
        log::debug!(
            "merging worker {}: {} keys from {} chunks",
            report.worker,
            report.partial.len(),
            report.traces.len()
        );
        merge_maps(&mut self.combined, report.partial);
        self.diagnostics.merge(report.diagnostics);
        self.traces.extend(report.traces);
        self.bytes += report.bytes;
        self.reports += 1;
    }

    /// A record that needs more than `chunk_size` bytes, `terminator`
    /// included, cannot be told apart from a truncated one.
    fn check_length(&self, record: &StitchedRecord, terminator: usize) -> Result<()> {
        if self.allow_long_records || record.bytes.len() + terminator <= self.chunk_size {
            return Ok(());
        }
        Err(Error::ChunkTooSmall {
            ordinal: record.offset / self.chunk_size as u64,
            offset: record.offset,
            chunk_size: self.chunk_size,
        })
    }

    fn fold_stitched(&mut self, record: StitchedRecord) {
        fold_record(
            &mut self.boundary,
            &mut self.diagnostics,
            record.offset,
            &record.bytes,
        );
    }

    pub fn finish(mut self) -> Result<Summary> {
        let chunks = self.stitcher.chunks();
        let stitcher = std::mem::replace(&mut self.stitcher, BoundaryStitcher::new());
        if let Some(record) = stitcher.finish()? {
            // Only the unterminated last record is left open at the end.
            self.check_length(&record, 0)?;
            fold_record(
                &mut self.boundary,
                &mut self.diagnostics,
                record.offset,
                &record.bytes,
            );
        }
        merge_maps(&mut self.combined, self.boundary);
        self.traces.sort_by_key(|t| t.ordinal);

        let result = finalize(&self.combined);
        log::info!(
            "merged {} keys from {chunks} chunks ({} bytes, {} workers, {} malformed)",
            result.len(),
            self.bytes,
            self.reports,
            self.diagnostics.malformed
        );
        Ok(Summary {
            result,
            diagnostics: self.diagnostics,
            chunks,
            bytes: self.bytes,
            traces: self.traces,
        })
    }
}
