//! Grouped min/max/average over large `key;value` files.
//!
//! The input is cut into fixed-size byte ranges that a pool of workers reads
//! and aggregates independently. Records cut in half by a range boundary are
//! shipped to the merging thread, which glues them back together and folds
//! them in with the workers' partial results.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod config;
pub mod error;
pub mod merge;
pub mod output;
pub mod profile;
pub mod reader;
pub mod record;
pub mod stats;
pub mod stitch;
pub mod timing;
pub mod worker;

pub use config::{Config, ReadMode};
pub use error::{Error, Result};
pub use merge::Summary;
pub use stats::{FinalResult, FinalStats};

use merge::Merger;
use reader::ChunkReader;
use worker::AggregationWorker;

/// Aggregates `path` with the default configuration.
pub fn aggregate(path: impl AsRef<Path>) -> Result<Summary> {
    aggregate_with(path, &Config::default())
}

pub fn aggregate_with(path: impl AsRef<Path>, config: &Config) -> Result<Summary> {
    config.validate()?;
    let reader = ChunkReader::open(path.as_ref(), config)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .thread_name(|i| format!("brc-worker-{i}"))
        .build()?;

    let cancel = AtomicBool::new(false);
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut merger = Merger::new(config);
    let mut failure = None;

    pool.in_place_scope(|scope| {
        for id in 0..config.workers {
            let worker = AggregationWorker::new(id, &reader, config, &cancel, tx.clone());
            scope.spawn(move |_| worker.run());
        }
        drop(tx);

        // Drain until every worker has dropped its sender.
        for message in rx {
            if failure.is_some() {
                continue;
            }
            if let Err(err) = merger.absorb(message) {
                log::error!("cancelling run over {}: {err}", reader.path().display());
                cancel.store(true, Ordering::Release);
                failure = Some(err);
            }
        }
    });

    match failure {
        Some(err) => Err(err),
        None => merger.finish(),
    }
}
