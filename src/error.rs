use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions. Any of these cancels the whole run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read input {}: {source}", path.display())]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "record in chunk {ordinal} near offset {offset} is longer than \
         the chunk size of {chunk_size} bytes"
    )]
    ChunkTooSmall {
        ordinal: u64,
        offset: u64,
        chunk_size: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("fragment table inconsistent: {0}")]
    Stitch(String),

    #[error("writing output: {0}")]
    Output(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
