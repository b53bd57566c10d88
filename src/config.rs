use crate::error::{Error, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;
pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_MAX_SAMPLES: usize = 8;

/// How a reserved byte range is turned into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Positional read of each range into a buffer owned by the worker.
    #[default]
    Positional,
    /// Map the file once and hand out borrowed slices of the mapping.
    Mapped,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub chunk_size: usize,
    pub workers: usize,
    pub read_mode: ReadMode,
    /// Reassemble records longer than `chunk_size` instead of failing.
    pub allow_long_records: bool,
    /// Malformed lines kept verbatim in the diagnostics.
    pub max_samples: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
            read_mode: ReadMode::default(),
            allow_long_records: false,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

impl Config {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_read_mode(mut self, read_mode: ReadMode) -> Self {
        self.read_mode = read_mode;
        self
    }

    pub fn with_long_records(mut self, allow: bool) -> Self {
        self.allow_long_records = allow;
        self
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size must be at least one byte".into()));
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig("at least one worker is required".into()));
        }
        Ok(())
    }
}
