//! Parsing of single `key;value` records and bookkeeping for the ones
//! that cannot be parsed.

use std::fmt;

use memchr::memchr;

pub const SEPARATOR: u8 = b';';
pub const TERMINATOR: u8 = b'\n';

/// Why a line was skipped. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedRecord {
    MissingSeparator,
    InvalidValue,
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedRecord::MissingSeparator => write!(f, "no ';' separator"),
            MalformedRecord::InvalidValue => write!(f, "value is not a finite number"),
        }
    }
}

/// Strips one trailing `\n` and, if present, the `\r` before it.
pub fn trim_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(&[TERMINATOR]).unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Splits on the first separator. The key is returned untouched, the
/// value must parse as a finite `f64`.
pub fn parse_record(line: &[u8]) -> Result<(&[u8], f64), MalformedRecord> {
    let line = trim_terminator(line);
    let at = memchr(SEPARATOR, line).ok_or(MalformedRecord::MissingSeparator)?;
    let (key, value) = (&line[..at], &line[at + 1..]);
    match lexical_core::parse::<f64>(value) {
        Ok(v) if v.is_finite() => Ok((key, v)),
        _ => Err(MalformedRecord::InvalidValue),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MalformedSample {
    /// Absolute byte offset of the line in the input file.
    pub offset: u64,
    pub line: String,
    pub reason: MalformedRecord,
}

/// Count of skipped lines plus the first few of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub malformed: u64,
    pub samples: Vec<MalformedSample>,
    limit: usize,
}

impl Diagnostics {
    pub fn with_limit(limit: usize) -> Self {
        Diagnostics {
            malformed: 0,
            samples: Vec::new(),
            limit,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.malformed == 0
    }

    /// Counts the line and samples it if it is among the lowest offsets
    /// seen so far.
    pub fn record(&mut self, offset: u64, line: &[u8], reason: MalformedRecord) {
        self.malformed += 1;
        log::debug!("skipping malformed record at offset {offset} ({reason})");
        let at = self.samples.partition_point(|s| s.offset < offset);
        if at >= self.limit {
            return;
        }
        self.samples.insert(
            at,
            MalformedSample {
                offset,
                line: String::from_utf8_lossy(trim_terminator(line)).into_owned(),
                reason,
            },
        );
        self.samples.truncate(self.limit);
    }

    /// Adds `other` into `self`, keeping the lowest-offset samples.
    pub fn merge(&mut self, other: Diagnostics) {
        self.malformed += other.malformed;
        self.samples.extend(other.samples);
        self.samples.sort_by_key(|s| s.offset);
        self.samples.truncate(self.limit);
    }
}
