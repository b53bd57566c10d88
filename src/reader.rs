use std::borrow::Cow;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use parking_lot::Mutex;

use crate::config::{Config, ReadMode};
use crate::error::{Error, Result};

/// A reserved byte range of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAssignment {
    pub offset: u64,
    pub len: usize,
    pub ordinal: u64,
    /// The range ends at the end of the file.
    pub last: bool,
}

#[derive(Debug)]
pub struct Chunk<'a> {
    pub ordinal: u64,
    pub offset: u64,
    pub last: bool,
    pub data: Cow<'a, [u8]>,
}

struct Position {
    offset: u64,
    ordinal: u64,
}

/// Hands out consecutive, non-overlapping ranges of `chunk_size` bytes.
/// Only the bookkeeping is serialized; callers do the transfer themselves.
pub struct RangeCursor {
    len: u64,
    chunk_size: usize,
    position: Mutex<Position>,
}

impl RangeCursor {
    pub fn new(len: u64, chunk_size: usize) -> Self {
        RangeCursor {
            len,
            chunk_size,
            position: Mutex::new(Position {
                offset: 0,
                ordinal: 0,
            }),
        }
    }

    pub fn reserve(&self) -> Option<ChunkAssignment> {
        let mut pos = self.position.lock();
        if pos.offset >= self.len {
            return None;
        }
        let remaining = self.len - pos.offset;
        let len = remaining.min(self.chunk_size as u64) as usize;
        let assignment = ChunkAssignment {
            offset: pos.offset,
            len,
            ordinal: pos.ordinal,
            last: len as u64 == remaining,
        };
        pos.offset += len as u64;
        pos.ordinal += 1;
        Some(assignment)
    }
}

enum Source {
    File(File),
    Mapped(Mmap),
}

/// Owns the input file and serves chunks to any number of threads.
pub struct ChunkReader {
    path: PathBuf,
    len: u64,
    source: Source,
    cursor: RangeCursor,
}

impl ChunkReader {
    pub fn open(path: &Path, config: &Config) -> Result<Self> {
        let unreadable = |source: io::Error| Error::InputUnreadable {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(unreadable)?;
        let len = file.metadata().map_err(unreadable)?.len();

        // Mapping an empty file fails on some platforms; nothing to map anyway.
        let source = match config.read_mode {
            ReadMode::Mapped if len > 0 => {
                // SAFETY: the input is treated as read-only for the lifetime of
                // the reader; concurrent truncation by another process is not
                // supported.
                let mmap = unsafe { Mmap::map(&file) }.map_err(unreadable)?;
                Source::Mapped(mmap)
            }
            _ => Source::File(file),
        };

        log::debug!(
            "opened {} ({len} bytes, chunks of {} bytes, {:?})",
            path.display(),
            config.chunk_size,
            config.read_mode
        );

        Ok(ChunkReader {
            path: path.to_path_buf(),
            len,
            source,
            cursor: RangeCursor::new(len, config.chunk_size),
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserves the next range and reads it. `Ok(None)` once the whole file
    /// has been handed out.
    pub fn next_chunk(&self) -> Result<Option<Chunk<'_>>> {
        let Some(range) = self.cursor.reserve() else {
            return Ok(None);
        };
        let data = match &self.source {
            Source::Mapped(mmap) => {
                let start = range.offset as usize;
                Cow::Borrowed(&mmap[start..start + range.len])
            }
            Source::File(file) => {
                let mut buf = vec![0u8; range.len];
                read_exact_at(file, &mut buf, range.offset).map_err(|source| {
                    Error::InputUnreadable {
                        path: self.path.clone(),
                        source,
                    }
                })?;
                Cow::Owned(buf)
            }
        };
        Ok(Some(Chunk {
            ordinal: range.ordinal,
            offset: range.offset,
            last: range.last,
            data,
        }))
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
