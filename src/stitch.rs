//! Reassembly of the records that straddle chunk boundaries.
//!
//! Boundaries are numbered so that boundary `i` sits right before chunk `i`:
//! boundary 0 is the start of the file and boundary `n` is its end. The
//! trailing piece of chunk `i` therefore opens a record at boundary `i + 1`
//! and the leading piece of chunk `j` closes a record at boundary `j`. A chunk
//! without any terminator is a span that only links boundary `s` to `s + 1`.
//!
//! Pieces are kept in a pending table keyed by boundary (or by ordinal for
//! spans) and a record is emitted as soon as every piece between an open tail
//! and a closing head has arrived, whatever the arrival order.

use ahash::{AHashMap, AHashSet};
use memchr::{memchr, memrchr};

use crate::error::{Error, Result};
use crate::reader::Chunk;
use crate::record::TERMINATOR;

/// The three regions of a chunk that contains at least one terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split<'a> {
    /// Bytes before the first terminator, terminator excluded.
    pub leading: &'a [u8],
    /// Complete records, each with its terminator.
    pub interior: &'a [u8],
    /// Bytes after the last terminator.
    pub trailing: &'a [u8],
    /// Position of `interior` inside the chunk.
    pub interior_start: usize,
    /// Position of `trailing` inside the chunk.
    pub trailing_start: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkShape<'a> {
    Terminated(Split<'a>),
    /// No terminator at all: the chunk lies inside a single record.
    Unterminated(&'a [u8]),
}

pub fn split_chunk(data: &[u8]) -> ChunkShape<'_> {
    let Some(first) = memchr(TERMINATOR, data) else {
        return ChunkShape::Unterminated(data);
    };
    // There is at least one terminator, so the reverse search cannot miss.
    let last = memrchr(TERMINATOR, data).unwrap_or(first);
    ChunkShape::Terminated(Split {
        leading: &data[..first],
        interior: &data[first + 1..last + 1],
        trailing: &data[last + 1..],
        interior_start: first + 1,
        trailing_start: last + 1,
    })
}

/// Partial record bytes together with their absolute file offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub offset: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edges {
    Split { leading: Piece, trailing: Piece },
    Span(Piece),
}

/// What a worker publishes for every chunk it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryFragment {
    pub ordinal: u64,
    pub last: bool,
    pub edges: Edges,
}

impl BoundaryFragment {
    pub fn from_chunk(chunk: &Chunk<'_>, shape: &ChunkShape<'_>) -> Self {
        let edges = match shape {
            ChunkShape::Terminated(split) => Edges::Split {
                leading: Piece {
                    offset: chunk.offset,
                    bytes: split.leading.to_vec(),
                },
                trailing: Piece {
                    offset: chunk.offset + split.trailing_start as u64,
                    bytes: split.trailing.to_vec(),
                },
            },
            ChunkShape::Unterminated(bytes) => Edges::Span(Piece {
                offset: chunk.offset,
                bytes: bytes.to_vec(),
            }),
        };
        BoundaryFragment {
            ordinal: chunk.ordinal,
            last: chunk.last,
            edges,
        }
    }
}

/// One reassembled record, without terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitchedRecord {
    pub offset: u64,
    pub bytes: Vec<u8>,
}

pub struct BoundaryStitcher {
    tails: AHashMap<u64, Piece>,
    heads: AHashMap<u64, Piece>,
    spans: AHashMap<u64, Piece>,
    received: AHashSet<u64>,
    total: Option<u64>,
}

impl Default for BoundaryStitcher {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundaryStitcher {
    pub fn new() -> Self {
        let mut tails = AHashMap::new();
        // The file start opens the very first record.
        tails.insert(
            0,
            Piece {
                offset: 0,
                bytes: Vec::new(),
            },
        );
        BoundaryStitcher {
            tails,
            heads: AHashMap::new(),
            spans: AHashMap::new(),
            received: AHashSet::new(),
            total: None,
        }
    }

    /// Fragments still waiting for a partner.
    pub fn pending(&self) -> usize {
        self.tails.len() + self.heads.len() + self.spans.len()
    }

    /// Number of chunk fragments accepted so far.
    pub fn chunks(&self) -> u64 {
        self.received.len() as u64
    }

    pub fn insert(&mut self, fragment: BoundaryFragment) -> Result<Vec<StitchedRecord>> {
        let ordinal = fragment.ordinal;
        if let Some(total) = self.total {
            if ordinal >= total {
                return Err(Error::Stitch(format!(
                    "chunk {ordinal} arrived after the last chunk {}",
                    total - 1
                )));
            }
        }
        if fragment.last {
            if let Some(beyond) = self.received.iter().find(|&&o| o > ordinal) {
                return Err(Error::Stitch(format!(
                    "chunk {ordinal} marked last but chunk {beyond} was already seen"
                )));
            }
            self.total = Some(ordinal + 1);
        }
        if !self.received.insert(ordinal) {
            return Err(Error::Stitch(format!("chunk {ordinal} published twice")));
        }

        let mut out = Vec::new();
        match fragment.edges {
            Edges::Split { leading, trailing } => {
                self.heads.insert(ordinal, leading);
                self.tails.insert(ordinal + 1, trailing);
                self.close_through(ordinal, &mut out);
                self.close_through(ordinal + 1, &mut out);
            }
            Edges::Span(piece) => {
                self.spans.insert(ordinal, piece);
                self.close_through(ordinal, &mut out);
            }
        }
        Ok(out)
    }

    /// Closes the record left open at the end of the file, if any, and checks
    /// that every fragment found its partner.
    pub fn finish(mut self) -> Result<Option<StitchedRecord>> {
        let seen = self.chunks();
        let end = self.total.unwrap_or(seen);
        if seen != end {
            return Err(Error::Stitch(format!(
                "expected {end} chunks, received {seen}"
            )));
        }
        self.heads.insert(
            end,
            Piece {
                offset: 0,
                bytes: Vec::new(),
            },
        );
        let mut out = Vec::new();
        self.close_through(end, &mut out);

        if self.pending() != 0 {
            return Err(Error::Stitch(format!(
                "{} fragments left unpaired after {end} chunks",
                self.pending()
            )));
        }
        Ok(out.pop())
    }

    /// Emits the record passing through `boundary` if all of its pieces are
    /// present.
    fn close_through(&mut self, boundary: u64, out: &mut Vec<StitchedRecord>) {
        let mut start = boundary;
        while !self.tails.contains_key(&start) {
            if start == 0 || !self.spans.contains_key(&(start - 1)) {
                return;
            }
            start -= 1;
        }
        let mut end = start;
        while !self.heads.contains_key(&end) {
            if !self.spans.contains_key(&end) {
                return;
            }
            end += 1;
        }

        let Some(tail) = self.tails.remove(&start) else {
            return;
        };
        let offset = tail.offset;
        let mut bytes = tail.bytes;
        for ordinal in start..end {
            if let Some(span) = self.spans.remove(&ordinal) {
                bytes.extend_from_slice(&span.bytes);
            }
        }
        if let Some(head) = self.heads.remove(&end) {
            bytes.extend_from_slice(&head.bytes);
        }
        if !bytes.is_empty() {
            out.push(StitchedRecord { offset, bytes });
        }
    }
}
