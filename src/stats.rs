use ahash::AHashMap;
use memchr::memchr_iter;

use crate::record::{parse_record, Diagnostics, TERMINATOR};

/// Running statistics for one key. `count == 0` only before the first
/// observation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aggregate {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl Aggregate {
    pub fn new(value: f64) -> Self {
        Aggregate {
            count: 1,
            sum: value,
            min: value,
            max: value,
        }
    }

    pub fn observe(&mut self, value: f64) {
        if self.count == 0 {
            *self = Aggregate::new(value);
            return;
        }
        self.count += 1;
        self.sum += value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn merge(&mut self, other: &Aggregate) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.count += other.count;
        self.sum += other.sum;
        if other.min < self.min {
            self.min = other.min;
        }
        if other.max > self.max {
            self.max = other.max;
        }
    }

    /// `None` until something has been observed. Rounding in `sum` may
    /// push the quotient just past an extreme, so it is clamped to them.
    pub fn finish(&self) -> Option<FinalStats> {
        if self.count == 0 {
            return None;
        }
        Some(FinalStats {
            min: self.min,
            max: self.max,
            avg: (self.sum / self.count as f64).clamp(self.min, self.max),
        })
    }
}

pub type PartialResult = AHashMap<Box<[u8]>, Aggregate>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

pub type FinalResult = AHashMap<Box<[u8]>, FinalStats>;

pub fn observe(partial: &mut PartialResult, key: &[u8], value: f64) {
    // Only allocate the key the first time it shows up.
    match partial.get_mut(key) {
        Some(agg) => agg.observe(value),
        None => {
            partial.insert(key.into(), Aggregate::new(value));
        }
    }
}

/// Parses and folds one complete record. Empty lines are ignored.
pub fn fold_record(
    partial: &mut PartialResult,
    diagnostics: &mut Diagnostics,
    offset: u64,
    line: &[u8],
) {
    if line.is_empty() || line == b"\r" {
        return;
    }
    match parse_record(line) {
        Ok((key, value)) => observe(partial, key, value),
        Err(reason) => diagnostics.record(offset, line, reason),
    }
}

/// Folds a run of complete records. `base` is the absolute file offset of
/// `records[0]`. A final record without terminator is folded as well.
pub fn fold_records(
    partial: &mut PartialResult,
    diagnostics: &mut Diagnostics,
    base: u64,
    records: &[u8],
) {
    let mut start = 0;
    for end in memchr_iter(TERMINATOR, records) {
        fold_record(partial, diagnostics, base + start as u64, &records[start..end]);
        start = end + 1;
    }
    if start < records.len() {
        fold_record(partial, diagnostics, base + start as u64, &records[start..]);
    }
}

/// Combines `local` into `global` key by key.
pub fn merge_maps(global: &mut PartialResult, local: PartialResult) {
    if global.is_empty() {
        *global = local;
        return;
    }
    for (key, stats) in local {
        global
            .entry(key)
            .and_modify(|g| g.merge(&stats))
            .or_insert(stats);
    }
}

pub fn finalize(partial: &PartialResult) -> FinalResult {
    partial
        .iter()
        .filter_map(|(key, agg)| agg.finish().map(|stats| (key.clone(), stats)))
        .collect()
}
