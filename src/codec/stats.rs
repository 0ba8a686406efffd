//! Compression accounting
//!
//! Running statistics over compressed frames: how many records landed on
//! each framing mode and what the corpus-level compression ratio works out
//! to. The caller owns the accumulator and feeds it each frame, so
//! concurrent compression threads can keep private counters and add them
//! up afterwards.

use crate::codec::CompressMode;

/// Statistics accumulated over a stream of compressed records
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompressionStats {
    /// Records observed
    pub records: u64,
    /// Raw record bytes in
    pub bytes_in: u64,
    /// Framed bytes out
    pub bytes_out: u64,
    /// Frames that stored the raw record
    pub not_compressed: u64,
    /// Frames compressed by the pattern codec alone
    pub pattern_only: u64,
    /// Frames compressed by the secondary encoder alone
    pub secondary_only: u64,
    /// Frames compressed by both layers
    pub combined: u64,
}

impl CompressionStats {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one record and the frame it compressed into.
    pub fn record(&mut self, record_len: usize, frame: &[u8]) {
        self.records += 1;
        self.bytes_in += record_len as u64;
        self.bytes_out += frame.len() as u64;

        let mode = frame
            .first()
            .and_then(|&tag| CompressMode::from_tag(tag).ok());
        match mode {
            Some(CompressMode::NotCompressed) => self.not_compressed += 1,
            Some(CompressMode::PatternOnly) => self.pattern_only += 1,
            Some(CompressMode::SecondaryOnly) => self.secondary_only += 1,
            Some(CompressMode::Combined) => self.combined += 1,
            None => {}
        }
    }

    /// Merge another accumulator into this one.
    pub fn merge(&mut self, other: &CompressionStats) {
        self.records += other.records;
        self.bytes_in += other.bytes_in;
        self.bytes_out += other.bytes_out;
        self.not_compressed += other.not_compressed;
        self.pattern_only += other.pattern_only;
        self.secondary_only += other.secondary_only;
        self.combined += other.combined;
    }

    /// Output bytes over input bytes; zero before any input
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_in == 0 {
            0.0
        } else {
            self.bytes_out as f64 / self.bytes_in as f64
        }
    }

    /// Space savings as a percentage
    pub fn space_savings(&self) -> f64 {
        (1.0 - self.compression_ratio()) * 100.0
    }

    /// Share of records that hit the pattern path (alone or combined)
    pub fn pattern_hit_rate(&self) -> f64 {
        if self.records == 0 {
            0.0
        } else {
            (self.pattern_only + self.combined) as f64 / self.records as f64
        }
    }
}
