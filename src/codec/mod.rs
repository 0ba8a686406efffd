//! Record codec
//!
//! Compresses one record at a time against a loaded pattern dictionary. A
//! one-byte mode tag leads every frame and names the layers that were
//! applied:
//!
//! | tag    | layout |
//! |--------|--------|
//! | `0x1B` | raw record (nothing shrank it) |
//! | `0x1C` | pattern id (2 bytes) + filler stream |
//! | `0x1D` | secondary-encoded raw record (no pattern matched) |
//! | `0x1E` | secondary-encoded (pattern id + filler stream) |
//!
//! The filler stream interleaves varint gap lengths with the gap bytes the
//! pattern's wildcards absorbed. The length-prefixed variants drop the mode
//! tag, always lead with the 2-byte id, and reserve id `N` (the dictionary
//! size) as the "no match, raw record follows" sentinel so concatenated
//! frames stay self-delimiting.

pub mod stats;

pub use stats::CompressionStats;

use crate::error::{PbcError, Result};
use crate::format::PatternFile;
use crate::pattern::{Pattern, PatternMatcher};
use crate::secondary::{CompressMethod, SecondaryEncoder};
use crate::varint::VarInt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Radix of the 2-byte pattern-id encoding; also the one-gram alphabet size
pub const SYMBOL_SIZE: usize = 256;

/// Frame mode tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressMode {
    /// Raw record follows the tag
    NotCompressed = 0x1B,
    /// Pattern id and filler stream follow the tag
    PatternOnly = 0x1C,
    /// Secondary-encoded raw record follows the tag
    SecondaryOnly = 0x1D,
    /// Secondary-encoded pattern body follows the tag
    Combined = 0x1E,
}

impl CompressMode {
    /// The wire byte for this mode
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte into a mode
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0x1B => Ok(Self::NotCompressed),
            0x1C => Ok(Self::PatternOnly),
            0x1D => Ok(Self::SecondaryOnly),
            0x1E => Ok(Self::Combined),
            other => Err(PbcError::decompress_failed(format!(
                "unknown mode tag {:#04x}",
                other
            ))),
        }
    }
}

/// Codec configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompressorConfig {
    /// Upper bound on a decompressed record, guarding against
    /// decompression bombs and truncation-induced runaway walks
    pub buffer_size: usize,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024 * 1024,
        }
    }
}

impl CompressorConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(PbcError::configuration("buffer_size must be nonzero"));
        }
        Ok(())
    }
}

/// Compression context over a loaded pattern dictionary
#[derive(Debug)]
pub struct PbcCompressor {
    config: CompressorConfig,
    patterns: Vec<Pattern>,
    matcher: PatternMatcher,
    secondary: SecondaryEncoder,
    /// Cap for a decoded pattern body: the record cap plus id and worst-case
    /// varint framing across the widest pattern
    body_cap: usize,
}

impl PbcCompressor {
    /// Load a compressor from a pattern-file blob.
    ///
    /// `method` must match the method the dictionary was trained with; the
    /// secondary state at the file tail is interpreted accordingly.
    pub fn load(method: CompressMethod, pattern_file: &[u8]) -> Result<Self> {
        Self::load_with_config(method, pattern_file, CompressorConfig::default())
    }

    /// Load a compressor with an explicit configuration.
    pub fn load_with_config(
        method: CompressMethod,
        pattern_file: &[u8],
        config: CompressorConfig,
    ) -> Result<Self> {
        config.validate()?;

        let file = PatternFile::parse(pattern_file)?;
        if file.skeletons.len() >= SYMBOL_SIZE * SYMBOL_SIZE {
            return Err(PbcError::configuration(format!(
                "{} patterns exceed the 2-byte id space",
                file.skeletons.len()
            )));
        }

        let patterns = file
            .skeletons
            .iter()
            .map(|s| Pattern::parse(s))
            .collect::<Result<Vec<_>>>()?;
        let matcher = PatternMatcher::new(&patterns)?;
        let secondary = SecondaryEncoder::deserialize(method, file.secondary)?;

        let widest = patterns.iter().map(|p| p.run_count()).max().unwrap_or(0);
        let body_cap = config.buffer_size + 2 + (widest + 1) * VarInt::MAX_ENCODED_LEN;

        Ok(Self {
            config,
            patterns,
            matcher,
            secondary,
            body_cap,
        })
    }

    /// Number of patterns in the loaded dictionary
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// The method this compressor was loaded with
    pub fn method(&self) -> CompressMethod {
        self.secondary.method()
    }

    /// Compress one record into a mode-tagged frame.
    pub fn compress(&self, record: &[u8]) -> Result<Vec<u8>> {
        if let Some(id) = self.matcher.find(record) {
            let mut body = Vec::with_capacity(record.len() + 8);
            body.push((id / SYMBOL_SIZE) as u8);
            body.push((id % SYMBOL_SIZE) as u8);
            self.build_filler_stream(&self.patterns[id], record, &mut body)?;

            match self.try_secondary(&body) {
                Some(encoded) if encoded.len() < body.len() => {
                    Ok(frame(CompressMode::Combined, &encoded))
                }
                _ => Ok(frame(CompressMode::PatternOnly, &body)),
            }
        } else {
            match self.try_secondary(record) {
                Some(encoded) if encoded.len() < record.len() => {
                    Ok(frame(CompressMode::SecondaryOnly, &encoded))
                }
                _ => Ok(frame(CompressMode::NotCompressed, record)),
            }
        }
    }

    /// Decompress one mode-tagged frame back into the record.
    pub fn decompress(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let (&tag, rest) = frame
            .split_first()
            .ok_or_else(|| PbcError::decompress_failed("empty frame"))?;

        match CompressMode::from_tag(tag)? {
            CompressMode::NotCompressed => {
                if rest.len() > self.config.buffer_size {
                    return Err(PbcError::decompress_failed("record exceeds output cap"));
                }
                Ok(rest.to_vec())
            }
            CompressMode::SecondaryOnly => self.secondary.decode(rest, self.config.buffer_size),
            CompressMode::PatternOnly => {
                let (record, _) = self.decode_pattern_body(rest)?;
                Ok(record)
            }
            CompressMode::Combined => {
                let body = self.secondary.decode(rest, self.body_cap)?;
                let (record, _) = self.decode_pattern_body(&body)?;
                Ok(record)
            }
        }
    }

    /// Compress one record into a self-delimiting, untagged frame.
    ///
    /// Always leads with the 2-byte pattern id; unmatched records use the
    /// sentinel id `N` followed by a varint length and the raw bytes. No
    /// secondary encoding is applied.
    pub fn compress_with_length(&self, record: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(record.len() + 8);
        match self.matcher.find(record) {
            Some(id) => {
                out.push((id / SYMBOL_SIZE) as u8);
                out.push((id % SYMBOL_SIZE) as u8);
                self.build_filler_stream(&self.patterns[id], record, &mut out)?;
            }
            None => {
                let sentinel = self.patterns.len();
                out.push((sentinel / SYMBOL_SIZE) as u8);
                out.push((sentinel % SYMBOL_SIZE) as u8);
                VarInt::write_to_vec(&mut out, record.len() as u32);
                out.extend_from_slice(record);
            }
        }
        Ok(out)
    }

    /// Decompress one self-delimiting frame, returning the record and the
    /// number of input bytes consumed.
    pub fn decompress_with_length(&self, input: &[u8]) -> Result<(Vec<u8>, usize)> {
        if input.len() < 2 {
            return Err(PbcError::decompress_failed("frame shorter than pattern id"));
        }
        let id = input[0] as usize * SYMBOL_SIZE + input[1] as usize;

        if id == self.patterns.len() {
            let (len, varint_len) = VarInt::decode(&input[2..])?;
            let len = len as usize;
            if len > self.config.buffer_size {
                return Err(PbcError::decompress_failed("record exceeds output cap"));
            }
            let start = 2 + varint_len;
            let record = input.get(start..start + len).ok_or_else(|| {
                PbcError::decompress_failed("raw frame shorter than its declared length")
            })?;
            return Ok((record.to_vec(), start + len));
        }

        let (record, consumed) = self.decode_pattern_body(input)?;
        Ok((record, consumed))
    }

    /// Apply the secondary encoder; failure degrades to "declined".
    fn try_secondary(&self, input: &[u8]) -> Option<Vec<u8>> {
        match self.secondary.encode(input) {
            Ok(result) => result,
            Err(err) => {
                log::debug!("secondary encoding degraded to pass-through: {}", err);
                None
            }
        }
    }

    /// Emit the filler stream of `record` against `pattern` onto `out`.
    fn build_filler_stream(
        &self,
        pattern: &Pattern,
        record: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let num = pattern.run_count();
        let mut cursor = 0usize;

        for k in 0..num {
            let run = pattern.run(k);
            if run.is_empty() {
                // Zero-width runs mark open ends; anywhere else the split
                // vector is corrupt
                if k != 0 && k != num - 1 {
                    return Err(PbcError::compress_failed(
                        "zero-width literal run inside pattern",
                    ));
                }
                continue;
            }

            let found = find_from(record, run, cursor).ok_or_else(|| {
                PbcError::compress_failed("literal run missing from matched record")
            })?;

            if found == cursor {
                if k > 0 {
                    out.push(0);
                }
            } else {
                VarInt::write_to_vec(out, (found - cursor) as u32);
                out.extend_from_slice(&record[cursor..found]);
            }
            cursor = found + run.len();
        }

        if pattern.open_at_end() {
            if cursor < record.len() {
                VarInt::write_to_vec(out, (record.len() - cursor) as u32);
                out.extend_from_slice(&record[cursor..]);
            } else {
                out.push(0);
            }
        } else if cursor != record.len() {
            return Err(PbcError::compress_failed(
                "record extends past anchored pattern end",
            ));
        }
        Ok(())
    }

    /// Decode a `pattern_id + filler_stream` body; returns the record and
    /// the number of body bytes consumed.
    fn decode_pattern_body(&self, body: &[u8]) -> Result<(Vec<u8>, usize)> {
        if body.len() < 2 {
            return Err(PbcError::decompress_failed("body shorter than pattern id"));
        }
        let id = body[0] as usize * SYMBOL_SIZE + body[1] as usize;
        let pattern = self
            .patterns
            .get(id)
            .ok_or_else(|| PbcError::decompress_failed(format!("unknown pattern id {}", id)))?;

        let stream = &body[2..];
        if stream.is_empty() {
            // Degenerate frame: the record is the pattern's literal form
            return Ok((pattern.literals().to_vec(), 2));
        }

        let mut out = Vec::with_capacity(pattern.literals().len() + stream.len());
        let mut pos = 0usize;

        if pattern.open_at_start() {
            pos += self.copy_gap(stream, pos, &mut out)?;
        }

        let num = pattern.run_count();
        for k in 0..num {
            let run = pattern.run(k);
            if run.is_empty() {
                if k != 0 && k != num - 1 {
                    return Err(PbcError::decompress_failed(
                        "zero-width literal run inside pattern",
                    ));
                }
                continue;
            }

            if out.len() + run.len() > self.config.buffer_size {
                return Err(PbcError::decompress_failed("record exceeds output cap"));
            }
            out.extend_from_slice(run);

            if k != num - 1 {
                pos += self.copy_gap(stream, pos, &mut out)?;
            }
        }

        Ok((out, 2 + pos))
    }

    /// Read one varint-prefixed gap from `stream[pos..]` into `out`;
    /// returns the number of stream bytes consumed.
    fn copy_gap(&self, stream: &[u8], pos: usize, out: &mut Vec<u8>) -> Result<usize> {
        let tail = stream
            .get(pos..)
            .ok_or_else(|| PbcError::decompress_failed("filler stream truncated"))?;
        let (gap_len, varint_len) = VarInt::decode(tail)?;
        let gap_len = gap_len as usize;

        let gap = tail.get(varint_len..varint_len + gap_len).ok_or_else(|| {
            PbcError::decompress_failed("filler stream shorter than its gap length")
        })?;
        if out.len() + gap_len > self.config.buffer_size {
            return Err(PbcError::decompress_failed("record exceeds output cap"));
        }
        out.extend_from_slice(gap);
        Ok(varint_len + gap_len)
    }
}

/// Prefix a body with a mode tag
fn frame(mode: CompressMode, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(mode.tag());
    out.extend_from_slice(body);
    out
}

/// First occurrence of `needle` in `haystack` at or after `from`
fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::write_pattern_file;

    fn pattern_only(skeletons: &[&[u8]]) -> PbcCompressor {
        let blob = write_pattern_file(skeletons, &[]);
        PbcCompressor::load(CompressMethod::PatternOnly, &blob).unwrap()
    }

    #[test]
    fn test_single_wildcard_frame_layout() {
        let pbc = pattern_only(&[b"user_*_id"]);
        let frame = pbc.compress(b"user_42_id").unwrap();

        // tag, id hi, id lo, varint(2), "42", trailing varint(0)
        assert_eq!(frame[0], 0x1C);
        assert_eq!(&frame[1..3], &[0, 0]);
        assert_eq!(frame[3], 2);
        assert_eq!(&frame[4..6], b"42");
        assert_eq!(frame[6], 0);
        assert_eq!(frame.len(), 7);

        assert_eq!(pbc.decompress(&frame).unwrap(), b"user_42_id");
    }

    #[test]
    fn test_no_match_falls_back_to_raw() {
        let pbc = pattern_only(&[b"user_*_id"]);
        let frame = pbc.compress(b"hello").unwrap();
        assert_eq!(frame[0], 0x1B);
        assert_eq!(pbc.decompress(&frame).unwrap(), b"hello");
    }

    #[test]
    fn test_wildcards_at_both_ends_filler_layout() {
        let pbc = pattern_only(&[b"*ERROR*"]);
        let record = b"2024-01-01 ERROR timeout";
        let frame = pbc.compress(record).unwrap();

        assert_eq!(frame[0], 0x1C);
        let mut expected = vec![0u8, 0];
        expected.push(11);
        expected.extend_from_slice(b"2024-01-01 ");
        expected.push(8);
        expected.extend_from_slice(b" timeout");
        assert_eq!(&frame[1..], &expected[..]);

        assert_eq!(pbc.decompress(&frame).unwrap(), record);
    }

    #[test]
    fn test_fully_literal_record_emits_zero_gaps() {
        let pbc = pattern_only(&[b"status_*_ok"]);
        let frame = pbc.compress(b"status__ok").unwrap();
        // Middle gap is empty (varint 0) and so is the tail
        assert_eq!(&frame[1..], &[0, 0, 0, 0]);
        assert_eq!(pbc.decompress(&frame).unwrap(), b"status__ok");
    }

    #[test]
    fn test_empty_record_round_trip() {
        let pbc = pattern_only(&[b"user_*_id"]);
        let frame = pbc.compress(b"").unwrap();
        assert_eq!(frame, vec![0x1B]);
        assert_eq!(pbc.decompress(&frame).unwrap(), b"");
    }

    #[test]
    fn test_record_with_embedded_nul() {
        let pbc = pattern_only(&[b"key=*;"]);
        let record = b"key=a\x00b;tail";
        let frame = pbc.compress(record).unwrap();
        assert_eq!(pbc.decompress(&frame).unwrap(), record);
    }

    #[test]
    fn test_escaped_literals_round_trip() {
        let pbc = pattern_only(&[br"glob \* pattern_*"]);
        let record = br"glob * pattern_match".as_slice();
        let frame = pbc.compress(record).unwrap();
        assert_eq!(frame[0], 0x1C);
        assert_eq!(pbc.decompress(&frame).unwrap(), record);
    }

    #[test]
    fn test_tie_break_prefers_more_literal_pattern() {
        let pbc = pattern_only(&[b"u*d", b"user_*_id"]);
        let frame = pbc.compress(b"user_42_id").unwrap();
        assert_eq!(&frame[1..3], &[0, 1]);
        assert_eq!(pbc.decompress(&frame).unwrap(), b"user_42_id");
    }

    #[test]
    fn test_malformed_frames_rejected() {
        let pbc = pattern_only(&[b"user_*_id"]);

        assert!(pbc.decompress(&[]).is_err());
        assert!(pbc.decompress(&[0xFF, 0x00]).is_err());
        // Unknown pattern id
        assert!(pbc.decompress(&[0x1C, 0x10, 0x00, 0x00]).is_err());
        // Truncated filler stream: declared gap of 5 with 1 byte present
        assert!(pbc.decompress(&[0x1C, 0x00, 0x00, 5, b'x']).is_err());
        // Secondary frame without a secondary encoder
        assert!(pbc.decompress(&[0x1D, 1, 2, 3]).is_err());
    }

    #[test]
    fn test_output_cap_enforced() {
        let blob = write_pattern_file(&[b"a*b".as_slice()], &[]);
        let pbc = PbcCompressor::load_with_config(
            CompressMethod::PatternOnly,
            &blob,
            CompressorConfig { buffer_size: 8 },
        )
        .unwrap();

        let frame = pattern_only(&[b"a*b"]).compress(b"a0123456789b").unwrap();
        assert!(pbc.decompress(&frame).is_err());
    }

    #[test]
    fn test_with_length_round_trip_and_concatenation() {
        let pbc = pattern_only(&[b"user_*_id"]);

        let matched = pbc.compress_with_length(b"user_42_id").unwrap();
        assert_eq!(&matched[..2], &[0, 0]);

        let unmatched = pbc.compress_with_length(b"hello").unwrap();
        // Sentinel id is the dictionary size (1)
        assert_eq!(&unmatched[..2], &[0, 1]);

        let mut stream = matched.clone();
        stream.extend_from_slice(&unmatched);

        let (first, used) = pbc.decompress_with_length(&stream).unwrap();
        assert_eq!(first, b"user_42_id");
        assert_eq!(used, matched.len());

        let (second, used2) = pbc.decompress_with_length(&stream[used..]).unwrap();
        assert_eq!(second, b"hello");
        assert_eq!(used + used2, stream.len());
    }

    #[test]
    fn test_with_length_rejects_out_of_range_id() {
        let pbc = pattern_only(&[b"user_*_id"]);
        // id 2 is past the sentinel (1)
        assert!(pbc.decompress_with_length(&[0, 2, 0]).is_err());
    }

    #[test]
    fn test_compress_does_not_poison_context() {
        let pbc = pattern_only(&[b"user_*_id"]);
        assert!(pbc.decompress(&[0x1C, 0x00]).is_err());
        // The context stays usable after a failed call
        let frame = pbc.compress(b"user_7_id").unwrap();
        assert_eq!(pbc.decompress(&frame).unwrap(), b"user_7_id");
    }

    #[test]
    fn test_mode_tags() {
        assert_eq!(CompressMode::NotCompressed.tag(), 0x1B);
        assert_eq!(CompressMode::PatternOnly.tag(), 0x1C);
        assert_eq!(CompressMode::SecondaryOnly.tag(), 0x1D);
        assert_eq!(CompressMode::Combined.tag(), 0x1E);
        for tag in [0x1B, 0x1C, 0x1D, 0x1E] {
            assert_eq!(CompressMode::from_tag(tag).unwrap().tag(), tag);
        }
        assert!(CompressMode::from_tag(0x1A).is_err());
    }
}
