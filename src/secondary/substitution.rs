//! Trained substring-substitution coder
//!
//! The dictionary-substitution secondary encoder: frequent substrings of the
//! training residue become one-byte codes. Codes `0..table_len` stand for
//! table entries, `0xFF` escapes one literal byte, and any other byte value
//! at or above `table_len` passes through unchanged. Encoding is greedy
//! longest-match; the trained table serializes as `(len, bytes)` entries.

use crate::error::{PbcError, Result};
use ahash::AHashMap;

/// Escape code introducing a literal byte
const LITERAL_ESCAPE: u8 = 0xFF;

/// Maximum number of table entries; code 0xFF is reserved for the escape
const MAX_ENTRIES: usize = 255;

/// Substring lengths considered during training
const MIN_SYMBOL_LEN: usize = 2;
const MAX_SYMBOL_LEN: usize = 8;

/// A substring must occur at least this often to earn a code
const MIN_FREQUENCY: u32 = 4;

/// Substring-substitution coder with a trained symbol table
#[derive(Debug, Clone)]
pub struct SubstitutionCoder {
    /// Code -> substring, at most `MAX_ENTRIES` entries of 2..=8 bytes
    symbols: Vec<Vec<u8>>,
    /// Substring -> code, derived from `symbols`
    lookup: AHashMap<Vec<u8>, u8>,
}

impl SubstitutionCoder {
    /// Train a symbol table over the residue sample frames.
    pub fn train(samples: &[Vec<u8>]) -> Self {
        let mut counts: AHashMap<&[u8], u32> = AHashMap::new();
        for sample in samples {
            for start in 0..sample.len() {
                for len in MIN_SYMBOL_LEN..=MAX_SYMBOL_LEN {
                    let Some(slice) = sample.get(start..start + len) else {
                        break;
                    };
                    *counts.entry(slice).or_insert(0) += 1;
                }
            }
        }

        // Gain of a code: every occurrence saves len-1 bytes. Sort is keyed
        // on (gain, bytes) so training is deterministic across runs.
        let mut candidates: Vec<(&[u8], u64)> = counts
            .into_iter()
            .filter(|&(_, count)| count >= MIN_FREQUENCY)
            .map(|(slice, count)| (slice, count as u64 * (slice.len() as u64 - 1)))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        candidates.truncate(MAX_ENTRIES);

        let symbols: Vec<Vec<u8>> = candidates
            .into_iter()
            .map(|(slice, _)| slice.to_vec())
            .collect();
        Self::from_symbols(symbols)
    }

    /// Rebuild the coder from a serialized symbol table.
    pub fn deserialize(blob: &[u8]) -> Result<Self> {
        let (&count, mut rest) = blob
            .split_first()
            .ok_or_else(|| PbcError::secondary_failed("substitution state is empty"))?;
        let mut symbols = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (&len, tail) = rest.split_first().ok_or_else(|| {
                PbcError::secondary_failed("substitution table truncated")
            })?;
            let len = len as usize;
            if !(MIN_SYMBOL_LEN..=MAX_SYMBOL_LEN).contains(&len) {
                return Err(PbcError::secondary_failed(format!(
                    "substitution symbol length {} out of range",
                    len
                )));
            }
            let symbol = tail.get(..len).ok_or_else(|| {
                PbcError::secondary_failed("substitution table truncated")
            })?;
            symbols.push(symbol.to_vec());
            rest = &tail[len..];
        }
        Ok(Self::from_symbols(symbols))
    }

    /// Serialize the trained state: entry count then `(len, bytes)` pairs.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![self.symbols.len() as u8];
        for symbol in &self.symbols {
            out.push(symbol.len() as u8);
            out.extend_from_slice(symbol);
        }
        out
    }

    /// Encode `input`, or decline when the result would not shrink it.
    pub fn encode(&self, input: &[u8]) -> Option<Vec<u8>> {
        if input.is_empty() {
            return None;
        }

        let table_len = self.symbols.len() as u8;
        let mut out = Vec::with_capacity(input.len());
        let mut pos = 0;
        while pos < input.len() {
            if out.len() >= input.len() {
                return None;
            }
            let mut matched = false;
            for len in (MIN_SYMBOL_LEN..=MAX_SYMBOL_LEN).rev() {
                let Some(slice) = input.get(pos..pos + len) else {
                    continue;
                };
                if let Some(&code) = self.lookup.get(slice) {
                    out.push(code);
                    pos += len;
                    matched = true;
                    break;
                }
            }
            if !matched {
                let byte = input[pos];
                if byte < table_len || byte == LITERAL_ESCAPE {
                    out.push(LITERAL_ESCAPE);
                }
                out.push(byte);
                pos += 1;
            }
        }

        if out.len() < input.len() {
            Some(out)
        } else {
            None
        }
    }

    /// Decode an encoded buffer, bounding the output to `max_out` bytes.
    pub fn decode(&self, input: &[u8], max_out: usize) -> Result<Vec<u8>> {
        let table_len = self.symbols.len() as u8;
        let mut out = Vec::with_capacity(input.len() * 2);
        let mut pos = 0;
        while pos < input.len() {
            let byte = input[pos];
            if byte == LITERAL_ESCAPE {
                let &literal = input.get(pos + 1).ok_or_else(|| {
                    PbcError::decompress_failed("substitution escape truncated")
                })?;
                out.push(literal);
                pos += 2;
            } else if byte < table_len {
                out.extend_from_slice(&self.symbols[byte as usize]);
                pos += 1;
            } else {
                out.push(byte);
                pos += 1;
            }
            if out.len() > max_out {
                return Err(PbcError::decompress_failed(
                    "substitution payload exceeds output cap",
                ));
            }
        }
        Ok(out)
    }

    fn from_symbols(symbols: Vec<Vec<u8>>) -> Self {
        let lookup = symbols
            .iter()
            .enumerate()
            .map(|(code, symbol)| (symbol.clone(), code as u8))
            .collect();
        Self { symbols, lookup }
    }
}
