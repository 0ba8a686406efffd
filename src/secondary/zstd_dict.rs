//! Trained-dictionary zstd coder
//!
//! The dictionary-compressor secondary encoder: a zstd dictionary trained on
//! the residue sample frames, serialized raw into the pattern-file tail and
//! attached to every compress/decompress call. Dictionary training needs a
//! minimum amount of sample material; when it cannot produce a dictionary
//! the coder falls back to plain zstd, which keeps the lifecycle uniform.

use crate::error::{PbcError, Result};

/// Maximum dictionary size handed to the trainer
const DICT_SIZE: usize = 110 * 1024;

/// Compression level used with the trained dictionary
const LEVEL: i32 = 3;

/// zstd coder with an optional trained dictionary
#[derive(Debug, Clone)]
pub struct ZstdDictCoder {
    /// Raw trained dictionary; empty means plain zstd
    dictionary: Vec<u8>,
}

impl ZstdDictCoder {
    /// Train a dictionary over the residue sample frames.
    ///
    /// Falls back to an empty dictionary when the samples are too small or
    /// too uniform for the trainer.
    pub fn train(samples: &[Vec<u8>]) -> Self {
        let dictionary = match zstd::dict::from_samples(samples, DICT_SIZE) {
            Ok(dict) => dict,
            Err(err) => {
                log::debug!("zstd dictionary training declined: {}", err);
                Vec::new()
            }
        };
        Self { dictionary }
    }

    /// Rebuild the coder from serialized dictionary bytes.
    pub fn deserialize(blob: &[u8]) -> Result<Self> {
        Ok(Self {
            dictionary: blob.to_vec(),
        })
    }

    /// Serialize the trained state: the raw dictionary bytes.
    pub fn serialize(&self) -> Vec<u8> {
        self.dictionary.clone()
    }

    /// Encode `input`, or decline when the result would not shrink it.
    pub fn encode(&self, input: &[u8]) -> Result<Option<Vec<u8>>> {
        if input.is_empty() {
            return Ok(None);
        }

        let mut compressor = if self.dictionary.is_empty() {
            zstd::bulk::Compressor::new(LEVEL)
        } else {
            zstd::bulk::Compressor::with_dictionary(LEVEL, &self.dictionary)
        }
        .map_err(|e| PbcError::secondary_failed(format!("zstd context: {}", e)))?;

        let out = compressor
            .compress(input)
            .map_err(|e| PbcError::secondary_failed(format!("zstd compress: {}", e)))?;

        if out.len() < input.len() {
            Ok(Some(out))
        } else {
            Ok(None)
        }
    }

    /// Decode an encoded buffer, bounding the output to `max_out` bytes.
    pub fn decode(&self, input: &[u8], max_out: usize) -> Result<Vec<u8>> {
        let mut decompressor = if self.dictionary.is_empty() {
            zstd::bulk::Decompressor::new()
        } else {
            zstd::bulk::Decompressor::with_dictionary(&self.dictionary)
        }
        .map_err(|e| PbcError::decompress_failed(format!("zstd context: {}", e)))?;

        decompressor
            .decompress(input, max_out)
            .map_err(|e| PbcError::decompress_failed(format!("zstd decompress: {}", e)))
    }
}
