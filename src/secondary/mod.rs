//! Secondary encoders
//!
//! After pattern matching removes the shared skeleton, the remaining
//! pattern-id + filler stream (or the raw record when nothing matched) can
//! be compressed once more by a general-purpose coder. Every variant follows
//! the same lifecycle: trained on the residue of the training corpus,
//! serialized into the pattern-file tail, rebuilt at load time, and asked to
//! encode each record body, with the right to decline when the result
//! would not shrink.

pub mod entropy;
pub mod substitution;
#[cfg(feature = "zstd")]
pub mod zstd_dict;

pub use entropy::EntropyCoder;
pub use substitution::SubstitutionCoder;
#[cfg(feature = "zstd")]
pub use zstd_dict::ZstdDictCoder;

use crate::error::{PbcError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Compression method selection
///
/// Chooses which secondary encoder runs behind the pattern codec. The
/// method is not recorded in the pattern file; compressor and trainer must
/// agree on it out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CompressMethod {
    /// Pattern codec only, no secondary stage
    PatternOnly,
    /// Trained order-0 entropy coder over the residue
    Entropy,
    /// Trained substring-substitution coder over the residue
    Substitution,
    /// zstd with a dictionary trained on the residue
    #[cfg(feature = "zstd")]
    Zstd,
}

impl Default for CompressMethod {
    fn default() -> Self {
        Self::Entropy
    }
}

impl CompressMethod {
    /// Get the name of the method
    pub fn name(self) -> &'static str {
        match self {
            CompressMethod::PatternOnly => "pattern-only",
            CompressMethod::Entropy => "entropy",
            CompressMethod::Substitution => "substitution",
            #[cfg(feature = "zstd")]
            CompressMethod::Zstd => "zstd",
        }
    }

    /// Get all methods available in the current build
    pub fn available_methods() -> Vec<Self> {
        let mut methods = vec![Self::PatternOnly, Self::Entropy, Self::Substitution];
        #[cfg(feature = "zstd")]
        methods.push(Self::Zstd);
        methods
    }
}

/// A trained secondary encoder, dispatched by method
#[derive(Debug, Clone)]
pub enum SecondaryEncoder {
    /// No secondary stage
    None,
    /// Trained entropy coder
    Entropy(EntropyCoder),
    /// Trained substitution coder
    Substitution(SubstitutionCoder),
    /// Trained zstd dictionary coder
    #[cfg(feature = "zstd")]
    Zstd(ZstdDictCoder),
}

impl SecondaryEncoder {
    /// Train an encoder of the given method on residue sample frames.
    pub fn train(method: CompressMethod, samples: &[Vec<u8>]) -> Result<Self> {
        Ok(match method {
            CompressMethod::PatternOnly => Self::None,
            CompressMethod::Entropy => {
                let residue: Vec<u8> = samples.iter().flat_map(|s| s.iter().copied()).collect();
                Self::Entropy(EntropyCoder::train(&residue))
            }
            CompressMethod::Substitution => Self::Substitution(SubstitutionCoder::train(samples)),
            #[cfg(feature = "zstd")]
            CompressMethod::Zstd => Self::Zstd(ZstdDictCoder::train(samples)),
        })
    }

    /// The method this encoder implements
    pub fn method(&self) -> CompressMethod {
        match self {
            Self::None => CompressMethod::PatternOnly,
            Self::Entropy(_) => CompressMethod::Entropy,
            Self::Substitution(_) => CompressMethod::Substitution,
            #[cfg(feature = "zstd")]
            Self::Zstd(_) => CompressMethod::Zstd,
        }
    }

    /// Encode `input`; `Ok(None)` means the encoder declined.
    pub fn encode(&self, input: &[u8]) -> Result<Option<Vec<u8>>> {
        match self {
            Self::None => Ok(None),
            Self::Entropy(coder) => Ok(coder.encode(input)),
            Self::Substitution(coder) => Ok(coder.encode(input)),
            #[cfg(feature = "zstd")]
            Self::Zstd(coder) => coder.encode(input),
        }
    }

    /// Decode an encoded buffer, bounding the output to `max_out` bytes.
    pub fn decode(&self, input: &[u8], max_out: usize) -> Result<Vec<u8>> {
        match self {
            Self::None => Err(PbcError::decompress_failed(
                "frame requires a secondary encoder but none is loaded",
            )),
            Self::Entropy(coder) => coder.decode(input, max_out),
            Self::Substitution(coder) => coder.decode(input, max_out),
            #[cfg(feature = "zstd")]
            Self::Zstd(coder) => coder.decode(input, max_out),
        }
    }

    /// Serialize the trained state for the pattern-file tail.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Self::None => Vec::new(),
            Self::Entropy(coder) => coder.serialize(),
            Self::Substitution(coder) => coder.serialize(),
            #[cfg(feature = "zstd")]
            Self::Zstd(coder) => coder.serialize(),
        }
    }

    /// Rebuild an encoder of the given method from the pattern-file tail.
    pub fn deserialize(method: CompressMethod, blob: &[u8]) -> Result<Self> {
        Ok(match method {
            CompressMethod::PatternOnly => Self::None,
            CompressMethod::Entropy => Self::Entropy(EntropyCoder::deserialize(blob)?),
            CompressMethod::Substitution => {
                Self::Substitution(SubstitutionCoder::deserialize(blob)?)
            }
            #[cfg(feature = "zstd")]
            CompressMethod::Zstd => Self::Zstd(ZstdDictCoder::deserialize(blob)?),
        })
    }
}
