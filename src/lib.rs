//! # PBC: Pattern-Based Compression
//!
//! Compression for short textual records (log lines, identifiers, URLs,
//! JSON fragments) built on the observation that such corpora share a
//! small set of *skeletons*: fixed character runs interleaved with
//! variable-length gaps.
//!
//! Training clusters the corpus agglomeratively, merging the pair of
//! skeletons whose fusion minimizes total encoding length until a target
//! dictionary size is reached. Compression then matches each record to the
//! best skeleton and stores only the pattern id plus the gap bytes, with an
//! optional trained secondary encoder squeezing that residue further.
//!
//! ## Quick Start
//!
//! ```rust
//! use pbc::{CompressMethod, PatternTrainer, PbcCompressor, RecordInput, TrainerConfig};
//!
//! // Train a dictionary over a line-separated corpus
//! let corpus = b"GET /api/users/1\nGET /api/users/2\nGET /api/users/3\n";
//! let mut trainer = PatternTrainer::with_config(TrainerConfig {
//!     method: CompressMethod::Entropy,
//!     thread_num: 0,
//!     ..Default::default()
//! })?;
//! trainer.load_training_data(corpus, RecordInput::LineSeparated)?;
//! let pattern_file = trainer.train(1)?;
//!
//! // Compress and decompress records against the trained dictionary
//! let pbc = PbcCompressor::load(CompressMethod::Entropy, &pattern_file)?;
//! let frame = pbc.compress(b"GET /api/users/42")?;
//! assert_eq!(pbc.decompress(&frame)?, b"GET /api/users/42");
//! # Ok::<(), pbc::PbcError>(())
//! ```
//!
//! ## Frame format
//!
//! Every compressed record leads with one mode-tag byte naming the layers
//! applied: `0x1B` raw, `0x1C` pattern-only, `0x1D` secondary-only,
//! `0x1E` pattern plus secondary. The length-prefixed codec variants drop
//! the tag in favour of a self-delimiting pattern-id framing.

#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod format;
pub mod pattern;
pub mod secondary;
pub mod train;
pub mod varint;

pub use codec::{CompressMode, CompressionStats, CompressorConfig, PbcCompressor, SYMBOL_SIZE};
pub use error::{PbcError, Result};
pub use format::{write_pattern_file, PatternFile};
pub use pattern::{Pattern, PatternMatcher};
pub use secondary::{CompressMethod, SecondaryEncoder};
pub use train::{PatternTrainer, RecordInput, TrainerConfig};
pub use varint::VarInt;
