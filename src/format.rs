//! Pattern-file wire format
//!
//! ```text
//! pattern_file := num_patterns:i32
//!                 ( pattern_len:i32 pattern_bytes[pattern_len] ){num_patterns}
//!                 secondary_blob[...to EOF]
//! ```
//!
//! Pattern bytes are the user-facing skeletons with `*` and `\` escaped.
//! All integers are little-endian. The secondary blob runs to end-of-file
//! and is handed to the secondary encoder's `deserialize` in one piece.

use crate::error::{PbcError, Result};

/// A parsed pattern file, borrowing the underlying buffer
#[derive(Debug)]
pub struct PatternFile<'a> {
    /// Skeleton bytes per pattern, in dictionary order
    pub skeletons: Vec<&'a [u8]>,
    /// Trained secondary-encoder state; empty for pattern-only files
    pub secondary: &'a [u8],
}

impl<'a> PatternFile<'a> {
    /// Parse a pattern file buffer.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let (count, mut rest) = read_i32(data)?;
        if count < 0 {
            return Err(PbcError::configuration(format!(
                "pattern file declares {} patterns",
                count
            )));
        }

        let mut skeletons = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (len, tail) = read_i32(rest)?;
            if len < 0 {
                return Err(PbcError::configuration(format!(
                    "pattern file declares a pattern of length {}",
                    len
                )));
            }
            let skeleton = tail.get(..len as usize).ok_or_else(|| {
                PbcError::configuration("pattern file truncated inside a pattern")
            })?;
            skeletons.push(skeleton);
            rest = &tail[len as usize..];
        }

        Ok(Self {
            skeletons,
            secondary: rest,
        })
    }
}

/// Serialize skeletons and a secondary-encoder blob into a pattern file.
pub fn write_pattern_file<S: AsRef<[u8]>>(skeletons: &[S], secondary: &[u8]) -> Vec<u8> {
    let body: usize = skeletons.iter().map(|s| 4 + s.as_ref().len()).sum();
    let mut out = Vec::with_capacity(4 + body + secondary.len());

    out.extend_from_slice(&(skeletons.len() as i32).to_le_bytes());
    for skeleton in skeletons {
        let skeleton = skeleton.as_ref();
        out.extend_from_slice(&(skeleton.len() as i32).to_le_bytes());
        out.extend_from_slice(skeleton);
    }
    out.extend_from_slice(secondary);
    out
}

fn read_i32(data: &[u8]) -> Result<(i32, &[u8])> {
    let bytes = data
        .get(..4)
        .ok_or_else(|| PbcError::configuration("pattern file truncated"))?;
    let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    Ok((value, &data[4..]))
}
