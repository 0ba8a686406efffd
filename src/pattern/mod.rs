//! Pattern skeleton model
//!
//! A pattern is a sequence of literal byte runs interleaved with unbounded
//! wildcards. The user-facing form is a byte string in which `*` marks a
//! wildcard and `\` escapes a literal `*` or `\`. Parsing produces the
//! unescaped literal bytes, the split vector locating each literal run, and
//! the anchored regular expression used by the matcher.
//!
//! On the wire the k-th literal run occupies `literals[splits[k]..splits[k+1]]`;
//! a zero-width run is legal only as the very first or very last run and
//! means the pattern is open at that end (arbitrary prefix / suffix).

pub mod matcher;

pub use matcher::PatternMatcher;

use crate::error::{PbcError, Result};
use std::fmt::Write as _;

/// Wildcard marker byte in a pattern skeleton
pub const WILDCARD: u8 = b'*';
/// Escape byte in a pattern skeleton
pub const ESCAPE: u8 = b'\\';

/// A parsed pattern skeleton
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    /// Unescaped literal bytes of all runs, concatenated
    literals: Vec<u8>,
    /// Split positions into `literals`; run k is `[splits[k], splits[k+1])`
    splits: Vec<usize>,
    /// Anchored regular expression equivalent to the skeleton
    regex: String,
    /// Tie-break metric: literal byte count minus run count
    literal_weight: i64,
}

impl Pattern {
    /// Parse a user-facing skeleton.
    ///
    /// Fails with [`PbcError::InvalidPattern`] on a dangling `\` at
    /// end-of-input or an escape of anything other than `*` or `\`.
    pub fn parse(skeleton: &[u8]) -> Result<Self> {
        let mut literals = Vec::with_capacity(skeleton.len());
        let mut splits = vec![0usize];
        let mut regex = String::with_capacity(skeleton.len() * 2 + 4);

        // Anchor at the start unless the skeleton opens with a wildcard
        if skeleton.first() != Some(&WILDCARD) {
            regex.push('^');
        }

        let mut last_was_wildcard = false;
        let mut i = 0;
        while i < skeleton.len() {
            match skeleton[i] {
                ESCAPE => {
                    let escaped = *skeleton.get(i + 1).ok_or_else(|| {
                        PbcError::invalid_pattern("dangling escape at end of skeleton")
                    })?;
                    if escaped != WILDCARD && escaped != ESCAPE {
                        return Err(PbcError::invalid_pattern(format!(
                            "invalid escape sequence \\{:#04x}",
                            escaped
                        )));
                    }
                    push_regex_byte(&mut regex, escaped);
                    literals.push(escaped);
                    last_was_wildcard = false;
                    i += 2;
                }
                WILDCARD => {
                    regex.push_str(".*");
                    splits.push(literals.len());
                    last_was_wildcard = true;
                    i += 1;
                }
                byte => {
                    push_regex_byte(&mut regex, byte);
                    literals.push(byte);
                    last_was_wildcard = false;
                    i += 1;
                }
            }
        }

        // The matched prefix may stop before end-of-input, so every pattern
        // is open at the end: append a trailing wildcard if not present.
        if !last_was_wildcard {
            regex.push_str(".*");
            splits.push(literals.len());
        }
        splits.push(literals.len());

        let literal_weight = literals.len() as i64 - (splits.len() as i64 - 1);

        Ok(Self {
            literals,
            splits,
            regex,
            literal_weight,
        })
    }

    /// Escape a raw record into its initial singleton skeleton form,
    /// prefixing `*` and `\` with the escape byte.
    pub fn escape_record(record: &[u8]) -> Vec<u8> {
        let mut escaped = Vec::with_capacity(record.len() + record.len() / 8);
        for &byte in record {
            if byte == WILDCARD || byte == ESCAPE {
                escaped.push(ESCAPE);
            }
            escaped.push(byte);
        }
        escaped
    }

    /// All literal bytes, concatenated across runs
    pub fn literals(&self) -> &[u8] {
        &self.literals
    }

    /// Number of literal runs (zero-width end runs included)
    pub fn run_count(&self) -> usize {
        self.splits.len() - 1
    }

    /// The k-th literal run
    pub fn run(&self, k: usize) -> &[u8] {
        &self.literals[self.splits[k]..self.splits[k + 1]]
    }

    /// Whether the pattern begins with a wildcard (zero-width first run)
    pub fn open_at_start(&self) -> bool {
        self.splits[1] == self.splits[0]
    }

    /// Whether the pattern ends with a wildcard (zero-width last run)
    pub fn open_at_end(&self) -> bool {
        let num = self.run_count();
        self.splits[num] == self.splits[num - 1]
    }

    /// The anchored regular expression equivalent to this skeleton
    pub fn regex(&self) -> &str {
        &self.regex
    }

    /// Tie-break metric used by the matcher: literal bytes minus run count
    pub fn literal_weight(&self) -> i64 {
        self.literal_weight
    }
}

/// Append one literal byte to a regex string, hex-escaping anything that
/// could read as regex syntax (including NUL and all non-ASCII bytes).
fn push_regex_byte(dst: &mut String, byte: u8) {
    let inert = byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b' ' | b'_' | b'-' | b',' | b';' | b':' | b'\'' | b'"' | b'<' | b'>' | b'@' | b'%'
                | b'&' | b'!' | b'~' | b'=' | b'/'
        );
    if inert {
        dst.push(byte as char);
    } else {
        // write! to a String cannot fail
        let _ = write!(dst, "\\x{:02X}", byte);
    }
}
