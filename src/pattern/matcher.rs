//! Multi-pattern matcher
//!
//! Dispatches a record to the best-matching pattern of a dictionary in one
//! block scan over a compiled [`regex::bytes::RegexSet`]. When several
//! patterns match, the one with the greatest literal weight wins; equal
//! weights fall back to the smallest pattern id. The matcher is immutable
//! after construction and safe for concurrent `find` calls.

use crate::error::{PbcError, Result};
use crate::pattern::Pattern;
use regex::bytes::RegexSetBuilder;

/// Compiled matcher over a pattern dictionary
#[derive(Debug)]
pub struct PatternMatcher {
    set: regex::bytes::RegexSet,
    literal_weights: Vec<i64>,
}

impl PatternMatcher {
    /// Compile the matcher for an ordered pattern dictionary.
    ///
    /// Pattern ids are the indices into `patterns`.
    pub fn new(patterns: &[Pattern]) -> Result<Self> {
        let set = RegexSetBuilder::new(patterns.iter().map(|p| p.regex()))
            .unicode(false)
            .dot_matches_new_line(true)
            .size_limit(64 << 20)
            .build()
            .map_err(|e| {
                PbcError::invalid_pattern(format!("pattern set compilation failed: {}", e))
            })?;

        let literal_weights = patterns.iter().map(|p| p.literal_weight()).collect();

        Ok(Self {
            set,
            literal_weights,
        })
    }

    /// Number of patterns in the dictionary
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Whether the dictionary is empty
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Return the id of the matching pattern, if any.
    ///
    /// Among all matching patterns, the greatest literal weight wins;
    /// ties go to the smallest id.
    pub fn find(&self, record: &[u8]) -> Option<usize> {
        let mut best: Option<usize> = None;
        for id in self.set.matches(record) {
            match best {
                Some(current) if self.literal_weights[id] <= self.literal_weights[current] => {}
                _ => best = Some(id),
            }
        }
        best
    }
}
