//! Minimum-encoding-length computation
//!
//! The training objective between two clusters is the total increment in
//! encoding length if their skeletons were replaced by one merged skeleton.
//! A dynamic program walks both skeletons at once; each cell records whether
//! the common suffix sits inside a shared literal or inside a wildcard gap,
//! the cost so far, and the move that produced it. Escape pairs (`\*`, `\\`)
//! are atomic: indexes jump by two and neighbours are read from the cell
//! before the pair.
//!
//! Costs per move: opening a wildcard charges both clusters their record
//! counts, a character falling into an existing gap charges its own
//! cluster, and extending a wildcard over a wildcard refunds the
//! double-counted gap. Matched characters are free.
//!
//! The row-wise minimum gives the early exit: once a whole row sits at or
//! above the caller's threshold no cheaper alignment exists.

use crate::pattern::{ESCAPE, WILDCARD};
use std::sync::atomic::{AtomicI64, Ordering};

/// Cost reported when the threshold pruned the computation
pub(crate) const INFINITE_COST: i64 = i64::MAX;

/// Whether a cell's suffix lies in a shared literal or a wildcard gap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Literal,
    Gap,
}

/// The move that produced a cell; `EscapeSkip` marks the untouched halves
/// of atomic escape pairs, which the reconstruction steps over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellSource {
    TakeA,
    TakeB,
    Shared,
    EscapeSkip,
}

/// Early-exit bound: either fixed for this call or shared with concurrent
/// computations against the same left-hand cluster
pub(crate) enum Threshold<'a> {
    Fixed(i64),
    Shared(&'a AtomicI64),
}

impl Threshold<'_> {
    fn current(&self) -> i64 {
        match self {
            Threshold::Fixed(value) => *value,
            Threshold::Shared(cell) => cell.load(Ordering::Relaxed),
        }
    }
}

/// Compute the minimum encoding length of merging skeletons `a` and `b`
/// holding `na` and `nb` records. Returns [`INFINITE_COST`] when the
/// threshold proves no productive merge exists.
pub(crate) fn min_encoding_length(
    a: &[u8],
    b: &[u8],
    na: i64,
    nb: i64,
    threshold: Threshold<'_>,
) -> i64 {
    let mut tables = DpTables::new(a.len(), b.len());
    match tables.construct(a, b, na, nb, &threshold) {
        Some(cost) => cost,
        None => INFINITE_COST,
    }
}

/// Merge two skeletons into the cheapest common skeleton.
///
/// Walks the finished transition table backwards: shared characters are
/// kept (re-escaped where the path crosses an escape pair), runs of
/// single-sided characters collapse into one wildcard, and a leftover
/// prefix on either side forces a leading wildcard.
pub(crate) fn merge_patterns(a: &[u8], b: &[u8], na: i64, nb: i64) -> Vec<u8> {
    let mut tables = DpTables::new(a.len(), b.len());
    let _ = tables.construct(a, b, na, nb, &Threshold::Fixed(INFINITE_COST));

    let mut reversed = Vec::with_capacity(a.len().max(b.len()) + 1);
    let mut pos_a = a.len();
    let mut pos_b = b.len();
    let mut last_kind = tables.kind(pos_a, pos_b);

    if last_kind != CellKind::Literal {
        reversed.push(WILDCARD);
    }

    while pos_a > 0 && pos_b > 0 {
        match tables.source(pos_a, pos_b) {
            CellSource::Shared => {
                reversed.push(a[pos_a - 1]);
                last_kind = CellKind::Literal;
                pos_a -= 1;
                pos_b -= 1;
                while pos_a > 0
                    && pos_b > 0
                    && tables.source(pos_a, pos_b) == CellSource::EscapeSkip
                {
                    reversed.push(ESCAPE);
                    pos_a -= 1;
                    pos_b -= 1;
                }
            }
            CellSource::TakeB => {
                if last_kind == CellKind::Literal {
                    reversed.push(WILDCARD);
                    last_kind = CellKind::Gap;
                }
                pos_b -= 1;
                while pos_a > 0
                    && pos_b > 0
                    && tables.source(pos_a, pos_b) == CellSource::EscapeSkip
                {
                    pos_b -= 1;
                }
            }
            CellSource::TakeA => {
                if last_kind == CellKind::Literal {
                    reversed.push(WILDCARD);
                    last_kind = CellKind::Gap;
                }
                pos_a -= 1;
                while pos_a > 0
                    && pos_b > 0
                    && tables.source(pos_a, pos_b) == CellSource::EscapeSkip
                {
                    pos_a -= 1;
                }
            }
            // Unreached: every landing cell is written by the construction
            CellSource::EscapeSkip => break,
        }
    }

    if pos_a != pos_b && reversed.last() != Some(&WILDCARD) {
        reversed.push(WILDCARD);
    }

    reversed.reverse();
    reversed
}

/// Cost transition for one consumed character.
fn update_cost(mut cost: i64, kind: CellKind, wildcard: bool, n_self: i64, n_other: i64) -> i64 {
    if kind == CellKind::Literal {
        // Leaving a shared literal opens a wildcard in both clusters
        cost += n_self + n_other;
    }
    if wildcard {
        // A wildcard absorbed by a wildcard was already paid for
        cost - n_self
    } else {
        cost + n_self
    }
}

/// An escape pair starts at `idx` only when its payload exists
fn escape_pair_at(s: &[u8], idx: usize) -> bool {
    s[idx] == ESCAPE && idx + 1 < s.len()
}

struct DpTables {
    width: usize,
    kind: Vec<CellKind>,
    cost: Vec<i64>,
    source: Vec<CellSource>,
}

impl DpTables {
    fn new(len_a: usize, len_b: usize) -> Self {
        let cells = (len_a + 1) * (len_b + 1);
        Self {
            width: len_b + 1,
            kind: vec![CellKind::Gap; cells],
            cost: vec![0; cells],
            source: vec![CellSource::EscapeSkip; cells],
        }
    }

    #[inline]
    fn idx(&self, i: usize, j: usize) -> usize {
        i * self.width + j
    }

    #[inline]
    fn kind(&self, i: usize, j: usize) -> CellKind {
        self.kind[self.idx(i, j)]
    }

    #[inline]
    fn cost(&self, i: usize, j: usize) -> i64 {
        self.cost[self.idx(i, j)]
    }

    #[inline]
    fn source(&self, i: usize, j: usize) -> CellSource {
        self.source[self.idx(i, j)]
    }

    fn set(&mut self, i: usize, j: usize, kind: CellKind, cost: i64, source: CellSource) {
        let idx = self.idx(i, j);
        self.kind[idx] = kind;
        self.cost[idx] = cost;
        self.source[idx] = source;
    }

    /// Fill the tables; `None` means the threshold pruned the computation.
    fn construct(
        &mut self,
        a: &[u8],
        b: &[u8],
        na: i64,
        nb: i64,
        threshold: &Threshold<'_>,
    ) -> Option<i64> {
        let len_a = a.len();
        let len_b = b.len();
        self.set(0, 0, CellKind::Literal, 0, CellSource::EscapeSkip);

        // First column: the whole prefix of `a` falls into one leading gap
        let mut i = 1;
        while i <= len_a {
            if escape_pair_at(a, i - 1) {
                let cost = update_cost(self.cost(i - 1, 0), self.kind(i - 1, 0), false, na, nb);
                self.set(i, 0, CellKind::Gap, 0, CellSource::EscapeSkip);
                i += 1;
                self.set(i, 0, CellKind::Gap, cost, CellSource::TakeA);
            } else {
                let wildcard = a[i - 1] == WILDCARD;
                let cost = update_cost(self.cost(i - 1, 0), self.kind(i - 1, 0), wildcard, na, nb);
                self.set(i, 0, CellKind::Gap, cost, CellSource::TakeA);
            }
            i += 1;
        }

        // First row: symmetric over `b`
        let mut j = 1;
        while j <= len_b {
            if escape_pair_at(b, j - 1) {
                let cost = update_cost(self.cost(0, j - 1), self.kind(0, j - 1), false, nb, na);
                self.set(0, j, CellKind::Gap, 0, CellSource::EscapeSkip);
                j += 1;
                self.set(0, j, CellKind::Gap, cost, CellSource::TakeB);
            } else {
                let wildcard = b[j - 1] == WILDCARD;
                let cost = update_cost(self.cost(0, j - 1), self.kind(0, j - 1), wildcard, nb, na);
                self.set(0, j, CellKind::Gap, cost, CellSource::TakeB);
            }
            j += 1;
        }

        let mut min_cost = INFINITE_COST;
        let mut i = 1;
        while i <= len_a {
            let mut escaped_a = false;
            if escape_pair_at(a, i - 1) {
                escaped_a = true;
                i += 1;
            }
            let prev_a = i - 1 - escaped_a as usize;

            let mut j = 1;
            while j <= len_b {
                let mut escaped_b = false;
                if escape_pair_at(b, j - 1) {
                    escaped_b = true;
                    j += 1;
                }
                let prev_b = j - 1 - escaped_b as usize;

                let char_a = a[i - 1];
                let char_b = b[j - 1];

                // A bare `*` never aligns as a shared character; escaped
                // ones are ordinary literals but only pair with each other
                let (kind, cost, source) = if char_a == char_b
                    && (char_a != WILDCARD || (escaped_a && escaped_b))
                {
                    let from_a =
                        update_cost(self.cost(prev_a, j), self.kind(prev_a, j), false, na, nb);
                    let from_b =
                        update_cost(self.cost(i, prev_b), self.kind(i, prev_b), false, nb, na);
                    let shared = self.cost(prev_a, prev_b);

                    if shared < from_a && shared < from_b {
                        (CellKind::Literal, shared, CellSource::Shared)
                    } else if from_a >= from_b {
                        // Equal paths keep the wildcard open
                        (CellKind::Gap, from_b, CellSource::TakeB)
                    } else {
                        (CellKind::Gap, from_a, CellSource::TakeA)
                    }
                } else {
                    let wild_a = char_a == WILDCARD && !escaped_a;
                    let wild_b = char_b == WILDCARD && !escaped_b;
                    let from_a =
                        update_cost(self.cost(prev_a, j), self.kind(prev_a, j), wild_a, na, nb);
                    let from_b =
                        update_cost(self.cost(i, prev_b), self.kind(i, prev_b), wild_b, nb, na);

                    if from_a >= from_b {
                        (CellKind::Gap, from_b, CellSource::TakeB)
                    } else {
                        (CellKind::Gap, from_a, CellSource::TakeA)
                    }
                };

                self.set(i, j, kind, cost, source);
                min_cost = min_cost.min(cost);
                j += 1;
            }

            if min_cost >= threshold.current() {
                return None;
            }
            i += 1;
        }

        Some(self.cost(len_a, len_b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mel(a: &[u8], b: &[u8], na: i64, nb: i64) -> i64 {
        min_encoding_length(a, b, na, nb, Threshold::Fixed(INFINITE_COST))
    }

    #[test]
    fn test_identical_skeletons_cost_nothing() {
        assert_eq!(mel(b"foo", b"foo", 1, 1), 0);
        assert_eq!(mel(b"foo", b"foo", 5, 3), 0);
    }

    #[test]
    fn test_single_divergent_character() {
        // Merging "a1" and "a2" opens one wildcard (paid by both clusters)
        // and drops one character of each into it
        assert_eq!(mel(b"a1", b"a2", 1, 1), 4);
    }

    #[test]
    fn test_symmetry() {
        let pairs: [(&[u8], &[u8]); 4] = [
            (b"abc1xyz", b"abc2xyz"),
            (b"user_42_id", b"user_9999_id"),
            (b"abc", b"xyz"),
            (b"short", b"a much longer record"),
        ];
        for (a, b) in pairs {
            assert_eq!(mel(a, b, 2, 3), mel(b, a, 3, 2), "asymmetric for {:?}", a);
        }
    }

    #[test]
    fn test_record_counts_scale_the_cost() {
        let light = mel(b"a1", b"a2", 1, 1);
        let heavy = mel(b"a1", b"a2", 10, 1);
        assert!(heavy > light);
    }

    #[test]
    fn test_threshold_prunes() {
        assert_eq!(
            min_encoding_length(b"abcdef", b"uvwxyz", 1, 1, Threshold::Fixed(1)),
            INFINITE_COST
        );
        // A generous threshold leaves the result intact
        assert_eq!(
            min_encoding_length(b"a1", b"a2", 1, 1, Threshold::Fixed(1000)),
            4
        );
    }

    #[test]
    fn test_shared_threshold_prunes() {
        let bound = AtomicI64::new(1);
        assert_eq!(
            min_encoding_length(b"abcdef", b"uvwxyz", 1, 1, Threshold::Shared(&bound)),
            INFINITE_COST
        );
    }

    #[test]
    fn test_merge_infix_divergence() {
        assert_eq!(merge_patterns(b"abc1xyz", b"abc2xyz", 1, 1), b"abc*xyz");
        assert_eq!(merge_patterns(b"a1", b"a2", 1, 1), b"a*");
    }

    #[test]
    fn test_merge_disjoint_skeletons() {
        assert_eq!(merge_patterns(b"x", b"y", 1, 1), b"*");
    }

    #[test]
    fn test_merge_prefix_divergence() {
        let merged = merge_patterns(b"alpha_suffix", b"beta_suffix", 1, 1);
        assert_eq!(merged, b"*a_suffix");
    }

    #[test]
    fn test_merge_with_existing_wildcard() {
        // A wildcard in one input absorbs the divergent run of the other
        let merged = merge_patterns(b"abc*xyz", b"abc9xyz", 1, 3);
        assert_eq!(merged, b"abc*xyz");
    }

    #[test]
    fn test_merge_preserves_escape_pairs() {
        assert_eq!(merge_patterns(br"a\*b", br"a\*c", 1, 1), br"a\**");
        assert_eq!(merge_patterns(br"a\\b", br"a\\b", 1, 1), br"a\\b");
    }

    #[test]
    fn test_merge_never_emits_adjacent_wildcards() {
        let cases: [(&[u8], &[u8]); 3] = [
            (b"abc*xyz", b"abc2xyz"),
            (b"*tail", b"head"),
            (b"a*b*c", b"a1b2c"),
        ];
        for (a, b) in cases {
            let merged = merge_patterns(a, b, 2, 2);
            assert!(
                !merged.windows(2).any(|w| w == b"**"),
                "adjacent wildcards in {:?}",
                String::from_utf8_lossy(&merged)
            );
        }
    }

    #[test]
    fn test_merge_of_identical_is_identity() {
        assert_eq!(merge_patterns(b"same", b"same", 4, 4), b"same");
    }
}
