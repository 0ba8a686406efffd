//! Pattern training
//!
//! Agglomerative clustering of a record corpus into a pattern dictionary.
//! Every record starts as its own cluster; the merge loop repeatedly fuses
//! the globally closest pair under the minimum-encoding-length objective
//! until the target dictionary size is reached or no merge is productive.
//!
//! Each cluster caches its nearest neighbour among clusters with a larger
//! index, so the whole lower triangle is scanned only once up front; after
//! a merge only the caches that named the merged pair are rebuilt. Two
//! pruning layers keep the pairwise DP affordable: a 1-gram overlap bound
//! that rejects pairs before the DP runs, and a per-cluster monotone
//! threshold that lets concurrent DP workers share the best bound seen so
//! far.

pub mod mel;

use crate::codec::{CompressorConfig, PbcCompressor, SYMBOL_SIZE};
use crate::error::{PbcError, Result};
use crate::format::write_pattern_file;
use crate::pattern::{Pattern, ESCAPE, WILDCARD};
use crate::secondary::{CompressMethod, SecondaryEncoder};
use ahash::AHashMap;
use mel::{Threshold, INFINITE_COST};
use rayon::prelude::*;
use std::sync::atomic::{AtomicI64, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Width of the coarse-grained pool driving per-row fan-outs
const OUTER_POOL_THREADS: usize = 64;

/// How a raw training buffer is split into records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RecordInput {
    /// Records split on `\n`; a trailing unterminated record is kept
    LineSeparated,
    /// Each record is an `i32` little-endian length followed by its bytes
    LengthPrefixed,
}

/// Trainer configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrainerConfig {
    /// Secondary encoder trained alongside the patterns
    pub method: CompressMethod,
    /// Worker count for the fan-out inside one neighbour recompute;
    /// zero selects the fully sequential path
    pub thread_num: usize,
    /// Output cap handed to the residue-generation codec
    pub buffer_size: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            method: CompressMethod::default(),
            thread_num: 16,
            buffer_size: 1024 * 1024,
        }
    }
}

impl TrainerConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(PbcError::configuration("buffer_size must be nonzero"));
        }
        Ok(())
    }
}

/// Cached nearest neighbour of a cluster, always at a larger index
#[derive(Debug, Clone, Copy)]
struct Neighbor {
    partner: usize,
    cost: i64,
}

/// One training-time cluster
struct Cluster {
    /// Current skeleton with `*` and `\` escaped
    skeleton: Vec<u8>,
    /// Forwarding pointer; equals the own index while this is a head
    head: usize,
    /// Records absorbed into this cluster
    records: i64,
    /// Literal bytes in the skeleton
    literal_count: i64,
    /// Histogram of literal byte values, for the overlap pruner
    one_gram: Vec<u32>,
    /// Nearest head at a larger index, if any productive pair exists
    nearest: Option<Neighbor>,
    /// Monotone bound shared by concurrent DP workers on this row
    threshold: AtomicI64,
}

/// Training context
pub struct PatternTrainer {
    config: TrainerConfig,
    clusters: Vec<Cluster>,
    records: Vec<Vec<u8>>,
    /// (coarse per-row pool, fine fan-out pool); absent when sequential
    pools: Option<(rayon::ThreadPool, rayon::ThreadPool)>,
}

impl PatternTrainer {
    /// Create a trainer with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(TrainerConfig::default())
    }

    /// Create a trainer with an explicit configuration.
    pub fn with_config(config: TrainerConfig) -> Result<Self> {
        config.validate()?;

        let pools = if config.thread_num > 0 {
            let outer = rayon::ThreadPoolBuilder::new()
                .num_threads(OUTER_POOL_THREADS)
                .build()
                .map_err(|e| PbcError::configuration(format!("row pool: {}", e)))?;
            let inner = rayon::ThreadPoolBuilder::new()
                .num_threads(config.thread_num)
                .build()
                .map_err(|e| PbcError::configuration(format!("fan-out pool: {}", e)))?;
            Some((outer, inner))
        } else {
            None
        };

        Ok(Self {
            config,
            clusters: Vec::new(),
            records: Vec::new(),
            pools,
        })
    }

    /// Parse a raw buffer into records and (re)build the cluster table.
    ///
    /// Replaces any previously loaded corpus. Empty records are skipped.
    pub fn load_training_data(&mut self, data: &[u8], input: RecordInput) -> Result<()> {
        let records = parse_records(data, input)?;
        self.clusters.clear();
        self.records.clear();

        for record in records {
            let skeleton = Pattern::escape_record(&record);
            let mut one_gram = vec![0u32; SYMBOL_SIZE];
            for &byte in &record {
                one_gram[byte as usize] += 1;
            }
            let index = self.clusters.len();
            self.clusters.push(Cluster {
                skeleton,
                head: index,
                records: 1,
                literal_count: record.len() as i64,
                one_gram,
                nearest: None,
                threshold: AtomicI64::new(INFINITE_COST),
            });
            self.records.push(record);
        }

        log::info!("loaded {} training records", self.records.len());
        Ok(())
    }

    /// Number of records currently loaded
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Run the merge loop down to `target_k` clusters and produce the
    /// pattern file, secondary-encoder state included.
    ///
    /// A `target_k` at or above the deduplicated cluster count leaves the
    /// merge loop idle; the dictionary then holds whatever clusters pass
    /// the emission filter.
    pub fn train(&mut self, target_k: usize) -> Result<Vec<u8>> {
        if self.clusters.is_empty() {
            return Err(PbcError::configuration("training corpus is empty"));
        }

        self.dedup();
        self.compute_neighbor_table();
        self.merge_loop(target_k);

        // Singleton clusters and single-byte skeletons only hurt the
        // dictionary; they fall back to the secondary encoder instead
        let skeletons = self.surviving_skeletons();
        log::info!("emitting {} patterns", skeletons.len());
        if skeletons.len() >= SYMBOL_SIZE * SYMBOL_SIZE {
            return Err(PbcError::configuration(format!(
                "{} patterns exceed the 2-byte id space",
                skeletons.len()
            )));
        }

        let base = write_pattern_file(&skeletons, &[]);
        let secondary = self.train_secondary(&base)?;
        let file = write_pattern_file(&skeletons, &secondary.serialize());
        Ok(file)
    }

    /// Collapse byte-identical skeletons, accumulating record counts.
    fn dedup(&mut self) {
        let before = self.clusters.len();
        let mut index_of: AHashMap<Vec<u8>, usize> = AHashMap::with_capacity(before);
        let mut kept: Vec<Cluster> = Vec::with_capacity(before);

        for mut cluster in self.clusters.drain(..) {
            if let Some(&at) = index_of.get(&cluster.skeleton) {
                kept[at].records += cluster.records;
            } else {
                let at = kept.len();
                cluster.head = at;
                index_of.insert(cluster.skeleton.clone(), at);
                kept.push(cluster);
            }
        }

        self.clusters = kept;
        log::info!(
            "deduplicated {} records into {} clusters",
            before,
            self.clusters.len()
        );
    }

    /// Fill every cluster's nearest-neighbour cache from scratch.
    fn compute_neighbor_table(&mut self) {
        let n = self.clusters.len();
        log::info!("computing pairwise encoding lengths over {} clusters", n);

        if let Some((outer, _)) = &self.pools {
            let nearest: Vec<Option<Neighbor>> = outer.install(|| {
                (0..n)
                    .into_par_iter()
                    .map(|row| self.nearest_for(row, false))
                    .collect()
            });
            for (cluster, nearest) in self.clusters.iter_mut().zip(nearest) {
                cluster.nearest = nearest;
            }
        } else {
            for row in 0..n {
                let nearest = self.nearest_for(row, false);
                self.clusters[row].nearest = nearest;
            }
        }
    }

    /// The agglomerative merge loop.
    fn merge_loop(&mut self, target_k: usize) {
        let mut heads = self.clusters.len();
        log::info!("merging {} clusters toward {}", heads, target_k);
        let report_every = (heads.saturating_sub(target_k) / 100).max(1);
        let mut iterations = 0usize;

        while heads > target_k {
            let Some((a, b)) = self.closest_pair() else {
                log::info!("no productive merges remain at {} clusters", heads);
                break;
            };
            iterations += 1;
            if iterations % report_every == 0 {
                log::debug!("merge progress: {} clusters remain", heads);
            }

            let merged = mel::merge_patterns(
                &self.clusters[a].skeleton,
                &self.clusters[b].skeleton,
                self.clusters[a].records,
                self.clusters[b].records,
            );
            let (literal_count, one_gram) = skeleton_stats(&merged);
            let absorbed = self.clusters[b].records;
            self.clusters[b].head = a;
            {
                let cluster = &mut self.clusters[a];
                cluster.skeleton = merged;
                cluster.literal_count = literal_count;
                cluster.one_gram = one_gram;
                cluster.records += absorbed;
            }

            // Heads below b may have cached either side of the merged pair
            let stale: Vec<usize> = (0..b)
                .filter(|&c| c != a && self.clusters[c].head == c)
                .collect();
            if let Some((outer, _)) = &self.pools {
                let updates: Vec<(usize, Option<Option<Neighbor>>)> = outer.install(|| {
                    stale
                        .par_iter()
                        .map(|&c| (c, self.refreshed_neighbor(c, a, b)))
                        .collect()
                });
                for (c, update) in updates {
                    if let Some(nearest) = update {
                        self.clusters[c].nearest = nearest;
                    }
                }
            } else {
                for &c in &stale {
                    if let Some(nearest) = self.refreshed_neighbor(c, a, b) {
                        self.clusters[c].nearest = nearest;
                    }
                }
            }

            let nearest_a = self.nearest_for(a, true);
            self.clusters[a].nearest = nearest_a;
            heads -= 1;
        }
    }

    /// The globally closest pair `(a, b)` with `a < b`, smallest `a` on
    /// ties; `None` once every cached cost is infinite.
    fn closest_pair(&self) -> Option<(usize, usize)> {
        let mut best: Option<(i64, usize, usize)> = None;
        for (i, cluster) in self.clusters.iter().enumerate() {
            if cluster.head != i {
                continue;
            }
            let Some(nearest) = cluster.nearest else {
                continue;
            };
            if best.map_or(true, |(cost, _, _)| nearest.cost < cost) {
                best = Some((nearest.cost, i, nearest.partner));
            }
        }
        best.filter(|&(cost, _, _)| cost < INFINITE_COST)
            .map(|(_, a, b)| (a, b))
    }

    /// Recompute `nearest[row]` over heads with a larger index.
    fn nearest_for(&self, row: usize, heads_only: bool) -> Option<Neighbor> {
        let candidates: Vec<usize> = (row + 1..self.clusters.len())
            .filter(|&j| !heads_only || self.clusters[j].head == j)
            .collect();

        match &self.pools {
            Some((_, inner)) => {
                self.clusters[row]
                    .threshold
                    .store(INFINITE_COST, Ordering::Relaxed);
                let costs: Vec<i64> = inner.install(|| {
                    candidates
                        .par_iter()
                        .map(|&j| self.pair_cost_shared(row, j))
                        .collect()
                });
                let mut best: Option<Neighbor> = None;
                for (&j, &cost) in candidates.iter().zip(&costs) {
                    if cost < best.map_or(INFINITE_COST, |b| b.cost) {
                        best = Some(Neighbor { partner: j, cost });
                    }
                }
                best
            }
            None => {
                let mut best: Option<Neighbor> = None;
                for &j in &candidates {
                    let limit = best.map_or(INFINITE_COST, |b| b.cost);
                    let cost = self.pair_cost(row, j, limit);
                    if cost < limit {
                        best = Some(Neighbor { partner: j, cost });
                    }
                }
                best
            }
        }
    }

    /// Cache maintenance for head `c` after `b` merged into `a`.
    ///
    /// Outer `None` keeps the cache untouched; `Some(n)` replaces it.
    fn refreshed_neighbor(&self, c: usize, a: usize, b: usize) -> Option<Option<Neighbor>> {
        let cached = self.clusters[c].nearest;
        if cached.map_or(false, |n| n.partner == a || n.partner == b) {
            Some(self.nearest_for(c, true))
        } else if c < a {
            // The merged cluster may have moved closer than the cache
            let limit = cached.map_or(INFINITE_COST, |n| n.cost);
            let cost = self.pair_cost(c, a, limit);
            if cost < limit {
                Some(Some(Neighbor { partner: a, cost }))
            } else {
                None
            }
        } else {
            None
        }
    }

    /// Pairwise cost with a fixed early-exit bound.
    fn pair_cost(&self, left: usize, right: usize, threshold: i64) -> i64 {
        if self.pruned(left, right, threshold) {
            return INFINITE_COST;
        }
        let lhs = &self.clusters[left];
        let rhs = &self.clusters[right];
        mel::min_encoding_length(
            &lhs.skeleton,
            &rhs.skeleton,
            lhs.records,
            rhs.records,
            Threshold::Fixed(threshold),
        )
    }

    /// Pairwise cost sharing the row's monotone bound with other workers.
    fn pair_cost_shared(&self, left: usize, right: usize) -> i64 {
        let bound = self.clusters[left].threshold.load(Ordering::Relaxed);
        if self.pruned(left, right, bound) {
            return INFINITE_COST;
        }
        let lhs = &self.clusters[left];
        let rhs = &self.clusters[right];
        let cost = mel::min_encoding_length(
            &lhs.skeleton,
            &rhs.skeleton,
            lhs.records,
            rhs.records,
            Threshold::Shared(&lhs.threshold),
        );
        if cost < INFINITE_COST {
            lhs.threshold.fetch_min(cost, Ordering::Relaxed);
        }
        cost
    }

    /// 1-gram pruner: even if every common byte were shared, the leftover
    /// literals alone already cost at least the bound.
    fn pruned(&self, left: usize, right: usize, threshold: i64) -> bool {
        let lhs = &self.clusters[left];
        let rhs = &self.clusters[right];
        let common: i64 = lhs
            .one_gram
            .iter()
            .zip(&rhs.one_gram)
            .map(|(&x, &y)| x.min(y) as i64)
            .sum();
        (lhs.literal_count - common) * lhs.records + (rhs.literal_count - common) * rhs.records
            >= threshold
    }

    /// Heads worth emitting: multi-record clusters with real skeletons.
    fn surviving_skeletons(&self) -> Vec<&[u8]> {
        self.clusters
            .iter()
            .enumerate()
            .filter(|(i, c)| c.head == *i && c.skeleton.len() > 1 && c.records > 1)
            .map(|(_, c)| c.skeleton.as_slice())
            .collect()
    }

    /// Compress the corpus pattern-only and train the secondary encoder on
    /// the resulting frames.
    fn train_secondary(&self, pattern_blob: &[u8]) -> Result<SecondaryEncoder> {
        if self.config.method == CompressMethod::PatternOnly {
            return Ok(SecondaryEncoder::None);
        }
        log::info!(
            "training {} secondary encoder on {} records",
            self.config.method.name(),
            self.records.len()
        );

        let codec = PbcCompressor::load_with_config(
            CompressMethod::PatternOnly,
            pattern_blob,
            CompressorConfig {
                buffer_size: self.config.buffer_size,
            },
        )?;

        let mut samples = Vec::with_capacity(self.records.len());
        for record in &self.records {
            samples.push(codec.compress(record)?);
        }
        SecondaryEncoder::train(self.config.method, &samples)
    }
}

/// Literal-byte count and histogram of a skeleton, escape-aware: the byte
/// behind an escape counts, the escape marker and bare wildcards do not.
fn skeleton_stats(skeleton: &[u8]) -> (i64, Vec<u32>) {
    let mut one_gram = vec![0u32; SYMBOL_SIZE];
    let mut literal_count = 0i64;
    let mut i = 0;
    while i < skeleton.len() {
        match skeleton[i] {
            ESCAPE if i + 1 < skeleton.len() => {
                one_gram[skeleton[i + 1] as usize] += 1;
                literal_count += 1;
                i += 2;
            }
            WILDCARD => i += 1,
            byte => {
                one_gram[byte as usize] += 1;
                literal_count += 1;
                i += 1;
            }
        }
    }
    (literal_count, one_gram)
}

/// Split a raw training buffer into records.
fn parse_records(data: &[u8], input: RecordInput) -> Result<Vec<Vec<u8>>> {
    let mut records = Vec::new();
    match input {
        RecordInput::LineSeparated => {
            for line in data.split(|&byte| byte == b'\n') {
                if !line.is_empty() {
                    records.push(line.to_vec());
                }
            }
        }
        RecordInput::LengthPrefixed => {
            let mut pos = 0usize;
            while pos < data.len() {
                let header = data.get(pos..pos + 4).ok_or_else(|| {
                    PbcError::configuration("length-prefixed input truncated in a header")
                })?;
                let len = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
                if len < 0 {
                    return Err(PbcError::configuration(format!(
                        "negative record length {}",
                        len
                    )));
                }
                pos += 4;
                let record = data.get(pos..pos + len as usize).ok_or_else(|| {
                    PbcError::configuration("length-prefixed input truncated in a record")
                })?;
                if !record.is_empty() {
                    records.push(record.to_vec());
                }
                pos += len as usize;
            }
        }
    }
    Ok(records)
}
