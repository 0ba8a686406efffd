//! Training-engine tests
//!
//! Exercises the agglomerative merge loop end to end: dedup, neighbour
//! caches, the emission filter, merge super-pattern behavior, threaded and
//! sequential paths, and the secondary-encoder lifecycle through the
//! pattern file.

use pbc::{
    CompressMethod, PatternFile, PatternTrainer, PbcCompressor, RecordInput, TrainerConfig,
};

fn sequential(method: CompressMethod) -> PatternTrainer {
    PatternTrainer::with_config(TrainerConfig {
        method,
        thread_num: 0,
        ..Default::default()
    })
    .unwrap()
}

fn train_blob(corpus: &[u8], k: usize) -> Vec<u8> {
    let mut trainer = sequential(CompressMethod::PatternOnly);
    trainer
        .load_training_data(corpus, RecordInput::LineSeparated)
        .unwrap();
    trainer.train(k).unwrap()
}

/// Generate a corpus where `count` records share each of the given stems
fn stem_corpus(stems: &[&str], count: usize) -> Vec<u8> {
    let mut corpus = String::new();
    for (s, stem) in stems.iter().enumerate() {
        for i in 0..count {
            corpus.push_str(&stem.replace('#', &format!("{}", s * 1000 + i)));
            corpus.push('\n');
        }
    }
    corpus.into_bytes()
}

#[test]
fn test_shared_stem_collapses_to_one_pattern() {
    // Three records around one stem plus a loner; the loner is a singleton
    // cluster and is filtered out of the dictionary
    let blob = train_blob(b"abc1xyz\nabc2xyz\nabc3xyz\nhelloworld\n", 2);
    let file = PatternFile::parse(&blob).unwrap();

    assert_eq!(file.skeletons.len(), 1);
    assert_eq!(file.skeletons[0], b"abc*xyz");
}

#[test]
fn test_identical_records_dedup_to_one_head() {
    let blob = train_blob(b"foo\nfoo\n", 8);
    let file = PatternFile::parse(&blob).unwrap();

    // Dedup leaves a single head with two records; the merge loop is a
    // no-op and the multi-record literal cluster is emitted as-is
    assert_eq!(file.skeletons.len(), 1);
    assert_eq!(file.skeletons[0], b"foo");
}

#[test]
fn test_train_to_single_cluster() {
    let corpus = stem_corpus(&["GET /api/users/# HTTP/1.1"], 12);
    let blob = train_blob(&corpus, 1);
    let file = PatternFile::parse(&blob).unwrap();

    assert_eq!(file.skeletons.len(), 1);
    let skeleton = file.skeletons[0];
    assert!(skeleton.starts_with(b"GET /api/users/"));
    assert!(skeleton.contains(&b'*'));
}

#[test]
fn test_multiple_stems_stay_separate() {
    let corpus = stem_corpus(
        &["GET /api/users/# HTTP/1.1", "level=ERROR worker=# stalled"],
        10,
    );
    let blob = train_blob(&corpus, 2);
    let file = PatternFile::parse(&blob).unwrap();

    assert_eq!(file.skeletons.len(), 2);
    let joined: Vec<u8> = file.skeletons.concat();
    let text = String::from_utf8_lossy(&joined);
    assert!(text.contains("GET /api/users/"));
    assert!(text.contains("level=ERROR worker="));
}

#[test]
fn test_merged_pattern_matches_all_contributing_records() {
    let corpus = stem_corpus(&["session=# user=alice action=login"], 15);
    let blob = train_blob(&corpus, 1);
    let pbc = PbcCompressor::load(CompressMethod::PatternOnly, &blob).unwrap();

    // Every training record must hit the pattern path, not the fallback
    for i in 0..15 {
        let record = format!("session={} user=alice action=login", i).into_bytes();
        let frame = pbc.compress(&record).unwrap();
        assert_eq!(frame[0], 0x1C, "record {} fell off the pattern path", i);
        assert_eq!(pbc.decompress(&frame).unwrap(), record);
    }
}

#[test]
fn test_oversized_target_k_is_a_noop_merge() {
    let blob = train_blob(b"aaa1\naaa1\nbbb2\nbbb2\n", 100);
    let file = PatternFile::parse(&blob).unwrap();
    // No merges happen; both deduplicated multi-record clusters survive
    assert_eq!(file.skeletons.len(), 2);
}

#[test]
fn test_training_is_deterministic_sequentially() {
    let corpus = stem_corpus(&["id-#-suffix", "key:#:value"], 9);
    let first = train_blob(&corpus, 2);
    let second = train_blob(&corpus, 2);
    assert_eq!(first, second);
}

#[test]
fn test_threaded_training_round_trips() {
    let corpus = stem_corpus(&["cart item # added", "cart item # removed"], 20);
    let mut trainer = PatternTrainer::with_config(TrainerConfig {
        method: CompressMethod::Entropy,
        thread_num: 4,
        ..Default::default()
    })
    .unwrap();
    trainer
        .load_training_data(&corpus, RecordInput::LineSeparated)
        .unwrap();
    let blob = trainer.train(2).unwrap();

    let pbc = PbcCompressor::load(CompressMethod::Entropy, &blob).unwrap();
    for record in [
        b"cart item 77 added".as_slice(),
        b"cart item 3 removed",
        b"something else entirely",
    ] {
        let frame = pbc.compress(record).unwrap();
        assert_eq!(pbc.decompress(&frame).unwrap(), record);
    }
}

#[test]
fn test_length_prefixed_training_input() {
    let mut corpus = Vec::new();
    for i in 0..10 {
        let record = format!("metric.cpu.core{}.usage", i).into_bytes();
        corpus.extend_from_slice(&(record.len() as i32).to_le_bytes());
        corpus.extend_from_slice(&record);
    }

    let mut trainer = sequential(CompressMethod::PatternOnly);
    trainer
        .load_training_data(&corpus, RecordInput::LengthPrefixed)
        .unwrap();
    assert_eq!(trainer.record_count(), 10);

    let blob = trainer.train(1).unwrap();
    let pbc = PbcCompressor::load(CompressMethod::PatternOnly, &blob).unwrap();
    let frame = pbc.compress(b"metric.cpu.core42.usage").unwrap();
    assert_eq!(frame[0], 0x1C);
}

#[test]
fn test_records_with_wildcard_bytes_survive_training() {
    // Records containing literal `*` and `\` must round-trip through the
    // escape layer and the merge
    let corpus = b"rm -rf /tmp/1/*\nrm -rf /tmp/2/*\nrm -rf /tmp/3/*\n";
    let blob = train_blob(corpus, 1);
    let pbc = PbcCompressor::load(CompressMethod::PatternOnly, &blob).unwrap();

    let record = b"rm -rf /tmp/99/*";
    let frame = pbc.compress(record).unwrap();
    assert_eq!(pbc.decompress(&frame).unwrap(), record);
}

#[test]
fn test_trained_secondary_state_round_trips_through_file() {
    let corpus = stem_corpus(&["order=# status=shipped region=eu-west"], 25);

    let methods: Vec<CompressMethod> = CompressMethod::available_methods()
        .into_iter()
        .filter(|&m| m != CompressMethod::PatternOnly)
        .collect();
    for method in methods {
        let mut trainer = sequential(method);
        trainer
            .load_training_data(&corpus, RecordInput::LineSeparated)
            .unwrap();
        let blob = trainer.train(1).unwrap();

        let file = PatternFile::parse(&blob).unwrap();
        if method == CompressMethod::Entropy {
            assert!(!file.secondary.is_empty(), "entropy produced no state");
        }

        let pbc = PbcCompressor::load(method, &blob).unwrap();
        let record = b"order=9000 status=shipped region=eu-west";
        let frame = pbc.compress(record).unwrap();
        assert_eq!(
            pbc.decompress(&frame).unwrap(),
            record,
            "{} round trip failed",
            method.name()
        );
    }
}

/// Random corpus whose records share generated stems, in the shape of real
/// mixed traffic: awkward bytes (`*`, `\`, NUL) included
fn random_stem_corpus(seed: u64, stems: usize, records_per_stem: usize) -> Vec<Vec<u8>> {
    fastrand::seed(seed);
    let mut records = Vec::new();
    for _ in 0..stems {
        let stem_len = fastrand::usize(6..14);
        let mut stem: Vec<u8> = (0..stem_len).map(|_| fastrand::u8(1..=255)).collect();
        stem[stem_len / 4] = b'\\';
        stem[stem_len / 3] = b'*';
        stem[stem_len / 2] = 0;
        for _ in 0..records_per_stem {
            let mut record = stem.clone();
            let tail_len = fastrand::usize(1..8);
            record.extend((0..tail_len).map(|_| fastrand::u8(1..=255)));
            records.push(record);
        }
    }
    records
}

#[test]
fn test_random_corpus_with_awkward_bytes() {
    let records = random_stem_corpus(0x5EED, 3, 8);
    let mut corpus = Vec::new();
    for record in &records {
        corpus.extend_from_slice(&(record.len() as i32).to_le_bytes());
        corpus.extend_from_slice(record);
    }

    let mut trainer = sequential(CompressMethod::Entropy);
    trainer
        .load_training_data(&corpus, RecordInput::LengthPrefixed)
        .unwrap();
    let blob = trainer.train(3).unwrap();

    let pbc = PbcCompressor::load(CompressMethod::Entropy, &blob).unwrap();
    for record in &records {
        let frame = pbc.compress(record).unwrap();
        assert_eq!(&pbc.decompress(&frame).unwrap(), record);
    }
}

#[test]
fn test_empty_corpus_is_a_configuration_error() {
    let mut trainer = sequential(CompressMethod::PatternOnly);
    trainer
        .load_training_data(b"", RecordInput::LineSeparated)
        .unwrap();
    let err = trainer.train(1).unwrap_err();
    assert_eq!(err.category(), "config");
}
