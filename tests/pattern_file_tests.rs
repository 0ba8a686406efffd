//! Pattern-file format tests
//!
//! Verifies that a trained dictionary survives the disk round trip
//! bit-for-bit and behaviorally, including the secondary-encoder tail.

use pbc::{
    write_pattern_file, CompressMethod, PatternFile, PatternTrainer, PbcCompressor, RecordInput,
    TrainerConfig,
};
use std::fs;

fn train(corpus: &[u8], method: CompressMethod, k: usize) -> Vec<u8> {
    let mut trainer = PatternTrainer::with_config(TrainerConfig {
        method,
        thread_num: 0,
        ..Default::default()
    })
    .unwrap();
    trainer
        .load_training_data(corpus, RecordInput::LineSeparated)
        .unwrap();
    trainer.train(k).unwrap()
}

#[test]
fn test_reserialization_is_bit_identical() {
    let corpus = b"host-1.example.com\nhost-2.example.com\nhost-3.example.com\n";
    let blob = train(corpus, CompressMethod::Entropy, 1);

    let parsed = PatternFile::parse(&blob).unwrap();
    let rewritten = write_pattern_file(&parsed.skeletons, parsed.secondary);
    assert_eq!(rewritten, blob);
}

#[test]
fn test_disk_round_trip_preserves_behavior() {
    let corpus = b"host-1.example.com\nhost-2.example.com\nhost-3.example.com\n";
    let blob = train(corpus, CompressMethod::Entropy, 1);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus.pbc");
    fs::write(&path, &blob).unwrap();
    let reloaded = fs::read(&path).unwrap();
    assert_eq!(reloaded, blob);

    let before = PbcCompressor::load(CompressMethod::Entropy, &blob).unwrap();
    let after = PbcCompressor::load(CompressMethod::Entropy, &reloaded).unwrap();

    let record = b"host-9.example.com";
    let frame = before.compress(record).unwrap();
    assert_eq!(after.decompress(&frame).unwrap(), record);
    assert_eq!(before.pattern_count(), after.pattern_count());
}

#[test]
fn test_integer_fields_are_little_endian() {
    let blob = write_pattern_file(&[b"ab*".as_slice()], b"");
    assert_eq!(&blob[..4], &[1, 0, 0, 0]);
    assert_eq!(&blob[4..8], &[3, 0, 0, 0]);
    assert_eq!(&blob[8..], b"ab*");
}

#[test]
fn test_loading_corrupt_files_fails_cleanly() {
    let corpus = b"aa1b\naa2b\naa3b\n";
    let blob = train(corpus, CompressMethod::PatternOnly, 1);

    // Truncations inside the pattern table are configuration errors
    for cut in [1, 3, 5, 7] {
        if cut < blob.len() {
            assert!(PbcCompressor::load(CompressMethod::PatternOnly, &blob[..cut]).is_err());
        }
    }

    // A skeleton with a dangling escape is an invalid pattern
    let bad = write_pattern_file(&[b"user\\".as_slice()], b"");
    let err = PbcCompressor::load(CompressMethod::PatternOnly, &bad).unwrap_err();
    assert_eq!(err.category(), "pattern");
}

#[test]
fn test_method_mismatch_is_detected_or_harmless() {
    let corpus = b"node=1 ready\nnode=2 ready\nnode=3 ready\n";
    let blob = train(corpus, CompressMethod::PatternOnly, 1);

    // A pattern-only file has no tail; loading it as entropy must fail
    // rather than fabricate a coder
    assert!(PbcCompressor::load(CompressMethod::Entropy, &blob).is_err());
}
