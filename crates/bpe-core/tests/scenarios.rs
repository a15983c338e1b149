//! End-to-end scenarios and cross-module invariants,
//! driven entirely through the public API.

use std::io::Write;
use std::sync::atomic::AtomicBool;

use bpe_core::{decode, train, BpeEncoder, TrainConfig};

fn write_corpus(text: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(text.as_bytes()).unwrap();
    tmp.flush().unwrap();
    tmp
}

/// S2: a special token's ID is 256, appears exactly once in the
/// encoding, and never participates in a merge.
#[test]
fn s2_special_token_gets_id_256_and_is_never_merged() {
    let tmp = write_corpus("hello<|endoftext|>world");
    let specials = vec![b"<|endoftext|>".to_vec()];
    let config = TrainConfig {
        input_path: tmp.path().to_path_buf(),
        vocab_size: 300,
        specials: specials.clone(),
        num_processes: 1,
    };
    let outcome = train(&config, &AtomicBool::new(false)).unwrap();

    let special_id = outcome.table.id_of(b"<|endoftext|>").unwrap();
    assert_eq!(special_id, 256);
    for (a, b) in outcome.table.merges() {
        assert_ne!(*a, special_id);
        assert_ne!(*b, special_id);
    }

    let encoder = BpeEncoder::new(&outcome.table, specials);
    let ids = encoder.encode("hello<|endoftext|>world");
    assert_eq!(ids.iter().filter(|&&id| id == special_id).count(), 1);
}

/// S3: an empty corpus terminates immediately with a base-only
/// vocabulary and no merges.
#[test]
fn s3_empty_corpus_yields_base_vocab_and_no_merges() {
    let tmp = write_corpus("");
    let specials = vec![b"<|endoftext|>".to_vec()];
    let config = TrainConfig {
        input_path: tmp.path().to_path_buf(),
        vocab_size: 257,
        specials,
        num_processes: 1,
    };
    let outcome = train(&config, &AtomicBool::new(false)).unwrap();
    assert_eq!(outcome.table.len(), 257);
    assert!(outcome.table.merges().is_empty());
    assert!(outcome.completed);
}

/// S5: encode-then-decode of non-ASCII UTF-8 text, trained on an
/// English corpus, is the identity.
#[test]
fn s5_non_ascii_roundtrips_through_a_vocab_trained_on_english_text() {
    let tmp = write_corpus("Hello there, how are you doing today? The weather is lovely outside.");
    let config = TrainConfig {
        input_path: tmp.path().to_path_buf(),
        vocab_size: 290,
        specials: vec![],
        num_processes: 1,
    };
    let outcome = train(&config, &AtomicBool::new(false)).unwrap();

    let encoder = BpeEncoder::new(&outcome.table, vec![]);
    let input = "Héllo 🌍";
    let ids = encoder.encode(input);
    let decoded = decode(&outcome.table, &ids).unwrap();
    assert_eq!(decoded, input);
}

/// Invariant 6: ASCII round-trips for arbitrary ASCII input once
/// every byte is at least representable as a singleton symbol.
#[test]
fn invariant_6_ascii_roundtrip_without_any_training() {
    let tmp = write_corpus("irrelevant, no merges needed for the base-byte table");
    let config = TrainConfig {
        input_path: tmp.path().to_path_buf(),
        vocab_size: 256,
        specials: vec![],
        num_processes: 1,
    };
    let outcome = train(&config, &AtomicBool::new(false)).unwrap();
    let encoder = BpeEncoder::new(&outcome.table, vec![]);

    for text in ["Hello, World! 123.", "", "The quick brown fox.", "   spaced   out   "] {
        let ids = encoder.encode(text);
        let decoded = decode(&outcome.table, &ids).unwrap();
        assert_eq!(decoded, text);
    }
}

/// S4: a corpus of space-separated repeats of "aaaaaa" merges 'a'+'a'
/// first, and with enough merge budget "aaaaaa" collapses to one symbol.
#[test]
fn s4_repeated_run_of_a_collapses_to_a_single_symbol() {
    let unit = "aaaaaa ";
    let text = unit.repeat(100);
    let tmp = write_corpus(&text);
    // Generous budget: the corpus only ever produces two distinct raw
    // bytes ('a' and ' '), so the merge queue exhausts itself (and
    // training completes) long before this ceiling is reached.
    let config = TrainConfig {
        input_path: tmp.path().to_path_buf(),
        vocab_size: 300,
        specials: vec![],
        num_processes: 1,
    };
    let outcome = train(&config, &AtomicBool::new(false)).unwrap();
    assert!(outcome.completed);

    let (a, b) = outcome.table.merges()[0];
    assert_eq!(outcome.table.bytes_of(a), Some(b"a".as_slice()));
    assert_eq!(outcome.table.bytes_of(b), Some(b"a".as_slice()));

    let encoder = BpeEncoder::new(&outcome.table, vec![]);
    let ids = encoder.encode("aaaaaa");
    assert_eq!(ids.len(), 1);
    assert_eq!(outcome.table.bytes_of(ids[0]), Some(b"aaaaaa".as_slice()));
}

/// Invariant 7: encoder locality — encoding the whole text equals
/// concatenating the encoder's output on each of its pre-tokens.
#[test]
fn invariant_7_encoder_output_is_concatenation_over_pretokens() {
    let tmp = write_corpus("the quick brown fox jumps over the lazy dog several times over");
    let config = TrainConfig {
        input_path: tmp.path().to_path_buf(),
        vocab_size: 290,
        specials: vec![],
        num_processes: 1,
    };
    let outcome = train(&config, &AtomicBool::new(false)).unwrap();
    let encoder = BpeEncoder::new(&outcome.table, vec![]);

    let text = "the quick brown fox";
    let whole = encoder.encode(text);

    let pretokenizer = bpe_core::Pretokenizer::new();
    let segments = pretokenizer.split(text.as_bytes(), &[]);
    let mut piecewise = Vec::new();
    for segment in segments {
        let piece_text = std::str::from_utf8(&segment.bytes).unwrap();
        piecewise.extend(encoder.encode(piece_text));
    }

    assert_eq!(whole, piecewise);
}
