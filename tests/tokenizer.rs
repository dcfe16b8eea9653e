//! Integration tests for the tokenizer pipeline.
//!
//! These exercise encode/decode round-trips, special token handling, chat
//! formatting, determinism, and persistence through the public API.

use morsel::{
    chat_tokens, Tokenizer, TokenizerError, UnknownTokenPolicy,
};

const TRAINING_CORPUS: &str = "The quick brown fox jumps over the lazy dog. \
    The dog was not amused. The fox did it again and again, and the dog \
    watched the fox jump over and over. ";

fn trained_tokenizer() -> Tokenizer {
    let corpus = TRAINING_CORPUS.repeat(50);
    Tokenizer::train(&corpus, 256 + 64).unwrap()
}

/// Basic encoding and decoding round-trip on a merge-free tokenizer.
#[test]
fn test_byte_level_roundtrip() {
    let tokenizer = Tokenizer::byte_level().unwrap();

    let test_cases = vec![
        "Hello, world!",
        "The quick brown fox jumps over the lazy dog.",
        "1234567890",
        "Special characters: !@#$%^&*()",
        "Multi-line\ntext\nwith\nnewlines",
        "Unicode: こんにちは 世界 🦀",
        "  leading and trailing whitespace   ",
    ];

    for text in test_cases {
        let tokens = tokenizer.encode(text).unwrap();
        assert_eq!(tokenizer.decode(&tokens), text, "roundtrip failed for {text:?}");
    }
}

/// Round-trip holds on a trained tokenizer too, including text the training
/// corpus never saw (byte fallback covers every input).
#[test]
fn test_trained_roundtrip() {
    let tokenizer = trained_tokenizer();

    let test_cases = vec![
        "The quick brown fox",
        "completely unrelated zebra text",
        "ünïcödé and 数字 123",
    ];

    for text in test_cases {
        let tokens = tokenizer.encode(text).unwrap();
        assert_eq!(tokenizer.decode(&tokens), text, "roundtrip failed for {text:?}");
    }
}

/// Pure ASCII on a merge-free tokenizer yields one id per byte, each equal
/// to the byte's value.
#[test]
fn test_byte_level_identity_ids() {
    let tokenizer = Tokenizer::byte_level().unwrap();
    let tokens = tokenizer.encode("Hello, world!").unwrap();
    assert_eq!(tokens.len(), 13);
    for (token, byte) in tokens.iter().zip("Hello, world!".bytes()) {
        assert_eq!(*token, u32::from(byte));
    }
}

/// A trained tokenizer actually compresses its own corpus.
#[test]
fn test_trained_tokenizer_compresses() {
    let tokenizer = trained_tokenizer();
    let tokens = tokenizer.encode(TRAINING_CORPUS).unwrap();
    assert!(
        tokens.len() < TRAINING_CORPUS.len(),
        "expected fewer tokens ({}) than bytes ({})",
        tokens.len(),
        TRAINING_CORPUS.len()
    );
}

/// Special tokens are atomic: never split, always their reserved ids, with
/// the text between them tokenized normally.
#[test]
fn test_special_token_atomicity() {
    let tokenizer = Tokenizer::byte_level().unwrap();
    let tokens = tokenizer
        .encode("<|im_start|>system<|im_sep|>Hello<|im_end|>")
        .unwrap();

    let expected: Vec<u32> = std::iter::once(chat_tokens::IM_START)
        .chain("system".bytes().map(u32::from))
        .chain(std::iter::once(chat_tokens::IM_SEP))
        .chain("Hello".bytes().map(u32::from))
        .chain(std::iter::once(chat_tokens::IM_END))
        .collect();
    assert_eq!(tokens, expected);
}

/// Chat-formatted exchanges survive the full encode/decode pipeline.
#[test]
fn test_chat_roundtrip() {
    let byte_level = Tokenizer::byte_level().unwrap();
    let trained = trained_tokenizer();

    let exchanges = [
        ("You are a helpful assistant.", "What is a tokenizer?"),
        ("Be terse.", "Explain BPE in one sentence."),
        ("", ""),
        ("Unicode ok: héllo", "世界 🦀"),
    ];

    for tokenizer in [&byte_level, &trained] {
        for (system, user) in exchanges {
            let prompt = tokenizer.format_chat_messages(system, user);
            let tokens = tokenizer.encode(&prompt).unwrap();
            assert_eq!(
                tokenizer.decode(&tokens),
                prompt,
                "chat roundtrip failed for ({system:?}, {user:?})"
            );
        }
    }
}

/// Encoding is a pure function of the model and input: a caching instance
/// and an effectively cache-free instance agree, and repeated calls agree.
#[test]
fn test_encode_determinism() {
    let corpus = TRAINING_CORPUS.repeat(50);
    let cached = Tokenizer::train(&corpus, 256 + 64).unwrap();
    let uncached = Tokenizer::with_options(
        cached.vocabulary().clone(),
        cached.merges().clone(),
        cached.special_tokens().clone(),
        1,
        UnknownTokenPolicy::Lenient,
    )
    .unwrap();

    let text = "The quick brown fox jumps over the lazy dog. Again. Again.";
    let first = cached.encode(text).unwrap();
    let second = cached.encode(text).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, uncached.encode(text).unwrap());
}

/// `tokenize` exposes token strings; the non-special ones concatenate to
/// the glyph form of the input.
#[test]
fn test_tokenize_covers_input() {
    let tokenizer = trained_tokenizer();
    let text = "The lazy dog watched.";
    let tokens = tokenizer.tokenize(text);
    let joined: String = tokens.concat();
    assert_eq!(joined, morsel::core::glyph_encode(text.as_bytes()));
}

/// `tokenize` leaves special literals intact.
#[test]
fn test_tokenize_special_literals() {
    let tokenizer = Tokenizer::byte_level().unwrap();
    let tokens = tokenizer.tokenize("<|im_start|>ab<|im_end|>");
    assert_eq!(tokens.first().map(String::as_str), Some("<|im_start|>"));
    assert_eq!(tokens.last().map(String::as_str), Some("<|im_end|>"));
    assert_eq!(tokens.len(), 4);
}

#[test]
fn test_is_special_token() {
    let tokenizer = Tokenizer::byte_level().unwrap();
    for literal in ["<|endoftext|>", "<|im_start|>", "<|im_end|>", "<|im_sep|>"] {
        assert!(tokenizer.is_special_token(literal));
    }
    assert!(!tokenizer.is_special_token("<|other|>"));
}

/// Save then load through the two persisted files reproduces the encoder.
#[test]
fn test_save_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let vocab_path = dir.path().join("vocab.json");
    let merges_path = dir.path().join("merges.txt");

    let trained = trained_tokenizer();
    trained.save(&vocab_path, &merges_path).unwrap();

    let loaded = Tokenizer::from_files(&vocab_path, &merges_path).unwrap();
    assert_eq!(loaded.vocab_size(), trained.vocab_size());

    let text = "The quick brown fox, once more";
    assert_eq!(loaded.encode(text).unwrap(), trained.encode(text).unwrap());
    assert_eq!(loaded.decode(&loaded.encode(text).unwrap()), text);
}

/// Malformed persisted files must fail the load, not half-construct.
#[test]
fn test_malformed_files_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let vocab_path = dir.path().join("vocab.json");
    let merges_path = dir.path().join("merges.txt");

    std::fs::write(&vocab_path, "{ not valid json").unwrap();
    std::fs::write(&merges_path, "#version: 0.2\na b\n").unwrap();
    assert!(matches!(
        Tokenizer::from_files(&vocab_path, &merges_path),
        Err(TokenizerError::Vocab(_))
    ));

    std::fs::write(&vocab_path, r#"{"a": 0}"#).unwrap();
    std::fs::write(&merges_path, "a b c\n").unwrap();
    assert!(matches!(
        Tokenizer::from_files(&vocab_path, &merges_path),
        Err(TokenizerError::Vocab(_))
    ));
}

/// Batch helpers agree with their sequential counterparts.
#[test]
fn test_batch_consistency() {
    let tokenizer = trained_tokenizer();
    let texts: Vec<String> = vec![
        "The fox".into(),
        "The dog".into(),
        "over and over".into(),
    ];
    let batch = tokenizer.encode_batch(&texts).unwrap();
    for (text, tokens) in texts.iter().zip(&batch) {
        assert_eq!(tokens, &tokenizer.encode(text).unwrap());
    }
    assert_eq!(tokenizer.decode_batch(&batch), texts);
}
