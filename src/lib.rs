//! Morsel - byte-level BPE tokenizer with chat special tokens
//!
//! A GPT-style tokenizer featuring:
//! - Byte/glyph codec so merge rules run over printable characters
//! - GPT-2 pre-tokenization via fancy-regex
//! - Ranked merge table replaying training order exactly at encode time
//! - Aho-Corasick special token matching (leftmost-longest)
//! - LRU cache for frequently encoded chunks
//! - Rayon parallelism for batch operations and training's pair counting
//! - Corpus training with deterministic tie-breaking and a run report
//! - UTF-8 streaming decoder for token-by-token output
//!
//! # Quick start
//!
//! ```ignore
//! use morsel::Tokenizer;
//!
//! let tokenizer = Tokenizer::train(&corpus, 256 + 1000)?;
//! let prompt = tokenizer.format_chat_messages("be brief", "hello!");
//! let ids = tokenizer.encode(&prompt)?;
//! assert_eq!(tokenizer.decode(&ids), prompt);
//! ```

pub mod core;

pub use core::{
    byte_pair_merge, chat_tokens, default_special_tokens, load_merges, load_merges_file,
    load_vocabulary, load_vocabulary_file, save_merges, save_vocabulary, MergeTable, Segmenter,
    StopReason, StreamingDecoder, TokenizerError, Tokenizer, TrainReport, TrainedModel, Trainer,
    TrainerConfig, UnknownTokenPolicy, VocabError, Vocabulary, ENDOFTEXT, GPT2_SPLIT_PATTERN,
    IM_END, IM_SEP, IM_START,
};
