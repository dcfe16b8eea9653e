//! Core tokenization engine for morsel.
//!
//! This module contains the byte-level BPE tokenizer implementation:
//!
//! - [`Tokenizer`]: main interface with special-token handling, LRU chunk
//!   caching, chat formatting, and batch helpers
//! - [`glyph`]: bijective byte ↔ printable-character codec the merge rules
//!   operate over
//! - [`Segmenter`]: GPT-2 pre-tokenization (fancy-regex, lookahead pattern)
//! - [`bpe`]: ranked pair merging for a single chunk
//! - [`Trainer`]: merge-table learning by greedy frequency maximization
//! - [`Vocabulary`] / [`MergeTable`]: the stores and their persisted file
//!   formats
//! - [`StreamingDecoder`]: UTF-8 safe decoding of token-by-token output
//!
//! # Performance notes
//!
//! - **FxHashMap** everywhere string keys are hot
//! - **Aho-Corasick** (leftmost-longest) for special token matching
//! - **LRU cache** to avoid re-merging repeated chunks
//! - **Rayon** for batch encode/decode and for training's pair counting

pub mod bpe;
pub mod glyph;
mod segment;
mod streaming;
mod tokenizer;
mod trainer;
mod vocab;

pub use bpe::byte_pair_merge;
pub use glyph::{
    byte_for_glyph, glyph_decode, glyph_decode_bytes, glyph_encode, glyph_for_byte, is_glyph_char,
};
pub use segment::{Segmenter, GPT2_SPLIT_PATTERN};
pub use streaming::StreamingDecoder;
pub use tokenizer::{
    chat_tokens, default_special_tokens, Tokenizer, TokenizerError, UnknownTokenPolicy,
    ENDOFTEXT, IM_END, IM_SEP, IM_START,
};
pub use trainer::{StopReason, TrainReport, TrainedModel, Trainer, TrainerConfig};
pub use vocab::{
    load_merges, load_merges_file, load_vocabulary, load_vocabulary_file, save_merges,
    save_vocabulary, MergeTable, VocabError, Vocabulary,
};
