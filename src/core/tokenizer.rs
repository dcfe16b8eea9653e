//! Main tokenizer interface.
//!
//! [`Tokenizer`] ties the pipeline together: special-token splitting
//! (Aho-Corasick, leftmost-longest), GPT-2 pre-tokenization, cached BPE
//! merging, and vocabulary lookup for `encode`; the reverse walk with
//! run-buffered UTF-8 assembly for `decode`. The model (vocabulary, merge
//! table, special tokens, compiled pattern) is immutable after construction;
//! the only mutable state is the LRU chunk cache behind a `Mutex`, so every
//! operation takes `&self` and is safe to call from multiple threads.

use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

use aho_corasick::{AhoCorasick, MatchKind};
use lru::LruCache;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHasher};
use thiserror::Error;

use super::bpe::byte_pair_merge;
use super::glyph::{glyph_decode, glyph_encode};
use super::segment::Segmenter;
use super::trainer::{TrainedModel, Trainer, TrainerConfig};
use super::vocab::{
    load_merges_file, load_vocabulary_file, save_merges, save_vocabulary, MergeTable, VocabError,
    Vocabulary,
};

/// Errors surfaced by tokenizer construction and strict-mode encoding.
#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("regex compilation error: {0}")]
    Regex(#[from] fancy_regex::Error),
    #[error("vocabulary error: {0}")]
    Vocab(#[from] VocabError),
    #[error("special token matcher build error: {0}")]
    AhoCorasick(#[from] aho_corasick::BuildError),
    #[error("no vocabulary id for token {0:?}")]
    UnknownToken(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Literal form of the end-of-text sentinel.
pub const ENDOFTEXT: &str = "<|endoftext|>";
/// Literal form of the chat message-start marker.
pub const IM_START: &str = "<|im_start|>";
/// Literal form of the chat message-end marker.
pub const IM_END: &str = "<|im_end|>";
/// Literal form of the chat role/content separator.
pub const IM_SEP: &str = "<|im_sep|>";

/// Reserved ids for the chat special tokens.
///
/// The values follow the cl100k chat conventions so encodings interoperate
/// with models expecting those exact ids. The range is disjoint from byte
/// glyph ids (0-255) and from any realistic merge-derived id.
pub mod chat_tokens {
    /// `<|endoftext|>` — also the lenient-mode fallback id.
    pub const ENDOFTEXT: u32 = 100257;
    /// `<|im_start|>`
    pub const IM_START: u32 = 100264;
    /// `<|im_end|>`
    pub const IM_END: u32 = 100265;
    /// `<|im_sep|>`
    pub const IM_SEP: u32 = 100266;
}

/// The default closed set of special tokens.
pub fn default_special_tokens() -> FxHashMap<String, u32> {
    let mut tokens = FxHashMap::default();
    tokens.insert(ENDOFTEXT.to_string(), chat_tokens::ENDOFTEXT);
    tokens.insert(IM_START.to_string(), chat_tokens::IM_START);
    tokens.insert(IM_END.to_string(), chat_tokens::IM_END);
    tokens.insert(IM_SEP.to_string(), chat_tokens::IM_SEP);
    tokens
}

/// What `encode` does when a merged token has no vocabulary id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTokenPolicy {
    /// Emit the `<|endoftext|>` id and log a warning; the call continues.
    #[default]
    Lenient,
    /// Fail the whole call with [`TokenizerError::UnknownToken`].
    Strict,
}

/// Default size of the chunk cache.
const DEFAULT_CACHE_SIZE: usize = 4096;

/// Byte-level BPE tokenizer with chat special tokens.
///
/// # Pipeline
///
/// `encode` scans for special-token literals first (leftmost-longest, so a
/// long literal always beats a prefix of it), maps them straight to their
/// reserved ids, and runs everything in between through pre-tokenization,
/// glyph encoding, ranked merging, and vocabulary lookup. `decode` reverses
/// the walk, accumulating bytes across each maximal run of non-special
/// tokens before UTF-8 decoding the run as a whole — decoding token-by-token
/// would corrupt multi-byte sequences that straddle token boundaries.
///
/// # Caching
///
/// Fully merged token strings are memoized per chunk in an LRU cache keyed
/// by an `FxHasher` hash of the chunk. The cache is an optimization only: a
/// lost update under contention or a cleared cache just means recomputation.
pub struct Tokenizer {
    vocab: Vocabulary,
    merges: MergeTable,
    special_tokens: FxHashMap<String, u32>,
    special_tokens_decoder: FxHashMap<u32, String>,
    special_token_strings: Vec<String>,
    segmenter: Segmenter,
    special_matcher: Option<AhoCorasick>,
    chunk_cache: Mutex<LruCache<u64, Vec<String>>>,
    cache_size: usize,
    unknown_policy: UnknownTokenPolicy,
}

impl Tokenizer {
    /// Create a tokenizer from a vocabulary, merge table, and special tokens.
    ///
    /// Uses the default cache size and the lenient unknown-token policy.
    pub fn new(
        vocab: Vocabulary,
        merges: MergeTable,
        special_tokens: FxHashMap<String, u32>,
    ) -> Result<Self, TokenizerError> {
        Self::with_options(
            vocab,
            merges,
            special_tokens,
            DEFAULT_CACHE_SIZE,
            UnknownTokenPolicy::default(),
        )
    }

    /// Create a tokenizer with explicit cache size and unknown-token policy.
    ///
    /// A `cache_size` of 1 effectively disables memoization, which is useful
    /// for determinism checks against a caching instance.
    pub fn with_options(
        vocab: Vocabulary,
        merges: MergeTable,
        special_tokens: FxHashMap<String, u32>,
        cache_size: usize,
        unknown_policy: UnknownTokenPolicy,
    ) -> Result<Self, TokenizerError> {
        let special_tokens_decoder: FxHashMap<u32, String> = special_tokens
            .iter()
            .map(|(k, v)| (*v, k.clone()))
            .collect();

        let special_token_strings: Vec<String> = special_tokens.keys().cloned().collect();
        let special_matcher = if special_token_strings.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(&special_token_strings)?,
            )
        };

        let cache_size_nz = NonZeroUsize::new(cache_size.max(1)).unwrap();

        Ok(Self {
            vocab,
            merges,
            special_tokens,
            special_tokens_decoder,
            special_token_strings,
            segmenter: Segmenter::new()?,
            special_matcher,
            chunk_cache: Mutex::new(LruCache::new(cache_size_nz)),
            cache_size,
            unknown_policy,
        })
    }

    /// Byte-level tokenizer: the 256 glyph tokens, no merges, default
    /// special tokens. Every UTF-8 byte encodes to its own id.
    pub fn byte_level() -> Result<Self, TokenizerError> {
        Self::new(
            Vocabulary::byte_level(),
            MergeTable::new(),
            default_special_tokens(),
        )
    }

    /// Wrap a freshly trained model with the default special tokens.
    pub fn from_trained(model: TrainedModel) -> Result<Self, TokenizerError> {
        Self::new(model.vocabulary, model.merges, default_special_tokens())
    }

    /// Load a tokenizer from a vocabulary file and a merge-rules file.
    ///
    /// Either file failing to parse is fatal: no tokenizer is produced.
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(
        vocab_path: P,
        merges_path: Q,
    ) -> Result<Self, TokenizerError> {
        let vocab = load_vocabulary_file(vocab_path)?;
        let merges = load_merges_file(merges_path)?;
        Self::new(vocab, merges, default_special_tokens())
    }

    /// Train on an in-memory corpus and wrap the result.
    pub fn train(corpus: &str, vocab_size: u32) -> Result<Self, TokenizerError> {
        let trainer = Trainer::new(TrainerConfig {
            vocab_size,
            ..TrainerConfig::default()
        })?;
        Self::from_trained(trainer.train_from_text(corpus))
    }

    /// Train on a corpus file and wrap the result.
    pub fn train_from_file<P: AsRef<Path>>(
        path: P,
        vocab_size: u32,
    ) -> Result<Self, TokenizerError> {
        let trainer = Trainer::new(TrainerConfig {
            vocab_size,
            ..TrainerConfig::default()
        })?;
        Self::from_trained(trainer.train_from_file(path)?)
    }

    /// Persist the vocabulary and merge rules to their two files.
    pub fn save<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        vocab_path: P,
        merges_path: Q,
    ) -> Result<(), VocabError> {
        save_vocabulary(&self.vocab, vocab_path)?;
        save_merges(&self.merges, merges_path)
    }

    #[inline]
    fn hash_chunk(chunk: &str) -> u64 {
        let mut hasher = FxHasher::default();
        chunk.hash(&mut hasher);
        hasher.finish()
    }

    /// Merge one pre-tokenization chunk into its token strings, memoized.
    fn tokenize_chunk(&self, chunk: &str) -> Vec<String> {
        let glyphs = glyph_encode(chunk.as_bytes());

        // Fast path: the whole chunk is already a known token.
        if self.vocab.contains(&glyphs) {
            return vec![glyphs];
        }

        let hash = Self::hash_chunk(chunk);
        if let Ok(mut cache) = self.chunk_cache.lock() {
            if let Some(hit) = cache.get(&hash) {
                return hit.clone();
            }
        }

        let result = byte_pair_merge(&glyphs, &self.merges);

        if let Ok(mut cache) = self.chunk_cache.lock() {
            cache.put(hash, result.clone());
        }

        result
    }

    /// Encode text to token ids.
    ///
    /// Special-token literals in the input map to their reserved ids and are
    /// never split; everything else goes through the BPE pipeline. Unknown
    /// merged tokens follow the configured [`UnknownTokenPolicy`].
    pub fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        let Some(matcher) = &self.special_matcher else {
            return self.encode_ordinary(text);
        };

        let mut ids = Vec::new();
        let mut last_end = 0;

        for m in matcher.find_iter(text) {
            if m.start() > last_end {
                self.encode_ordinary_into(&text[last_end..m.start()], &mut ids)?;
            }
            let literal = &self.special_token_strings[m.pattern().as_usize()];
            if let Some(&id) = self.special_tokens.get(literal) {
                ids.push(id);
            }
            last_end = m.end();
        }

        if last_end < text.len() {
            self.encode_ordinary_into(&text[last_end..], &mut ids)?;
        }

        Ok(ids)
    }

    /// Encode text to token ids, treating special-token literals as plain
    /// text to be split like anything else.
    pub fn encode_ordinary(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        let mut ids = Vec::new();
        self.encode_ordinary_into(text, &mut ids)?;
        Ok(ids)
    }

    fn encode_ordinary_into(
        &self,
        text: &str,
        ids: &mut Vec<u32>,
    ) -> Result<(), TokenizerError> {
        for chunk in self.segmenter.segment(text) {
            for token in self.tokenize_chunk(chunk) {
                match self.vocab.id_of(&token) {
                    Some(id) => ids.push(id),
                    None => match self.unknown_policy {
                        UnknownTokenPolicy::Lenient => {
                            if let Some(&fallback) = self.special_tokens.get(ENDOFTEXT) {
                                log::warn!(
                                    "token {token:?} missing from vocabulary, \
                                     falling back to {ENDOFTEXT}"
                                );
                                ids.push(fallback);
                            } else {
                                return Err(TokenizerError::UnknownToken(token));
                            }
                        }
                        UnknownTokenPolicy::Strict => {
                            return Err(TokenizerError::UnknownToken(token));
                        }
                    },
                }
            }
        }
        Ok(())
    }

    /// Run the encode pipeline but stop before the id lookup, returning
    /// token strings. Special-token literals appear verbatim.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let Some(matcher) = &self.special_matcher else {
            return self.tokenize_ordinary(text);
        };

        let mut tokens = Vec::new();
        let mut last_end = 0;

        for m in matcher.find_iter(text) {
            if m.start() > last_end {
                tokens.extend(self.tokenize_ordinary(&text[last_end..m.start()]));
            }
            tokens.push(self.special_token_strings[m.pattern().as_usize()].clone());
            last_end = m.end();
        }

        if last_end < text.len() {
            tokens.extend(self.tokenize_ordinary(&text[last_end..]));
        }

        tokens
    }

    fn tokenize_ordinary(&self, text: &str) -> Vec<String> {
        self.segmenter
            .segment(text)
            .into_iter()
            .flat_map(|chunk| self.tokenize_chunk(chunk))
            .collect()
    }

    /// Decode token ids back to text.
    ///
    /// Bytes accumulate across each maximal run of non-special tokens and
    /// the run is UTF-8 decoded once; a run that is not valid UTF-8 falls
    /// back to its literal glyph form. Unknown ids are skipped with a
    /// warning and contribute nothing. Special ids emit their literal.
    pub fn decode(&self, tokens: &[u32]) -> String {
        let mut out = String::new();
        let mut run_bytes: Vec<u8> = Vec::new();
        let mut run_glyphs = String::new();

        for &id in tokens {
            if let Some(special) = self.special_tokens_decoder.get(&id) {
                flush_run(&mut out, &mut run_bytes, &mut run_glyphs);
                out.push_str(special);
            } else if let Some(token) = self.vocab.token_of(id) {
                match glyph_decode(token) {
                    Some(bytes) => run_bytes.extend_from_slice(&bytes),
                    None => {
                        log::warn!("token {token:?} contains non-glyph characters");
                        run_bytes.extend_from_slice(token.as_bytes());
                    }
                }
                run_glyphs.push_str(token);
            } else {
                log::warn!("unknown token id {id} skipped during decode");
            }
        }

        flush_run(&mut out, &mut run_bytes, &mut run_glyphs);
        out
    }

    /// Decode token ids to raw bytes, without the per-run UTF-8 step.
    pub fn decode_bytes(&self, tokens: &[u32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(tokens.len() * 2);

        for &id in tokens {
            if let Some(special) = self.special_tokens_decoder.get(&id) {
                out.extend_from_slice(special.as_bytes());
            } else if let Some(token) = self.vocab.token_of(id) {
                match glyph_decode(token) {
                    Some(bytes) => out.extend_from_slice(&bytes),
                    None => out.extend_from_slice(token.as_bytes()),
                }
            } else {
                log::warn!("unknown token id {id} skipped during decode");
            }
        }

        out
    }

    /// Render a system/user exchange in the chat template, ending with an
    /// open assistant turn.
    pub fn format_chat_messages(&self, system: &str, user: &str) -> String {
        format!(
            "{IM_START}system{IM_SEP}{system}{IM_END}\
             {IM_START}user{IM_SEP}{user}{IM_END}\
             {IM_START}assistant{IM_SEP}"
        )
    }

    /// Whether a string is one of the reserved special-token literals.
    pub fn is_special_token(&self, token: &str) -> bool {
        self.special_tokens.contains_key(token)
    }

    /// Total number of token ids this tokenizer can produce (vocabulary
    /// entries plus special tokens).
    pub fn vocab_size(&self) -> usize {
        self.vocab.len() + self.special_tokens.len()
    }

    /// The vocabulary store.
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    /// The merge table.
    pub fn merges(&self) -> &MergeTable {
        &self.merges
    }

    /// The special tokens map (literal → id).
    pub fn special_tokens(&self) -> &FxHashMap<String, u32> {
        &self.special_tokens
    }

    /// The special tokens reverse map (id → literal).
    pub fn special_tokens_decoder(&self) -> &FxHashMap<u32, String> {
        &self.special_tokens_decoder
    }

    /// Encode multiple texts in parallel.
    pub fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<u32>>, TokenizerError> {
        texts.par_iter().map(|text| self.encode(text)).collect()
    }

    /// Decode multiple token lists in parallel.
    pub fn decode_batch(&self, token_lists: &[Vec<u32>]) -> Vec<String> {
        token_lists
            .par_iter()
            .map(|tokens| self.decode(tokens))
            .collect()
    }

    /// Drop all memoized chunk results.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.chunk_cache.lock() {
            cache.clear();
        }
    }

    /// Number of memoized chunks.
    pub fn cache_len(&self) -> usize {
        self.chunk_cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Clone for Tokenizer {
    fn clone(&self) -> Self {
        // The clone gets its own, empty cache.
        let cache_size_nz = NonZeroUsize::new(self.cache_size.max(1)).unwrap();
        Self {
            vocab: self.vocab.clone(),
            merges: self.merges.clone(),
            special_tokens: self.special_tokens.clone(),
            special_tokens_decoder: self.special_tokens_decoder.clone(),
            special_token_strings: self.special_token_strings.clone(),
            segmenter: self.segmenter.clone(),
            special_matcher: self.special_matcher.clone(),
            chunk_cache: Mutex::new(LruCache::new(cache_size_nz)),
            cache_size: self.cache_size,
            unknown_policy: self.unknown_policy,
        }
    }
}

/// UTF-8 decode one finished run of non-special tokens into `out`.
fn flush_run(out: &mut String, bytes: &mut Vec<u8>, glyphs: &mut String) {
    if bytes.is_empty() {
        glyphs.clear();
        return;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => out.push_str(text),
        Err(_) => {
            log::warn!(
                "decoded run of {} bytes is not valid UTF-8, emitting glyph form",
                bytes.len()
            );
            out.push_str(glyphs);
        }
    }
    bytes.clear();
    glyphs.clear();
}
