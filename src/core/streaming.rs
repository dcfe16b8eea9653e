//! UTF-8 safe streaming decoder for token-by-token output.
//!
//! When tokens arrive one at a time (generation loops, server-sent streams),
//! a token's bytes may end in the middle of a multi-byte UTF-8 character.
//! [`StreamingDecoder`] buffers incomplete sequences and only emits complete,
//! valid UTF-8 — the run-accumulation rule of batch decoding, in stateful
//! form.

use super::glyph::glyph_decode;
use super::tokenizer::Tokenizer;

/// Stateful decoder that assembles UTF-8 across token boundaries.
///
/// # Example
///
/// ```ignore
/// let tokenizer = Tokenizer::byte_level()?;
/// let mut decoder = StreamingDecoder::new(&tokenizer);
///
/// for token_id in token_stream {
///     if let Some(text) = decoder.add_token(token_id) {
///         print!("{text}");
///     }
/// }
/// print!("{}", decoder.flush());
/// ```
pub struct StreamingDecoder<'a> {
    tokenizer: &'a Tokenizer,
    buffer: Vec<u8>,
}

impl<'a> StreamingDecoder<'a> {
    /// Create a streaming decoder for the given tokenizer.
    pub fn new(tokenizer: &'a Tokenizer) -> Self {
        Self {
            tokenizer,
            buffer: Vec::with_capacity(16),
        }
    }

    /// Add a token and return any newly completed text.
    ///
    /// Returns `None` when the buffered bytes still end mid-character or the
    /// id is unknown (unknown ids contribute nothing, matching batch decode).
    pub fn add_token(&mut self, token_id: u32) -> Option<String> {
        self.push_token_bytes(token_id);
        self.extract_complete_utf8()
    }

    /// Add several tokens at once and return any newly completed text.
    pub fn add_tokens(&mut self, token_ids: &[u32]) -> Option<String> {
        for &token_id in token_ids {
            self.push_token_bytes(token_id);
        }
        self.extract_complete_utf8()
    }

    fn push_token_bytes(&mut self, token_id: u32) {
        if let Some(special) = self.tokenizer.special_tokens_decoder().get(&token_id) {
            self.buffer.extend_from_slice(special.as_bytes());
        } else if let Some(token) = self.tokenizer.vocabulary().token_of(token_id) {
            match glyph_decode(token) {
                Some(bytes) => self.buffer.extend_from_slice(&bytes),
                None => self.buffer.extend_from_slice(token.as_bytes()),
            }
        }
    }

    /// Emit whatever remains, replacing any incomplete trailing sequence
    /// with U+FFFD.
    pub fn flush(&mut self) -> String {
        if self.buffer.is_empty() {
            return String::new();
        }
        let result = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        result
    }

    /// Discard any buffered bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Whether bytes are waiting for a sequence to complete.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Number of buffered bytes.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Drain the longest valid UTF-8 prefix of the buffer.
    fn extract_complete_utf8(&mut self) -> Option<String> {
        let valid_len = match std::str::from_utf8(&self.buffer) {
            Ok(_) => self.buffer.len(),
            Err(err) => err.valid_up_to(),
        };
        if valid_len == 0 {
            return None;
        }

        let valid_bytes: Vec<u8> = self.buffer.drain(..valid_len).collect();
        // Validated just above.
        Some(String::from_utf8(valid_bytes).unwrap())
    }
}
