//! Pre-tokenization segmenter.
//!
//! Before any merging happens, raw text is split into chunks that BPE treats
//! independently: contraction suffixes, letter runs, digit runs, punctuation
//! runs, and whitespace runs, each with GPT-2's "optional leading space"
//! convention. Merges never cross a chunk boundary, which is what keeps
//! ` world` and `world` distinct tokens.
//!
//! The pattern needs the negative lookahead in the trailing-whitespace
//! alternative (`\s+(?!\S)`), so it is compiled with fancy-regex rather than
//! the plain regex crate.

use fancy_regex::Regex;

/// GPT-2 pre-tokenization pattern.
///
/// Alternatives, tried left to right at each position:
/// contraction suffixes, an optional space plus a letter run, an optional
/// space plus a digit run, an optional space plus a run of anything that is
/// neither whitespace nor letter nor digit, a whitespace run not followed by a
/// non-whitespace character, and finally any whitespace run.
pub const GPT2_SPLIT_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// Compiled segmentation rule.
///
/// Every character of the input belongs to exactly one chunk: the alternatives
/// cover all of Unicode, so concatenating the chunks in order reproduces the
/// input.
#[derive(Debug, Clone)]
pub struct Segmenter {
    regex: Regex,
}

impl Segmenter {
    /// Compile the default GPT-2 pattern.
    pub fn new() -> Result<Self, fancy_regex::Error> {
        Self::with_pattern(GPT2_SPLIT_PATTERN)
    }

    /// Compile a custom pre-tokenization pattern.
    pub fn with_pattern(pattern: &str) -> Result<Self, fancy_regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    /// Split `text` into ordered, covering chunks.
    pub fn segment<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.regex
            .find_iter(text)
            .filter_map(|m| m.ok())
            .map(|m| m.as_str())
            .collect()
    }

    /// Chunk boundaries as `(start, end)` byte offsets.
    pub fn segment_offsets(&self, text: &str) -> Vec<(usize, usize)> {
        self.regex
            .find_iter(text)
            .filter_map(|m| m.ok())
            .map(|m| (m.start(), m.end()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(text: &str) -> Vec<String> {
        Segmenter::new()
            .unwrap()
            .segment(text)
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn word_and_punctuation_boundaries() {
        assert_eq!(chunks("Hello, world!"), ["Hello", ",", " world", "!"]);
    }

    #[test]
    fn contraction_suffixes_split_off() {
        assert_eq!(
            chunks("I'm sure we're ready"),
            ["I", "'m", " sure", " we", "'re", " ready"]
        );
        assert_eq!(chunks("don't"), ["don", "'t"]);
    }

    #[test]
    fn digit_runs_take_a_leading_space() {
        assert_eq!(chunks("abc 123 x4"), ["abc", " 123", " x4"]);
    }

    #[test]
    fn interior_whitespace_leaves_one_space_for_the_word() {
        // Two spaces before a word: the first closes the whitespace run, the
        // second attaches to the word.
        assert_eq!(chunks("a  b"), ["a", " ", " b"]);
    }

    #[test]
    fn trailing_whitespace_is_one_run() {
        assert_eq!(chunks("hi   "), ["hi", "   "]);
    }

    #[test]
    fn newlines_are_their_own_runs() {
        assert_eq!(chunks("a\nb"), ["a", "\n", "b"]);
        assert_eq!(chunks("a\n\n  b"), ["a", "\n\n ", " b"]);
    }

    #[test]
    fn unicode_letters_are_letters() {
        assert_eq!(chunks("café 北京"), ["café", " 北京"]);
    }

    #[test]
    fn coverage_reproduces_the_input() {
        let cases = [
            "Hello, world!",
            "  leading and trailing  ",
            "mixed 123 !!! \t\n ok",
            "unicode: こんにちは 世界 🦀",
            "",
        ];
        let segmenter = Segmenter::new().unwrap();
        for text in cases {
            let joined: String = segmenter.segment(text).concat();
            assert_eq!(joined, text, "coverage failed for {text:?}");
        }
    }

    #[test]
    fn offsets_match_chunks() {
        let segmenter = Segmenter::new().unwrap();
        let text = "Hello, world!";
        let offsets = segmenter.segment_offsets(text);
        let via_offsets: Vec<&str> = offsets.iter().map(|&(s, e)| &text[s..e]).collect();
        assert_eq!(via_offsets, segmenter.segment(text));
    }
}
