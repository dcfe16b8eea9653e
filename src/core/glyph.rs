//! Byte/glyph codec: a bijective mapping between raw byte values and
//! printable Unicode characters.
//!
//! BPE merge rules are matched over sequences of "characters", but arbitrary
//! input bytes include control characters, whitespace, and Latin-1 gaps that
//! are invisible or ambiguous in text form. The codec gives every byte value
//! 0-255 a distinct, displayable stand-in (its *glyph*) so any byte sequence
//! can be represented as an ordinary string for merging and for vocabulary
//! keys.
//!
//! # Mapping rule
//!
//! - Bytes 33-126 (`!` to `~`): map to themselves
//! - Bytes 161-172 (`¡` to `¬`): map to themselves
//! - Bytes 174-255 (`®` to `ÿ`): map to themselves
//! - Every other byte (controls, space, 127-160, 173): assigned the next free
//!   code point from U+0100 upward, in ascending byte order
//!
//! The rule depends only on the byte value domain, so the tables are stable
//! across processes and compatible with the GPT-2 byte-level alphabet. The
//! space byte 0x20 maps to `Ġ` (U+0120), which is why merged word tokens
//! render with a leading `Ġ`.
//!
//! Decoding a character outside the glyph alphabet is an error condition
//! surfaced as `None`, never a silent default.

use rustc_hash::FxHashMap;
use std::sync::LazyLock;

/// Glyph for each byte value (256 entries), built once per process.
static BYTE_TO_GLYPH: LazyLock<[char; 256]> = LazyLock::new(|| {
    let mut printable = [false; 256];
    for b in 33u8..=126 {
        printable[b as usize] = true;
    }
    for b in 161u8..=172 {
        printable[b as usize] = true;
    }
    for b in 174u8..=255 {
        printable[b as usize] = true;
    }

    let mut table = ['\0'; 256];
    let mut next = 0x100u32;
    for b in 0usize..256 {
        if printable[b] {
            table[b] = b as u8 as char;
        } else {
            // Unwrap is fine: next stays far below the surrogate range.
            table[b] = char::from_u32(next).unwrap();
            next += 1;
        }
    }
    table
});

/// Inverse of [`BYTE_TO_GLYPH`].
static GLYPH_TO_BYTE: LazyLock<FxHashMap<char, u8>> = LazyLock::new(|| {
    BYTE_TO_GLYPH
        .iter()
        .enumerate()
        .map(|(byte, &ch)| (ch, byte as u8))
        .collect()
});

/// Encode raw bytes as their glyph string.
///
/// The result is always valid UTF-8 and contains exactly one `char` per input
/// byte, making it safe to use as a BPE symbol sequence or vocabulary key.
///
/// ```ignore
/// assert_eq!(glyph_encode(b" hello"), "Ġhello");
/// ```
#[inline]
pub fn glyph_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| BYTE_TO_GLYPH[b as usize]).collect()
}

/// Decode a glyph string back to the raw bytes it stands for.
///
/// Returns `None` if any character is not part of the glyph alphabet.
#[inline]
pub fn glyph_decode(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|ch| GLYPH_TO_BYTE.get(&ch).copied())
        .collect()
}

/// Decode the UTF-8 bytes of a glyph string back to raw bytes.
///
/// Convenience for callers holding the glyph representation as bytes.
#[inline]
pub fn glyph_decode_bytes(encoded: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(encoded).ok()?;
    glyph_decode(text)
}

/// Glyph standing in for a byte value.
#[inline]
pub fn glyph_for_byte(byte: u8) -> char {
    BYTE_TO_GLYPH[byte as usize]
}

/// Byte value a glyph stands for, or `None` outside the alphabet.
#[inline]
pub fn byte_for_glyph(ch: char) -> Option<u8> {
    GLYPH_TO_BYTE.get(&ch).copied()
}

/// Whether a character belongs to the glyph alphabet.
#[inline]
pub fn is_glyph_char(ch: char) -> bool {
    GLYPH_TO_BYTE.contains_key(&ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_bijective() {
        let mut seen = std::collections::HashSet::new();
        for b in 0u8..=255 {
            assert!(seen.insert(glyph_for_byte(b)), "duplicate glyph for byte {b}");
        }
        assert_eq!(seen.len(), 256);
    }

    #[test]
    fn roundtrip_every_byte() {
        for b in 0u8..=255 {
            let encoded = glyph_encode(&[b]);
            assert_eq!(glyph_decode(&encoded), Some(vec![b]), "byte {b}");
            assert_eq!(byte_for_glyph(glyph_for_byte(b)), Some(b), "byte {b}");
        }
    }

    #[test]
    fn printable_ascii_maps_to_itself() {
        for b in 33u8..=126 {
            assert_eq!(glyph_for_byte(b), b as char);
        }
    }

    #[test]
    fn space_maps_to_g_dot() {
        assert_eq!(glyph_for_byte(b' '), '\u{0120}');
        assert_eq!(glyph_encode(b" world"), "Ġworld");
    }

    #[test]
    fn control_bytes_start_at_u0100() {
        // Byte 0 is the first non-printable byte, so it takes U+0100.
        assert_eq!(glyph_for_byte(0), '\u{0100}');
    }

    #[test]
    fn multibyte_utf8_roundtrip() {
        let text = "héllo 世界 🦀";
        let encoded = glyph_encode(text.as_bytes());
        let decoded = glyph_decode(&encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), text);
    }

    #[test]
    fn unknown_glyph_is_an_error() {
        assert_eq!(glyph_decode("\u{2581}"), None);
        assert_eq!(byte_for_glyph('\u{2581}'), None);
        assert!(!is_glyph_char('\u{2581}'));
    }

    #[test]
    fn decode_bytes_matches_decode() {
        let encoded = glyph_encode(b"a b\nc");
        assert_eq!(
            glyph_decode_bytes(encoded.as_bytes()),
            Some(b"a b\nc".to_vec())
        );
    }
}
