//! Byte-level alphabet shared by every GPT-2 style vocabulary.
//!
//! GPT-2 vocabularies never contain raw bytes. Instead each byte value is
//! projected onto a printable code point: bytes that are already visible
//! Latin-1 characters map to themselves, while control characters, space and
//! a handful of other bytes are shifted into the `U+0100..U+0143` range. The
//! mapping is a fixed bijection and does not depend on the loaded vocabulary.

use std::sync::OnceLock;

/// Number of bytes that need a shifted code point (0..=32, 127..=160, 173).
const SHIFTED_BYTES: usize = 68;

/// Placeholders span `U+0021..=U+0143`.
const DECODER_LEN: usize = 0x100 + SHIFTED_BYTES - 0x21;

/// Fixed bijection between byte values and their placeholder characters.
#[derive(Debug)]
pub struct ByteCodec {
    encoder: [char; 256],
    /// Indexed by `code point - 0x21`; holds `byte + 1` so zero means "not a placeholder".
    decoder: [u16; DECODER_LEN],
}

impl ByteCodec {
    fn build() -> Self {
        let mut encoder = ['\0'; 256];
        let mut decoder = [0u16; DECODER_LEN];
        let mut shifted = 0u32;

        for b in 0..=255u8 {
            let printable = matches!(b, b'!'..=b'~' | 0xA1..=0xAC | 0xAE..=0xFF);
            let cp = if printable {
                b as u32
            } else {
                shifted += 1;
                255 + shifted
            };
            // Every value produced here is below U+0200, a valid scalar.
            let ch = char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER);
            encoder[b as usize] = ch;
            decoder[(cp - 0x21) as usize] = b as u16 + 1;
        }

        Self { encoder, decoder }
    }

    /// The process-wide codec table, built on first use.
    pub fn global() -> &'static ByteCodec {
        static CODEC: OnceLock<ByteCodec> = OnceLock::new();
        CODEC.get_or_init(ByteCodec::build)
    }

    /// Placeholder character for a raw byte.
    #[inline]
    pub fn encode(&self, byte: u8) -> char {
        self.encoder[byte as usize]
    }

    /// Raw byte behind a placeholder character, if `ch` is one.
    #[inline]
    pub fn decode(&self, ch: char) -> Option<u8> {
        let idx = (ch as u32).checked_sub(0x21)? as usize;
        match self.decoder.get(idx) {
            Some(&v) if v > 0 => Some((v - 1) as u8),
            _ => None,
        }
    }
}
