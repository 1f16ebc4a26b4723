//! Shift-JIS normalization of trip secrets.
//!
//! Legacy tripcodes were computed over Shift-JIS encoded bytes, one byte per
//! character. Secrets are re-encoded the same way so multibyte input hashes
//! to the historical value: ASCII is unchanged, `¥`/`‾` fold onto `\`/`~`,
//! and anything Shift-JIS cannot represent keeps its UTF-8 bytes.

use encoding_rs::SHIFT_JIS;

pub fn to_shift_jis(input: &str) -> Vec<u8> {
    let (bytes, _, unmappable) = SHIFT_JIS.encode(input);
    if !unmappable {
        return bytes.into_owned();
    }

    // The encoder substitutes numeric character references for unmappable
    // characters; redo it per character to pass those through instead.
    let mut out = Vec::with_capacity(input.len());
    let mut buf = [0u8; 4];
    for ch in input.chars() {
        let utf8 = ch.encode_utf8(&mut buf);
        let (bytes, _, unmappable) = SHIFT_JIS.encode(utf8);
        if unmappable {
            out.extend_from_slice(utf8.as_bytes());
        } else {
            out.extend_from_slice(&bytes);
        }
    }
    out
}
