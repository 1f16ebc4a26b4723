//! Traditional DES-based crypt(3).
//!
//! Only the first 8 key bytes count, each losing its high bit; the output is
//! the 2-character salt followed by 11 hash characters.

/// Characters legal in a crypt salt (`[./0-9A-Za-z]`).
pub fn is_salt_char(b: u8) -> bool {
    b == b'.' || b == b'/' || b.is_ascii_alphanumeric()
}

/// Returns the 13-character crypt string, or `None` if the salt is illegal.
pub fn hash_with_salt(key: &[u8], salt: &[u8; 2]) -> Option<String> {
    if !salt.iter().copied().all(is_salt_char) {
        return None;
    }
    let salt = std::str::from_utf8(salt).ok()?;
    // crypt(3) reads the key as a C string.
    let key = key.split(|&b| b == 0).next().unwrap_or_default();
    pwhash::unix_crypt::hash_with(salt, key).ok()
}
