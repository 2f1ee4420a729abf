//! Payload masking
//!
//! Client-to-server payloads are XORed with a 4-byte key. Applying the same
//! key twice is the identity, which is what both frame construction and
//! unmasking rely on.

/// XOR `data` in place with the 4-byte masking key.
///
/// Byte `i` is XORed with `key[i % 4]`. Involution: applying the same key
/// twice restores the input.
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    if data.is_empty() {
        return;
    }

    let key_word = u32::from_ne_bytes(key);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes(chunk.try_into().unwrap()) ^ key_word;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    // The tail starts at a multiple of 4, so the key index realigns to 0.
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

/// Generate a random masking key for client frames.
///
/// Not a secret; it only has to be unpredictable enough to defeat naive
/// proxy caching.
#[inline]
pub fn generate_mask() -> [u8; 4] {
    fastrand::u32(..).to_ne_bytes()
}

/// Derive the deterministic hybi-04 masking key from the handshake key and
/// nonce.
///
/// The ASCII digits of `key` followed by those of `nonce` are accumulated as
/// a base-10 number with wrapping 32-bit arithmetic, emitted big-endian.
/// Only the frozen draft versions 4-6 ever use this.
pub fn generate_mask_v4(key: &str, nonce: &str) -> [u8; 4] {
    let mut acc: u32 = 0;
    for c in key.chars().chain(nonce.chars()) {
        if let Some(d) = c.to_digit(10) {
            acc = acc.wrapping_mul(10).wrapping_add(d);
        }
    }
    acc.to_be_bytes()
}
