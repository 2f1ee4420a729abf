//! UTF-8 validation for text payloads
//!
//! Complete messages go through `simdutf8`. Fragment boundaries may split a
//! multi-byte sequence, so in-progress reassembly uses the partial check that
//! tolerates a truncated final sequence.

/// Validate that `data` is complete, valid UTF-8.
#[inline]
pub fn validate_utf8(data: &[u8]) -> bool {
    simdutf8::basic::from_utf8(data).is_ok()
}

/// Validate a UTF-8 prefix that may end mid-sequence.
///
/// Returns true when every complete sequence is valid; a truncated trailing
/// sequence is allowed since the next fragment may finish it.
#[inline]
pub fn validate_utf8_partial(data: &[u8]) -> bool {
    match std::str::from_utf8(data) {
        Ok(_) => true,
        // error_len() of None means the input ended inside a sequence
        Err(e) => e.error_len().is_none(),
    }
}
