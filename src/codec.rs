//! Blob payload framing
//!
//! A dispersed payload must decode as a sequence of BN254 field elements.
//! The framing guarantees this by prefixing every 31-byte window of the raw
//! payload with a `0x00` byte, so each 32-byte symbol has a zero top byte
//! and therefore sits below the field modulus.
//!
//! Decoding needs the original payload length: the final window is
//! zero-padded and trailing payload zeros are indistinguishable from the
//! padding without it.

#![forbid(unsafe_code)]

/// Size of one pricing/encoding symbol.
pub const BYTES_PER_SYMBOL: usize = 32;
/// Raw payload bytes carried by each symbol.
pub const PAYLOAD_BYTES_PER_SYMBOL: usize = BYTES_PER_SYMBOL - 1;

/// Framing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The encoded blob does not have the length implied by the claimed
    /// payload length.
    #[error("encoded blob is {got} bytes, expected {expected} for a {payload_len}-byte payload")]
    UnexpectedLength {
        /// Length the framing demands for `payload_len`.
        expected: usize,
        /// Length actually supplied.
        got: usize,
        /// Claimed raw payload length.
        payload_len: usize,
    },
}

/// Encoded length for a raw payload of `payload_len` bytes:
/// `32 · ceil(payload_len / 31)`.
#[inline]
pub const fn encoded_payload_len(payload_len: usize) -> usize {
    payload_len.div_ceil(PAYLOAD_BYTES_PER_SYMBOL) * BYTES_PER_SYMBOL
}

/// Frame a raw payload into field-element-safe symbols.
pub fn encode_payload(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_payload_len(payload.len()));
    for window in payload.chunks(PAYLOAD_BYTES_PER_SYMBOL) {
        out.push(0);
        out.extend_from_slice(window);
        // Right-pad the final window to a full symbol.
        out.resize(out.len() + (PAYLOAD_BYTES_PER_SYMBOL - window.len()), 0);
    }
    out
}

/// Recover the raw payload from its framed form.
///
/// `payload_len` is the original length; it disambiguates trailing payload
/// zeros from window padding.
pub fn decode_payload(encoded: &[u8], payload_len: usize) -> Result<Vec<u8>, CodecError> {
    let expected = encoded_payload_len(payload_len);
    if encoded.len() != expected {
        return Err(CodecError::UnexpectedLength {
            expected,
            got: encoded.len(),
            payload_len,
        });
    }
    let mut out = Vec::with_capacity(payload_len);
    for symbol in encoded.chunks(BYTES_PER_SYMBOL) {
        out.extend_from_slice(&symbol[1..]);
    }
    out.truncate(payload_len);
    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================
