//! BN254 point (de)compression in the gnark wire format
//!
//! The disperser returns KZG commitments as **gnark-compressed** points:
//! 32 bytes for G1, 64 bytes for G2, big-endian x coordinate with a two-bit
//! flag in the most significant bits of byte 0. This module owns the byte
//! layout, the flag convention, and the y-candidate selection; all field and
//! curve arithmetic (inversion, Tonelli–Shanks square roots, curve and
//! subgroup checks) is consumed from Arkworks.
//!
//! ## Wire invariants
//!
//! - **Flags.** `0x40` = point at infinity (remaining bytes must be zero),
//!   `0x80` = the lexicographically *smaller* y was dropped at compression,
//!   `0xC0` = the larger one. `0x00` marks gnark's uncompressed form and is
//!   rejected here.
//! - **Coordinate order.** G2 serializes the x coordinate imaginary-limb
//!   first: bytes `0..32` hold `x.c1`, bytes `32..64` hold `x.c0`.
//! - **"Larger" y.** An Fp element is larger than its negation iff its
//!   canonical integer exceeds `(p − 1) / 2`. An Fp2 element compares `c1`
//!   first and falls back to `c0` when `c1 = 0`.
//!
//! Compression is the exact inverse of decompression; the round-trip is
//! pinned by tests against the known G1/G2 generator encodings.

#![forbid(unsafe_code)]

use ark_bn254::{Fq, Fq2, G1Affine, G2Affine};
use ark_ec::{short_weierstrass::SWCurveConfig, AffineRepr};
use ark_ff::{BigInteger, Field, PrimeField, Zero};

use alloy_primitives::U256;

/// Size of a gnark-compressed G1 point.
pub const COMPRESSED_G1_SIZE: usize = 32;
/// Size of a gnark-compressed G2 point.
pub const COMPRESSED_G2_SIZE: usize = 64;

const FLAG_MASK: u8 = 0xC0;
const FLAG_INFINITY: u8 = 0x40;
const FLAG_SMALLER_Y: u8 = 0x80;
const FLAG_LARGER_Y: u8 = 0xC0;

/// Failure modes of point decompression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PointError {
    /// The encoding itself is malformed (bad length, bad flag, scalar ≥ p,
    /// non-zero payload on an infinity flag).
    #[error("invalid compressed point: {0}")]
    InvalidPoint(&'static str),
    /// The x coordinate has no matching y on the curve.
    #[error("x coordinate is not on the curve")]
    NotOnCurve,
    /// The point is on the curve but outside the prime-order subgroup.
    #[error("point is not in the prime-order subgroup")]
    NotInSubgroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YFlag {
    Infinity,
    Smaller,
    Larger,
}

impl YFlag {
    fn parse(byte0: u8) -> Result<Self, PointError> {
        match byte0 & FLAG_MASK {
            FLAG_INFINITY => Ok(Self::Infinity),
            FLAG_SMALLER_Y => Ok(Self::Smaller),
            FLAG_LARGER_Y => Ok(Self::Larger),
            _ => Err(PointError::InvalidPoint("missing compression flag")),
        }
    }
}

// ---------------------------------------------------------------------------
// Fp / Fp2 byte codecs and ordering
// ---------------------------------------------------------------------------

/// Parse a big-endian base-field scalar, rejecting values ≥ p.
fn fq_from_be_bytes(bytes: &[u8; 32]) -> Result<Fq, PointError> {
    let modulus = Fq::MODULUS.to_bytes_be();
    if bytes.as_slice() >= modulus.as_slice() {
        return Err(PointError::InvalidPoint("scalar exceeds the field modulus"));
    }
    Ok(Fq::from_be_bytes_mod_order(bytes))
}

/// Canonical 32-byte big-endian encoding of a base-field scalar.
pub(crate) fn fq_to_be_bytes(x: &Fq) -> [u8; 32] {
    let raw = x.into_bigint().to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - raw.len()..].copy_from_slice(&raw);
    out
}

/// Base-field scalar as a `U256` (used by the ABI tuple encoder).
pub(crate) fn fq_to_u256(x: &Fq) -> U256 {
    U256::from_be_bytes(fq_to_be_bytes(x))
}

/// gnark's lexicographic order on Fp: larger than the negation iff the
/// canonical integer exceeds (p − 1) / 2.
fn fq_is_larger(y: &Fq) -> bool {
    y.into_bigint() > Fq::MODULUS_MINUS_ONE_DIV_TWO
}

/// gnark's lexicographic order on Fp2: `c1` decides, `c0` breaks the tie.
fn fq2_is_larger(y: &Fq2) -> bool {
    if y.c1.is_zero() {
        fq_is_larger(&y.c0)
    } else {
        fq_is_larger(&y.c1)
    }
}

// ---------------------------------------------------------------------------
// G1
// ---------------------------------------------------------------------------

/// Decompress a 32-byte gnark-encoded G1 point.
pub fn decompress_g1(bytes: &[u8]) -> Result<G1Affine, PointError> {
    let bytes: &[u8; COMPRESSED_G1_SIZE] = bytes
        .try_into()
        .map_err(|_| PointError::InvalidPoint("G1 encoding must be 32 bytes"))?;
    let flag = YFlag::parse(bytes[0])?;

    let mut x_bytes = *bytes;
    x_bytes[0] &= !FLAG_MASK;

    if flag == YFlag::Infinity {
        if x_bytes != [0u8; 32] {
            return Err(PointError::InvalidPoint("non-zero payload on infinity flag"));
        }
        return Ok(G1Affine::zero());
    }

    let x = fq_from_be_bytes(&x_bytes)?;
    let rhs = x.square() * x + ark_bn254::g1::Config::COEFF_B;
    let y = rhs.sqrt().ok_or(PointError::NotOnCurve)?;
    let y = if fq_is_larger(&y) == (flag == YFlag::Larger) { y } else { -y };

    // y is a root of x^3 + b, so the point is on the curve; G1 has cofactor 1.
    Ok(G1Affine::new_unchecked(x, y))
}

/// Compress a G1 point to the 32-byte gnark encoding.
pub fn compress_g1(point: &G1Affine) -> [u8; COMPRESSED_G1_SIZE] {
    let Some((x, y)) = point.xy() else {
        let mut out = [0u8; COMPRESSED_G1_SIZE];
        out[0] = FLAG_INFINITY;
        return out;
    };
    let mut out = fq_to_be_bytes(x);
    out[0] |= if fq_is_larger(y) { FLAG_LARGER_Y } else { FLAG_SMALLER_Y };
    out
}

// ---------------------------------------------------------------------------
// G2
// ---------------------------------------------------------------------------

/// Decompress a 64-byte gnark-encoded G2 point.
///
/// Unlike G1, the G2 cofactor is non-trivial, so a successful square root is
/// followed by a subgroup check.
pub fn decompress_g2(bytes: &[u8]) -> Result<G2Affine, PointError> {
    let bytes: &[u8; COMPRESSED_G2_SIZE] = bytes
        .try_into()
        .map_err(|_| PointError::InvalidPoint("G2 encoding must be 64 bytes"))?;
    let flag = YFlag::parse(bytes[0])?;

    let mut c1_bytes: [u8; 32] = bytes[..32].try_into().expect("split is 32 bytes");
    c1_bytes[0] &= !FLAG_MASK;
    let c0_bytes: [u8; 32] = bytes[32..].try_into().expect("split is 32 bytes");

    if flag == YFlag::Infinity {
        if c1_bytes != [0u8; 32] || c0_bytes != [0u8; 32] {
            return Err(PointError::InvalidPoint("non-zero payload on infinity flag"));
        }
        return Ok(G2Affine::zero());
    }

    let x = Fq2::new(fq_from_be_bytes(&c0_bytes)?, fq_from_be_bytes(&c1_bytes)?);
    let rhs = x.square() * x + ark_bn254::g2::Config::COEFF_B;
    let y = rhs.sqrt().ok_or(PointError::NotOnCurve)?;
    let y = if fq2_is_larger(&y) == (flag == YFlag::Larger) { y } else { -y };

    let point = G2Affine::new_unchecked(x, y);
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(PointError::NotInSubgroup);
    }
    Ok(point)
}

/// Compress a G2 point to the 64-byte gnark encoding (`x.c1` first).
pub fn compress_g2(point: &G2Affine) -> [u8; COMPRESSED_G2_SIZE] {
    let mut out = [0u8; COMPRESSED_G2_SIZE];
    let Some((x, y)) = point.xy() else {
        out[0] = FLAG_INFINITY;
        return out;
    };
    out[..32].copy_from_slice(&fq_to_be_bytes(&x.c1));
    out[32..].copy_from_slice(&fq_to_be_bytes(&x.c0));
    out[0] |= if fq2_is_larger(y) { FLAG_LARGER_Y } else { FLAG_SMALLER_Y };
    out
}

// ============================================================================
// Tests
// ============================================================================
