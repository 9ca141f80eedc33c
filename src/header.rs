//! Blob headers, payment metadata, and the canonical blob key
//!
//! The blob key is the keccak digest of the header's Solidity ABI tuple and
//! must be **bit-identical** to the digest the service computes for the same
//! header. The tuple layout follows the on-chain `EigenDATypesV2` structs:
//!
//! ```text
//! (uint16 version,
//!  bytes  quorumNumbers,                    // one byte per quorum, packed
//!  (  (uint256 X, uint256 Y),               // G1 commitment
//!     (uint256[2] X, uint256[2] Y),         // G2 length commitment, [c1, c0]
//!     (uint256[2] X, uint256[2] Y),         // G2 length proof,      [c1, c0]
//!     uint32 length),
//!  bytes32 paymentMetadataHash)
//! ```
//!
//! G2 limbs are ordered imaginary-first, the EVM precompile convention.
//! The payment metadata hash is itself the keccak of a static tuple
//! `(address, uint256 timestamp_ns, uint256 cumulative_payment)`.

#![forbid(unsafe_code)]

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use ark_bn254::{Fq2, G1Affine, G2Affine};
use ark_ec::AffineRepr;
use ark_ff::Zero;

use crate::bn254::{self, fq_to_u256, PointError};

/// Blob versions the service currently accepts.
pub const SUPPORTED_BLOB_VERSIONS: &[u16] = &[0];

mod abi {
    //! Solidity tuple mirrors of the on-chain `EigenDATypesV2` structs.
    #![allow(missing_docs)]

    use alloy_sol_types::sol;

    sol! {
        struct G1PointSol {
            uint256 X;
            uint256 Y;
        }

        struct G2PointSol {
            uint256[2] X;
            uint256[2] Y;
        }

        struct BlobCommitmentSol {
            G1PointSol commitment;
            G2PointSol lengthCommitment;
            G2PointSol lengthProof;
            uint32 length;
        }

        struct BlobHeaderSol {
            uint16 version;
            bytes quorumNumbers;
            BlobCommitmentSol commitment;
            bytes32 paymentMetadataHash;
        }

        struct PaymentMetadataSol {
            address accountID;
            uint256 timestamp;
            uint256 cumulativePayment;
        }
    }
}

use abi::{BlobCommitmentSol, BlobHeaderSol, G1PointSol, G2PointSol, PaymentMetadataSol};

/// Header construction failures (the caller's inputs are at fault).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    /// The version is outside [`SUPPORTED_BLOB_VERSIONS`].
    #[error("blob version {0} is not supported")]
    UnsupportedVersion(u16),
    /// No quorums were requested.
    #[error("quorum list is empty")]
    EmptyQuorums,
    /// The quorum list names the same quorum twice.
    #[error("quorum list contains duplicates")]
    DuplicateQuorums,
}

/// 32-byte canonical blob identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobKey(pub [u8; 32]);

impl BlobKey {
    /// Borrow the raw digest bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering (the form status queries take on the wire).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex blob key (optional `0x` prefix).
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let mut out = [0u8; 32];
        hex::decode_to_slice(stripped, &mut out)?;
        Ok(Self(out))
    }
}

impl std::fmt::Display for BlobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for BlobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlobKey({})", self.to_hex())
    }
}

/// Payment record bound into a blob header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentMetadata {
    /// Paying account (derived from the signer's key).
    pub account_id: Address,
    /// Dispersal timestamp in Unix nanoseconds.
    pub timestamp_ns: i64,
    /// New cumulative on-demand total; zero when a reservation pays.
    pub cumulative_payment: U256,
}

impl PaymentMetadata {
    /// keccak of the static ABI tuple `(address, uint256, uint256)`.
    pub fn hash(&self) -> B256 {
        let tuple = PaymentMetadataSol {
            accountID: self.account_id,
            timestamp: U256::from(self.timestamp_ns as u64),
            cumulativePayment: self.cumulative_payment,
        };
        keccak256(tuple.abi_encode())
    }

    /// Wire form of the cumulative payment: big-endian, leading zeros
    /// stripped, empty for zero (and thus for reservation-backed blobs).
    pub fn wire_cumulative_payment(&self) -> Bytes {
        if self.cumulative_payment.is_zero() {
            Bytes::new()
        } else {
            Bytes::from(self.cumulative_payment.to_be_bytes_trimmed_vec())
        }
    }
}

/// KZG commitment triple returned by the disperser, decompressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobCommitment {
    /// G1 commitment to the blob polynomial.
    pub commitment: G1Affine,
    /// G2 commitment binding the blob length.
    pub length_commitment: G2Affine,
    /// G2 proof for the length claim.
    pub length_proof: G2Affine,
    /// Number of 32-byte symbols in the encoded blob.
    pub length: u32,
}

impl BlobCommitment {
    /// Decompress a commitment from its gnark wire encoding.
    pub fn from_compressed(
        commitment: &[u8],
        length_commitment: &[u8],
        length_proof: &[u8],
        length: u32,
    ) -> Result<Self, PointError> {
        Ok(Self {
            commitment: bn254::decompress_g1(commitment)?,
            length_commitment: bn254::decompress_g2(length_commitment)?,
            length_proof: bn254::decompress_g2(length_proof)?,
            length,
        })
    }

    fn to_sol(&self) -> BlobCommitmentSol {
        BlobCommitmentSol {
            commitment: g1_to_sol(&self.commitment),
            lengthCommitment: g2_to_sol(&self.length_commitment),
            lengthProof: g2_to_sol(&self.length_proof),
            length: self.length,
        }
    }
}

fn g1_to_sol(point: &G1Affine) -> G1PointSol {
    // The contracts encode the point at infinity as (0, 0).
    match point.xy() {
        Some((x, y)) => G1PointSol { X: fq_to_u256(x), Y: fq_to_u256(y) },
        None => G1PointSol { X: U256::ZERO, Y: U256::ZERO },
    }
}

fn g2_to_sol(point: &G2Affine) -> G2PointSol {
    let zero = Fq2::zero();
    let (x, y) = point.xy().map(|(x, y)| (*x, *y)).unwrap_or((zero, zero));
    G2PointSol {
        X: [fq_to_u256(&x.c1), fq_to_u256(&x.c0)],
        Y: [fq_to_u256(&y.c1), fq_to_u256(&y.c0)],
    }
}

/// Versioned blob header; hashing it yields the blob key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobHeader {
    /// Blob format version.
    pub version: u16,
    /// Target quorums, sorted and unique.
    pub quorum_numbers: Vec<u8>,
    /// Decompressed KZG commitment triple.
    pub commitment: BlobCommitment,
    /// Payment record for this dispersal.
    pub payment: PaymentMetadata,
}

impl BlobHeader {
    /// Build a header, validating version and quorum list.
    ///
    /// The quorum list is sorted; duplicates are rejected rather than
    /// silently collapsed so the caller learns about the bad input.
    pub fn new(
        version: u16,
        quorum_numbers: &[u8],
        commitment: BlobCommitment,
        payment: PaymentMetadata,
    ) -> Result<Self, HeaderError> {
        if !SUPPORTED_BLOB_VERSIONS.contains(&version) {
            return Err(HeaderError::UnsupportedVersion(version));
        }
        let quorum_numbers = normalize_quorums(quorum_numbers)?;
        Ok(Self { version, quorum_numbers, commitment, payment })
    }

    /// Canonical blob key: keccak of the header's ABI tuple.
    pub fn blob_key(&self) -> BlobKey {
        let tuple = BlobHeaderSol {
            version: self.version,
            quorumNumbers: Bytes::copy_from_slice(&self.quorum_numbers),
            commitment: self.commitment.to_sol(),
            paymentMetadataHash: self.payment.hash(),
        };
        BlobKey(keccak256(tuple.abi_encode()).0)
    }
}

/// Sort a quorum list and reject empties and duplicates.
pub fn normalize_quorums(quorums: &[u8]) -> Result<Vec<u8>, HeaderError> {
    if quorums.is_empty() {
        return Err(HeaderError::EmptyQuorums);
    }
    let mut sorted = quorums.to_vec();
    sorted.sort_unstable();
    if sorted.windows(2).any(|w| w[0] == w[1]) {
        return Err(HeaderError::DuplicateQuorums);
    }
    Ok(sorted)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ec::CurveGroup;

    fn test_commitment() -> BlobCommitment {
        let g2_double = (G2Affine::generator().into_group() + G2Affine::generator()).into_affine();
        BlobCommitment {
            commitment: G1Affine::generator(),
            length_commitment: G2Affine::generator(),
            length_proof: g2_double,
            length: 1,
        }
    }

    fn test_payment() -> PaymentMetadata {
        PaymentMetadata {
            account_id: "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".parse().unwrap(),
            timestamp_ns: 1_700_000_000_000_000_000,
            cumulative_payment: U256::ZERO,
        }
    }

    fn test_header() -> BlobHeader {
        BlobHeader::new(0, &[0, 1], test_commitment(), test_payment()).unwrap()
    }

    #[test]
    fn blob_key_is_deterministic() {
        assert_eq!(test_header().blob_key(), test_header().blob_key());
    }

    #[test]
    fn blob_key_tuple_layout_is_pinned() {
        // abi.encode of a dynamic struct: one offset word, then the tuple.
        // Head: version + quorumNumbers offset + 11-word commitment + hash
        // = 14 words; tail: quorum length word + one padded data word.
        let header = test_header();
        let tuple = BlobHeaderSol {
            version: header.version,
            quorumNumbers: Bytes::copy_from_slice(&header.quorum_numbers),
            commitment: header.commitment.to_sol(),
            paymentMetadataHash: header.payment.hash(),
        };
        let encoded = tuple.abi_encode();
        assert_eq!(encoded.len(), 32 * (1 + 14 + 2));

        // Outer offset points just past itself.
        assert_eq!(U256::from_be_slice(&encoded[..32]), U256::from(32));
        // First head word is the version.
        assert_eq!(U256::from_be_slice(&encoded[32..64]), U256::from(header.version));
        // quorumNumbers offset is relative to the tuple start: 14 words.
        assert_eq!(U256::from_be_slice(&encoded[64..96]), U256::from(14 * 32));
        // Tail: length 2, then the packed quorum bytes.
        let tail = &encoded[32 + 14 * 32..];
        assert_eq!(U256::from_be_slice(&tail[..32]), U256::from(2));
        assert_eq!(&tail[32..34], &[0, 1]);
    }

    #[test]
    fn blob_key_changes_with_every_field() {
        let base = test_header().blob_key();

        let mut quorums = test_header();
        quorums.quorum_numbers = vec![0];
        assert_ne!(quorums.blob_key(), base);

        let mut commitment = test_header();
        commitment.commitment.length = 2;
        assert_ne!(commitment.blob_key(), base);

        let mut payment = test_header();
        payment.payment.cumulative_payment = U256::from(1u64);
        assert_ne!(payment.blob_key(), base);

        let mut timestamp = test_header();
        timestamp.payment.timestamp_ns += 1;
        assert_ne!(timestamp.blob_key(), base);
    }

    #[test]
    fn payment_hash_is_a_static_tuple() {
        // Three static fields, no offsets: exactly 96 encoded bytes.
        let payment = test_payment();
        let tuple = PaymentMetadataSol {
            accountID: payment.account_id,
            timestamp: U256::from(payment.timestamp_ns as u64),
            cumulativePayment: payment.cumulative_payment,
        };
        assert_eq!(tuple.abi_encode().len(), 96);
        assert_eq!(payment.hash(), payment.hash());
        let mut other = payment;
        other.cumulative_payment = U256::from(7u64);
        assert_ne!(other.hash(), test_payment().hash());
    }

    #[test]
    fn wire_cumulative_payment_strips_leading_zeros() {
        let mut payment = test_payment();
        assert!(payment.wire_cumulative_payment().is_empty());

        payment.cumulative_payment = U256::from(1_830_912_000_000_000u64);
        let wire = payment.wire_cumulative_payment();
        assert_eq!(wire.first(), Some(&0x06u8));
        assert_eq!(wire.len(), 7);
        assert_eq!(U256::from_be_slice(&wire), payment.cumulative_payment);
    }

    #[test]
    fn header_validation() {
        let commitment = test_commitment();
        let payment = test_payment();
        assert_eq!(
            BlobHeader::new(3, &[0], commitment.clone(), payment.clone()),
            Err(HeaderError::UnsupportedVersion(3))
        );
        assert_eq!(
            BlobHeader::new(0, &[], commitment.clone(), payment.clone()),
            Err(HeaderError::EmptyQuorums)
        );
        assert_eq!(
            BlobHeader::new(0, &[1, 0, 1], commitment.clone(), payment.clone()),
            Err(HeaderError::DuplicateQuorums)
        );
        // Unsorted input is accepted and normalized.
        let header = BlobHeader::new(0, &[1, 0], commitment, payment).unwrap();
        assert_eq!(header.quorum_numbers, vec![0, 1]);
    }

    #[test]
    fn blob_key_from_wire_commitment_fixture() {
        // Compressed generator encodings, as they arrive from the service:
        // G1 generator (x = 1, smaller y), G2 generator (x.c1 leads with
        // 0x19, smaller y).
        let g1_hex = "8000000000000000000000000000000000000000000000000000000000000001";
        let g2_hex = "998e9393920d483a7260bfb731fb5d25f1aa493335a9e71297e485b7aef312c2\
                      1800deef121f1e76426a00665e5c4479674322d4f75edadd46debd5cd992f6ed";
        let commitment = BlobCommitment::from_compressed(
            &hex::decode(g1_hex).unwrap(),
            &hex::decode(g2_hex).unwrap(),
            &hex::decode(g2_hex).unwrap(),
            1,
        )
        .unwrap();
        assert_eq!(commitment.commitment, G1Affine::generator());
        assert_eq!(commitment.length_commitment, G2Affine::generator());

        let header = BlobHeader::new(0, &[0, 1], commitment, test_payment()).unwrap();
        let key = header.blob_key();
        // The key is a pure function of the header; recomputing from the
        // same wire bytes must reproduce it.
        assert_eq!(key, header.blob_key());
        assert_ne!(key.0, [0u8; 32]);
    }

    #[test]
    fn blob_key_hex_round_trip() {
        let key = test_header().blob_key();
        assert_eq!(BlobKey::from_hex(&key.to_hex()).unwrap(), key);
        assert_eq!(BlobKey::from_hex(&format!("0x{key}")).unwrap(), key);
        assert_eq!(key.to_hex().len(), 64);
    }
}
