//! secp256k1 request signing
//!
//! Every authenticated request carries a 65-byte recoverable ECDSA signature
//! `(r ‖ s ‖ v)` whose recovery byte is `0` or `1` on the wire (never the
//! Ethereum 27/28 convention). Two domains are signed:
//!
//! - **Dispersal**: the 32-byte blob key is signed directly as a prehash.
//! - **Payment-state queries**: the signed digest is
//!   `SHA256(keccak256(0x14 ‖ account ‖ be_u64(timestamp_ns)))`, keccak
//!   first, SHA-256 second. The double wrap is part of the wire protocol;
//!   changing either layer makes the service treat requests as
//!   unauthenticated.
//!
//! The account address is derived the Ethereum way:
//! `keccak256(uncompressed_pubkey[1..])[12..]`.

#![forbid(unsafe_code)]

use alloy_primitives::{keccak256, Address};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};

use crate::header::BlobKey;

/// Length of a wire signature: 32-byte `r`, 32-byte `s`, one recovery byte.
pub const SIGNATURE_SIZE: usize = 65;

/// Signing failures.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The private key material is malformed.
    #[error("invalid secp256k1 private key: {0}")]
    InvalidKey(String),
    /// The backend failed to produce a signature.
    #[error("signing failed: {0}")]
    Signature(String),
}

/// Holder of the account's secp256k1 key.
#[derive(Clone)]
pub struct BlobSigner {
    signing_key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for BlobSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobSigner").field("address", &self.address).finish_non_exhaustive()
    }
}

impl BlobSigner {
    /// Wrap an existing signing key.
    pub fn new(signing_key: SigningKey) -> Self {
        let address = public_key_to_address(signing_key.verifying_key());
        Self { signing_key, address }
    }

    /// Parse a hex private key (32 bytes, optional `0x` prefix).
    pub fn from_hex(key: &str) -> Result<Self, SignerError> {
        let stripped = key.strip_prefix("0x").unwrap_or(key);
        let bytes = hex::decode(stripped).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(SignerError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self::new(signing_key))
    }

    /// The 20-byte account address this signer authenticates as.
    #[inline]
    pub fn account_id(&self) -> Address {
        self.address
    }

    /// Sign a blob key for a `DisperseBlob` request.
    pub fn sign_blob_key(&self, blob_key: &BlobKey) -> Result<[u8; SIGNATURE_SIZE], SignerError> {
        self.sign_prehash(blob_key.as_bytes())
    }

    /// Sign a `GetPaymentState` request for the given timestamp.
    pub fn sign_payment_state_request(
        &self,
        timestamp_ns: i64,
    ) -> Result<[u8; SIGNATURE_SIZE], SignerError> {
        let digest = payment_state_request_digest(&self.address, timestamp_ns);
        self.sign_prehash(&digest)
    }

    fn sign_prehash(&self, digest: &[u8; 32]) -> Result<[u8; SIGNATURE_SIZE], SignerError> {
        let (signature, recovery_id): (Signature, RecoveryId) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|e| SignerError::Signature(e.to_string()))?;
        let mut out = [0u8; SIGNATURE_SIZE];
        out[..64].copy_from_slice(signature.to_bytes().as_slice());
        out[64] = normalize_recovery_byte(recovery_id.to_byte());
        Ok(out)
    }
}

/// Digest for payment-state authentication:
/// `SHA256(keccak256(len(account) ‖ account ‖ be_u64(timestamp_ns)))`.
pub fn payment_state_request_digest(account: &Address, timestamp_ns: i64) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(1 + Address::len_bytes() + 8);
    preimage.push(Address::len_bytes() as u8);
    preimage.extend_from_slice(account.as_slice());
    preimage.extend_from_slice(&(timestamp_ns as u64).to_be_bytes());
    let inner = keccak256(&preimage);
    Sha256::digest(inner).into()
}

/// Map the Ethereum 27/28 convention down to the wire's 0/1.
#[inline]
fn normalize_recovery_byte(v: u8) -> u8 {
    if v >= 27 {
        v - 27
    } else {
        v
    }
}

fn public_key_to_address(public: &VerifyingKey) -> Address {
    // Strip the 0x04 tag of the uncompressed SEC1 encoding.
    let uncompressed = public.to_encoded_point(false);
    let hash = keccak256(&uncompressed.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // Private key 0x...01; its address is a fixed point of every Ethereum
    // tooling stack.
    const KEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

    fn signer() -> BlobSigner {
        BlobSigner::from_hex(KEY_ONE).unwrap()
    }

    #[test]
    fn derives_the_known_address_for_key_one() {
        assert_eq!(
            signer().account_id(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(matches!(BlobSigner::from_hex("0xzz"), Err(SignerError::InvalidKey(_))));
        assert!(matches!(BlobSigner::from_hex("0xabcd"), Err(SignerError::InvalidKey(_))));
        // The zero scalar is not a valid secp256k1 key.
        let zero = format!("0x{}", "00".repeat(32));
        assert!(matches!(BlobSigner::from_hex(&zero), Err(SignerError::InvalidKey(_))));
    }

    #[test]
    fn blob_key_signature_recovers_to_the_account() {
        let signer = signer();
        let blob_key = BlobKey([0x5au8; 32]);
        let sig = signer.sign_blob_key(&blob_key).unwrap();
        assert!(sig[64] == 0 || sig[64] == 1);

        let parsed = Signature::from_slice(&sig[..64]).unwrap();
        let recovery_id = RecoveryId::from_byte(sig[64]).unwrap();
        let recovered =
            VerifyingKey::recover_from_prehash(blob_key.as_bytes(), &parsed, recovery_id).unwrap();
        assert_eq!(public_key_to_address(&recovered), signer.account_id());
    }

    #[test]
    fn payment_state_signature_recovers_to_the_account() {
        let signer = signer();
        let timestamp_ns = 1_700_000_000_000_000_000_i64;
        let sig = signer.sign_payment_state_request(timestamp_ns).unwrap();
        assert!(sig[64] == 0 || sig[64] == 1);

        let digest = payment_state_request_digest(&signer.account_id(), timestamp_ns);
        let parsed = Signature::from_slice(&sig[..64]).unwrap();
        let recovery_id = RecoveryId::from_byte(sig[64]).unwrap();
        let recovered =
            VerifyingKey::recover_from_prehash(&digest, &parsed, recovery_id).unwrap();
        assert_eq!(public_key_to_address(&recovered), signer.account_id());
    }

    #[test]
    fn payment_state_digest_binds_every_input() {
        let account = signer().account_id();
        let base = payment_state_request_digest(&account, 1);
        assert_ne!(base, payment_state_request_digest(&account, 2));
        assert_ne!(base, payment_state_request_digest(&Address::ZERO, 1));
        // Deterministic for identical inputs.
        assert_eq!(base, payment_state_request_digest(&account, 1));
    }

    #[test]
    fn recovery_byte_normalization() {
        assert_eq!(normalize_recovery_byte(0), 0);
        assert_eq!(normalize_recovery_byte(1), 1);
        assert_eq!(normalize_recovery_byte(27), 0);
        assert_eq!(normalize_recovery_byte(28), 1);
    }

    #[test]
    fn random_keys_always_produce_wire_recovery_bytes() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        for i in 0..16u8 {
            let signer = BlobSigner::new(SigningKey::random(&mut rng));
            let sig = signer.sign_blob_key(&BlobKey([i; 32])).unwrap();
            assert!(sig[64] == 0 || sig[64] == 1);

            let parsed = Signature::from_slice(&sig[..64]).unwrap();
            let recovery_id = RecoveryId::from_byte(sig[64]).unwrap();
            let recovered =
                VerifyingKey::recover_from_prehash(&[i; 32], &parsed, recovery_id).unwrap();
            assert_eq!(public_key_to_address(&recovered), signer.account_id());
        }
    }
}
