//! Blob retrieval from storage nodes
//!
//! Retrieval is interface-level in this crate: the node endpoints and the
//! transport live outside, behind [`RetrieverService`]. The caller keeps the
//! blob header and the reference block number from the dispersal step; this
//! wrapper fetches the encoded bytes and, when the original payload length
//! is known, unframes them.

#![forbid(unsafe_code)]

use crate::codec::{self, CodecError};
use crate::header::BlobHeader;
use crate::rpc::{RetrieverService, TransportError};

/// Retrieval failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrieveError {
    /// The storage-node RPC failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The fetched bytes do not unframe to the claimed payload length.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Thin client over a retrieval transport.
#[derive(Debug)]
pub struct RetrieverClient<S> {
    service: S,
}

impl<S: RetrieverService> RetrieverClient<S> {
    /// Wrap a retrieval transport.
    pub fn new(service: S) -> Self {
        Self { service }
    }

    /// Fetch the encoded (framed) blob bytes.
    pub async fn retrieve_encoded(
        &self,
        header: &BlobHeader,
        reference_block_number: u32,
        quorum_id: u8,
    ) -> Result<Vec<u8>, RetrieveError> {
        Ok(self.service.get_blob(header, reference_block_number, quorum_id).await?)
    }

    /// Fetch a blob and unframe it back to the raw payload.
    ///
    /// `payload_len` is the original payload length, which the framing
    /// cannot recover on its own.
    pub async fn retrieve_payload(
        &self,
        header: &BlobHeader,
        reference_block_number: u32,
        quorum_id: u8,
        payload_len: usize,
    ) -> Result<Vec<u8>, RetrieveError> {
        let encoded = self.retrieve_encoded(header, reference_block_number, quorum_id).await?;
        Ok(codec::decode_payload(&encoded, payload_len)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use ark_bn254::{G1Affine, G2Affine};
    use ark_ec::AffineRepr;
    use async_trait::async_trait;

    use crate::header::{BlobCommitment, PaymentMetadata};

    struct FixedBlobNode {
        encoded: Vec<u8>,
    }

    #[async_trait]
    impl RetrieverService for FixedBlobNode {
        async fn get_blob(
            &self,
            _header: &BlobHeader,
            _reference_block_number: u32,
            _quorum_id: u8,
        ) -> Result<Vec<u8>, TransportError> {
            Ok(self.encoded.clone())
        }
    }

    fn header() -> BlobHeader {
        BlobHeader::new(
            0,
            &[0],
            BlobCommitment {
                commitment: G1Affine::generator(),
                length_commitment: G2Affine::generator(),
                length_proof: G2Affine::generator(),
                length: 1,
            },
            PaymentMetadata {
                account_id: Address::ZERO,
                timestamp_ns: 0,
                cumulative_payment: U256::ZERO,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn retrieves_and_unframes_a_payload() {
        let payload = b"retrieved payload".to_vec();
        let node = FixedBlobNode { encoded: codec::encode_payload(&payload) };
        let client = RetrieverClient::new(node);

        let raw = client.retrieve_payload(&header(), 100, 0, payload.len()).await.unwrap();
        assert_eq!(raw, payload);
    }

    #[tokio::test]
    async fn wrong_payload_length_is_a_codec_error() {
        let node = FixedBlobNode { encoded: codec::encode_payload(b"abc") };
        let client = RetrieverClient::new(node);

        let err = client.retrieve_payload(&header(), 100, 0, 500).await.unwrap_err();
        assert!(matches!(err, RetrieveError::Codec(CodecError::UnexpectedLength { .. })));
    }
}
