//! Wire-level types for the disperser and retriever services
//!
//! The generated gRPC stubs and the transport live outside this crate; the
//! client consumes them through the [`DisperserService`] and
//! [`RetrieverService`] traits, whose messages mirror the protobuf
//! field-for-field. Tests back the traits with in-process mocks.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::accountant::{AllQuorumsPaymentSnapshot, PaymentStateSnapshot};
use crate::header::BlobHeader;

/// Decode a wire payment amount: big-endian bytes, leading zeros stripped,
/// empty meaning zero. `None` if the value does not fit 256 bits.
pub fn payment_from_wire(bytes: &[u8]) -> Option<U256> {
    if bytes.len() > 32 {
        return None;
    }
    Some(U256::from_be_slice(bytes))
}

/// Encode a payment amount to its wire form (inverse of
/// [`payment_from_wire`]).
pub fn payment_to_wire(value: U256) -> Vec<u8> {
    if value.is_zero() {
        Vec::new()
    } else {
        value.to_be_bytes_trimmed_vec()
    }
}

/// Transport and service-side failures, as surfaced by the RPC layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection-level failure: refused, reset, TLS, stream broken.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The call did not complete within its deadline.
    #[error("rpc deadline exceeded")]
    DeadlineExceeded,
    /// The service rejected the request's signature.
    #[error("signature rejected by the service: {0}")]
    SignatureRejected(String),
    /// The service refused the payment without consuming it.
    #[error("payment rejected by the service: {0}")]
    PaymentRejected(String),
}

/// Dispersal lifecycle status. Discriminants are wire-fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum BlobStatus {
    Unknown = 0,
    Queued = 1,
    Encoded = 2,
    GatheringSignatures = 3,
    Complete = 4,
    Failed = 5,
}

impl BlobStatus {
    /// Decode a wire status code.
    pub fn from_wire(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::Queued),
            2 => Some(Self::Encoded),
            3 => Some(Self::GatheringSignatures),
            4 => Some(Self::Complete),
            5 => Some(Self::Failed),
            _ => None,
        }
    }

    /// The wire status code.
    #[inline]
    pub const fn wire_code(self) -> i32 {
        self as i32
    }

    /// Whether the service took responsibility for the blob.
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Queued | Self::Encoded | Self::GatheringSignatures | Self::Complete)
    }
}

/// Reply to `GetBlobCommitment`: gnark-compressed points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBlobCommitment {
    pub commitment: Vec<u8>,
    pub length_commitment: Vec<u8>,
    pub length_proof: Vec<u8>,
    pub length: u32,
}

/// Authenticated `GetPaymentState*` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentStateRequest {
    pub account_id: Address,
    pub timestamp_ns: i64,
    /// 65-byte recoverable signature over the payment-state digest.
    pub signature: Vec<u8>,
}

/// `DisperseBlob` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisperseBlobRequest {
    pub blob_header: BlobHeader,
    /// Encoded (framed) blob bytes.
    pub data: Vec<u8>,
    /// 65-byte recoverable signature over the blob key.
    pub signature: Vec<u8>,
}

/// `DisperseBlob` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisperseBlobReply {
    pub result: BlobStatus,
    /// Blob key as the *server* computed it; the client cross-checks.
    pub blob_key: Vec<u8>,
}

/// `GetBlobStatus` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobStatusReply {
    pub status: BlobStatus,
}

/// The disperser's RPC surface, as the client consumes it.
#[async_trait]
pub trait DisperserService: Send + Sync {
    /// Ask the service to commit to the (already encoded) blob.
    async fn get_blob_commitment(
        &self,
        data: &[u8],
    ) -> Result<CompressedBlobCommitment, TransportError>;

    /// Fetch the account-wide payment state.
    async fn get_payment_state(
        &self,
        request: PaymentStateRequest,
    ) -> Result<PaymentStateSnapshot, TransportError>;

    /// Fetch the per-quorum payment state.
    async fn get_payment_state_for_all_quorums(
        &self,
        request: PaymentStateRequest,
    ) -> Result<AllQuorumsPaymentSnapshot, TransportError>;

    /// Submit a signed blob.
    async fn disperse_blob(
        &self,
        request: DisperseBlobRequest,
    ) -> Result<DisperseBlobReply, TransportError>;

    /// Poll the status of a dispersed blob by its hex key.
    async fn get_blob_status(&self, blob_key_hex: String)
        -> Result<BlobStatusReply, TransportError>;
}

/// The retrieval-node RPC surface.
#[async_trait]
pub trait RetrieverService: Send + Sync {
    /// Fetch the encoded bytes of a blob from storage nodes.
    async fn get_blob(
        &self,
        header: &BlobHeader,
        reference_block_number: u32,
        quorum_id: u8,
    ) -> Result<Vec<u8>, TransportError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_wire_fixed() {
        let table = [
            (BlobStatus::Unknown, 0),
            (BlobStatus::Queued, 1),
            (BlobStatus::Encoded, 2),
            (BlobStatus::GatheringSignatures, 3),
            (BlobStatus::Complete, 4),
            (BlobStatus::Failed, 5),
        ];
        for (status, code) in table {
            assert_eq!(status.wire_code(), code);
            assert_eq!(BlobStatus::from_wire(code), Some(status));
        }
        assert_eq!(BlobStatus::from_wire(6), None);
        assert_eq!(BlobStatus::from_wire(-1), None);
    }

    #[test]
    fn wire_payment_round_trip() {
        for value in [
            U256::ZERO,
            U256::from(1u64),
            U256::from(1_830_912_000_000_000u64),
            U256::MAX,
        ] {
            let wire = payment_to_wire(value);
            assert_eq!(payment_from_wire(&wire), Some(value));
            // Stripped form: no leading zero byte unless empty.
            assert!(wire.first() != Some(&0));
        }
        assert!(payment_to_wire(U256::ZERO).is_empty());
        assert_eq!(payment_from_wire(&[0u8; 33]), None);
    }

    #[test]
    fn acceptance_partition() {
        for status in [
            BlobStatus::Queued,
            BlobStatus::Encoded,
            BlobStatus::GatheringSignatures,
            BlobStatus::Complete,
        ] {
            assert!(status.is_accepted());
        }
        assert!(!BlobStatus::Unknown.is_accepted());
        assert!(!BlobStatus::Failed.is_accepted());
    }
}
