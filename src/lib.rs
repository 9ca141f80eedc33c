//! Crate root: public surface and protocol-wide invariants
//!
//! Client for the EigenDA data-availability service. One dispersal flows
//! raw bytes → payload framing → server commitment (decompressed on
//! receipt) → payment allocation → canonical header → signature →
//! submission, and the server's blob key must match the one derived
//! locally, bit for bit.
//!
//! ## Invariants (wire-aligned)
//!
//! - **Field & curve.** Commitment points live on BN254
//!   (`ark_bn254::{G1Affine, G2Affine}`) and arrive gnark-compressed: flags
//!   `0x40`/`0x80`/`0xC0` in the two MSBs of byte 0, big-endian x, G2
//!   imaginary limb first. We **forbid unsafe** throughout the crate.
//!
//! - **Blob key.** `keccak256` of the header's Solidity ABI tuple
//!   (`EigenDATypesV2` layout). Any single-bit change to version, quorums,
//!   commitment, or payment metadata changes the key.
//!
//! - **Payments.** Reservation bandwidth is budgeted into fixed periods
//!   (three-slot circular buffer, overflow into the next period only);
//!   on-demand payments advance a cumulative wei counter that never
//!   decreases, and a server resync can only push it forward.
//!
//! - **Signatures.** Recoverable secp256k1, recovery byte `0`/`1` on the
//!   wire. Payment-state queries sign `SHA256(keccak256(...))`; both
//!   layers are load-bearing.
//!
//! Violations surface as precise typed errors, never as corrupted wire
//! state: every payment mutation is rolled back when the submission it paid
//! for does not land.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Payment accounting: reservations, period bins, cumulative counter.
pub mod accountant;
/// gnark-format BN254 point (de)compression.
pub mod bn254;
/// Dispersal orchestration and status polling.
pub mod client;
/// 31-byte payload framing to field-element-safe symbols.
pub mod codec;
/// `EIGENDA_*` environment configuration.
pub mod config;
/// Blob headers, payment metadata, blob-key derivation.
pub mod header;
/// Compiled-in network table.
pub mod network;
/// Blob retrieval from storage nodes.
pub mod retriever;
/// Wire-level message types and service traits.
pub mod rpc;
/// secp256k1 request signing and address derivation.
pub mod signer;

// ============================================================================
// Canonical re-exports
// ============================================================================

pub use accountant::{
    Accountant, AccountantError, AccountingMode, Allocation, CommitId, PaymentMethod,
    PaymentStateSnapshot, PeriodRecord, ProtocolParams, Reservation,
};
pub use client::{DisperseError, DisperserClient, DisperserClientBuilder};
pub use codec::{decode_payload, encode_payload, CodecError};
pub use config::{ClientSettings, ConfigError};
pub use header::{BlobCommitment, BlobHeader, BlobKey, HeaderError, PaymentMetadata};
pub use network::{EigenDaNetwork, NetworkDescriptor};
pub use retriever::{RetrieveError, RetrieverClient};
pub use rpc::{
    payment_from_wire, payment_to_wire, BlobStatus, DisperserService, RetrieverService,
    TransportError,
};
pub use signer::{BlobSigner, SignerError};
