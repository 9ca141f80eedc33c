//! Dispersal client
//!
//! Orchestrates one dispersal end to end:
//!
//! 1. frame the payload ([`crate::codec`]);
//! 2. fetch and decompress the KZG commitment;
//! 3. under the accountant lock: resync payment state, allocate a payment;
//! 4. build the header and derive the blob key;
//! 5. sign the key;
//! 6. submit, then cross-check the server's blob key against the local one.
//!
//! The accountant lock is held from the resync until the allocation is
//! committed or rolled back, so concurrent `disperse_blob` calls from a
//! worker pool serialize on payment state and observe strictly monotone
//! cumulative totals. Any failure after the allocation (transport error,
//! deadline, key mismatch, rejected payment, a `FAILED` reply) rolls the
//! allocation back before surfacing.

#![forbid(unsafe_code)]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::accountant::{
    Accountant, AccountantError, AccountingMode, PaymentStateSnapshot, ProtocolParams,
};
use crate::bn254::PointError;
use crate::codec;
use crate::header::{BlobCommitment, BlobHeader, BlobKey, HeaderError, PaymentMetadata};
use crate::rpc::{
    BlobStatus, DisperseBlobRequest, DisperserService, PaymentStateRequest, TransportError,
};
use crate::signer::{BlobSigner, SignerError};

/// Default per-RPC deadline.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything that can go wrong in a dispersal.
#[derive(Debug, thiserror::Error)]
pub enum DisperseError {
    /// The raw payload is empty.
    #[error("payload is empty")]
    EmptyPayload,
    /// Bad version or quorum list.
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// The server returned a malformed commitment point.
    #[error(transparent)]
    Point(#[from] PointError),
    /// The server's commitment disagrees with the local encoding.
    #[error("commitment length mismatch: server reported {server} symbols, encoded payload has {local}")]
    CommitmentMismatch {
        /// Symbol count in the server's commitment.
        server: u32,
        /// Symbol count of the locally encoded payload.
        local: u32,
    },
    /// Neither payment regime can cover the blob.
    #[error(transparent)]
    Accountant(#[from] AccountantError),
    /// Key handling or signing failed.
    #[error(transparent)]
    Signer(#[from] SignerError),
    /// The RPC layer failed; the allocation was rolled back.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server computed a different blob key, which indicates a codec or
    /// field-ordering bug on one side. Fatal for this dispersal.
    #[error("server blob key 0x{server} does not match locally computed {local}")]
    BlobKeyMismatch {
        /// Locally derived key.
        local: BlobKey,
        /// Server-computed key, hex.
        server: String,
    },
    /// The server did not accept the blob.
    #[error("dispersal rejected with status {0:?}")]
    ServerFailure(BlobStatus),
    /// The system clock reads before the Unix epoch.
    #[error("system clock is before the unix epoch")]
    Clock,
}

/// Builder for [`DisperserClient`].
pub struct DisperserClientBuilder<S> {
    service: S,
    signer: BlobSigner,
    params: ProtocolParams,
    rpc_timeout: Duration,
    per_quorum_accounting: bool,
}

impl<S: DisperserService> DisperserClientBuilder<S> {
    /// Start a builder around a transport and a signer.
    pub fn new(service: S, signer: BlobSigner) -> Self {
        Self {
            service,
            signer,
            params: ProtocolParams::default(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            per_quorum_accounting: false,
        }
    }

    /// Seed pricing/period constants (refreshed from the server on every
    /// dispersal; these only matter before the first resync).
    pub fn params(mut self, params: ProtocolParams) -> Self {
        self.params = params;
        self
    }

    /// Per-RPC deadline.
    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Track reservations per quorum instead of account-wide.
    pub fn per_quorum_accounting(mut self, enabled: bool) -> Self {
        self.per_quorum_accounting = enabled;
        self
    }

    /// Build the client.
    pub fn build(self) -> DisperserClient<S> {
        let accountant = if self.per_quorum_accounting {
            Accountant::new_per_quorum(self.params)
        } else {
            Accountant::new(self.params)
        };
        DisperserClient {
            service: self.service,
            signer: self.signer,
            accountant: Mutex::new(accountant),
            rpc_timeout: self.rpc_timeout,
        }
    }
}

/// Client for the dispersal service; shareable across a worker pool.
#[derive(Debug)]
pub struct DisperserClient<S> {
    service: S,
    signer: BlobSigner,
    accountant: Mutex<Accountant>,
    rpc_timeout: Duration,
}

impl<S: DisperserService> DisperserClient<S> {
    /// Client with default settings (account-wide accounting).
    pub fn new(service: S, signer: BlobSigner) -> Self {
        DisperserClientBuilder::new(service, signer).build()
    }

    /// Disperse a raw payload to the given quorums.
    ///
    /// Returns the server's acceptance status and the blob key, which the
    /// caller needs for status polling and retrieval.
    pub async fn disperse_blob(
        &self,
        payload: &[u8],
        blob_version: u16,
        quorums: &[u8],
    ) -> Result<(BlobStatus, BlobKey), DisperseError> {
        if payload.is_empty() {
            return Err(DisperseError::EmptyPayload);
        }
        let quorums = crate::header::normalize_quorums(quorums)?;

        let encoded = codec::encode_payload(payload);
        let local_symbols = (encoded.len() / codec::BYTES_PER_SYMBOL) as u32;

        let reply = self.rpc(self.service.get_blob_commitment(&encoded)).await?;
        let commitment = BlobCommitment::from_compressed(
            &reply.commitment,
            &reply.length_commitment,
            &reply.length_proof,
            reply.length,
        )?;
        if commitment.length != local_symbols {
            return Err(DisperseError::CommitmentMismatch {
                server: commitment.length,
                local: local_symbols,
            });
        }

        let timestamp_ns = unix_now_ns()?;
        let mut accountant = self.accountant.lock().await;
        self.resync(&mut accountant, timestamp_ns).await?;

        let symbols = accountant.params().blob_symbols(encoded.len());
        let allocation = accountant.allocate(symbols, &quorums, timestamp_ns)?;

        let payment = PaymentMetadata {
            account_id: self.signer.account_id(),
            timestamp_ns,
            cumulative_payment: allocation.cumulative_payment(),
        };
        let header = BlobHeader::new(blob_version, &quorums, commitment, payment)?;
        let blob_key = header.blob_key();
        let signature = match self.signer.sign_blob_key(&blob_key) {
            Ok(sig) => sig,
            Err(e) => {
                accountant.rollback(allocation.commit_id);
                return Err(e.into());
            }
        };

        debug!(%blob_key, symbols, "submitting blob");
        let request = DisperseBlobRequest {
            blob_header: header,
            data: encoded,
            signature: signature.to_vec(),
        };
        let reply = match self.rpc(self.service.disperse_blob(request)).await {
            Ok(reply) => reply,
            Err(e) => {
                accountant.rollback(allocation.commit_id);
                return Err(e.into());
            }
        };

        if reply.blob_key.as_slice() != blob_key.as_bytes() {
            accountant.rollback(allocation.commit_id);
            return Err(DisperseError::BlobKeyMismatch {
                local: blob_key,
                server: hex::encode(&reply.blob_key),
            });
        }
        if !reply.result.is_accepted() {
            accountant.rollback(allocation.commit_id);
            return Err(DisperseError::ServerFailure(reply.result));
        }

        accountant.commit(allocation.commit_id);
        drop(accountant);

        info!(%blob_key, status = ?reply.result, "blob dispersed");
        Ok((reply.result, blob_key))
    }

    /// Poll the status of a dispersed blob.
    pub async fn blob_status(&self, blob_key: &BlobKey) -> Result<BlobStatus, DisperseError> {
        let reply = self.rpc(self.service.get_blob_status(blob_key.to_hex())).await?;
        Ok(reply.status)
    }

    /// Fetch the server's account-wide payment state without dispersing.
    pub async fn payment_state(&self) -> Result<PaymentStateSnapshot, DisperseError> {
        let timestamp_ns = unix_now_ns()?;
        let request = self.payment_state_request(timestamp_ns)?;
        Ok(self.rpc(self.service.get_payment_state(request)).await?)
    }

    /// The account address dispersals are billed to.
    pub fn account_id(&self) -> alloy_primitives::Address {
        self.signer.account_id()
    }

    async fn resync(
        &self,
        accountant: &mut Accountant,
        timestamp_ns: i64,
    ) -> Result<(), DisperseError> {
        let request = self.payment_state_request(timestamp_ns)?;
        match accountant.mode() {
            AccountingMode::Simple => {
                let snapshot = self.rpc(self.service.get_payment_state(request)).await?;
                accountant.sync(snapshot);
            }
            AccountingMode::PerQuorum => {
                let snapshot =
                    self.rpc(self.service.get_payment_state_for_all_quorums(request)).await?;
                accountant.sync_all_quorums(snapshot);
            }
        }
        Ok(())
    }

    fn payment_state_request(
        &self,
        timestamp_ns: i64,
    ) -> Result<PaymentStateRequest, DisperseError> {
        let signature = self.signer.sign_payment_state_request(timestamp_ns)?;
        Ok(PaymentStateRequest {
            account_id: self.signer.account_id(),
            timestamp_ns,
            signature: signature.to_vec(),
        })
    }

    /// Run one RPC under the configured deadline.
    async fn rpc<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        match tokio::time::timeout(self.rpc_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::DeadlineExceeded),
        }
    }
}

fn unix_now_ns() -> Result<i64, DisperseError> {
    let elapsed =
        SystemTime::now().duration_since(UNIX_EPOCH).map_err(|_| DisperseError::Clock)?;
    i64::try_from(elapsed.as_nanos()).map_err(|_| DisperseError::Clock)
}

// ============================================================================
// Tests
// ============================================================================
