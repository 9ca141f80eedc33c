//! Environment configuration (`EIGENDA_*`)
//!
//! | variable | meaning | default |
//! |----------|---------|---------|
//! | `EIGENDA_PRIVATE_KEY` | account key, 32-byte hex, optional `0x` | required |
//! | `EIGENDA_DISPERSER_HOST` | disperser hostname | Holesky testnet |
//! | `EIGENDA_DISPERSER_PORT` | disperser port | 443 |
//! | `EIGENDA_USE_SECURE_GRPC` | TLS on the channel | true iff port 443 |
//! | `EIGENDA_PAYMENT_VAULT` | PaymentVault override | network table |

#![forbid(unsafe_code)]

use std::env;

use alloy_primitives::Address;

use crate::network::EigenDaNetwork;
use crate::signer::{BlobSigner, SignerError};

/// Configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `EIGENDA_PRIVATE_KEY` is unset.
    #[error("EIGENDA_PRIVATE_KEY is not set")]
    MissingPrivateKey,
    /// A variable is set but unparseable.
    #[error("invalid {name}: {value:?}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
    /// The private key failed to parse.
    #[error(transparent)]
    Signer(#[from] SignerError),
}

/// Settings assembled from the environment.
#[derive(Clone, Debug)]
pub struct ClientSettings {
    /// Hex private key (kept as provided; parse with [`ClientSettings::signer`]).
    pub private_key: String,
    /// Disperser hostname.
    pub disperser_host: String,
    /// Disperser port.
    pub disperser_port: u16,
    /// Whether the gRPC channel uses TLS.
    pub use_secure_grpc: bool,
    /// PaymentVault override, if any.
    pub payment_vault: Option<Address>,
}

impl ClientSettings {
    /// Read the `EIGENDA_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let private_key =
            env::var("EIGENDA_PRIVATE_KEY").map_err(|_| ConfigError::MissingPrivateKey)?;

        let disperser_host = env::var("EIGENDA_DISPERSER_HOST")
            .unwrap_or_else(|_| EigenDaNetwork::Holesky.descriptor().disperser_host.to_string());

        let disperser_port = match env::var("EIGENDA_DISPERSER_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: "EIGENDA_DISPERSER_PORT",
                value: raw,
            })?,
            Err(_) => 443,
        };

        let use_secure_grpc = match env::var("EIGENDA_USE_SECURE_GRPC") {
            Ok(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidValue {
                name: "EIGENDA_USE_SECURE_GRPC",
                value: raw,
            })?,
            Err(_) => disperser_port == 443,
        };

        let payment_vault = match env::var("EIGENDA_PAYMENT_VAULT") {
            Ok(raw) => {
                Some(raw.parse::<Address>().map_err(|_| ConfigError::InvalidValue {
                    name: "EIGENDA_PAYMENT_VAULT",
                    value: raw,
                })?)
            }
            Err(_) => None,
        };

        Ok(Self { private_key, disperser_host, disperser_port, use_secure_grpc, payment_vault })
    }

    /// Build the signer from the configured key.
    pub fn signer(&self) -> Result<BlobSigner, SignerError> {
        BlobSigner::from_hex(&self.private_key)
    }

    /// The known network for the configured host, if any.
    pub fn network(&self) -> Option<EigenDaNetwork> {
        EigenDaNetwork::from_disperser_host(&self.disperser_host)
    }

    /// PaymentVault address: the override, or the network table's entry.
    pub fn payment_vault(&self) -> Option<Address> {
        self.payment_vault.or_else(|| self.network().map(|n| n.descriptor().payment_vault))
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
