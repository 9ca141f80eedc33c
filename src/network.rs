//! Compiled-in network table
//!
//! One descriptor per supported network: disperser endpoint, chain id,
//! payment-vault contract, and the pricing defaults in force before the
//! first server resync replaces them. Lookup is a pure match; there is no
//! dynamic configuration here.

#![forbid(unsafe_code)]

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::accountant::ProtocolParams;

/// Networks the client knows out of the box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EigenDaNetwork {
    /// Ethereum mainnet.
    Mainnet,
    /// Holesky testnet.
    Holesky,
    /// Sepolia testnet.
    Sepolia,
}

/// Static facts about one network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkDescriptor {
    /// EVM chain id of the settlement chain.
    pub chain_id: u64,
    /// Disperser hostname.
    pub disperser_host: &'static str,
    /// Disperser port.
    pub disperser_port: u16,
    /// PaymentVault contract (read-only reference; override with
    /// `EIGENDA_PAYMENT_VAULT` if your deployment differs).
    pub payment_vault: Address,
    /// Pricing/period defaults used until the first resync.
    pub params: ProtocolParams,
}

const DEFAULT_PARAMS: ProtocolParams = ProtocolParams {
    price_per_symbol: 447_000_000_000,
    min_num_symbols: 4096,
    reservation_period_interval: 300,
};

impl EigenDaNetwork {
    /// The full descriptor for this network.
    pub const fn descriptor(self) -> NetworkDescriptor {
        match self {
            Self::Mainnet => NetworkDescriptor {
                chain_id: 1,
                disperser_host: "disperser.eigenda.xyz",
                disperser_port: 443,
                payment_vault: address!("0xb2ef1b9a2500c7eb3dcb02b0ee3a1e345c68c2a7"),
                params: DEFAULT_PARAMS,
            },
            Self::Holesky => NetworkDescriptor {
                chain_id: 17_000,
                disperser_host: "disperser-testnet-holesky.eigenda.xyz",
                disperser_port: 443,
                payment_vault: address!("0x4a7fff191bcda5806f1bc8689afc1417c08c61ab"),
                params: DEFAULT_PARAMS,
            },
            Self::Sepolia => NetworkDescriptor {
                chain_id: 11_155_111,
                disperser_host: "disperser-testnet-sepolia.eigenda.xyz",
                disperser_port: 443,
                payment_vault: address!("0x2e1bd56ec7cf4cb8d8db6900f41e90635a1a35f1"),
                params: DEFAULT_PARAMS,
            },
        }
    }

    /// Reverse lookup from a disperser hostname.
    pub fn from_disperser_host(host: &str) -> Option<Self> {
        [Self::Mainnet, Self::Holesky, Self::Sepolia]
            .into_iter()
            .find(|network| network.descriptor().disperser_host == host)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_lookup_is_deterministic() {
        for network in [EigenDaNetwork::Mainnet, EigenDaNetwork::Holesky, EigenDaNetwork::Sepolia] {
            let descriptor = network.descriptor();
            assert_eq!(EigenDaNetwork::from_disperser_host(descriptor.disperser_host), Some(network));
            assert_eq!(descriptor.disperser_port, 443);
        }
        assert_eq!(EigenDaNetwork::from_disperser_host("example.com"), None);
    }

    #[test]
    fn chain_ids_match_the_settlement_chains() {
        assert_eq!(EigenDaNetwork::Mainnet.descriptor().chain_id, 1);
        assert_eq!(EigenDaNetwork::Holesky.descriptor().chain_id, 17_000);
        assert_eq!(EigenDaNetwork::Sepolia.descriptor().chain_id, 11_155_111);
    }

    #[test]
    fn default_params_cover_the_minimum_charge() {
        let params = EigenDaNetwork::Holesky.descriptor().params;
        assert_eq!(params.blob_symbols(32), 4096);
        assert_eq!(
            params.blob_cost(params.blob_symbols(32)),
            alloy_primitives::U256::from(1_830_912_000_000_000u64)
        );
    }
}
