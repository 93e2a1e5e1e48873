//! Network definitions for text encodings

use crate::contract::MaterialKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Network type enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Mainnet
    #[default]
    Mainnet,
    /// Testnet
    Testnet,
    /// Regtest (local development)
    Regtest,
}

impl NetworkType {
    /// Network name as used in configuration.
    pub fn name(self) -> &'static str {
        match self {
            NetworkType::Mainnet => "mainnet",
            NetworkType::Testnet => "testnet",
            NetworkType::Regtest => "regtest",
        }
    }

    /// Bech32 human-readable prefix for `kind` on this network.
    pub fn hrp(self, kind: MaterialKind) -> &'static str {
        match kind {
            MaterialKind::PrivateKey => private_key_hrp_for_network(self),
            MaterialKind::ViewKey => view_key_hrp_for_network(self),
            MaterialKind::Address => address_hrp_for_network(self),
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" | "main" => Ok(NetworkType::Mainnet),
            "testnet" | "test" => Ok(NetworkType::Testnet),
            "regtest" => Ok(NetworkType::Regtest),
            other => Err(format!("Unknown network: {other}")),
        }
    }
}

fn private_key_hrp_for_network(network: NetworkType) -> &'static str {
    match network {
        NetworkType::Mainnet => "provable-secret-key",
        NetworkType::Testnet => "provable-secret-key-test",
        NetworkType::Regtest => "provable-secret-key-regtest",
    }
}

fn view_key_hrp_for_network(network: NetworkType) -> &'static str {
    match network {
        NetworkType::Mainnet => "provable-view-key",
        NetworkType::Testnet => "provable-view-key-test",
        NetworkType::Regtest => "provable-view-key-regtest",
    }
}

fn address_hrp_for_network(network: NetworkType) -> &'static str {
    match network {
        NetworkType::Mainnet => "provable",
        NetworkType::Testnet => "provable-test",
        NetworkType::Regtest => "provable-regtest",
    }
}
