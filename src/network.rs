use lwk_wollet::ElementsNetwork;
use lwk_wollet::elements::{Address, AddressParams, AssetId};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Network variants for Liquid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Liquid,
    LiquidTestnet,
    LiquidRegtest,
}

impl Network {
    pub fn into_lwk(self) -> ElementsNetwork {
        match self {
            Network::Liquid => ElementsNetwork::Liquid,
            Network::LiquidTestnet => ElementsNetwork::LiquidTestnet,
            Network::LiquidRegtest => ElementsNetwork::default_regtest(),
        }
    }

    pub fn is_mainnet(self) -> bool {
        matches!(self, Network::Liquid)
    }

    /// The asset fees are paid in.
    pub fn policy_asset(self) -> AssetId {
        self.into_lwk().policy_asset()
    }

    pub fn default_electrum_url(self) -> &'static str {
        match self {
            Network::Liquid => "ssl://blockstream.info:995",
            Network::LiquidTestnet => "ssl://blockstream.info:465",
            Network::LiquidRegtest => "tcp://localhost:50001",
        }
    }

    pub fn esplora_url(self) -> &'static str {
        match self {
            Network::Liquid => "https://blockstream.info/liquid/api",
            Network::LiquidTestnet => "https://blockstream.info/liquidtestnet/api",
            Network::LiquidRegtest => "http://localhost:3000",
        }
    }

    pub fn address_params(self) -> &'static AddressParams {
        match self {
            Network::Liquid => &AddressParams::LIQUID,
            Network::LiquidTestnet => &AddressParams::LIQUID_TESTNET,
            Network::LiquidRegtest => &AddressParams::ELEMENTS,
        }
    }

    /// URI scheme for payment requests on this network.
    pub fn payment_scheme(self) -> &'static str {
        match self {
            Network::Liquid => "liquidnetwork",
            Network::LiquidTestnet => "liquidtestnet",
            Network::LiquidRegtest => "liquidregtest",
        }
    }

    /// Detect the network an address belongs to from its prefix parameters.
    pub fn from_address(address: &Address) -> Result<Network> {
        if *address.params == AddressParams::LIQUID {
            Ok(Network::Liquid)
        } else if *address.params == AddressParams::LIQUID_TESTNET {
            Ok(Network::LiquidTestnet)
        } else if *address.params == AddressParams::ELEMENTS {
            Ok(Network::LiquidRegtest)
        } else {
            Err(Error::Address(format!(
                "unknown address prefix for {address}"
            )))
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Liquid => "mainnet",
            Network::LiquidTestnet => "testnet",
            Network::LiquidRegtest => "regtest",
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "liquid" => Ok(Network::Liquid),
            "testnet" | "liquid-testnet" | "liquidtestnet" => Ok(Network::LiquidTestnet),
            "regtest" | "liquid-regtest" | "liquidregtest" => Ok(Network::LiquidRegtest),
            _ => Err(format!("invalid network: {}", s)),
        }
    }
}
