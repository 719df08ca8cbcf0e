use alloy::primitives::{Address, address};

/// Represents each network the router treats as first class.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u64)]
pub enum Chain {
    Mainnet = 1,
    Optimism = 10,
    ArbitrumOne = 42161,
    Sepolia = 11155111,
}

impl Chain {
    /// Returns the chain for the given chain ID or `None` for networks the
    /// router does not support.
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            1 => Some(Self::Mainnet),
            10 => Some(Self::Optimism),
            42161 => Some(Self::ArbitrumOne),
            11155111 => Some(Self::Sepolia),
            _ => None,
        }
    }

    /// Returns the network's chain ID.
    pub fn id(&self) -> u64 {
        *self as u64
    }

    /// Returns the canonical name of the network.
    pub fn name(&self) -> &'static str {
        // You can find a list of available networks by network and chain id here:
        // https://chainid.network/chains.json
        match self {
            Self::Mainnet => "Ethereum / Mainnet",
            Self::Optimism => "OP Mainnet",
            Self::ArbitrumOne => "Arbitrum One",
            Self::Sepolia => "Ethereum / Sepolia",
        }
    }

    /// The canonical wrapped version of the chain's native currency.
    pub fn wrapped_native(&self) -> Address {
        match self {
            Self::Mainnet => address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            Self::Optimism => address!("0x4200000000000000000000000000000000000006"),
            Self::ArbitrumOne => address!("0x82aF49447D8a07e3bd95BD0d56f35241523fBab1"),
            Self::Sepolia => address!("0xfFf9976782d46CC05630D1f6eBAb18b2324d6B14"),
        }
    }

    pub fn wrapped_native_symbol(&self) -> &'static str {
        "WETH"
    }

    /// Rollups charge an additional fee for posting transaction data to the
    /// settlement layer which the gas model has to account for separately.
    pub fn has_l1_fee(&self) -> bool {
        matches!(self, Self::Optimism | Self::ArbitrumOne)
    }

    /// Returns the block time in milliseconds.
    pub fn block_time_in_ms(&self) -> u64 {
        match self {
            Self::Mainnet => 12_000,
            Self::Optimism => 2_000,
            Self::ArbitrumOne => 250,
            Self::Sepolia => 12_000,
        }
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_id_round_trips() {
        for chain in [
            Chain::Mainnet,
            Chain::Optimism,
            Chain::ArbitrumOne,
            Chain::Sepolia,
        ] {
            assert_eq!(Chain::from_chain_id(chain.id()), Some(chain));
        }
        assert_eq!(Chain::from_chain_id(100), None);
    }

    #[test]
    fn rollups_have_l1_fee() {
        assert!(Chain::Optimism.has_l1_fee());
        assert!(Chain::ArbitrumOne.has_l1_fee());
        assert!(!Chain::Mainnet.has_l1_fee());
        assert!(!Chain::Sepolia.has_l1_fee());
    }
}
