//! Well known, high liquidity tokens per chain.
//!
//! These seed the token metadata cache and act as the base tokens that anchor
//! candidate pool selection.

use {
    alloy::primitives::{Address, address},
    model::{Chain, Token},
};

fn token(chain: Chain, address: Address, decimals: u8, symbol: &str) -> Token {
    Token::new(chain, address, decimals, Some(symbol.to_string()))
}

pub fn usdc(chain: Chain) -> Option<Token> {
    let (address, symbol) = match chain {
        Chain::Mainnet => (
            address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            "USDC",
        ),
        Chain::Optimism => (
            address!("0x7F5c764cBc14f9669B88837ca1490cCa17c31607"),
            "USDC.e",
        ),
        Chain::ArbitrumOne => (
            address!("0xFF970A61A04b1cA14834A43f5dE4533eBDDB5CC8"),
            "USDC.e",
        ),
        Chain::Sepolia => (
            address!("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
            "USDC",
        ),
    };
    Some(token(chain, address, 6, symbol))
}

pub fn usdt(chain: Chain) -> Option<Token> {
    let address = match chain {
        Chain::Mainnet => address!("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
        Chain::Optimism => address!("0x94b008aA00579c1307B0EF2c499aD98a8ce58e58"),
        Chain::ArbitrumOne => address!("0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"),
        Chain::Sepolia => return None,
    };
    Some(token(chain, address, 6, "USDT"))
}

pub fn dai(chain: Chain) -> Option<Token> {
    let address = match chain {
        Chain::Mainnet => address!("0x6B175474E89094C44Da98b954EedeAC495271d0F"),
        Chain::Optimism | Chain::ArbitrumOne => {
            address!("0xDA10009cBd5D07dd0CeCc66161FC93D7c9000da1")
        }
        Chain::Sepolia => return None,
    };
    Some(token(chain, address, 18, "DAI"))
}

pub fn wbtc(chain: Chain) -> Option<Token> {
    let address = match chain {
        Chain::Mainnet => address!("0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"),
        Chain::Optimism => address!("0x68f180fcCe6836688e9084f035309E29Bf0A2095"),
        Chain::ArbitrumOne => address!("0x2f2a2543B76A4166549F7aaB2e75Bef0aefC5B0f"),
        Chain::Sepolia => return None,
    };
    Some(token(chain, address, 8, "WBTC"))
}

/// The base tokens anchoring candidate pool selection on the chain.
///
/// Always includes the wrapped native token.
pub fn base_tokens(chain: Chain) -> Vec<Token> {
    [
        Some(Token::wrapped_native(chain)),
        usdc(chain),
        usdt(chain),
        dai(chain),
        wbtc(chain),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Stable coins used to locate the native/USD reference pool for gas cost
/// conversion, in preference order.
pub fn usd_tokens(chain: Chain) -> Vec<Token> {
    [usdc(chain), usdt(chain), dai(chain)]
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_tokens_always_contain_wrapped_native() {
        for chain in [
            Chain::Mainnet,
            Chain::Optimism,
            Chain::ArbitrumOne,
            Chain::Sepolia,
        ] {
            let tokens = base_tokens(chain);
            assert!(tokens.iter().any(|token| token.is_wrapped_native()));
            // No duplicates.
            let mut addresses = tokens.iter().map(|token| token.address).collect::<Vec<_>>();
            addresses.sort();
            addresses.dedup();
            assert_eq!(addresses.len(), tokens.len());
        }
    }

    #[test]
    fn sepolia_has_a_usd_token() {
        assert!(!usd_tokens(Chain::Sepolia).is_empty());
    }
}
