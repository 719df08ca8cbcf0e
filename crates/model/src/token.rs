use {
    crate::chain::Chain,
    alloy::primitives::Address,
    std::hash::{Hash, Hasher},
};

/// An ERC20 token on a specific chain.
///
/// Two tokens are considered equal iff they live on the same chain at the same
/// address; decimals and symbol are metadata and do not participate in
/// equality.
#[derive(Clone, Debug, Eq)]
pub struct Token {
    pub chain: Chain,
    pub address: Address,
    pub decimals: u8,
    pub symbol: Option<String>,
}

impl Token {
    pub fn new(chain: Chain, address: Address, decimals: u8, symbol: Option<String>) -> Self {
        Self {
            chain,
            address,
            decimals,
            symbol,
        }
    }

    /// The canonical wrapped native token of the chain.
    pub fn wrapped_native(chain: Chain) -> Self {
        Self {
            chain,
            address: chain.wrapped_native(),
            decimals: 18,
            symbol: Some(chain.wrapped_native_symbol().to_string()),
        }
    }

    pub fn is_wrapped_native(&self) -> bool {
        self.address == self.chain.wrapped_native()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.chain == other.chain && self.address == other.address
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chain.hash(state);
        self.address.hash(state);
    }
}

/// A currency a caller can trade: either the chain's native currency or an
/// ERC20 token.
///
/// The router operates on wrapped tokens internally; native currencies are
/// wrapped at the trade boundary and the wrap/unwrap intent is recorded on the
/// resulting plan.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Currency {
    Native(Chain),
    Erc20(Token),
}

impl Currency {
    pub fn chain(&self) -> Chain {
        match self {
            Self::Native(chain) => *chain,
            Self::Erc20(token) => token.chain,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native(_))
    }

    /// The token the router uses internally for this currency.
    pub fn wrapped(&self) -> Token {
        match self {
            Self::Native(chain) => Token::wrapped_native(*chain),
            Self::Erc20(token) => token.clone(),
        }
    }
}

impl From<Token> for Currency {
    fn from(token: Token) -> Self {
        Self::Erc20(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_equality_ignores_metadata() {
        let address = Address::with_last_byte(1);
        let a = Token::new(Chain::Mainnet, address, 18, Some("WETH".to_string()));
        let b = Token::new(Chain::Mainnet, address, 6, None);
        assert_eq!(a, b);

        let c = Token::new(Chain::Sepolia, address, 18, Some("WETH".to_string()));
        assert_ne!(a, c);
    }

    #[test]
    fn native_currency_wraps_to_chain_weth() {
        let native = Currency::Native(Chain::Mainnet);
        assert!(native.is_native());
        assert_eq!(native.wrapped().address, Chain::Mainnet.wrapped_native());
        assert!(native.wrapped().is_wrapped_native());
    }
}
