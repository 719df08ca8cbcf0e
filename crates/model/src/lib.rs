//! Contains models that are shared between the routing layers.

pub mod amount;
pub mod chain;
pub mod conversions;
pub mod token;

use alloy::primitives::{Address, B256};
use std::fmt;

pub use {
    amount::{CurrencyAmount, TokenAmount},
    chain::Chain,
    token::{Currency, Token},
};

/// Erc20 token pair specified by two contract addresses.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TokenPair(Address, Address);

impl TokenPair {
    /// Create a new token pair from two addresses.
    /// The addresses must not be equal.
    pub fn new(token_a: Address, token_b: Address) -> Option<Self> {
        match token_a.cmp(&token_b) {
            std::cmp::Ordering::Less => Some(Self(token_a, token_b)),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(Self(token_b, token_a)),
        }
    }

    /// Used to determine if `token` is among the pair.
    pub fn contains(&self, token: &Address) -> bool {
        self.0 == *token || self.1 == *token
    }

    /// Returns the token in the pair which is not the one passed in, or None if
    /// the token passed in is not part of the pair.
    pub fn other(&self, token: &Address) -> Option<Address> {
        if &self.0 == token {
            Some(self.1)
        } else if &self.1 == token {
            Some(self.0)
        } else {
            None
        }
    }

    /// The first address is always the lower one.
    /// The addresses are never equal.
    pub fn get(&self) -> (Address, Address) {
        (self.0, self.1)
    }
}

impl IntoIterator for TokenPair {
    type Item = Address;
    type IntoIter = std::iter::Chain<std::iter::Once<Address>, std::iter::Once<Address>>;

    fn into_iter(self) -> Self::IntoIter {
        std::iter::once(self.0).chain(std::iter::once(self.1))
    }
}

impl<'a> IntoIterator for &'a TokenPair {
    type Item = &'a Address;
    type IntoIter = std::iter::Chain<std::iter::Once<&'a Address>, std::iter::Once<&'a Address>>;

    fn into_iter(self) -> Self::IntoIter {
        std::iter::once(&self.0).chain(std::iter::once(&self.1))
    }
}

/// Canonical identity of a liquidity pool.
///
/// Constant-product and concentrated-liquidity pools are identified by their
/// contract address while stable pools are identified by their 32 byte pool
/// id. The same stable pool is reachable through several token pair
/// projections so route enumeration must deduplicate on this identity.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PoolId {
    Contract(Address),
    Stable(B256),
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contract(address) => write!(f, "{address:?}"),
            Self::Stable(id) => write!(f, "{id:?}"),
        }
    }
}

/// Whether the fixed side of a trade is the input or the output amount.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum TradeType {
    ExactInput,
    ExactOutput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_pair_is_order_independent() {
        let (a, b) = (Address::with_last_byte(1), Address::with_last_byte(2));
        assert_eq!(TokenPair::new(a, b), TokenPair::new(b, a));
        assert_eq!(TokenPair::new(a, b).unwrap().get(), (a, b));
        assert_eq!(TokenPair::new(a, a), None);
    }

    #[test]
    fn token_pair_other() {
        let (a, b) = (Address::with_last_byte(1), Address::with_last_byte(2));
        let pair = TokenPair::new(a, b).unwrap();
        assert_eq!(pair.other(&a), Some(b));
        assert_eq!(pair.other(&b), Some(a));
        assert_eq!(pair.other(&Address::with_last_byte(3)), None);
    }

    #[test]
    fn pool_id_ordering_is_stable() {
        let contract = PoolId::Contract(Address::with_last_byte(9));
        let stable = PoolId::Stable(B256::with_last_byte(1));
        assert!(contract < stable);
    }
}
