//! Materialized liquidity pools and their uniform capability set.
//!
//! Pools are a tagged union; all dispatch happens via `match` so each
//! protocol's fields stay strongly typed.

use {
    alloy::primitives::{Address, B256, U256},
    anyhow::{Result, ensure},
    model::{
        Chain,
        PoolId,
        TokenPair,
        conversions::{u256_to_big_int, u256_to_big_rational},
    },
    num::{BigInt, BigRational, One, Zero},
    std::hash::{Hash, Hasher},
};

/// The liquidity protocols the router can route through.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Protocol {
    V2,
    V3,
    Stable,
    StableWrapper,
    /// Routes combining pools of at least two distinct protocols.
    Mixed,
}

impl Protocol {
    pub const ALL: [Self; 5] = [
        Self::V2,
        Self::V3,
        Self::Stable,
        Self::StableWrapper,
        Self::Mixed,
    ];
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::V2 => "V2",
            Self::V3 => "V3",
            Self::Stable => "Stable",
            Self::StableWrapper => "StableWrapper",
            Self::Mixed => "Mixed",
        };
        f.write_str(name)
    }
}

/// Discrete swap fee levels supported by concentrated liquidity pools.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FeeTier {
    Lowest,
    Low,
    Medium,
    High,
}

impl FeeTier {
    pub const ALL: [Self; 4] = [Self::Lowest, Self::Low, Self::Medium, Self::High];

    /// The fee in hundredths of a basis point, as encoded on-chain.
    pub fn as_raw(&self) -> u32 {
        match self {
            Self::Lowest => 100,
            Self::Low => 500,
            Self::Medium => 3_000,
            Self::High => 10_000,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            100 => Some(Self::Lowest),
            500 => Some(Self::Low),
            3_000 => Some(Self::Medium),
            10_000 => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct V2Pool {
    pub chain: Chain,
    pub address: Address,
    pub tokens: TokenPair,
    pub reserves: (u128, u128),
}

#[derive(Clone, Debug)]
pub struct V3Pool {
    pub chain: Chain,
    pub address: Address,
    pub tokens: TokenPair,
    pub fee: FeeTier,
    pub liquidity: u128,
    pub sqrt_price: U256,
}

/// Amplification parameter of a stable pool, a fixed point factor/precision
/// pair as returned by the pool contract.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AmplificationParameter {
    factor: U256,
    precision: U256,
}

impl AmplificationParameter {
    pub fn try_new(factor: U256, precision: U256) -> Result<Self> {
        ensure!(!precision.is_zero(), "zero precision not allowed");
        Ok(Self { factor, precision })
    }

    pub fn as_big_rational(&self) -> BigRational {
        // The precision is checked to be non-zero on construction.
        BigRational::new(
            u256_to_big_int(&self.factor),
            u256_to_big_int(&self.precision),
        )
    }
}

#[derive(Clone, Debug)]
pub struct StablePool {
    pub chain: Chain,
    pub id: B256,
    pub address: Address,
    pub tokens: Vec<Address>,
    pub amplification: AmplificationParameter,
    /// Swap fee as an 18 decimal fixed point fraction.
    pub swap_fee: U256,
    pub total_shares: U256,
    pub balances: Vec<U256>,
    pub scaling_factors: Vec<U256>,
}

/// A share/asset vault wrapping a stable pool's share token.
#[derive(Clone, Debug)]
pub struct WrapperPool {
    pub chain: Chain,
    pub address: Address,
    /// The stable pool share token held by the vault.
    pub underlying: Address,
    /// The vault's own token.
    pub wrapper: Address,
    /// Underlying per wrapper token, as an 18 decimal fixed point rate.
    pub rate: U256,
}

#[derive(Clone, Debug)]
pub enum Pool {
    V2(V2Pool),
    V3(V3Pool),
    Stable(StablePool),
    StableWrapper(WrapperPool),
}

impl Pool {
    /// The canonical identity. Stable pools are identified by pool id, all
    /// others by contract address.
    pub fn id(&self) -> PoolId {
        match self {
            Self::V2(pool) => PoolId::Contract(pool.address),
            Self::V3(pool) => PoolId::Contract(pool.address),
            Self::Stable(pool) => PoolId::Stable(pool.id),
            Self::StableWrapper(pool) => PoolId::Contract(pool.address),
        }
    }

    pub fn address(&self) -> Address {
        match self {
            Self::V2(pool) => pool.address,
            Self::V3(pool) => pool.address,
            Self::Stable(pool) => pool.address,
            Self::StableWrapper(pool) => pool.address,
        }
    }

    pub fn chain(&self) -> Chain {
        match self {
            Self::V2(pool) => pool.chain,
            Self::V3(pool) => pool.chain,
            Self::Stable(pool) => pool.chain,
            Self::StableWrapper(pool) => pool.chain,
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Self::V2(_) => Protocol::V2,
            Self::V3(_) => Protocol::V3,
            Self::Stable(_) => Protocol::Stable,
            Self::StableWrapper(_) => Protocol::StableWrapper,
        }
    }

    pub fn tokens(&self) -> Vec<Address> {
        match self {
            Self::V2(pool) => pool.tokens.into_iter().collect(),
            Self::V3(pool) => pool.tokens.into_iter().collect(),
            Self::Stable(pool) => pool.tokens.clone(),
            Self::StableWrapper(pool) => vec![pool.underlying, pool.wrapper],
        }
    }

    pub fn involves(&self, token: Address) -> bool {
        match self {
            Self::V2(pool) => pool.tokens.contains(&token),
            Self::V3(pool) => pool.tokens.contains(&token),
            Self::Stable(pool) => pool.tokens.contains(&token),
            Self::StableWrapper(pool) => pool.underlying == token || pool.wrapper == token,
        }
    }

    /// The pool's other token for two token pools; `None` when the token is
    /// not part of the pool or when several tokens qualify.
    pub fn other(&self, token: Address) -> Option<Address> {
        match self {
            Self::V2(pool) => pool.tokens.other(&token),
            Self::V3(pool) => pool.tokens.other(&token),
            Self::Stable(pool) => match pool.tokens.as_slice() {
                [a, b] if *a == token => Some(*b),
                [a, b] if *b == token => Some(*a),
                _ => None,
            },
            Self::StableWrapper(pool) => {
                if pool.underlying == token {
                    Some(pool.wrapper)
                } else if pool.wrapper == token {
                    Some(pool.underlying)
                } else {
                    None
                }
            }
        }
    }

    /// The tokens reachable in a single hop when entering with `input`.
    pub fn outputs(&self, input: Address) -> Vec<Address> {
        if !self.involves(input) {
            return Vec::new();
        }
        self.tokens()
            .into_iter()
            .filter(|token| *token != input)
            .collect()
    }

    /// Mid price of the pool in raw token units: the amount of the other
    /// token one raw unit of `base` converts to, ignoring fees and slippage.
    ///
    /// Only meaningful for two token pools; used for gas cost conversion, not
    /// for quoting.
    pub fn mid_price(&self, base: Address) -> Option<BigRational> {
        match self {
            Self::V2(pool) => {
                let (reserve0, reserve1) = pool.reserves;
                let (token0, _) = pool.tokens.get();
                let (reserve_base, reserve_other) = if base == token0 {
                    (reserve0, reserve1)
                } else if pool.tokens.contains(&base) {
                    (reserve1, reserve0)
                } else {
                    return None;
                };
                if reserve_base == 0 {
                    return None;
                }
                Some(BigRational::new(reserve_other.into(), reserve_base.into()))
            }
            Self::V3(pool) => {
                if !pool.tokens.contains(&base) {
                    return None;
                }
                // The sqrt price is encoded as a Q64.96 so the raw
                // token1/token0 price is sqrt_price^2 / 2^192.
                let sqrt_price = u256_to_big_int(&pool.sqrt_price);
                if sqrt_price.is_zero() {
                    return None;
                }
                let price = BigRational::new(&sqrt_price * &sqrt_price, BigInt::one() << 192);
                let (token0, _) = pool.tokens.get();
                if base == token0 {
                    Some(price)
                } else {
                    Some(price.recip())
                }
            }
            Self::StableWrapper(pool) => {
                let rate = u256_to_big_rational(&pool.rate);
                if rate.is_zero() {
                    return None;
                }
                let one = BigRational::new(BigInt::from(10u64.pow(18)), BigInt::one());
                if base == pool.wrapper {
                    Some(rate / one)
                } else if base == pool.underlying {
                    Some(one / rate)
                } else {
                    None
                }
            }
            Self::Stable(_) => None,
        }
    }
}

impl PartialEq for Pool {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Pool {}

impl Hash for Pool {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn v2_pool(address: u8, token_a: u8, token_b: u8) -> Pool {
        Pool::V2(V2Pool {
            chain: Chain::Mainnet,
            address: Address::with_last_byte(address),
            tokens: TokenPair::new(
                Address::with_last_byte(token_a),
                Address::with_last_byte(token_b),
            )
            .unwrap(),
            reserves: (1_000_000, 1_000_000),
        })
    }

    #[test]
    fn fee_tier_round_trips() {
        for tier in FeeTier::ALL {
            assert_eq!(FeeTier::from_raw(tier.as_raw()), Some(tier));
        }
        assert_eq!(FeeTier::from_raw(123), None);
    }

    #[test]
    fn stable_pool_identity_is_pool_id() {
        let pool = |address: u8| StablePool {
            chain: Chain::Mainnet,
            id: B256::with_last_byte(1),
            address: Address::with_last_byte(address),
            tokens: vec![],
            amplification: AmplificationParameter::try_new(U256::from(200), U256::ONE).unwrap(),
            swap_fee: U256::ZERO,
            total_shares: U256::ZERO,
            balances: vec![],
            scaling_factors: vec![],
        };
        // Same pool id counts as the same pool even under different addresses.
        assert_eq!(Pool::Stable(pool(1)), Pool::Stable(pool(2)));
    }

    #[test]
    fn outputs_of_multi_token_pool() {
        let tokens = vec![
            Address::with_last_byte(1),
            Address::with_last_byte(2),
            Address::with_last_byte(3),
        ];
        let pool = Pool::Stable(StablePool {
            chain: Chain::Mainnet,
            id: B256::with_last_byte(1),
            address: Address::with_last_byte(9),
            tokens: tokens.clone(),
            amplification: AmplificationParameter::try_new(U256::from(200), U256::ONE).unwrap(),
            swap_fee: U256::ZERO,
            total_shares: U256::ZERO,
            balances: vec![],
            scaling_factors: vec![],
        });
        assert_eq!(pool.outputs(tokens[0]), vec![tokens[1], tokens[2]]);
        assert!(pool.other(tokens[0]).is_none());
        assert!(pool.outputs(Address::with_last_byte(9)).is_empty());
    }

    #[test]
    fn v2_mid_price_is_reserve_ratio() {
        let pool = Pool::V2(V2Pool {
            chain: Chain::Mainnet,
            address: Address::with_last_byte(1),
            tokens: TokenPair::new(Address::with_last_byte(1), Address::with_last_byte(2))
                .unwrap(),
            reserves: (100, 300),
        });
        assert_eq!(
            pool.mid_price(Address::with_last_byte(1)),
            Some(BigRational::new(3.into(), 1.into()))
        );
        assert_eq!(
            pool.mid_price(Address::with_last_byte(2)),
            Some(BigRational::new(1.into(), 3.into()))
        );
        assert_eq!(pool.mid_price(Address::with_last_byte(3)), None);
    }

    #[test]
    fn v3_mid_price_from_sqrt_price() {
        let pool = Pool::V3(V3Pool {
            chain: Chain::Mainnet,
            address: Address::with_last_byte(1),
            tokens: TokenPair::new(Address::with_last_byte(1), Address::with_last_byte(2))
                .unwrap(),
            fee: FeeTier::Medium,
            liquidity: 1,
            // 2 * 2^96, i.e. a raw price of 4.
            sqrt_price: U256::from(2u8) << 96,
        });
        assert_eq!(
            pool.mid_price(Address::with_last_byte(1)),
            Some(BigRational::new(4.into(), 1.into()))
        );
        assert_eq!(
            pool.mid_price(Address::with_last_byte(2)),
            Some(BigRational::new(1.into(), 4.into()))
        );
    }

    #[test]
    fn wrapper_pool_connects_share_and_vault_token() {
        let pool = Pool::StableWrapper(WrapperPool {
            chain: Chain::Mainnet,
            address: Address::with_last_byte(1),
            underlying: Address::with_last_byte(2),
            wrapper: Address::with_last_byte(3),
            rate: U256::from(2) * U256::from(10).pow(U256::from(18)),
        });
        assert_eq!(
            pool.other(Address::with_last_byte(2)),
            Some(Address::with_last_byte(3))
        );
        // One wrapper redeems for two underlying.
        assert_eq!(
            pool.mid_price(Address::with_last_byte(3)),
            Some(BigRational::new(2.into(), 1.into()))
        );
        assert_eq!(
            pool.mid_price(Address::with_last_byte(2)),
            Some(BigRational::new(1.into(), 2.into()))
        );
    }

    #[test]
    fn pools_dedupe_by_identity() {
        let mut set = std::collections::HashSet::new();
        assert!(set.insert(v2_pool(1, 1, 2)));
        assert!(!set.insert(v2_pool(1, 1, 2)));
        assert!(set.insert(v2_pool(2, 1, 2)));
    }
}
