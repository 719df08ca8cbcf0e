use {
    crate::{
        conversions::{big_rational_to_u256, u256_to_big_rational},
        token::{Currency, Token},
    },
    alloy::primitives::U256,
    anyhow::Result,
    num::{BigRational, Signed, Zero},
    std::{cmp::Ordering, ops::Add},
};

/// A fixed trade-side amount as specified by a caller: a raw integer amount
/// of a currency, which may be the chain's native one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CurrencyAmount {
    pub currency: Currency,
    pub amount: U256,
}

impl CurrencyAmount {
    pub fn new(currency: Currency, amount: U256) -> Self {
        Self { currency, amount }
    }

    /// The same amount denominated in the currency's wrapped token, which is
    /// what all internal math runs on.
    pub fn wrapped(&self) -> TokenAmount {
        TokenAmount::from_raw(self.currency.wrapped(), self.amount)
    }
}

/// An amount of a specific token.
///
/// Internally an exact rational so that fractional trade amounts and gas cost
/// conversions lose no precision; rounding happens only when crossing back to
/// the 256 bit on-chain representation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenAmount {
    pub token: Token,
    amount: BigRational,
}

impl TokenAmount {
    pub fn new(token: Token, amount: BigRational) -> Self {
        Self { token, amount }
    }

    pub fn zero(token: Token) -> Self {
        Self {
            token,
            amount: BigRational::zero(),
        }
    }

    /// An amount from the raw on-chain integer representation.
    pub fn from_raw(token: Token, amount: U256) -> Self {
        Self {
            token,
            amount: u256_to_big_rational(&amount),
        }
    }

    pub fn as_rational(&self) -> &BigRational {
        &self.amount
    }

    /// The raw on-chain integer representation, truncated towards zero.
    /// Errors when the amount is negative or does not fit 256 bits.
    pub fn as_raw(&self) -> Result<U256> {
        big_rational_to_u256(&self.amount)
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount.is_positive()
    }

    /// The fraction of this amount corresponding to an integer percentage.
    pub fn percent(&self, percent: u32) -> Self {
        Self {
            token: self.token.clone(),
            amount: &self.amount * BigRational::new(percent.into(), 100.into()),
        }
    }

    /// Scales the amount by an exact rational factor, e.g. a reference pool
    /// mid price when converting between denominations.
    pub fn scale(&self, factor: &BigRational, token: Token) -> Self {
        Self {
            token,
            amount: &self.amount * factor,
        }
    }

    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        (self.token == other.token).then(|| Self {
            token: self.token.clone(),
            amount: &self.amount + &other.amount,
        })
    }

    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        (self.token == other.token).then(|| Self {
            token: self.token.clone(),
            amount: &self.amount - &other.amount,
        })
    }
}

impl Add for TokenAmount {
    type Output = TokenAmount;

    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(&rhs).expect("mismatching amount tokens")
    }
}

impl PartialOrd for TokenAmount {
    /// Amounts of different tokens are incomparable.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        (self.token == other.token).then(|| self.amount.cmp(&other.amount))
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::chain::Chain, alloy::primitives::Address};

    fn token(byte: u8) -> Token {
        Token::new(Chain::Mainnet, Address::with_last_byte(byte), 18, None)
    }

    #[test]
    fn percent_is_exact() {
        let amount = TokenAmount::from_raw(token(1), U256::from(1_000));
        assert_eq!(amount.percent(25).as_raw().unwrap(), U256::from(250));
        // 5% of 33 is 1.65 which only truncates at the raw boundary.
        let amount = TokenAmount::from_raw(token(1), U256::from(33));
        let fraction = amount.percent(5);
        assert_eq!(
            fraction.as_rational(),
            &BigRational::new(165.into(), 100.into())
        );
        assert_eq!(fraction.as_raw().unwrap(), U256::ONE);
    }

    #[test]
    fn fractions_recombine_exactly() {
        let amount = TokenAmount::from_raw(token(1), U256::from(999));
        let sum = amount
            .percent(45)
            .checked_add(&amount.percent(55))
            .unwrap();
        assert_eq!(sum, amount);
    }

    #[test]
    fn amounts_of_different_tokens_do_not_mix() {
        let a = TokenAmount::from_raw(token(1), U256::ONE);
        let b = TokenAmount::from_raw(token(2), U256::ONE);
        assert!(a.checked_add(&b).is_none());
        assert!(a.partial_cmp(&b).is_none());
    }

    #[test]
    fn scale_converts_denomination() {
        let a = TokenAmount::from_raw(token(1), U256::from(100));
        let price = BigRational::new(3.into(), 2.into());
        let b = a.scale(&price, token(2));
        assert_eq!(b.token, token(2));
        assert_eq!(b.as_raw().unwrap(), U256::from(150));
    }
}
