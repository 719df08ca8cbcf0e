use {
    alloy::primitives::{Address, B256, keccak256},
    model::{Chain, TokenPair},
};

#[derive(Clone, Debug)]
pub struct PairProvider {
    pub factory: Address,
    pub init_code_digest: B256,
}

impl PairProvider {
    pub fn for_chain(chain: Chain) -> Option<Self> {
        contracts::factories::v2_factory(chain.id()).map(|(factory, init_code_digest)| Self {
            factory,
            init_code_digest,
        })
    }

    pub fn pair_address(&self, pair: &TokenPair) -> Address {
        let (token0, token1) = pair.get();

        // https://docs.uniswap.org/contracts/v2/guides/smart-contract-integration/getting-pair-addresses
        let salt = {
            let mut buffer = [0u8; 40];
            buffer[0..20].copy_from_slice(token0.as_slice());
            buffer[20..40].copy_from_slice(token1.as_slice());
            keccak256(buffer)
        };
        create2_target_address(self.factory, &salt, &self.init_code_digest)
    }
}

pub(crate) fn create2_target_address(
    creator: Address,
    salt: &B256,
    init_code_digest: &B256,
) -> Address {
    let mut preimage = [0xff; 85];
    preimage[1..21].copy_from_slice(creator.as_slice());
    preimage[21..53].copy_from_slice(salt.as_slice());
    preimage[53..85].copy_from_slice(init_code_digest.as_slice());
    Address::from_slice(&keccak256(preimage)[12..])
}

#[cfg(test)]
mod tests {
    use {super::*, alloy::primitives::address};

    #[test]
    fn test_create2_mainnet() {
        // https://v2.info.uniswap.org/pair/0x3e8468f66d30fc99f745481d4b383f89861702c6
        let provider = PairProvider::for_chain(Chain::Mainnet).unwrap();
        let gno = address!("0x6810e776880C02933D47DB1b9fc05908e5386b96");
        let weth = Chain::Mainnet.wrapped_native();
        let pair = TokenPair::new(gno, weth).unwrap();
        assert_eq!(
            provider.pair_address(&pair),
            address!("0x3e8468f66d30fc99f745481d4b383f89861702c6")
        );
    }
}
