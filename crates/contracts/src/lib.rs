//! Contract interfaces the router talks to, declared inline with
//! [`alloy::sol!`], plus the known deployment addresses per network.

pub mod networks {
    pub const MAINNET: u64 = 1;
    pub const OPTIMISM: u64 = 10;
    pub const ARBITRUM_ONE: u64 = 42161;
    pub const SEPOLIA: u64 = 11155111;
}

/// Generates the contract bindings in a private module and re-exports them in
/// our own module together with an `Instance` type alias and, when deployment
/// info is given, per-network address lookups.
#[macro_export]
macro_rules! bindings {
    ($contract:ident, { $($interface:tt)* } $(, $deployment_info:expr)? $(,)?) => {
        paste::paste! {
            #[allow(non_snake_case)]
            mod [<$contract Private>] {
                alloy::sol!(
                    #[allow(missing_docs)]
                    #[sol(rpc)]
                    #[derive(Debug)]
                    contract $contract { $($interface)* }
                );
            }

            #[allow(non_snake_case)]
            pub mod $contract {
                use alloy::providers::DynProvider;

                pub use super::[<$contract Private>]::$contract::*;
                pub type Instance =
                    super::[<$contract Private>]::$contract::[<$contract Instance>]<DynProvider>;

                $(
                use {
                    std::{collections::HashMap, sync::LazyLock},
                    alloy::primitives::{address, Address},
                    anyhow::Context,
                    $crate::networks::*,
                };

                pub static DEPLOYMENT_INFO: LazyLock<HashMap<u64, Address>> =
                    LazyLock::new(|| $deployment_info);

                /// The contract's address on the given network.
                pub fn deployment(chain_id: u64) -> anyhow::Result<Address> {
                    DEPLOYMENT_INFO
                        .get(&chain_id)
                        .copied()
                        .with_context(|| format!("no deployment info for chain {chain_id}"))
                }

                /// Creates a contract instance at the expected address for the
                /// given network.
                pub fn deployed(provider: &DynProvider, chain_id: u64) -> anyhow::Result<Instance> {
                    Ok(Instance::new(deployment(chain_id)?, provider.clone()))
                }
                )?
            }
        }
    };
}

bindings!(ERC20, {
    function decimals() external view returns (uint8);
    function symbol() external view returns (string);
    function balanceOf(address owner) external view returns (uint256);
});

// Some older tokens (e.g. MKR, SAI) return their symbol as a fixed `bytes32`
// instead of a `string`.
bindings!(ERC20SymbolBytes, {
    function symbol() external view returns (bytes32);
});

bindings!(UniswapV2Pair, {
    function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    function token0() external view returns (address);
    function token1() external view returns (address);
});

bindings!(
    UniswapV2Router,
    {
        function getAmountsOut(uint256 amountIn, address[] path) external view returns (uint256[] amounts);
        function getAmountsIn(uint256 amountOut, address[] path) external view returns (uint256[] amounts);
    },
    maplit::hashmap! {
        MAINNET => address!("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
        OPTIMISM => address!("0x4A7b5Da61326A6379179b40d00F57E5bbDC962c2"),
        ARBITRUM_ONE => address!("0x4752ba5DBc23f44D87826276BF6Fd6b1C372aD24"),
        SEPOLIA => address!("0xeE567Fe1712Faf6149d80dA1E6934E354124CfE3"),
    }
);

bindings!(UniswapV3Pool, {
    function liquidity() external view returns (uint128);
    function slot0() external view returns (uint160 sqrtPriceX96, int24 tick, uint16 observationIndex, uint16 observationCardinality, uint16 observationCardinalityNext, uint8 feeProtocol, bool unlocked);
});

bindings!(
    QuoterV2,
    {
        function quoteExactInput(bytes path, uint256 amountIn) external returns (uint256 amountOut, uint160[] sqrtPriceX96AfterList, uint32[] initializedTicksCrossedList, uint256 gasEstimate);
        function quoteExactOutput(bytes path, uint256 amountOut) external returns (uint256 amountIn, uint160[] sqrtPriceX96AfterList, uint32[] initializedTicksCrossedList, uint256 gasEstimate);
    },
    maplit::hashmap! {
        MAINNET => address!("0x61fFE014bA17989E743c5F6cB21bF9697530B21e"),
        OPTIMISM => address!("0x61fFE014bA17989E743c5F6cB21bF9697530B21e"),
        ARBITRUM_ONE => address!("0x61fFE014bA17989E743c5F6cB21bF9697530B21e"),
        SEPOLIA => address!("0xEd1f6473345F45b75F8179591dd5bA1888cf2FB3"),
    }
);

// Simulates routes that mix constant product, concentrated liquidity and
// stable pools in a single path. Exact input only.
bindings!(
    MixedRouteQuoter,
    {
        function quoteExactInput(bytes path, uint256 amountIn) external returns (uint256 amountOut, uint160[] v3SqrtPriceX96AfterList, uint32[] v3InitializedTicksCrossedList, uint256 v3SwapGasEstimate);
    },
    maplit::hashmap! {
        MAINNET => address!("0x84E44095eeBfEC7793Cd7d5b57B7e401D7f1cA2E"),
        OPTIMISM => address!("0x84E44095eeBfEC7793Cd7d5b57B7e401D7f1cA2E"),
        ARBITRUM_ONE => address!("0x84E44095eeBfEC7793Cd7d5b57B7e401D7f1cA2E"),
        SEPOLIA => address!("0x84E44095eeBfEC7793Cd7d5b57B7e401D7f1cA2E"),
    }
);

bindings!(
    Multicall,
    {
        struct Call {
            address target;
            uint256 gasLimit;
            bytes callData;
        }

        struct Result {
            bool success;
            uint256 gasUsed;
            bytes returnData;
        }

        function multicall(Call[] calls) external returns (uint256 blockNumber, Result[] returnData);
    },
    maplit::hashmap! {
        MAINNET => address!("0x1F98415757620B543A52E61c46B32eB19261F984"),
        OPTIMISM => address!("0x1F98415757620B543A52E61c46B32eB19261F984"),
        ARBITRUM_ONE => address!("0x1F98415757620B543A52E61c46B32eB19261F984"),
        SEPOLIA => address!("0xD7F33bCdb21b359c8ee6F0251d30E94832baAd07"),
    }
);

// Stable pools register their tokens and balances with a single vault
// contract; pool level parameters live on the pool contract itself.
bindings!(
    StableVault,
    {
        function getPoolTokens(bytes32 poolId) external view returns (address[] tokens, uint256[] balances, uint256 lastChangeBlock);
    },
    maplit::hashmap! {
        MAINNET => address!("0xBA12222222228d8Ba445958a75a0704d566BF2C8"),
        OPTIMISM => address!("0xBA12222222228d8Ba445958a75a0704d566BF2C8"),
        ARBITRUM_ONE => address!("0xBA12222222228d8Ba445958a75a0704d566BF2C8"),
        SEPOLIA => address!("0xBA12222222228d8Ba445958a75a0704d566BF2C8"),
    }
);

bindings!(StablePool, {
    function getPoolId() external view returns (bytes32);
    function getAmplificationParameter() external view returns (uint256 value, bool isUpdating, uint256 precision);
    function getSwapFeePercentage() external view returns (uint256);
    function getScalingFactors() external view returns (uint256[] factors);
    function totalSupply() external view returns (uint256);
});

// Share/asset vaults wrapping a stable pool's share token.
bindings!(WrapperVault, {
    function asset() external view returns (address);
    function convertToAssets(uint256 shares) external view returns (uint256 assets);
});

// Optimism predeploy exposing the L1 data fee charged per transaction.
bindings!(
    GasPriceOracle,
    {
        function getL1Fee(bytes data) external view returns (uint256);
    },
    maplit::hashmap! {
        OPTIMISM => address!("0x420000000000000000000000000000000000000F"),
    }
);

// Arbitrum precompile exposing, among others, the price per L1 calldata byte.
bindings!(
    ArbGasInfo,
    {
        function getPricesInWei() external view returns (uint256 perL2Tx, uint256 perL1CalldataByte, uint256 perStorageAllocation, uint256 perArbGasBase, uint256 perArbGasCongestion, uint256 perArbGasTotal);
    },
    maplit::hashmap! {
        ARBITRUM_ONE => address!("0x000000000000000000000000000000000000006C"),
    }
);

pub mod factories {
    use alloy::primitives::{Address, B256, address, b256};

    use crate::networks::*;

    /// Constant product pair factory and the init code digest used to derive
    /// pair addresses deterministically.
    pub fn v2_factory(chain_id: u64) -> Option<(Address, B256)> {
        let factory = match chain_id {
            MAINNET => address!("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f"),
            OPTIMISM => address!("0x0c3c1c532F1e39EdF36BE9Fe0bE1410313E074Bf"),
            ARBITRUM_ONE => address!("0xf1D7CC64Fb4452F05c498126312eBE29f30Fbcf9"),
            SEPOLIA => address!("0xF62c03E08ada871A0bEb309762E260a7a6a880E6"),
            _ => return None,
        };
        Some((
            factory,
            b256!("0x96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f"),
        ))
    }

    /// Concentrated liquidity pool factory and pool init code digest.
    pub fn v3_factory(chain_id: u64) -> Option<(Address, B256)> {
        let factory = match chain_id {
            MAINNET | OPTIMISM | ARBITRUM_ONE => {
                address!("0x1F98431c8aD98523631AE4a59f267346ea31F984")
            }
            SEPOLIA => address!("0x0227628f3F023bb0B980b67D528571c95c6DaC1c"),
            _ => return None,
        };
        Some((
            factory,
            b256!("0xe34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployments_cover_first_class_networks() {
        for chain_id in [
            networks::MAINNET,
            networks::OPTIMISM,
            networks::ARBITRUM_ONE,
            networks::SEPOLIA,
        ] {
            assert!(QuoterV2::deployment(chain_id).is_ok());
            assert!(Multicall::deployment(chain_id).is_ok());
            assert!(UniswapV2Router::deployment(chain_id).is_ok());
            assert!(StableVault::deployment(chain_id).is_ok());
            assert!(factories::v2_factory(chain_id).is_some());
            assert!(factories::v3_factory(chain_id).is_some());
        }
        assert!(QuoterV2::deployment(100).is_err());
    }

    #[test]
    fn l1_fee_oracles_are_rollup_only() {
        assert!(GasPriceOracle::deployment(networks::OPTIMISM).is_ok());
        assert!(GasPriceOracle::deployment(networks::MAINNET).is_err());
        assert!(ArbGasInfo::deployment(networks::ARBITRUM_ONE).is_ok());
        assert!(ArbGasInfo::deployment(networks::OPTIMISM).is_err());
    }
}
