//! Batched read-only contract calls going through the on-chain multicall
//! contract so that many view calls cost few RPC round trips.
//!
//! Batches that fail as a whole (node error, aggregate out of gas, timeout)
//! are split in half and re-executed up to a maximum depth; individual call
//! failures never abort a batch. Results always come back in input order.

use {
    crate::Web3,
    alloy::{
        eips::BlockId,
        primitives::{Address, Bytes, U256},
        sol_types::{SolCall, SolValue},
    },
    anyhow::{Context as _, Result},
    contracts::Multicall,
    futures::{
        future::{BoxFuture, FutureExt as _},
        stream::{self, StreamExt as _},
    },
    std::num::NonZeroUsize,
};

/// Selector of `Error(string)`.
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// How many calls to pack into a single multicall before any splitting.
    pub batch_size: usize,
    /// Gas passed on to every inner call.
    pub gas_limit_per_call: u64,
    /// The maximum number of batches in flight at the same time.
    pub max_concurrent_batches: NonZeroUsize,
    /// How often a failing batch may be halved before every contained call is
    /// reported as fatal.
    pub max_halvings: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 100,
            gas_limit_per_call: 1_000_000,
            max_concurrent_batches: NonZeroUsize::new(10).unwrap(),
            max_halvings: 5,
        }
    }
}

/// A single read-only call to execute as part of a batch.
#[derive(Clone, Debug)]
pub struct Call {
    pub target: Address,
    pub calldata: Bytes,
}

/// Per-call result of a batched execution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CallOutcome<T> {
    Ok {
        data: T,
        gas_used: U256,
    },
    /// The call itself reverted. The reason is decoded from `Error(string)`
    /// return data when present.
    Reverted {
        reason: Option<String>,
    },
    /// The containing batch kept failing all the way down to the halving
    /// depth limit.
    Fatal,
}

impl<T> CallOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Ok { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }
}

/// Executes one prepared batch as a single `eth_call`.
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait::async_trait]
pub trait BatchExecuting: Send + Sync {
    async fn execute(
        &self,
        calls: Vec<Multicall::Call>,
        block: Option<BlockId>,
    ) -> Result<Vec<Multicall::Result>>;
}

pub struct ContractExecutor {
    instance: Multicall::Instance,
}

#[async_trait::async_trait]
impl BatchExecuting for ContractExecutor {
    async fn execute(
        &self,
        calls: Vec<Multicall::Call>,
        block: Option<BlockId>,
    ) -> Result<Vec<Multicall::Result>> {
        let call = self.instance.multicall(calls);
        let call = match block {
            Some(block) => call.block(block),
            None => call,
        };
        let output = call.call().await.context("multicall failed")?;
        Ok(output.returnData)
    }
}

pub struct MulticallExecutor<E = ContractExecutor> {
    executor: E,
    config: Config,
}

impl MulticallExecutor<ContractExecutor> {
    /// Multicall executor using the contract deployment known for the chain.
    pub fn new(web3: &Web3, chain_id: u64, config: Config) -> Result<Self> {
        let instance = Multicall::deployed(&web3.provider, chain_id)?;
        Ok(Self::with_executor(ContractExecutor { instance }, config))
    }

    /// Multicall executor using a caller supplied contract address.
    pub fn at(web3: &Web3, address: Address, config: Config) -> Self {
        let instance = Multicall::Instance::new(address, web3.provider.clone());
        Self::with_executor(ContractExecutor { instance }, config)
    }
}

impl<E> MulticallExecutor<E>
where
    E: BatchExecuting,
{
    pub fn with_executor(executor: E, config: Config) -> Self {
        Self { executor, config }
    }

    /// Executes all calls, in as few round trips as the configured batch size
    /// allows, and returns one outcome per call in input order.
    pub async fn aggregate(
        &self,
        calls: Vec<Call>,
        block: Option<BlockId>,
    ) -> Vec<CallOutcome<Bytes>> {
        let chunks = calls
            .chunks(self.config.batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect::<Vec<_>>();
        let results = stream::iter(chunks)
            .map(|chunk| self.execute_chunk(chunk, block, 0))
            .buffered(self.config.max_concurrent_batches.get())
            .collect::<Vec<_>>()
            .await;
        results.concat()
    }

    /// Executes the same function on many contracts.
    pub async fn same_function_many_contracts<C>(
        &self,
        targets: &[Address],
        call: &C,
        block: Option<BlockId>,
    ) -> Vec<CallOutcome<C::Return>>
    where
        C: SolCall,
    {
        let calls = targets
            .iter()
            .map(|target| Call {
                target: *target,
                calldata: call.abi_encode().into(),
            })
            .collect();
        decode_outcomes::<C>(self.aggregate(calls, block).await)
    }

    /// Executes one function of one contract for many parameter sets.
    pub async fn one_contract_many_params<C>(
        &self,
        target: Address,
        calls: &[C],
        block: Option<BlockId>,
    ) -> Vec<CallOutcome<C::Return>>
    where
        C: SolCall,
    {
        let calls = calls
            .iter()
            .map(|call| Call {
                target,
                calldata: call.abi_encode().into(),
            })
            .collect();
        decode_outcomes::<C>(self.aggregate(calls, block).await)
    }

    fn execute_chunk(
        &self,
        calls: Vec<Call>,
        block: Option<BlockId>,
        depth: u32,
    ) -> BoxFuture<'_, Vec<CallOutcome<Bytes>>> {
        async move {
            let batch = calls
                .iter()
                .map(|call| Multicall::Call {
                    target: call.target,
                    gasLimit: U256::from(self.config.gas_limit_per_call),
                    callData: call.calldata.clone(),
                })
                .collect();
            match self.executor.execute(batch, block).await {
                Ok(results) if results.len() == calls.len() => results
                    .into_iter()
                    .map(|result| {
                        if result.success {
                            CallOutcome::Ok {
                                data: result.returnData,
                                gas_used: result.gasUsed,
                            }
                        } else {
                            CallOutcome::Reverted {
                                reason: decode_revert_reason(&result.returnData),
                            }
                        }
                    })
                    .collect(),
                Ok(results) => {
                    tracing::error!(
                        expected = calls.len(),
                        got = results.len(),
                        "multicall returned unexpected number of results"
                    );
                    vec![CallOutcome::Fatal; calls.len()]
                }
                Err(err) if calls.len() > 1 && depth < self.config.max_halvings => {
                    tracing::debug!(?err, calls = calls.len(), depth, "splitting failed batch");
                    let (left, right) = calls.split_at(calls.len() / 2);
                    let (left, right) = futures::join!(
                        self.execute_chunk(left.to_vec(), block, depth + 1),
                        self.execute_chunk(right.to_vec(), block, depth + 1),
                    );
                    left.into_iter().chain(right).collect()
                }
                Err(err) => {
                    tracing::warn!(
                        ?err,
                        calls = calls.len(),
                        depth,
                        "batch failed at maximum halving depth"
                    );
                    vec![CallOutcome::Fatal; calls.len()]
                }
            }
        }
        .boxed()
    }
}

fn decode_outcomes<C>(outcomes: Vec<CallOutcome<Bytes>>) -> Vec<CallOutcome<C::Return>>
where
    C: SolCall,
{
    outcomes
        .into_iter()
        .map(|outcome| match outcome {
            CallOutcome::Ok { data, gas_used } => match C::abi_decode_returns(&data) {
                Ok(value) => CallOutcome::Ok {
                    data: value,
                    gas_used,
                },
                Err(err) => CallOutcome::Reverted {
                    reason: Some(format!("return data decoding failed: {err}")),
                },
            },
            CallOutcome::Reverted { reason } => CallOutcome::Reverted { reason },
            CallOutcome::Fatal => CallOutcome::Fatal,
        })
        .collect()
}

/// Decodes the revert reason of a failed call when the return data carries an
/// `Error(string)`.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(&ERROR_SELECTOR[..])?;
    String::abi_decode(payload).ok()
}
