pub mod current_block;
pub mod multicall;

use {
    alloy::providers::{DynProvider, Provider, ProviderBuilder},
    url::Url,
};

pub type AlloyProvider = DynProvider;

/// Handle to an Ethereum node.
#[derive(Clone, Debug)]
pub struct Web3 {
    pub provider: AlloyProvider,
}

/// Create a Web3 instance for the node at the given URL.
pub fn web3(url: &Url) -> Web3 {
    let provider = ProviderBuilder::new().connect_http(url.clone()).erased();
    Web3 { provider }
}

/// Like above but takes the URL from the environment variable `NODE_URL`, or
/// `NODE_URL_{chain_id}` when a chain id is given. Panics when the variable is
/// unset or malformed, which is acceptable for the process entry points and
/// tests that use it.
pub fn web3_from_env(chain_id: Option<u64>) -> Web3 {
    let var = match chain_id {
        Some(id) => format!("NODE_URL_{id}"),
        None => "NODE_URL".to_string(),
    };
    let url = std::env::var(&var).unwrap_or_else(|_| panic!("environment variable {var} not set"));
    web3(&url.parse().unwrap())
}
