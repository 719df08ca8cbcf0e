use thiserror::Error;

/// Errors surfaced by the routing entry point.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("unsupported chain id {0}")]
    UnsupportedChain(u64),

    #[error("trade type not supported by the requested protocols")]
    UnsupportedTradeType,

    #[error("no route found between the requested tokens")]
    NoRouteFound,

    #[error("rpc failure: {0:#}")]
    RpcFailure(#[from] anyhow::Error),

    #[error("deadline exceeded")]
    Timeout,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
