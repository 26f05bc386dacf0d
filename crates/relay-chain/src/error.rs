use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("rpc transport error: {0}")]
    Transport(#[from] alloy_transport::TransportError),

    #[error("contract call error: {0}")]
    Contract(#[from] alloy_contract::Error),

    #[error("store error: {0}")]
    Store(#[from] relay_store::StoreError),

    #[error("unknown remote status: {0}")]
    UnknownRemoteStatus(#[from] relay_types::Error),

    #[error("unsupported chain id: {0}")]
    UnknownChain(u64),

    #[error("log decode error: {0}")]
    LogDecode(String),

    #[error("timed out waiting on chain: {0}")]
    Timeout(String),
}
