use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] relay_store::StoreError),

    #[error("chain error: {0}")]
    Chain(#[from] relay_chain::ChainError),

    #[error("no adapter configured for chain {0}")]
    UnknownChain(u64),
}
