use thiserror::Error;

/// Whether a failed event can be retried (cursor does not advance) or must be
/// treated as consumed (cursor advances, the event is skipped for good).
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("store error: {0}")]
    Store(#[from] relay_store::StoreError),

    #[error("no destination chain configured for chain id {0}")]
    UnknownDstChain(u64),

    #[error("no token config on chain {chain_id} matching source token {token}")]
    UnknownToken { chain_id: u64, token: alloy_primitives::Address },
}

impl IngestError {
    /// A store error means the DB write itself may not have landed — retry
    /// without advancing the cursor. Everything else is a malformed or
    /// unroutable event that will never succeed no matter how many times it
    /// is replayed, so it's consumed and the cursor moves on.
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
