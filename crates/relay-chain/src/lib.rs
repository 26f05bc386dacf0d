pub mod abi;
pub mod adapter;
pub mod error;
pub mod monitor;

pub use adapter::{ChainAdapter, EvmChainAdapter, SentTx};
pub use error::ChainError;
pub use monitor::{BridgeEvent, LogWatcher};
