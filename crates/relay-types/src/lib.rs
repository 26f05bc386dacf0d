pub mod config;
pub mod error;
pub mod status;
pub mod transfer;

pub use config::{ChainConfig, RelayConfig, TokenConfig, TransactorConfig, WatchConfig};
pub use error::Error;
pub use status::{RemoteStatus, TransferStatus, TransferType};
pub use transfer::{derive_in_transfer_id, Transfer};
