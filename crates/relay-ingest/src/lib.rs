pub mod error;
pub mod handler;
pub mod seed;

pub use error::IngestError;
pub use handler::{EventIngestor, Outcome};
pub use seed::{build_transfer_pair, TransferOutEvent, IN_TIMELOCK_SHAVE_HOURS, MIN_TIMELOCK_MARGIN_HOURS};
