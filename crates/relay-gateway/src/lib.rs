pub mod client;
pub mod error;

pub(crate) mod proto {
    tonic::include_proto!("relay.gateway");
}

pub use client::{ChainGasInfo, ChainHeartbeat, GatewayClient, TokenBalanceInfo};
pub use error::GatewayError;
