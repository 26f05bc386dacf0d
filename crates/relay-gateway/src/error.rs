use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("gateway rpc error: {0}")]
    Status(#[from] tonic::Status),

    #[error("failed to sign ping: {0}")]
    Sign(#[from] alloy_signer::Error),
}
