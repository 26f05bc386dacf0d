use thiserror::Error;

/// Errors surfaced by `relay-types` itself: config loading and the few value
/// conversions that can fail (e.g. decoding a remote contract status byte).
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config file: {0}")]
    ConfigRead(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[source] toml::de::Error),

    #[error("unknown remote transfer status byte: {0}")]
    UnknownRemoteStatus(u8),
}
