use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "relay-node", about = "Hashed-timelock cross-chain bridge relay node")]
pub struct Cli {
    /// Path to the relay's TOML configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Path to a file holding the relay's hex-encoded signing key, one per
    /// line. If omitted, the key is read from the `RELAY_PRIVATE_KEY`
    /// environment variable, falling back to an interactive masked prompt.
    #[arg(long, value_name = "FILE")]
    pub keyfile: Option<PathBuf>,

    /// Log filter, e.g. "info" or "relay_reconcile=debug,info".
    #[arg(long, default_value = "info")]
    pub log_filter: String,
}
