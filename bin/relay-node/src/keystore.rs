use std::path::Path;

use alloy_signer_local::PrivateKeySigner;

/// Resolves the relay's signing key: a keyfile path, then the
/// `RELAY_PRIVATE_KEY` environment variable, then an interactive masked
/// prompt. Every chain currently shares one key; per-chain keys are not a
/// requirement this relay needs to meet yet.
pub fn load_signer(keyfile: Option<&Path>) -> eyre::Result<PrivateKeySigner> {
    let raw = if let Some(path) = keyfile {
        std::fs::read_to_string(path)?.trim().to_owned()
    } else if let Ok(from_env) = std::env::var("RELAY_PRIVATE_KEY") {
        from_env
    } else {
        rpassword::prompt_password("relay signing key (hex): ")?
    };

    let raw = raw.strip_prefix("0x").unwrap_or(&raw);
    Ok(raw.parse()?)
}
