//! Configuration loading from `.env` files.

use std::env;

use anyhow::{Context, Result};

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HTTP bind address, e.g. `127.0.0.1:7777`.
    pub bind_http: String,
    /// WebSocket bind address, e.g. `127.0.0.1:7778`.
    pub bind_ws: String,
    /// Verify Schnorr signatures of published events.
    pub verify_sig: bool,
    /// Relay name advertised in the NIP-11 document.
    pub relay_name: String,
    /// Free-form description advertised in the NIP-11 document.
    pub relay_description: String,
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let bind_http = env::var("BIND_HTTP").context("BIND_HTTP is not set")?;
        let bind_ws = env::var("BIND_WS").context("BIND_WS is not set")?;
        let verify_sig = env::var("VERIFY_SIG").unwrap_or_else(|_| "1".into()) != "0";
        let relay_name = env::var("RELAY_NAME")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "flare".into());
        let relay_description = env::var("RELAY_DESCRIPTION").unwrap_or_default();
        Ok(Self {
            bind_http,
            bind_ws,
            verify_sig,
            relay_name,
            relay_description,
        })
    }
}

/// Contents written by `flare init` when no `.env` exists yet.
///
/// dotenvy rejects unquoted values containing spaces, so free-text fields
/// are written quoted.
pub fn default_env() -> String {
    concat!(
        "BIND_HTTP=127.0.0.1:7777\n",
        "BIND_WS=127.0.0.1:7778\n",
        "VERIFY_SIG=1\n",
        "RELAY_NAME=flare\n",
        "RELAY_DESCRIPTION=\"\"\n",
    )
    .to_string()
}
