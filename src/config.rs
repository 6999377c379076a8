//! # Configuration
//!
//! Static parameters shared by coordinator and worker: network address,
//! heartbeat timeout, quit grace, and the shared secret key. Immutable once
//! constructed — the secret key is transformed into Fernet-ready key
//! material exactly once, at construction, mirroring `PSConfiguration`'s
//! `base64.urlsafe_b64encode` step in the original Python library.

use crate::error::ConfigError;
use base64::Engine;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1";
const DEFAULT_SERVER_PORT: u16 = 3100;
const DEFAULT_HEARTBEAT_TIMEOUT: u64 = 300;
const DEFAULT_QUIT_COUNTER: u32 = 10;

/// Raw JSON shape accepted from a configuration file. Field names match
/// `spec.md` §6.3 exactly; everything but `secret_key` is optional.
#[derive(Debug, Deserialize)]
struct RawConfig {
    secret_key: String,
    #[serde(default)]
    server_address: Option<String>,
    #[serde(default)]
    server_port: Option<u16>,
    #[serde(default)]
    heartbeat_timeout: Option<u64>,
    #[serde(default)]
    quit_counter: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub server_address: String,
    pub server_port: u16,
    pub heartbeat_timeout: u64,
    pub quit_counter: u32,
    /// The raw 32-byte user key, URL-safe base64 encoded into Fernet's
    /// canonical key form. Never logged.
    fernet_key: String,
}

impl Configuration {
    /// Build a configuration directly from a 32-byte secret key and
    /// defaults, validating as `from_json` would.
    pub fn new(secret_key: &str) -> Result<Self, ConfigError> {
        Self::build(
            secret_key,
            None,
            None,
            None,
            None,
        )
    }

    /// Load and validate a configuration from a JSON file. Invalid values
    /// are fatal (`ConfigError`), matching the Python original's asserts
    /// in `PSConfiguration.from_json`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(content)?;
        Self::build(
            &raw.secret_key,
            raw.server_address,
            raw.server_port,
            raw.heartbeat_timeout,
            raw.quit_counter,
        )
    }

    fn build(
        secret_key: &str,
        server_address: Option<String>,
        server_port: Option<u16>,
        heartbeat_timeout: Option<u64>,
        quit_counter: Option<u32>,
    ) -> Result<Self, ConfigError> {
        if secret_key.len() != 32 {
            return Err(ConfigError::InvalidKeyLength(secret_key.len()));
        }
        let heartbeat_timeout = heartbeat_timeout.unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT);
        if heartbeat_timeout <= 9 {
            return Err(ConfigError::HeartbeatTimeoutTooLow(heartbeat_timeout));
        }
        let quit_counter = quit_counter.unwrap_or(DEFAULT_QUIT_COUNTER);
        if quit_counter == 0 {
            return Err(ConfigError::QuitCounterZero(quit_counter));
        }

        let fernet_key =
            base64::engine::general_purpose::URL_SAFE.encode(secret_key.as_bytes());

        Ok(Configuration {
            server_address: server_address.unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string()),
            server_port: server_port.unwrap_or(DEFAULT_SERVER_PORT),
            heartbeat_timeout,
            quit_counter,
            fernet_key,
        })
    }

    /// The canonical (already-base64) key handed to the Fernet cipher.
    pub(crate) fn fernet_key(&self) -> &str {
        &self.fernet_key
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.server_address, self.server_port)
    }
}
