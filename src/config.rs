//! Client configuration.
//!
//! Parsing an on-disk config file is a caller concern (this crate's scope
//! stops at accepting an already-built [`ClientConfig`]); the `Deserialize`
//! derive just means an embedding application can assemble one from TOML or
//! any other `serde` source the way it assembles the rest of its config.

use std::time::Duration;

use serde::Deserialize;

use crate::{DEFAULT_HOST, DEFAULT_PORT, MAX_CONNECTIONS};

/// `(host, port, timeout, max_connections)` — the immutable configuration a
/// [`crate::KtClient`] is built from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,

    /// Per-socket read/write/connect timeout. `None` means no timeout.
    #[serde(skip)]
    pub timeout: Option<Duration>,

    pub max_connections: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: None,
            max_connections: MAX_CONNECTIONS,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }
}
