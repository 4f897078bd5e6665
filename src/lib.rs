//! Async client for the Kyoto Tycoon binary protocol.
//!
//! Kyoto Tycoon is a lightweight, high-performance key-value store server.
//! This crate speaks its binary protocol over TCP with I/O batching and a
//! bounded pool of persistent connections, so that many concurrent logical
//! requests can share a small number of sockets under Tokio's cooperative
//! scheduler.
//!
//! Keys and values are opaque byte strings everywhere in this crate — there
//! is no typed value coercion. See [`client::KtClient`] for the operations
//! this crate exposes, and [`embedded::embedded`] for spinning up a
//! `ktserver` child process for local development or tests.

pub mod client;
pub mod codec;
pub mod config;
pub mod embedded;
pub mod error;
pub mod pool;
pub mod record;
pub mod stream;

pub use client::KtClient;
pub use config::ClientConfig;
pub use embedded::{embedded, embedded_default};
pub use error::{Error, ProtocolError, Result};
pub use record::{GetItem, GetRecord, Record, ScriptRecord};

/// `set_bulk` request/response magic.
pub const MB_SET_BULK: u8 = codec::MB_SET_BULK;
/// `get_bulk` request/response magic.
pub const MB_GET_BULK: u8 = codec::MB_GET_BULK;
/// `remove_bulk` request/response magic.
pub const MB_REMOVE_BULK: u8 = codec::MB_REMOVE_BULK;
/// `play_script` request/response magic.
pub const MB_PLAY_SCRIPT: u8 = codec::MB_PLAY_SCRIPT;
/// Error response magic.
pub const MB_ERROR: u8 = codec::MB_ERROR;

/// Default host used when no host is configured.
pub const DEFAULT_HOST: &str = "localhost";
/// Default Kyoto Tycoon binary protocol port.
pub const DEFAULT_PORT: u16 = 1978;
/// Sentinel expiration timestamp meaning "never expire".
pub const DEFAULT_EXPIRE: i64 = 0x7FFF_FFFF_FFFF_FFFF;

/// Request flag: suppress the server's response (and the client's read).
pub const FLAG_NOREPLY: u32 = 0x01;

/// Default maximum number of pooled connections.
pub const MAX_CONNECTIONS: usize = 4;
/// Default lower bound of the embedded server's ephemeral port range.
pub const RANGE_FROM: u16 = 0x4000;
/// Default upper bound of the embedded server's ephemeral port range.
pub const RANGE_TO: u16 = 0x7FFF;
