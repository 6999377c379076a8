//! # Error Kinds
//!
//! Five kinds: `CodecError` for the frame pipeline, `ProtocolError` for a
//! dispatch-time contract violation, `TransportError` for connection
//! failures, `ConfigError` for invalid configuration, and a `User` variant
//! for a panic escaping a callback. A `ProtocolError` never propagates out
//! of the coordinator as a `Result` — it is logged, then answered on the
//! wire as the matching `InitError`/`HeartbeatError` message, since the
//! peer on the other end of the connection is exactly who needs to see it.
//!
//! `CodecError` deliberately collapses decryption, decompression, and
//! deserialization failure into one variant: the caller must never be able
//! to distinguish *which* stage failed, or a malicious peer could use the
//! difference as a decryption oracle.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to decode frame")]
    DecodeFailed,
    #[error("failed to encode frame: {0}")]
    EncodeFailed(String),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("node id already registered")]
    AlreadyRegistered,
    #[error("node id not registered")]
    UnknownNode,
    #[error("unexpected message for current state: {0}")]
    UnexpectedMessage(&'static str),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection refused")]
    ConnectionRefused,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("secret key must be exactly 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("heartbeat_timeout must be greater than 9 seconds, got {0}")]
    HeartbeatTimeoutTooLow(u64),
    #[error("quit_counter must be greater than 0, got {0}")]
    QuitCounterZero(u32),
    #[error("failed to read configuration file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level error, gathering the five kinds behind one `From`-convertible type.
#[derive(Error, Debug)]
pub enum FarflungError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("user callback panicked: {0}")]
    User(String),
}
