//! ---
//! ws_section: "03-collaborators"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Remote console clients for the proxy and the game server."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RconError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("rcon {operation} timed out after {limit:?}")]
    Timeout { operation: &'static str, limit: Duration },
    #[error("rcon authentication rejected by {address}")]
    AuthRejected { address: String },
    #[error("rcon packet too large: max {max} got {got}")]
    PacketTooLarge { max: usize, got: usize },
    #[error("malformed rcon packet: {reason}")]
    Malformed { reason: String },
    #[error("connection closed by peer")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy unavailable: {0}")]
    Unavailable(String),
}

impl From<RconError> for ProxyError {
    fn from(err: RconError) -> Self {
        ProxyError::Unavailable(err.to_string())
    }
}
