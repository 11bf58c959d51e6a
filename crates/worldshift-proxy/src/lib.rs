//! ---
//! ws_section: "03-collaborators"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Remote console clients for the proxy and the game server."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! RCON clients for the reverse proxy in front of the workload and for the game server
//! console behind it.

pub mod codec;
mod client;
mod console;
mod error;
mod proxy;

pub use client::RconClient;
pub use console::{GameConsole, PlayerList, ServerConsole};
pub use error::{ProxyError, RconError};
pub use proxy::{ProxyController, RconProxyController};
