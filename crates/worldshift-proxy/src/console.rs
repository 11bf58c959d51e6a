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

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use worldshift_common::config::ConsoleConfig;

use crate::client::RconClient;
use crate::error::RconError;

/// Players reported by the game server's `list` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayerList {
    pub online: u32,
    pub max: Option<u32>,
    pub names: Vec<String>,
}

impl PlayerList {
    /// Parse `There are X of a maximum of Y players online: a, b`.
    pub fn parse(response: &str) -> Option<Self> {
        let (summary, names) = response.split_once(':')?;
        let after_are = summary.split_once("are")?.1;
        let (online, rest) = after_are.split_once("of")?;
        let online = online.trim().parse::<u32>().ok()?;
        let max = rest
            .split_whitespace()
            .find_map(|token| token.parse::<u32>().ok());
        let names = names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect();
        Some(Self { online, max, names })
    }
}

/// Commands issued to the game server's own admin console.
#[async_trait]
pub trait GameConsole: Send + Sync {
    /// Flush the world to disk.
    async fn save_world(&self) -> Result<(), RconError>;

    /// Show `message` to every connected player.
    async fn broadcast(&self, message: &str) -> Result<(), RconError>;

    /// `None` when the server answered with something other than a player list.
    async fn online_players(&self) -> Result<Option<PlayerList>, RconError>;
}

/// [`GameConsole`] over RCON.
#[derive(Debug, Clone)]
pub struct ServerConsole {
    address: String,
    password: String,
    timeout: Duration,
}

impl ServerConsole {
    pub fn new(address: impl Into<String>, password: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self::new(config.address.clone(), config.password.clone(), config.timeout)
    }

    async fn session(&self) -> Result<RconClient, RconError> {
        RconClient::connect(&self.address, &self.password, self.timeout).await
    }
}

#[async_trait]
impl GameConsole for ServerConsole {
    async fn save_world(&self) -> Result<(), RconError> {
        let mut client = self.session().await?;
        client.exec("save-all flush").await?;
        info!(console = %self.address, "world saved");
        Ok(())
    }

    /// Sends a formatted `tellraw` followed by a plain `say`, which also reaches the log.
    async fn broadcast(&self, message: &str) -> Result<(), RconError> {
        let mut client = self.session().await?;
        let formatted = json!({ "text": message, "color": "gold", "bold": true });
        client.exec(&format!("tellraw @a {formatted}")).await?;
        client.exec(&format!("say {message}")).await?;
        info!(console = %self.address, message, "players notified");
        Ok(())
    }

    async fn online_players(&self) -> Result<Option<PlayerList>, RconError> {
        let mut client = self.session().await?;
        let response = client.exec("list").await?;
        let players = PlayerList::parse(&response);
        if players.is_none() {
            warn!(console = %self.address, response = %response.trim(), "unrecognised player list");
        }
        Ok(players)
    }
}
