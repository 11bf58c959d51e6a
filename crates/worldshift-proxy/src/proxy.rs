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
use tracing::info;
use worldshift_common::config::ProxyConfig;

use crate::client::RconClient;
use crate::error::ProxyError;

/// Reverse-proxy administration used to keep players connected across a restart.
#[async_trait]
pub trait ProxyController: Send + Sync {
    /// Broadcast a message to all connected clients.
    async fn notify(&self, message: &str) -> Result<(), ProxyError>;

    /// Move every connected client to the backend registered as `alias`.
    async fn redirect_all(&self, alias: &str) -> Result<(), ProxyError>;
}

/// [`ProxyController`] speaking RCON to the proxy's admin endpoint.
///
/// Each call opens its own authenticated session; the proxy is contacted rarely and a
/// fresh connection survives proxy restarts between steps.
#[derive(Debug, Clone)]
pub struct RconProxyController {
    address: String,
    password: String,
    timeout: Duration,
}

impl RconProxyController {
    pub fn new(address: impl Into<String>, password: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.address.clone(), config.password.clone(), config.timeout)
    }

    async fn run(&self, command: &str) -> Result<String, ProxyError> {
        let mut client = RconClient::connect(&self.address, &self.password, self.timeout).await?;
        Ok(client.exec(command).await?)
    }
}

#[async_trait]
impl ProxyController for RconProxyController {
    async fn notify(&self, message: &str) -> Result<(), ProxyError> {
        self.run(&format!("alert {message}")).await?;
        info!(proxy = %self.address, "clients notified");
        Ok(())
    }

    async fn redirect_all(&self, alias: &str) -> Result<(), ProxyError> {
        let response = self.run(&format!("send all {alias}")).await?;
        info!(proxy = %self.address, alias, response = %response.trim(), "clients redirected");
        Ok(())
    }
}
