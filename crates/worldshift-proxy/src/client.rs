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

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::codec::{
    decode_packet, encode_packet, RconPacket, TYPE_AUTH_RESPONSE, TYPE_RESPONSE_VALUE,
};
use crate::error::RconError;

/// Authenticated RCON session over TCP.
#[derive(Debug)]
pub struct RconClient {
    stream: TcpStream,
    address: String,
    buffer: BytesMut,
    next_id: i32,
    timeout: Duration,
}

impl RconClient {
    /// Connect to `address` and authenticate with `password`.
    pub async fn connect(address: &str, password: &str, limit: Duration) -> Result<Self, RconError> {
        let stream = timeout(limit, TcpStream::connect(address))
            .await
            .map_err(|_| RconError::Timeout {
                operation: "connect",
                limit,
            })??;
        let mut client = Self {
            stream,
            address: address.to_owned(),
            buffer: BytesMut::with_capacity(4096),
            next_id: 1,
            timeout: limit,
        };
        client.authenticate(password).await?;
        debug!(address, "rcon session authenticated");
        Ok(client)
    }

    async fn authenticate(&mut self, password: &str) -> Result<(), RconError> {
        let id = self.allocate_id();
        self.send(&RconPacket::auth(id, password)).await?;
        loop {
            let packet = self.receive("authenticate").await?;
            // Some servers emit an empty RESPONSE_VALUE ahead of the auth response.
            if packet.kind == TYPE_RESPONSE_VALUE {
                continue;
            }
            if packet.kind != TYPE_AUTH_RESPONSE {
                return Err(RconError::Malformed {
                    reason: format!("unexpected packet type {} during auth", packet.kind),
                });
            }
            if packet.id == -1 || packet.id != id {
                return Err(RconError::AuthRejected {
                    address: self.address.clone(),
                });
            }
            return Ok(());
        }
    }

    /// Run a console command and return its response body.
    pub async fn exec(&mut self, command: &str) -> Result<String, RconError> {
        let id = self.allocate_id();
        self.send(&RconPacket::command(id, command)).await?;
        loop {
            let packet = self.receive("exec").await?;
            if packet.id == id {
                debug!(address = %self.address, command, "rcon command executed");
                return Ok(packet.body);
            }
            debug!(expected = id, got = packet.id, "discarding stale rcon packet");
        }
    }

    fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    async fn send(&mut self, packet: &RconPacket) -> Result<(), RconError> {
        let bytes = encode_packet(packet)?;
        timeout(self.timeout, self.stream.write_all(&bytes))
            .await
            .map_err(|_| RconError::Timeout {
                operation: "send",
                limit: self.timeout,
            })??;
        Ok(())
    }

    async fn receive(&mut self, operation: &'static str) -> Result<RconPacket, RconError> {
        let limit = self.timeout;
        timeout(limit, self.read_packet())
            .await
            .map_err(|_| RconError::Timeout { operation, limit })?
    }

    async fn read_packet(&mut self) -> Result<RconPacket, RconError> {
        loop {
            if let Some(packet) = decode_packet(&mut self.buffer)? {
                return Ok(packet);
            }
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(RconError::Closed);
            }
        }
    }
}
