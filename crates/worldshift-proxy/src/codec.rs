//! ---
//! ws_section: "03-collaborators"
//! ws_subsection: "module"
//! ws_type: "source"
//! ws_scope: "code"
//! ws_description: "Remote console clients for the proxy and the game server."
//! ws_version: "v0.1.0"
//! ws_owner: "tbd"
//! ---
//! RCON packet framing.
//!
//! Layout (all integers little-endian): `length: i32`, `id: i32`, `type: i32`, the body
//! as ASCII/UTF-8, then two NUL bytes. `length` counts everything after itself.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::RconError;

pub const PACKET_HEADER_LEN: usize = 4;
/// `id` + `type` + the two trailing NULs.
pub const PACKET_MIN_LEN: usize = 10;
pub const MAX_PACKET_LEN: usize = 64 * 1024;

pub const TYPE_RESPONSE_VALUE: i32 = 0;
pub const TYPE_EXEC_COMMAND: i32 = 2;
pub const TYPE_AUTH_RESPONSE: i32 = 2;
pub const TYPE_AUTH: i32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl RconPacket {
    pub fn auth(id: i32, password: &str) -> Self {
        Self {
            id,
            kind: TYPE_AUTH,
            body: password.to_owned(),
        }
    }

    pub fn command(id: i32, command: &str) -> Self {
        Self {
            id,
            kind: TYPE_EXEC_COMMAND,
            body: command.to_owned(),
        }
    }
}

pub fn encode_packet(packet: &RconPacket) -> Result<Bytes, RconError> {
    let payload_len = PACKET_MIN_LEN + packet.body.len();
    if payload_len > MAX_PACKET_LEN {
        return Err(RconError::PacketTooLarge {
            max: MAX_PACKET_LEN,
            got: payload_len,
        });
    }
    if packet.body.as_bytes().contains(&0) {
        return Err(RconError::Malformed {
            reason: "body contains a NUL byte".to_owned(),
        });
    }
    let mut buf = BytesMut::with_capacity(PACKET_HEADER_LEN + payload_len);
    buf.put_i32_le(payload_len as i32);
    buf.put_i32_le(packet.id);
    buf.put_i32_le(packet.kind);
    buf.put_slice(packet.body.as_bytes());
    buf.put_u8(0);
    buf.put_u8(0);
    Ok(buf.freeze())
}

/// Decode one packet from the front of `buf`, leaving any remainder in place.
///
/// Returns `Ok(None)` while the buffer holds less than a complete packet.
pub fn decode_packet(buf: &mut BytesMut) -> Result<Option<RconPacket>, RconError> {
    if buf.len() < PACKET_HEADER_LEN {
        return Ok(None);
    }
    let length = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if length < PACKET_MIN_LEN as i32 {
        return Err(RconError::Malformed {
            reason: format!("packet length {length} below minimum"),
        });
    }
    let length = length as usize;
    if length > MAX_PACKET_LEN {
        return Err(RconError::PacketTooLarge {
            max: MAX_PACKET_LEN,
            got: length,
        });
    }
    if buf.len() < PACKET_HEADER_LEN + length {
        return Ok(None);
    }

    buf.advance(PACKET_HEADER_LEN);
    let mut frame = buf.split_to(length);
    let id = frame.get_i32_le();
    let kind = frame.get_i32_le();
    let body_len = frame.len() - 2;
    if frame[body_len..] != [0, 0] {
        return Err(RconError::Malformed {
            reason: "packet is not NUL terminated".to_owned(),
        });
    }
    let body = String::from_utf8_lossy(&frame[..body_len]).into_owned();
    Ok(Some(RconPacket { id, kind, body }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_packet_has_expected_layout() {
        let bytes = encode_packet(&RconPacket::command(7, "list")).unwrap();
        assert_eq!(&bytes[..4], &14i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2i32.to_le_bytes());
        assert_eq!(&bytes[12..16], b"list");
        assert_eq!(&bytes[16..], &[0, 0]);
    }

    #[test]
    fn partial_input_waits_for_more_bytes() {
        let encoded = encode_packet(&RconPacket::command(1, "say hi")).unwrap();
        let mut buf = BytesMut::from(&encoded[..9]);
        assert_eq!(decode_packet(&mut buf).unwrap(), None);
        buf.extend_from_slice(&encoded[9..]);
        let second = encode_packet(&RconPacket::auth(2, "pw")).unwrap();
        buf.extend_from_slice(&second);

        let first = decode_packet(&mut buf).unwrap().unwrap();
        assert_eq!(first.body, "say hi");
        let next = decode_packet(&mut buf).unwrap().unwrap();
        assert_eq!(next.kind, TYPE_AUTH);
        assert!(buf.is_empty());
    }

    #[test]
    fn undersized_length_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(4);
        buf.put_i32_le(1);
        assert!(matches!(
            decode_packet(&mut buf),
            Err(RconError::Malformed { .. })
        ));
    }

    #[test]
    fn oversized_body_is_rejected_before_sending() {
        let body = "x".repeat(MAX_PACKET_LEN);
        assert!(matches!(
            encode_packet(&RconPacket::command(1, &body)),
            Err(RconError::PacketTooLarge { .. })
        ));
    }
}
