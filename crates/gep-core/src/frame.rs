//! Payload-header framing for the command channel
//!
//! Every command-channel message is framed as:
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Bytes 0-3:  Marker (0xAA 0xBB 0xCC 0xDD)                 │
//! │ Bytes 4-7:  Packet size (uint32 little-endian)           │
//! ├──────────────────────────────────────────────────────────┤
//! │ Body (packet-size bytes)                                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//! A command body is the command code followed by its payload. A response
//! body is the response code, the echoed command code, a big-endian payload
//! length, and the payload. The outer size field is the only little-endian
//! integer in the protocol.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::protocol::ServerCommand;
use crate::wire::ByteReader;

/// Leading marker of every framed message.
pub const PAYLOAD_MARKER: [u8; 4] = [0xAA, 0xBB, 0xCC, 0xDD];

/// Size of the payload header (marker + packet size).
pub const PAYLOAD_HEADER_SIZE: usize = 8;

/// Size of the response header inside a body (response code, command code,
/// big-endian payload length).
pub const RESPONSE_HEADER_SIZE: usize = 6;

/// Initial read/write buffer size; buffers grow past this but never shrink.
pub const MAX_PACKET_SIZE: usize = 32768;

/// Extracts the body length from an 8-byte payload header.
///
/// The marker bytes are not validated; the read path trusts the stream and
/// parses only the size field.
pub fn packet_size(header: &[u8; PAYLOAD_HEADER_SIZE]) -> u32 {
    u32::from_le_bytes([header[4], header[5], header[6], header[7]])
}

/// Frames a command for the wire: marker, little-endian size, command code,
/// payload.
pub fn encode_command(command: ServerCommand, payload: &[u8]) -> Bytes {
    encode_command_code(command.code(), payload)
}

/// Frames an arbitrary command code; the packet size is `payload.len() + 1`
/// for the leading code byte.
pub fn encode_command_code(code: u8, payload: &[u8]) -> Bytes {
    let packet_size = 1 + payload.len() as u32;
    let mut buf = BytesMut::with_capacity(PAYLOAD_HEADER_SIZE + packet_size as usize);
    buf.put_slice(&PAYLOAD_MARKER);
    buf.put_u32_le(packet_size);
    buf.put_u8(code);
    buf.put_slice(payload);
    buf.freeze()
}

/// A decoded response body.
#[derive(Debug)]
pub struct ResponseFrame<'a> {
    pub response_code: u8,
    /// The command this response refers to, or 0 for unsolicited stream
    /// frames such as data packets.
    pub command_code: u8,
    pub payload: &'a [u8],
}

impl<'a> ResponseFrame<'a> {
    /// Decodes a response body (the bytes inside the outer framing).
    ///
    /// The embedded big-endian length field is informational; the trailing
    /// bytes are authoritative.
    pub fn decode(body: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(body);
        let response_code = reader.read_u8()?;
        let command_code = reader.read_u8()?;
        let _declared_length = reader.read_u32_be()?;
        Ok(Self {
            response_code,
            command_code,
            payload: reader.rest(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerResponse;

    #[test]
    fn test_command_framing_round_trip() {
        let payload = [0x10u8, 0x20, 0x30, 0x40, 0x50];
        let framed = encode_command(ServerCommand::Subscribe, &payload);

        assert_eq!(&framed[0..4], &PAYLOAD_MARKER);

        let mut header = [0u8; PAYLOAD_HEADER_SIZE];
        header.copy_from_slice(&framed[..PAYLOAD_HEADER_SIZE]);
        assert_eq!(packet_size(&header) as usize, payload.len() + 1);

        assert_eq!(framed[PAYLOAD_HEADER_SIZE], ServerCommand::Subscribe.code());
        assert_eq!(&framed[PAYLOAD_HEADER_SIZE + 1..], &payload);
    }

    #[test]
    fn test_bare_command_wire_image() {
        // A payload-less command is nine literal bytes on the wire.
        let framed = encode_command_code(0xCC, &[]);
        assert_eq!(
            framed.as_ref(),
            &[0xAA, 0xBB, 0xCC, 0xDD, 0x01, 0x00, 0x00, 0x00, 0xCC]
        );
    }

    #[test]
    fn test_response_frame_decode() {
        let mut body = vec![
            ServerResponse::Succeeded as u8,
            ServerCommand::Subscribe.code(),
        ];
        let message = b"Client subscribed";
        body.extend_from_slice(&(message.len() as u32).to_be_bytes());
        body.extend_from_slice(message);

        let frame = ResponseFrame::decode(&body).unwrap();
        assert_eq!(frame.response_code, ServerResponse::Succeeded as u8);
        assert_eq!(frame.command_code, ServerCommand::Subscribe.code());
        assert_eq!(frame.payload, message);
    }

    #[test]
    fn test_response_frame_too_short() {
        assert!(ResponseFrame::decode(&[0x80, 0x02]).is_err());
    }
}
