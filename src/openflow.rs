/*! OpenFlow 1.0 message framing.

Peels the fixed 8-byte OpenFlow header off a single TCP-payload buffer and
exposes the handful of message types the correlator cares about. The buffer
is assumed to already start at a message boundary — TCP stream reassembly
and buffering across partial reads are the upstream capture source's job,
not this crate's (see the crate-level docs' Non-goals).
*/

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder};

const HEADER_LEN: usize = 8;
pub const OFP_VERSION: u8 = 1;

pub const OFPT_PACKET_IN: u8 = 10;
pub const OFPT_PACKET_OUT: u8 = 13;
pub const OFPT_ECHO_REQUEST: u8 = 2;
pub const OFPT_ECHO_REPLY: u8 = 3;

pub const OFP_NO_BUFFER: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<'a> {
    PacketIn {
        buffer_id: u32,
        total_len: u16,
        in_port: u16,
        reason: u8,
        data: &'a [u8],
    },
    PacketOut {
        buffer_id: u32,
        in_port: u16,
        actions_len: u16,
        /// Inner Ethernet frame. Empty when `buffer_id != OFP_NO_BUFFER`,
        /// since the switch is expected to replay buffered data itself.
        data: &'a [u8],
    },
    EchoRequest {
        data: &'a [u8],
    },
    EchoReply {
        data: &'a [u8],
    },
    Other {
        msg_type: u8,
    },
}

/// Parses exactly one OpenFlow 1.0 message starting at `buf[0]`.
///
/// Returns the message and the number of bytes it occupied, so callers
/// iterating over a buffer containing several messages back-to-back can
/// advance correctly (the correlator itself only ever sees one message per
/// captured TCP payload, per the upstream contract, but parsing the length
/// is still the framer's job).
pub fn parse(buf: &[u8]) -> Result<(Message<'_>, usize)> {
    if buf.len() < HEADER_LEN {
        return Err(Error::TooShort);
    }
    let version = buf[0];
    let msg_type = buf[1];
    let length = BigEndian::read_u16(&buf[2..4]) as usize;
    // xid at buf[4..8] is unused by this crate.

    if version != OFP_VERSION {
        return Err(Error::BadVersion(version));
    }
    if length < HEADER_LEN || buf.len() < length {
        return Err(Error::Truncated);
    }
    let body = &buf[HEADER_LEN..length];

    let msg = match msg_type {
        OFPT_PACKET_IN => parse_packet_in(body)?,
        OFPT_PACKET_OUT => parse_packet_out(body)?,
        OFPT_ECHO_REQUEST => Message::EchoRequest { data: body },
        OFPT_ECHO_REPLY => Message::EchoReply { data: body },
        _ => Message::Other { msg_type },
    };
    Ok((msg, length))
}

fn parse_packet_in(body: &[u8]) -> Result<Message<'_>> {
    // buffer_id(4) + total_len(2) + in_port(2) + reason(1) + pad(1)
    if body.len() < 10 {
        return Err(Error::Truncated);
    }
    let buffer_id = BigEndian::read_u32(&body[0..4]);
    let total_len = BigEndian::read_u16(&body[4..6]);
    let in_port = BigEndian::read_u16(&body[6..8]);
    let reason = body[8];
    Ok(Message::PacketIn {
        buffer_id,
        total_len,
        in_port,
        reason,
        data: &body[10..],
    })
}

fn parse_packet_out(body: &[u8]) -> Result<Message<'_>> {
    // buffer_id(4) + in_port(2) + actions_len(2)
    if body.len() < 8 {
        return Err(Error::Truncated);
    }
    let buffer_id = BigEndian::read_u32(&body[0..4]);
    let in_port = BigEndian::read_u16(&body[4..6]);
    let actions_len = BigEndian::read_u16(&body[6..8]) as usize;
    let rest = &body[8..];
    if rest.len() < actions_len {
        return Err(Error::Truncated);
    }
    let (_actions, tail) = rest.split_at(actions_len);
    let data = if buffer_id == OFP_NO_BUFFER { tail } else { &[] };
    Ok(Message::PacketOut {
        buffer_id,
        in_port,
        actions_len: actions_len as u16,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(msg_type: u8, length: u16) -> Vec<u8> {
        vec![OFP_VERSION, msg_type, (length >> 8) as u8, length as u8, 0, 0, 0, 1]
    }

    #[test]
    fn rejects_non_v1() {
        let mut buf = header(OFPT_PACKET_IN, 18);
        buf[0] = 4;
        buf.resize(18, 0);
        assert_eq!(parse(&buf), Err(Error::BadVersion(4)));
    }

    #[test]
    fn rejects_truncated_header() {
        assert_eq!(parse(&[1, 2, 3]), Err(Error::TooShort));
    }

    #[test]
    fn rejects_length_past_buffer() {
        let buf = header(OFPT_PACKET_IN, 100);
        assert_eq!(parse(&buf), Err(Error::Truncated));
    }

    #[test]
    fn parses_packet_in_with_inner_frame() {
        let mut buf = header(OFPT_PACKET_IN, 8 + 10 + 4);
        buf.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // buffer_id
        buf.extend_from_slice(&4u16.to_be_bytes()); // total_len
        buf.extend_from_slice(&1u16.to_be_bytes()); // in_port
        buf.push(0); // reason
        buf.push(0); // pad
        buf.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let (msg, len) = parse(&buf).unwrap();
        assert_eq!(len, buf.len());
        match msg {
            Message::PacketIn { in_port, data, .. } => {
                assert_eq!(in_port, 1);
                assert_eq!(data, &[0xDE, 0xAD, 0xBE, 0xEF]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn packet_out_with_buffer_id_set_has_no_inner_frame() {
        let mut buf = header(OFPT_PACKET_OUT, 8 + 8 + 4);
        buf.extend_from_slice(&7u32.to_be_bytes()); // buffer_id (buffered)
        buf.extend_from_slice(&1u16.to_be_bytes()); // in_port
        buf.extend_from_slice(&0u16.to_be_bytes()); // actions_len
        buf.extend_from_slice(&[1, 2, 3, 4]); // would-be data, ignored

        let (msg, _) = parse(&buf).unwrap();
        match msg {
            Message::PacketOut { data, .. } => assert!(data.is_empty()),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn packet_out_with_no_buffer_carries_inner_frame_after_actions() {
        let mut buf = header(OFPT_PACKET_OUT, 8 + 8 + 4 + 3);
        buf.extend_from_slice(&OFP_NO_BUFFER.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes()); // in_port
        buf.extend_from_slice(&4u16.to_be_bytes()); // actions_len
        buf.extend_from_slice(&[0, 0, 0, 0]); // one dummy action
        buf.extend_from_slice(&[9, 9, 9]); // inner frame

        let (msg, _) = parse(&buf).unwrap();
        match msg {
            Message::PacketOut { data, actions_len, .. } => {
                assert_eq!(actions_len, 4);
                assert_eq!(data, &[9, 9, 9]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_type_is_classified_as_other() {
        let buf = header(99, 8);
        let (msg, _) = parse(&buf).unwrap();
        assert_eq!(msg, Message::Other { msg_type: 99 });
    }
}
