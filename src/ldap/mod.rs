//! Recognises a [`crate::ber::BerElement`] as an LDAP message and hands it
//! to a [`MessageSink`].
//!
//! This is an entry point, not an LDAP parser: it reads the message-ID
//! `INTEGER` and the protocol-op tag byte — the two definite-length BER
//! primitives the rest of this crate already knows how to split — and
//! classifies the tag against the standard LDAPv3 `APPLICATION` tag table
//! (RFC 4511 §4.2–§4.19). Filters, attribute lists, controls, and every
//! other piece of LDAP grammar stay an external collaborator's problem.

use std::time::Duration;

use thiserror::Error;

use crate::ber::BerElement;
use crate::flow::FlowKey;
use crate::reader::{uint, Endianness};

/// The APPLICATION-class operations defined by RFC 4511. `SearchResultRef`
/// (19), `ExtendedRequest`/`Response` (23/24), and `IntermediateResponse`
/// (25) are listed for completeness even though later LDAPv3 extensions
/// added them after the original RFC 2251 set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolOpKind {
    BindRequest,
    BindResponse,
    UnbindRequest,
    SearchRequest,
    SearchResultEntry,
    SearchResultDone,
    ModifyRequest,
    ModifyResponse,
    AddRequest,
    AddResponse,
    DelRequest,
    DelResponse,
    ModDnRequest,
    ModDnResponse,
    CompareRequest,
    CompareResponse,
    AbandonRequest,
    SearchResultReference,
    ExtendedRequest,
    ExtendedResponse,
    IntermediateResponse,
}

impl ProtocolOpKind {
    /// Map an APPLICATION-class BER tag byte to the operation it names,
    /// per RFC 4511. Returns `None` for a tag this crate doesn't
    /// recognise (e.g. a vendor extension, or garbage).
    pub fn from_tag(tag: u8) -> Option<ProtocolOpKind> {
        use ProtocolOpKind::*;
        Some(match tag {
            0x60 => BindRequest,
            0x61 => BindResponse,
            0x42 => UnbindRequest,
            0x63 => SearchRequest,
            0x64 => SearchResultEntry,
            0x65 => SearchResultDone,
            0x66 => ModifyRequest,
            0x67 => ModifyResponse,
            0x68 => AddRequest,
            0x69 => AddResponse,
            0x4A => DelRequest,
            0x6B => DelResponse,
            0x6C => ModDnRequest,
            0x6D => ModDnResponse,
            0x6E => CompareRequest,
            0x6F => CompareResponse,
            0x50 => AbandonRequest,
            0x73 => SearchResultReference,
            0x77 => ExtendedRequest,
            0x78 => ExtendedResponse,
            0x79 => IntermediateResponse,
            _ => return None,
        })
    }
}

/// Either a recognised protocol op (tag classified, body left opaque for
/// the external collaborator to parse) or a tag this crate didn't
/// recognise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolOp {
    Known {
        tag: u8,
        kind: ProtocolOpKind,
        body: Vec<u8>,
    },
    Unknown {
        tag: u8,
        body: Vec<u8>,
    },
}

impl ProtocolOp {
    pub fn tag(&self) -> u8 {
        match self {
            ProtocolOp::Known { tag, .. } => *tag,
            ProtocolOp::Unknown { tag, .. } => *tag,
        }
    }
}

/// Opaque beyond "it was decoded from a BER element" — its further
/// structure is an external collaborator's responsibility.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LdapMessage {
    pub message_id: i64,
    pub protocol_op: ProtocolOp,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LdapDecodeError {
    #[error("SEQUENCE body is empty")]
    Empty,
    #[error("expected an INTEGER (tag 0x02) for messageID, saw tag {0:#x}")]
    MissingMessageId(u8),
    #[error("messageID field is truncated")]
    TruncatedMessageId,
    #[error("no protocol-op element follows messageID")]
    MissingProtocolOp,
    #[error("protocol-op element is truncated")]
    TruncatedProtocolOp,
}

/// Read one definite-length BER TLV (any tag) off the front of `buf`.
/// Unlike [`crate::ber::split`], this doesn't care what the tag is and
/// doesn't treat `0x80`/`0xFF` length bytes specially beyond rejecting
/// them — this is used only on a buffer that's already a complete,
/// validated BER element's value, so "needs more data" isn't a concern
/// here, only "is this well-formed".
fn read_tlv(buf: &[u8]) -> Option<(u8, usize, &[u8])> {
    if buf.len() < 2 {
        return None;
    }
    let tag = buf[0];
    let length_byte = buf[1];
    let (length, prefix_len) = if length_byte < 0x80 {
        (usize::from(length_byte), 2)
    } else if length_byte == 0x80 || length_byte == 0xFF {
        return None;
    } else {
        let n = usize::from(length_byte & 0x7F);
        if buf.len() < 2 + n || n > 4 {
            return None;
        }
        (uint(buf, 2, n, Endianness::Big) as usize, 2 + n)
    };
    let end = prefix_len.checked_add(length)?;
    if end > buf.len() {
        return None;
    }
    Some((tag, end, &buf[prefix_len..end]))
}

fn decode_integer(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    let negative = bytes[0] & 0x80 != 0;
    let mut v: i64 = if negative { -1 } else { 0 };
    for &b in bytes {
        v = (v << 8) | i64::from(b);
    }
    Some(v)
}

const MESSAGE_ID_TAG: u8 = 0x02;

/// Classify a complete BER element (the outer LDAPMessage SEQUENCE) as an
/// LDAP message.
pub fn parse(element: &BerElement) -> Result<LdapMessage, LdapDecodeError> {
    let body = element.value.as_slice();
    if body.is_empty() {
        return Err(LdapDecodeError::Empty);
    }
    let (id_tag, id_consumed, id_value) =
        read_tlv(body).ok_or(LdapDecodeError::TruncatedMessageId)?;
    if id_tag != MESSAGE_ID_TAG {
        return Err(LdapDecodeError::MissingMessageId(id_tag));
    }
    let message_id = decode_integer(id_value).ok_or(LdapDecodeError::TruncatedMessageId)?;

    let rest = &body[id_consumed..];
    if rest.is_empty() {
        return Err(LdapDecodeError::MissingProtocolOp);
    }
    let (op_tag, _op_consumed, op_value) =
        read_tlv(rest).ok_or(LdapDecodeError::TruncatedProtocolOp)?;

    let protocol_op = match ProtocolOpKind::from_tag(op_tag) {
        Some(kind) => ProtocolOp::Known {
            tag: op_tag,
            kind,
            body: op_value.to_vec(),
        },
        None => ProtocolOp::Unknown {
            tag: op_tag,
            body: op_value.to_vec(),
        },
    };

    Ok(LdapMessage {
        message_id,
        protocol_op,
    })
}

/// The opaque sink this crate hands fully-decoded LDAP messages to,
/// together with the flow they came from and the containing packet's
/// timestamp. Rendering to text or to a scripting language is an external
/// collaborator's job.
pub trait MessageSink {
    fn accept(&mut self, flow: FlowKey, timestamp: Duration, message: LdapMessage);
}

/// A sink that discards everything. Useful when only the summary counters
/// matter.
#[derive(Default)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn accept(&mut self, _flow: FlowKey, _timestamp: Duration, _message: LdapMessage) {}
}

/// A sink that collects every message it's handed, in order. Used by
/// tests.
#[derive(Default)]
pub struct VecSink {
    pub messages: Vec<(FlowKey, Duration, LdapMessage)>,
}

impl MessageSink for VecSink {
    fn accept(&mut self, flow: FlowKey, timestamp: Duration, message: LdapMessage) {
        self.messages.push((flow, timestamp, message));
    }
}
