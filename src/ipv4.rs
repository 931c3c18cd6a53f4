//! IPv4 header decoding.
//!
//! The fragmentation flags are decoded with a *negated* sense on purpose:
//! `may_fragment` is true when the DF bit is **clear**, and
//! `last_fragment` is true when the MF bit is **clear**. This looks
//! backwards next to RFC 791 (where DF set means "don't fragment" and MF
//! set means "more fragments follow"), but it matches what downstream
//! tooling consuming this crate's output expects, so the inversion is
//! preserved here rather than "fixed".

use thiserror::Error;

use crate::reader::{u16_be, u32_be};

pub const PROTOCOL_TCP: u8 = 6;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IPv4Header {
    pub header_words: u8,
    pub tos: u8,
    pub total_length: u16,
    pub id: u16,
    /// True iff the DF bit (0x4000) is clear. See the module doc comment.
    pub may_fragment: bool,
    /// True iff the MF bit (0x2000) is clear. See the module doc comment.
    pub last_fragment: bool,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src_ip: u32,
    pub dst_ip: u32,
    pub options: Vec<u8>,
    /// Offset of the payload within the decoded slice: `header_words * 4`.
    pub payload_offset: usize,
}

impl IPv4Header {
    /// Whether RFC 791 would actually call this packet a fragment: it's
    /// not the last fragment, or its offset is non-zero. Named apart from
    /// the raw `last_fragment`/`fragment_offset` fields since callers
    /// want to warn on exactly this condition without re-deriving it.
    pub fn is_fragment(&self) -> bool {
        !self.last_fragment || self.fragment_offset != 0
    }
}

#[derive(Debug, Error)]
pub enum Ipv4Error {
    #[error("need at least 20 bytes for a minimal IPv4 header, got {0}")]
    TooShort(usize),
    #[error("IP version {0} is not 4")]
    BadVersion(u8),
    #[error("header_words {0} is less than the minimum of 5")]
    HeaderWordsTooSmall(u8),
    #[error("header claims {claimed} bytes but only {available} are present")]
    HeaderTruncated { claimed: usize, available: usize },
}

/// Decode the IPv4 header starting at `offset` within `bytes`.
pub fn decode(bytes: &[u8], offset: usize) -> Result<IPv4Header, Ipv4Error> {
    let available = bytes.len().saturating_sub(offset);
    if available < 20 {
        return Err(Ipv4Error::TooShort(available));
    }
    let b = &bytes[offset..];

    let version = b[0] >> 4;
    if version != 4 {
        return Err(Ipv4Error::BadVersion(version));
    }
    let header_words = b[0] & 0x0F;
    if header_words < 5 {
        return Err(Ipv4Error::HeaderWordsTooSmall(header_words));
    }
    let header_len = usize::from(header_words) * 4;
    if available < header_len {
        return Err(Ipv4Error::HeaderTruncated {
            claimed: header_len,
            available,
        });
    }

    let tos = b[1];
    let total_length = u16_be(b, 2);
    let id = u16_be(b, 4);
    let frag_word = u16_be(b, 6);
    let may_fragment = frag_word & 0x4000 == 0;
    let last_fragment = frag_word & 0x2000 == 0;
    let fragment_offset = frag_word & 0x1FFF;
    let ttl = b[8];
    let protocol = b[9];
    let checksum = u16_be(b, 10);
    let src_ip = u32_be(b, 12);
    let dst_ip = u32_be(b, 16);
    let options = b[20..header_len].to_vec();

    Ok(IPv4Header {
        header_words,
        tos,
        total_length,
        id,
        may_fragment,
        last_fragment,
        fragment_offset,
        ttl,
        protocol,
        checksum,
        src_ip,
        dst_ip,
        options,
        payload_offset: offset + header_len,
    })
}
