//! The snoop-like container (RFC 1761): fixed big-endian throughout.

use crate::capture::{CaptureOpenError, CaptureReadError, PacketRecord};
use crate::reader::{u32_be, StreamReader};

const FILE_HEADER_LITERAL: &[u8; 8] = b"snoop\0\0\0";
const RECORD_HEADER_LEN: u32 = 24;
const ETHERNET_LINK_TYPE: u32 = 4;

pub(super) fn read_file_header<R: std::io::Read>(
    reader: &mut StreamReader<R>,
    first_byte: u8,
) -> Result<(), CaptureOpenError> {
    let rest = reader.read_exact(7)?;
    let mut literal = vec![first_byte];
    literal.extend_from_slice(&rest);
    if literal != FILE_HEADER_LITERAL {
        return Err(CaptureOpenError::BadSnoopMagic);
    }
    let version_bytes = reader.read_exact(4)?;
    let version = u32_be(&version_bytes, 0);
    if version != 2 {
        return Err(CaptureOpenError::UnsupportedSnoopVersion(version));
    }
    let link_type_bytes = reader.read_exact(4)?;
    let link_type = u32_be(&link_type_bytes, 0);
    if link_type > 9 {
        return Err(CaptureOpenError::UnsupportedLinkType(link_type));
    }
    if link_type != ETHERNET_LINK_TYPE {
        return Err(CaptureOpenError::UnsupportedLinkType(link_type));
    }
    Ok(())
}

pub(super) fn read_record<R: std::io::Read>(
    reader: &mut StreamReader<R>,
) -> Result<Option<PacketRecord>, CaptureReadError> {
    let header = match reader.read_exact_opt(24)? {
        Some(h) => h,
        None => return Ok(None),
    };
    let original_len = u32_be(&header, 0);
    let included_len = u32_be(&header, 4);
    let record_len = u32_be(&header, 8);
    let cumulative_drops = u32_be(&header, 12);
    let ts_seconds = u32_be(&header, 16);
    let ts_micros = u32_be(&header, 20);

    let min = RECORD_HEADER_LEN + included_len;
    if record_len < min {
        return Err(CaptureReadError::RecordLengthInvalid { record_len, min });
    }
    let payload = reader.read_exact(included_len as usize)?;
    let pad_len = record_len - min;
    if pad_len > 0 {
        reader.read_exact(pad_len as usize)?;
    }

    Ok(Some(PacketRecord::new(
        payload,
        original_len,
        u64::from(ts_seconds),
        ts_micros,
        Some(cumulative_drops),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::tests::snoop_header;
    use std::io::Cursor;

    fn record_bytes(payload: &[u8], drops: u32) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&(payload.len() as u32).to_be_bytes()); // original
        v.extend_from_slice(&(payload.len() as u32).to_be_bytes()); // included
        v.extend_from_slice(&(24 + payload.len() as u32).to_be_bytes()); // record_len
        v.extend_from_slice(&drops.to_be_bytes());
        v.extend_from_slice(&1u32.to_be_bytes()); // ts_seconds
        v.extend_from_slice(&2u32.to_be_bytes()); // ts_micros
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn reads_one_record() {
        let mut bytes = snoop_header(4);
        bytes.extend(record_bytes(b"hello", 0));
        let mut cap = crate::capture::CaptureReader::open(Cursor::new(bytes)).unwrap();
        let rec = cap.next().unwrap().unwrap();
        assert_eq!(rec.captured_bytes, b"hello");
        assert_eq!(rec.original_length, 5);
        assert_eq!(rec.cumulative_drops, Some(0));
        assert!(!rec.truncated);
        assert!(cap.next().is_none());
    }

    #[test]
    fn invalid_record_length_is_fatal() {
        let mut bytes = snoop_header(4);
        // record_len too small for the included payload
        bytes.extend_from_slice(&5u32.to_be_bytes());
        bytes.extend_from_slice(&5u32.to_be_bytes());
        bytes.extend_from_slice(&4u32.to_be_bytes()); // record_len < 24 + 5
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(b"hello");
        let mut cap = crate::capture::CaptureReader::open(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            cap.next().unwrap(),
            Err(CaptureReadError::RecordLengthInvalid { .. })
        ));
    }
}
