//! The pcap-like container: magic-number-driven endianness.

use crate::capture::{CaptureOpenError, CaptureReadError, PacketRecord};
use crate::reader::{uint, Endianness, StreamReader};

const RECORD_HEADER_LEN: usize = 16;
const ETHERNET_LINK_TYPE: u32 = 1;

fn u16_from(bytes: &[u8], endianness: Endianness) -> u16 {
    uint(bytes, 0, 2, endianness) as u16
}

fn u32_from(bytes: &[u8], endianness: Endianness) -> u32 {
    uint(bytes, 0, 4, endianness) as u32
}

pub(super) fn read_file_header<R: std::io::Read>(
    reader: &mut StreamReader<R>,
    _first_byte: u8,
    endianness: Endianness,
) -> Result<(), CaptureOpenError> {
    // The magic number itself (4 bytes, already peeked/consumed by the
    // caller one byte at a time) is not re-read here; we just consume the
    // 20 bytes that follow it.
    reader.read_exact(3)?; // remaining 3 bytes of the magic

    let major = u16_from(&reader.read_exact(2)?, endianness);
    if major != 2 {
        return Err(CaptureOpenError::UnsupportedPcapVersion(major));
    }
    reader.read_exact(2)?; // minor version, unchecked
    reader.read_exact(4)?; // thiszone, ignored
    reader.read_exact(4)?; // sigfigs, ignored
    let snaplen = u32_from(&reader.read_exact(4)?, endianness);
    if snaplen == 0 {
        return Err(CaptureOpenError::ZeroSnaplen);
    }
    let link_type = u32_from(&reader.read_exact(4)?, endianness);
    if link_type != ETHERNET_LINK_TYPE {
        return Err(CaptureOpenError::UnsupportedLinkType(link_type));
    }
    Ok(())
}

pub(super) fn read_record<R: std::io::Read>(
    reader: &mut StreamReader<R>,
    endianness: Endianness,
) -> Result<Option<PacketRecord>, CaptureReadError> {
    let header = match reader.read_exact_opt(RECORD_HEADER_LEN)? {
        Some(h) => h,
        None => return Ok(None),
    };
    let ts_seconds = u32_from(&header[0..4], endianness);
    let ts_micros = u32_from(&header[4..8], endianness);
    let included_len = u32_from(&header[8..12], endianness);
    let original_len = u32_from(&header[12..16], endianness);

    let payload = reader.read_exact(included_len as usize)?;
    Ok(Some(PacketRecord::new(
        payload,
        original_len,
        u64::from(ts_seconds),
        ts_micros,
        None,
    )))
}
