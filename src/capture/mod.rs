//! Opens a capture file, auto-detects its container format, and exposes a
//! lazy sequence of [`PacketRecord`]s.
//!
//! Two container shapes are understood:
//!
//! * **snoop-like** (RFC 1761): fixed big-endian, detected by a leading
//!   `b's'` and the literal `"snoop\0\0\0"`.
//! * **pcap-like**: magic-number-driven, either big- or little-endian
//!   depending on whether the 4-byte magic reads as `0xA1B2C3D4` or its
//!   byte-swap.

mod pcap;
mod snoop;

use thiserror::Error;

use crate::reader::{Endianness, ReadError, StreamReader};

/// One captured frame, plus the container-level bookkeeping the driver
/// needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketRecord {
    pub captured_bytes: Vec<u8>,
    pub original_length: u32,
    pub timestamp_seconds: u64,
    pub timestamp_microseconds: u32,
    pub truncated: bool,
    /// Only meaningful for the snoop-like container; `None` for pcap-like.
    pub cumulative_drops: Option<u32>,
}

impl PacketRecord {
    fn new(
        captured_bytes: Vec<u8>,
        original_length: u32,
        timestamp_seconds: u64,
        timestamp_microseconds: u32,
        cumulative_drops: Option<u32>,
    ) -> PacketRecord {
        let truncated = (captured_bytes.len() as u64) < u64::from(original_length);
        PacketRecord {
            captured_bytes,
            original_length,
            timestamp_seconds,
            timestamp_microseconds,
            truncated,
            cumulative_drops,
        }
    }
}

/// Which container shape was auto-detected, and (for pcap-like) which
/// endianness it uses. Exposed so callers/tests can assert what branch
/// `CaptureReader::open` took.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ContainerKind {
    SnoopLike,
    PcapLike(Endianness),
}

#[derive(Debug, Error)]
pub enum CaptureOpenError {
    #[error("first byte {0:#x} doesn't match any known container format")]
    UnknownContainer(u8),
    #[error("snoop-like container: expected the literal b\"snoop\\0\\0\\0\", didn't find it")]
    BadSnoopMagic,
    #[error("snoop-like container: unsupported version {0} (expected 2)")]
    UnsupportedSnoopVersion(u32),
    #[error("pcap-like container: unsupported major version {0} (expected 2)")]
    UnsupportedPcapVersion(u16),
    #[error("pcap-like container: snaplen is zero")]
    ZeroSnaplen,
    #[error("link type {0} is not Ethernet; only Ethernet captures are supported")]
    UnsupportedLinkType(u32),
    #[error(transparent)]
    Read(#[from] ReadError),
}

#[derive(Debug, Error)]
pub enum CaptureReadError {
    #[error("record's stated length ({record_len}) is less than its header plus included data ({min})")]
    RecordLengthInvalid { record_len: u32, min: u32 },
    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Reads [`PacketRecord`]s out of a capture file, auto-detecting the
/// container format on open.
pub struct CaptureReader<R> {
    reader: StreamReader<R>,
    kind: ContainerKind,
    index: usize,
}

impl<R: std::io::Read> CaptureReader<R> {
    /// Detects the container format from the first few bytes, validates
    /// the file header, and returns a reader positioned at the first
    /// record.
    pub fn open(stream: R) -> Result<CaptureReader<R>, CaptureOpenError> {
        let mut reader = StreamReader::new(stream);
        let peek = reader.read_exact(1)?;
        let kind = match peek[0] {
            0x73 => {
                snoop::read_file_header(&mut reader, peek[0])?;
                ContainerKind::SnoopLike
            }
            0xA1 => {
                pcap::read_file_header(&mut reader, peek[0], Endianness::Big)?;
                ContainerKind::PcapLike(Endianness::Big)
            }
            0xD4 => {
                pcap::read_file_header(&mut reader, peek[0], Endianness::Little)?;
                ContainerKind::PcapLike(Endianness::Little)
            }
            other => return Err(CaptureOpenError::UnknownContainer(other)),
        };
        tracing::info!(?kind, "detected capture container");
        Ok(CaptureReader {
            reader,
            kind,
            index: 0,
        })
    }

    pub fn container_kind(&self) -> ContainerKind {
        self.kind
    }

    /// The index (0-based) of the record that will be returned by the
    /// next call to [`CaptureReader::next`].
    pub fn next_index(&self) -> usize {
        self.index
    }
}

impl<R: std::io::Read> Iterator for CaptureReader<R> {
    type Item = Result<PacketRecord, CaptureReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match self.kind {
            ContainerKind::SnoopLike => snoop::read_record(&mut self.reader),
            ContainerKind::PcapLike(endianness) => pcap::read_record(&mut self.reader, endianness),
        };
        match result {
            Ok(Some(record)) => {
                tracing::trace!(index = self.index, len = record.captured_bytes.len(), "read record");
                self.index += 1;
                Some(Ok(record))
            }
            Ok(None) => None,
            Err(e) => {
                self.index += 1;
                Some(Err(e))
            }
        }
    }
}
