//! Endian-aware integer reads.
//!
//! [`StreamReader`] wraps a [`Read`] and pulls exact-length chunks off it,
//! the way [`crate::capture`] reads capture-container headers and record
//! framing off a file. Everything past that point (link/IPv4/TCP headers,
//! BER elements, capture record fields) is already sitting in memory, so
//! it's read through [`uint`] instead: the one width-and-endianness
//! parametric accumulator every in-memory decoder in this crate calls,
//! rather than each decoder hand-rolling its own big/little-endian
//! byte-shift loop.

use std::io::{self, Read};
use thiserror::Error;

/// Which byte order a multi-byte field uses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Endianness {
    Big,
    Little,
}

#[derive(Debug, Error)]
pub enum ReadError {
    /// Nothing at all was available; a clean end-of-stream.
    #[error("end of stream")]
    Eof,
    /// Some bytes were available, but fewer than requested, and then the
    /// stream ended. Unlike [`ReadError::Eof`] this is always a hard
    /// error: a short record is a corrupt capture, not a clean stop.
    #[error("truncated: wanted {wanted} bytes, got {got}")]
    Truncated { wanted: usize, got: usize },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Streaming reader used by [`crate::capture`] to pull capture-container
/// headers and per-record framing directly off the underlying file.
pub struct StreamReader<R> {
    inner: R,
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R) -> StreamReader<R> {
        StreamReader { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read exactly `n` bytes, or report why that wasn't possible.
    ///
    /// A read of zero bytes at the very start (nothing at all available)
    /// is reported as [`ReadError::Eof`]; anything read but incomplete is
    /// [`ReadError::Truncated`], which callers should treat as fatal.
    pub fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, ReadError> {
        let mut buf = vec![0u8; n];
        let mut got = 0;
        while got < n {
            let m = self.inner.read(&mut buf[got..])?;
            if m == 0 {
                break;
            }
            got += m;
        }
        if got == 0 && n > 0 {
            return Err(ReadError::Eof);
        }
        if got < n {
            return Err(ReadError::Truncated { wanted: n, got });
        }
        Ok(buf)
    }

    /// Like [`StreamReader::read_exact`], but reports a clean `None` at
    /// EOF instead of an error. Used at record boundaries, where an EOF is
    /// expected and not an error.
    pub fn read_exact_opt(&mut self, n: usize) -> Result<Option<Vec<u8>>, ReadError> {
        match self.read_exact(n) {
            Ok(buf) => Ok(Some(buf)),
            Err(ReadError::Eof) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Width-parametric unsigned read: `len` bytes starting at `off`, as
/// either endianness. `len` must be in `1..=8`; this is the single
/// function the rest of the crate is built on, so that every place that
/// used to duplicate a big/little-endian `match` collapses to one call
/// site.
///
/// Callers are expected to have already bounds-checked; a bad offset or
/// an out-of-range `len` here is a caller bug, not a recoverable runtime
/// condition.
pub fn uint(buf: &[u8], off: usize, len: usize, endian: Endianness) -> u64 {
    debug_assert!((1..=8).contains(&len));
    let mut v = 0u64;
    match endian {
        Endianness::Big => {
            for i in 0..len {
                v = (v << 8) | u64::from(buf[off + i]);
            }
        }
        Endianness::Little => {
            for i in 0..len {
                v |= u64::from(buf[off + i]) << (8 * i);
            }
        }
    }
    v
}

/// Read a big-endian `u16` out of `buf` at `buf[off..off+2]`. A thin,
/// ergonomic wrapper over [`uint`] for the common fixed-width
/// big-endian case every network header in this crate uses.
pub fn u16_be(buf: &[u8], off: usize) -> u16 {
    uint(buf, off, 2, Endianness::Big) as u16
}

/// Read a big-endian `u32` out of `buf` at `buf[off..off+4]`; see [`u16_be`].
pub fn u32_be(buf: &[u8], off: usize) -> u32 {
    uint(buf, off, 4, Endianness::Big) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn exact_read_succeeds() {
        let mut r = StreamReader::new(Cursor::new(vec![1, 2, 3, 4]));
        assert_eq!(r.read_exact(4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn clean_eof_is_reported() {
        let mut r = StreamReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(matches!(r.read_exact(4), Err(ReadError::Eof)));
        let mut r = StreamReader::new(Cursor::new(Vec::<u8>::new()));
        assert_eq!(r.read_exact_opt(4).unwrap(), None);
    }

    #[test]
    fn short_read_is_truncated() {
        let mut r = StreamReader::new(Cursor::new(vec![1, 2]));
        match r.read_exact(4) {
            Err(ReadError::Truncated { wanted, got }) => {
                assert_eq!(wanted, 4);
                assert_eq!(got, 2);
            }
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn big_and_little_endian_agree_on_width_parametric_read() {
        let buf = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(uint(&buf, 0, 2, Endianness::Big), 0x1234);
        assert_eq!(uint(&buf, 0, 2, Endianness::Little), 0x3412);
        assert_eq!(uint(&buf, 0, 4, Endianness::Big), 0x12345678);
        assert_eq!(uint(&buf, 0, 4, Endianness::Little), 0x78563412);
    }

    #[test]
    fn no_sign_extension_on_high_bit_bytes() {
        // The classic byte-as-i8 bug: 0xFF must read as 255, not -1 sign-
        // extended into the wider integer.
        let buf = [0xFF, 0xFF];
        assert_eq!(u16_be(&buf, 0), 0xFFFF);
        assert_eq!(uint(&buf, 0, 1, Endianness::Big), 0xFF);
    }
}
