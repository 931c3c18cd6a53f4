//! Crate-wide error taxonomy.
//!
//! Per-component parse errors live next to the code that raises them
//! (`capture::CaptureOpenError`, `link::LinkError`, `ipv4::Ipv4Error`,
//! `tcp::TcpError`, `ber::BerError`, `ldap::LdapDecodeError`). This module
//! only holds what needs to be shared across all of them: the fatal/
//! non-fatal split the driver loop relies on, and the `SkipReason` enum
//! the driver counts skips by.

use std::fmt;

use crate::capture::{CaptureOpenError, CaptureReadError};

/// The two fatal error kinds. Nothing else aborts the decode loop.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("failed to open capture: {0}")]
    ContainerOpen(#[from] CaptureOpenError),
    #[error("capture truncated mid-record: {0}")]
    ContainerTruncated(#[from] CaptureReadError),
}

/// Every reason a single packet can be skipped without aborting the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    PacketTruncated,
    PacketShort,
    NonIPv4,
    VlanTagged,
    NonTCP,
    FilterMismatch,
    NoPayload,
    NonLdapStart,
    OversizedBuffer,
    BerIndefiniteLength,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::PacketTruncated => "packet truncated (included < original)",
            SkipReason::PacketShort => "header claims more bytes than are present",
            SkipReason::NonIPv4 => "non-IPv4 ethertype",
            SkipReason::VlanTagged => "VLAN-tagged frame",
            SkipReason::NonTCP => "non-TCP IPv4 protocol",
            SkipReason::FilterMismatch => "endpoint filter mismatch",
            SkipReason::NoPayload => "empty TCP payload",
            SkipReason::NonLdapStart => "reassembled buffer didn't start with a BER SEQUENCE",
            SkipReason::OversizedBuffer => "flow buffer exceeded the size cap before completion",
            SkipReason::BerIndefiniteLength => "BER element used indefinite-length encoding",
        };
        f.write_str(s)
    }
}

impl SkipReason {
    /// Whether this reason resets the flow's buffer.
    pub fn resets_flow(&self) -> bool {
        matches!(
            self,
            SkipReason::NonLdapStart
                | SkipReason::OversizedBuffer
                | SkipReason::BerIndefiniteLength
        )
    }

    /// Whether this reason is logged at all, or silently dropped
    /// (`FilterMismatch` and `NoPayload` are silent).
    pub fn is_silent(&self) -> bool {
        matches!(self, SkipReason::FilterMismatch | SkipReason::NoPayload)
    }
}
