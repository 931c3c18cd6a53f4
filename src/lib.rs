/*!

Reconstructs LDAP protocol messages from an offline packet capture.

Point this crate at a snoop-like or pcap-like capture file containing
Ethernet/IPv4/TCP traffic and it will:

* auto-detect the capture container and iterate its records,
* decode the Ethernet, IPv4, and TCP headers of each packet,
* reassemble each TCP flow's byte stream,
* split that stream into complete, definite-length BER elements, and
* recognise each element as an LDAP message (message ID + protocol-op
  tag) and hand it to a [`ldap::MessageSink`].

Everything past "this element's protocol-op tag is `bindRequest`" — BIND
credentials, search filters, attribute values, controls — is an external
collaborator's job. This crate's contract ends at the BER/LDAP envelope:
see the module-level docs on [`ldap`] for exactly where the line is
drawn.

Nothing here attempts to decrypt LDAPS (LDAP-over-TLS) traffic, follow
TCP retransmissions/out-of-order segments, or reassemble fragmented IP
datagrams; a fragmented datagram is logged and otherwise skipped rather
than reassembled.
*/

pub mod ber;
pub mod capture;
pub mod driver;
pub mod error;
pub mod flow;
pub mod ipv4;
pub mod ldap;
pub mod link;
pub mod reader;
pub mod tcp;

pub use ber::{BerElement, BerError};
pub use capture::{CaptureOpenError, CaptureReadError, CaptureReader, ContainerKind, PacketRecord};
pub use driver::{DecodeDriver, DecodeSummary, DriverConfig};
pub use error::{FatalError, SkipReason};
pub use flow::{DrainEvent, FlowAssembler, FlowKey};
pub use ldap::{LdapDecodeError, LdapMessage, MessageSink, NullSink, ProtocolOp, ProtocolOpKind, VecSink};
