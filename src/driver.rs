//! Wires every other component into the per-packet decode loop: read a
//! record, walk it down through the link/IPv4/TCP decoders, feed the TCP
//! payload to the right flow, drain complete BER elements, and hand
//! recognised LDAP messages to a [`MessageSink`].
//!
//! One record in, zero-or-more warnings logged, zero-or-one item out;
//! nothing ever aborts the loop except a fatal container-level error.

use std::io::Read;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::ber;
use crate::capture::{CaptureReader, ContainerKind, PacketRecord};
use crate::error::{FatalError, SkipReason};
use crate::flow::{DrainEvent, FlowAssembler, FlowKey};
use crate::ipv4;
use crate::ldap::{self, MessageSink};
use crate::link::{self, ETHERTYPE_IPV4, ETHERTYPE_VLAN};
use crate::tcp;

/// Knobs a caller can set before starting a decode run. All optional;
/// defaults match running over an entire capture with no endpoint filter.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Only reassemble flows where this address appears as either
    /// endpoint. `None` means no IP filter.
    pub expected_server_ip: Option<Ipv4Addr>,
    /// Only reassemble flows where this port appears on either endpoint.
    /// Typically 389 (LDAP) or 636 (LDAPS, though this crate doesn't
    /// decrypt TLS).
    pub expected_server_port: Option<u16>,
    /// Per-flow buffered-bytes ceiling; passed straight to
    /// [`FlowAssembler::with_buffer_cap`].
    pub flow_buffer_cap: usize,
    /// If set, flows idle for more than this many packets are evicted
    /// after every record.
    pub evict_idle_after: Option<usize>,
}

impl Default for DriverConfig {
    fn default() -> DriverConfig {
        DriverConfig {
            expected_server_ip: None,
            expected_server_port: None,
            flow_buffer_cap: ber::MAX_BUFFERED,
            evict_idle_after: None,
        }
    }
}

/// Tallies produced by a full decode run. Every counter corresponds to
/// either a successfully dispatched LDAP message or one named reason a
/// packet was skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    pub total_packets: usize,
    pub ldap_messages: usize,
    pub ldap_decode_errors: usize,
    pub packet_truncated: usize,
    pub packet_short: usize,
    pub non_ipv4: usize,
    pub vlan_tagged: usize,
    pub non_tcp: usize,
    pub filter_mismatch: usize,
    pub no_payload: usize,
    pub non_ldap_start: usize,
    pub oversized_buffer: usize,
    pub ber_indefinite_length: usize,
    /// Number of times the snoop-like container's cumulative drop counter
    /// advanced between consecutive records. Always zero for pcap-like
    /// captures, which carry no such counter.
    pub drop_notices: usize,
}

impl DecodeSummary {
    fn record_skip(&mut self, reason: &SkipReason) {
        match reason {
            SkipReason::PacketTruncated => self.packet_truncated += 1,
            SkipReason::PacketShort => self.packet_short += 1,
            SkipReason::NonIPv4 => self.non_ipv4 += 1,
            SkipReason::VlanTagged => self.vlan_tagged += 1,
            SkipReason::NonTCP => self.non_tcp += 1,
            SkipReason::FilterMismatch => self.filter_mismatch += 1,
            SkipReason::NoPayload => self.no_payload += 1,
            SkipReason::NonLdapStart => self.non_ldap_start += 1,
            SkipReason::OversizedBuffer => self.oversized_buffer += 1,
            SkipReason::BerIndefiniteLength => self.ber_indefinite_length += 1,
        }
    }

    /// True iff nothing was skipped and no LDAP message failed to parse.
    /// A run over a capture with plenty of expected non-LDAP traffic is
    /// still "not clean" here, since this only tracks anomalies, not
    /// traffic mix.
    pub fn is_clean(&self) -> bool {
        self.ldap_decode_errors == 0
            && self.packet_truncated == 0
            && self.packet_short == 0
            && self.non_ldap_start == 0
            && self.oversized_buffer == 0
            && self.ber_indefinite_length == 0
    }
}

/// Drives a capture end-to-end, dispatching recognised LDAP messages to a
/// [`MessageSink`] and returning a [`DecodeSummary`] once the capture is
/// exhausted.
pub struct DecodeDriver<R, S> {
    capture: CaptureReader<R>,
    flows: FlowAssembler,
    config: DriverConfig,
    sink: S,
    summary: DecodeSummary,
    last_cumulative_drops: Option<u32>,
}

impl<R: Read, S: MessageSink> DecodeDriver<R, S> {
    pub fn open(stream: R, config: DriverConfig, sink: S) -> Result<DecodeDriver<R, S>, FatalError> {
        let capture = CaptureReader::open(stream)?;
        let flows = FlowAssembler::with_buffer_cap(config.flow_buffer_cap);
        Ok(DecodeDriver {
            capture,
            flows,
            config,
            sink,
            summary: DecodeSummary::default(),
            last_cumulative_drops: None,
        })
    }

    pub fn container_kind(&self) -> ContainerKind {
        self.capture.container_kind()
    }

    /// Run the decode loop to completion, consuming `self`. Returns the
    /// sink back out alongside the summary so callers that used
    /// [`crate::ldap::VecSink`] can inspect what was collected.
    pub fn run(mut self) -> Result<(DecodeSummary, S), FatalError> {
        loop {
            let record = match self.capture.next() {
                Some(Ok(record)) => record,
                Some(Err(e)) => return Err(FatalError::from(e)),
                None => break,
            };
            let index = self.summary.total_packets;
            self.summary.total_packets += 1;
            self.handle_record(index, &record);
            if let Some(max_idle) = self.config.evict_idle_after {
                self.flows.evict_idle(index, max_idle);
            }
        }
        Ok((self.summary, self.sink))
    }

    fn handle_record(&mut self, index: usize, record: &PacketRecord) {
        if let Some(drops) = record.cumulative_drops {
            if let Some(previous) = self.last_cumulative_drops {
                if drops > previous {
                    tracing::warn!(packet = index, previous, current = drops, "capture reports dropped packets");
                    self.summary.drop_notices += 1;
                }
            }
            self.last_cumulative_drops = Some(drops);
        }

        if record.truncated {
            tracing::warn!(packet = index, "packet truncated by capture snaplen");
            self.summary.record_skip(&SkipReason::PacketTruncated);
            return;
        }

        let eth = match link::decode(&record.captured_bytes) {
            Ok(eth) => eth,
            Err(e) => {
                tracing::warn!(packet = index, reason = %e, "short link-layer frame");
                self.summary.record_skip(&SkipReason::PacketShort);
                return;
            }
        };
        if eth.ethertype == ETHERTYPE_VLAN {
            self.summary.record_skip(&SkipReason::VlanTagged);
            return;
        }
        if eth.ethertype != ETHERTYPE_IPV4 {
            self.summary.record_skip(&SkipReason::NonIPv4);
            return;
        }

        let ip = match ipv4::decode(&record.captured_bytes, eth.payload_offset) {
            Ok(ip) => ip,
            Err(e) => {
                tracing::warn!(packet = index, reason = %e, "short or malformed IPv4 header");
                self.summary.record_skip(&SkipReason::PacketShort);
                return;
            }
        };
        if ip.is_fragment() {
            tracing::warn!(packet = index, id = ip.id, "fragmented IPv4 packet; reassembly is not attempted");
        }
        if ip.protocol != ipv4::PROTOCOL_TCP {
            self.summary.record_skip(&SkipReason::NonTCP);
            return;
        }

        let tcp = match tcp::decode(&record.captured_bytes, ip.payload_offset) {
            Ok(tcp) => tcp,
            Err(e) => {
                tracing::warn!(packet = index, reason = %e, "short or malformed TCP header");
                self.summary.record_skip(&SkipReason::PacketShort);
                return;
            }
        };

        let key = FlowKey::new(ip.src_ip, tcp.src_port, ip.dst_ip, tcp.dst_port);
        if !self.passes_filter(&key) {
            self.summary.record_skip(&SkipReason::FilterMismatch);
            return;
        }

        let payload = &record.captured_bytes[tcp.payload_offset..];
        if payload.is_empty() {
            self.summary.record_skip(&SkipReason::NoPayload);
            return;
        }

        self.flows.append(key, payload, index);
        let timestamp = Duration::new(record.timestamp_seconds, record.timestamp_microseconds * 1000);
        for event in self.flows.drain(key) {
            match event {
                DrainEvent::Element(element) => match ldap::parse(&element) {
                    Ok(message) => {
                        self.summary.ldap_messages += 1;
                        self.sink.accept(key, timestamp, message);
                    }
                    Err(e) => {
                        tracing::warn!(packet = index, reason = %e, "element did not decode as an LDAP message");
                        self.summary.ldap_decode_errors += 1;
                    }
                },
                DrainEvent::Reset(reason) => {
                    if !reason.is_silent() {
                        tracing::warn!(packet = index, reason = %reason, "flow buffer reset");
                    }
                    self.summary.record_skip(&reason);
                }
            }
        }
    }

    /// A flow passes iff one of its two endpoints matches *both*
    /// configured filters at once, not an IP filter satisfied by one
    /// endpoint and a port filter satisfied by the other — a packet with
    /// the expected server's address on one side and an unrelated port on
    /// the other is not a match.
    fn passes_filter(&self, key: &FlowKey) -> bool {
        let endpoint_matches = |ip: Ipv4Addr, port: u16| {
            self.config.expected_server_ip.map_or(true, |expected| ip == expected)
                && self.config.expected_server_port.map_or(true, |expected| port == expected)
        };
        endpoint_matches(key.src_ip, key.src_port) || endpoint_matches(key.dst_ip, key.dst_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::{ProtocolOp, ProtocolOpKind, VecSink};
    use std::io::Cursor;

    fn pcap_header() -> Vec<u8> {
        let mut v = vec![0xA1, 0xB2, 0xC3, 0xD4];
        v.extend_from_slice(&2u16.to_be_bytes());
        v.extend_from_slice(&4u16.to_be_bytes());
        v.extend_from_slice(&0u32.to_be_bytes());
        v.extend_from_slice(&0u32.to_be_bytes());
        v.extend_from_slice(&65535u32.to_be_bytes());
        v.extend_from_slice(&1u32.to_be_bytes());
        v
    }

    fn pcap_record(seconds: u32, micros: u32, payload: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&seconds.to_be_bytes());
        v.extend_from_slice(&micros.to_be_bytes());
        v.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        v.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        v.extend_from_slice(payload);
        v
    }

    fn ethernet_ipv4_tcp_frame(tcp_payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xAAu8; 12];
        frame.extend_from_slice(&0x0800u16.to_be_bytes()); // IPv4

        let mut ip = vec![0u8; 20];
        ip[0] = (4 << 4) | 5;
        let total_len = 20 + 20 + tcp_payload.len();
        ip[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
        ip[8] = 64;
        ip[9] = ipv4::PROTOCOL_TCP;
        ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
        ip[16..20].copy_from_slice(&[10, 0, 0, 2]);
        frame.extend_from_slice(&ip);

        let mut tcp = vec![0u8; 20];
        tcp[0..2].copy_from_slice(&50000u16.to_be_bytes());
        tcp[2..4].copy_from_slice(&389u16.to_be_bytes());
        tcp[12] = 5 << 4;
        frame.extend_from_slice(&tcp);
        frame.extend_from_slice(tcp_payload);
        frame
    }

    fn ber_seq(value: &[u8]) -> Vec<u8> {
        let mut v = vec![0x30, value.len() as u8];
        v.extend_from_slice(value);
        v
    }

    fn bind_request_payload() -> Vec<u8> {
        let mut body = vec![0x02, 0x01, 0x01]; // messageID = 1
        body.extend_from_slice(&[0x60, 0x02, 0x00, 0x00]); // bindRequest, trivial body
        ber_seq(&body)
    }

    #[test]
    fn end_to_end_single_bind_request() {
        let mut capture = pcap_header();
        let frame = ethernet_ipv4_tcp_frame(&bind_request_payload());
        capture.extend(pcap_record(0, 0, &frame));

        let driver = DecodeDriver::open(Cursor::new(capture), DriverConfig::default(), VecSink::default())
            .unwrap();
        let (summary, sink) = driver.run().unwrap();

        assert_eq!(summary.total_packets, 1);
        assert_eq!(summary.ldap_messages, 1);
        assert!(summary.is_clean());
        assert_eq!(sink.messages.len(), 1);
        let (_, _, message) = &sink.messages[0];
        assert_eq!(message.message_id, 1);
        assert!(matches!(
            message.protocol_op,
            ProtocolOp::Known { kind: ProtocolOpKind::BindRequest, .. }
        ));
    }

    #[test]
    fn non_tcp_packet_is_skipped_not_fatal() {
        let mut capture = pcap_header();
        let mut frame = vec![0xAAu8; 12];
        frame.extend_from_slice(&0x0800u16.to_be_bytes());
        let mut ip = vec![0u8; 20];
        ip[0] = (4 << 4) | 5;
        ip[9] = 17; // UDP
        ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
        ip[16..20].copy_from_slice(&[10, 0, 0, 2]);
        frame.extend_from_slice(&ip);
        capture.extend(pcap_record(0, 0, &frame));

        let driver = DecodeDriver::open(Cursor::new(capture), DriverConfig::default(), VecSink::default())
            .unwrap();
        let (summary, _sink) = driver.run().unwrap();
        assert_eq!(summary.non_tcp, 1);
        assert_eq!(summary.ldap_messages, 0);
    }

    #[test]
    fn endpoint_filter_excludes_other_flows() {
        let mut capture = pcap_header();
        let frame = ethernet_ipv4_tcp_frame(&bind_request_payload());
        capture.extend(pcap_record(0, 0, &frame));

        let config = DriverConfig {
            expected_server_port: Some(636), // not 389
            ..DriverConfig::default()
        };
        let driver = DecodeDriver::open(Cursor::new(capture), config, VecSink::default()).unwrap();
        let (summary, _sink) = driver.run().unwrap();
        assert_eq!(summary.filter_mismatch, 1);
        assert_eq!(summary.ldap_messages, 0);
    }

    #[test]
    fn filter_requires_both_conditions_on_the_same_endpoint() {
        // Frame is 10.0.0.1:50000 -> 10.0.0.2:389. The IP filter matches
        // the source endpoint and the port filter matches the
        // destination endpoint, but no *single* endpoint satisfies both,
        // so this must not pass.
        let mut capture = pcap_header();
        let frame = ethernet_ipv4_tcp_frame(&bind_request_payload());
        capture.extend(pcap_record(0, 0, &frame));

        let config = DriverConfig {
            expected_server_ip: Some(Ipv4Addr::new(10, 0, 0, 1)),
            expected_server_port: Some(389),
            ..DriverConfig::default()
        };
        let driver = DecodeDriver::open(Cursor::new(capture), config, VecSink::default()).unwrap();
        let (summary, _sink) = driver.run().unwrap();
        assert_eq!(summary.filter_mismatch, 1);
        assert_eq!(summary.ldap_messages, 0);
    }

    #[test]
    fn filter_passes_when_one_endpoint_matches_both_conditions() {
        let mut capture = pcap_header();
        let frame = ethernet_ipv4_tcp_frame(&bind_request_payload());
        capture.extend(pcap_record(0, 0, &frame));

        let config = DriverConfig {
            expected_server_ip: Some(Ipv4Addr::new(10, 0, 0, 2)),
            expected_server_port: Some(389),
            ..DriverConfig::default()
        };
        let driver = DecodeDriver::open(Cursor::new(capture), config, VecSink::default()).unwrap();
        let (summary, _sink) = driver.run().unwrap();
        assert_eq!(summary.filter_mismatch, 0);
        assert_eq!(summary.ldap_messages, 1);
    }

    #[test]
    fn snoop_container_reports_advancing_drop_counter() {
        fn snoop_header(link_type: u32) -> Vec<u8> {
            let mut v = b"snoop\0\0\0".to_vec();
            v.extend_from_slice(&2u32.to_be_bytes());
            v.extend_from_slice(&link_type.to_be_bytes());
            v
        }
        fn snoop_record(payload: &[u8], drops: u32) -> Vec<u8> {
            let mut v = Vec::new();
            v.extend_from_slice(&(payload.len() as u32).to_be_bytes()); // original
            v.extend_from_slice(&(payload.len() as u32).to_be_bytes()); // included
            v.extend_from_slice(&(24 + payload.len() as u32).to_be_bytes()); // record_len
            v.extend_from_slice(&drops.to_be_bytes());
            v.extend_from_slice(&0u32.to_be_bytes()); // ts_seconds
            v.extend_from_slice(&0u32.to_be_bytes()); // ts_micros
            v.extend_from_slice(payload);
            v
        }

        let mut capture = snoop_header(4);
        let frame = ethernet_ipv4_tcp_frame(&bind_request_payload());
        capture.extend(snoop_record(&frame, 0));
        capture.extend(snoop_record(&frame, 3));

        let driver = DecodeDriver::open(Cursor::new(capture), DriverConfig::default(), VecSink::default())
            .unwrap();
        let (summary, _sink) = driver.run().unwrap();
        assert_eq!(summary.total_packets, 2);
        assert_eq!(summary.drop_notices, 1);
    }

    #[test]
    fn garbage_tcp_payload_resets_flow_and_is_counted() {
        let mut capture = pcap_header();
        let frame = ethernet_ipv4_tcp_frame(&[0xAA, 0xBB, 0xCC]);
        capture.extend(pcap_record(0, 0, &frame));

        let driver = DecodeDriver::open(Cursor::new(capture), DriverConfig::default(), VecSink::default())
            .unwrap();
        let (summary, _sink) = driver.run().unwrap();
        assert_eq!(summary.non_ldap_start, 1);
        assert!(!summary.is_clean());
    }
}
