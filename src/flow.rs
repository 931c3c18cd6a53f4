//! Groups payload bytes by the 4-tuple flow key and drains complete BER
//! elements out of each flow's buffer.
//!
//! One buffer per flow key, owned outright by whoever holds the
//! `FlowAssembler`: no shared mutation, no global state.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::ber::{self, BerElement, BerError, MAX_BUFFERED};
use crate::error::SkipReason;

/// The ordered 4-tuple identifying one direction of one TCP connection.
/// Forward and reverse traffic are deliberately distinct keys: merging
/// them would require guessing which side is the server, which this
/// crate has no reliable way to do from the 4-tuple alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn new(src_ip: u32, src_port: u16, dst_ip: u32, dst_port: u16) -> FlowKey {
        FlowKey {
            src_ip: Ipv4Addr::from(src_ip),
            src_port,
            dst_ip: Ipv4Addr::from(dst_ip),
            dst_port,
        }
    }
}

struct FlowState {
    buffer: Vec<u8>,
    /// The packet index (crate::driver's notion of "total packets seen
    /// so far") at which this flow was last appended to. Used only by the
    /// optional idle-eviction policy.
    last_touched: usize,
}

impl FlowState {
    fn new() -> FlowState {
        FlowState {
            buffer: Vec::new(),
            last_touched: 0,
        }
    }
}

/// One event yielded while draining a flow: either a decoded element, or
/// notice that the flow's buffer had to be reset and why.
#[derive(Debug)]
pub enum DrainEvent {
    Element(BerElement),
    Reset(SkipReason),
}

/// Owns the per-flow buffers. Single-writer, no locking.
pub struct FlowAssembler {
    flows: HashMap<FlowKey, FlowState>,
    buffer_cap: usize,
}

impl FlowAssembler {
    pub fn new() -> FlowAssembler {
        FlowAssembler::with_buffer_cap(MAX_BUFFERED)
    }

    pub fn with_buffer_cap(buffer_cap: usize) -> FlowAssembler {
        FlowAssembler {
            flows: HashMap::new(),
            buffer_cap,
        }
    }

    /// Append bytes to the flow's buffer, creating it on first sight of
    /// this key.
    pub fn append(&mut self, key: FlowKey, bytes: &[u8], packet_index: usize) {
        let state = self.flows.entry(key).or_insert_with(FlowState::new);
        state.buffer.extend_from_slice(bytes);
        state.last_touched = packet_index;
    }

    /// Repeatedly split complete BER elements out of this flow's buffer.
    /// Stops when the buffer needs more data, or after a reset (oversize
    /// or a guard failure), never both in the same call: once a flow is
    /// reset its buffer is empty, so there's nothing left to drain.
    pub fn drain(&mut self, key: FlowKey) -> Vec<DrainEvent> {
        let state = match self.flows.get_mut(&key) {
            Some(s) => s,
            None => return Vec::new(),
        };
        let mut events = Vec::new();
        loop {
            match ber::split(&state.buffer, self.buffer_cap) {
                Ok(ber::SplitOutcome::Complete { element, consumed }) => {
                    state.buffer.drain(..consumed);
                    events.push(DrainEvent::Element(element));
                }
                Ok(ber::SplitOutcome::NeedsMore) => break,
                Err(e) => {
                    let reason = match e {
                        BerError::NotSequenceStart(_) => SkipReason::NonLdapStart,
                        BerError::IndefiniteLength | BerError::ReservedLengthByte => {
                            SkipReason::BerIndefiniteLength
                        }
                        BerError::Oversized => SkipReason::OversizedBuffer,
                    };
                    state.buffer.clear();
                    events.push(DrainEvent::Reset(reason));
                    break;
                }
            }
        }
        events
    }

    /// Discard a flow's buffer outright.
    pub fn reset(&mut self, key: FlowKey) {
        if let Some(state) = self.flows.get_mut(&key) {
            state.buffer.clear();
        }
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    pub fn buffered_len(&self, key: FlowKey) -> usize {
        self.flows.get(&key).map_or(0, |s| s.buffer.len())
    }

    /// Optional LRU-ish eviction of flows that haven't been appended to
    /// in a while. Not required for correctness on well-formed input, but
    /// bounds memory for a long-running decode over a capture with many
    /// short-lived connections. Never called unless the embedder opts in.
    pub fn evict_idle(&mut self, current_packet_index: usize, max_idle_packets: usize) {
        self.flows
            .retain(|_, state| current_packet_index.saturating_sub(state.last_touched) <= max_idle_packets);
    }
}

impl Default for FlowAssembler {
    fn default() -> Self {
        FlowAssembler::new()
    }
}
