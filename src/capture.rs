/*! Capture loop: pulls demuxed TCP tuples from an upstream source, filters
by OpenFlow TCP port, and dispatches LLDP-carrying frames to the
correlator.

The capture loop is generic over [`PacketSource`] so tests can drive it
with a synthetic, in-memory source instead of a live device. The real
device-backed source lives in `pcap_source` behind the `cli` feature;
this module carries no `pcap` dependency at all.
*/

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::correlator;
use crate::endpoint::EndpointId;
use crate::openflow::{self, Message};
use crate::store::EndpointLatencyStore;

/// One demuxed TCP segment observed on the wire, with enough IP-layer
/// detail for the capture loop to apply its own defensive protocol check
/// even though the packet source is expected to have already filtered to
/// `tcp port <ofp_port>` via a BPF-style filter.
pub struct RawFrame {
    pub ts: Duration,
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
    /// IP protocol number (6 == TCP). Anything else is skipped.
    pub ip_protocol: u8,
    /// The IPv4 header's "more fragments" flag. A fragmented datagram
    /// carries no usable TCP header in this fragment and is skipped.
    pub more_fragments: bool,
    /// The OpenFlow message bytes (TCP payload).
    pub payload: Vec<u8>,
}

const IPPROTO_TCP: u8 = 6;

/// Upstream packet source. The real implementation (`pcap_source::PcapSource`)
/// pulls from libpcap; tests use a `VecDeque`-backed fake.
pub trait PacketSource {
    fn next(&mut self) -> Option<RawFrame>;
}

/// Runs the capture loop until `source` is exhausted or `stop` is set.
///
/// Checks `stop` once per iteration: at most one more event is processed
/// after the flag flips, matching the cancellation contract.
pub fn run<S: PacketSource>(mut source: S, store: &EndpointLatencyStore, ofp_port: u16, stop: &Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        let frame = match source.next() {
            Some(f) => f,
            None => break,
        };
        handle_frame(store, ofp_port, &frame);
    }
}

fn handle_frame(store: &EndpointLatencyStore, ofp_port: u16, frame: &RawFrame) {
    if frame.more_fragments {
        debug!("skipping fragmented IPv4 datagram");
        return;
    }
    if frame.ip_protocol != IPPROTO_TCP {
        debug!(protocol = frame.ip_protocol, "skipping non-TCP datagram");
        return;
    }

    let is_packet_in = frame.src_port == ofp_port;
    let switch_ep = if is_packet_in {
        EndpointId::new(frame.dst_ip, frame.dst_port)
    } else {
        EndpointId::new(frame.src_ip, frame.src_port)
    };

    let (msg, _len) = match openflow::parse(&frame.payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(%switch_ep, error = %e, "dropping unparseable OpenFlow message");
            return;
        }
    };

    let inner = match msg {
        Message::PacketIn { data, .. } => data,
        Message::PacketOut { data, .. } => data,
        Message::EchoRequest { .. } | Message::EchoReply { .. } | Message::Other { .. } => return,
    };

    correlator::process_frame(store, switch_ep, frame.ts, is_packet_in, inner);
}
