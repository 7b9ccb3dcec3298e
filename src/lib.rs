//! Passive OpenFlow 1.0 control-channel latency estimation via LLDP probe
//! correlation.
//!
//! Observes the TCP control channel between one or more OpenFlow 1.0
//! switches and an SDN controller and derives three latency estimates per
//! switch endpoint — `EchoRTT`, `PktInRTT`, and per-port `LinkLat` — by
//! correlating specially crafted LLDP probes carried inside `PACKET_IN`
//! and `PACKET_OUT` messages. See `correlator` for the classification
//! table this crate implements.
//!
//! Packet capture is abstracted behind [`capture::PacketSource`]; the real
//! libpcap-backed implementation lives in `pcap_source` behind the `cli`
//! feature, alongside the `ofprobe` binary that wires everything together.

pub mod capture;
pub mod correlator;
pub mod endpoint;
pub mod error;
pub mod lldp;
pub mod logfile;
pub mod openflow;
pub mod stats;
pub mod store;

#[cfg(feature = "cli")]
pub mod pcap_source;

pub use endpoint::EndpointId;
pub use error::{Error, Fatal, Result};
pub use store::EndpointLatencyStore;
