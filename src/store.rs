/*! Per-endpoint latency state: outstanding probes and running statistics.

Mirrors the original sniffer's `EndpointLatencyMetadata`, which kept a
single `unordered_map<IPv4EndpointType, LatencyMetadata>` behind no lock at
all (it only ever ran on one thread). This crate's concurrency model (see
the crate-level docs) allows reader threads alongside the capture thread,
so each endpoint's metadata lives behind its own [`Mutex`], reachable
through an outer map lock that's only held long enough to look up or
insert the `Arc`. Looking up one endpoint never blocks access to another.
*/

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::endpoint::EndpointId;
use crate::logfile::StatsLog;
use crate::stats::StatStream;

pub const ECHO_RTT_WINDOW: usize = 15;
pub const PKT_IN_RTT_WINDOW: usize = 60;
pub const LINK_LAT_WINDOW: usize = 20;
pub const MAX_OUTSTANDING_PKTS: usize = 20;

pub type PacketId = [u8; 32];

struct LatencyMetadata {
    seen: HashMap<PacketId, Duration>,
    outstanding: HashMap<u32, VecDeque<PacketId>>,
    echo: StatStream,
    pktin: StatStream,
    link: HashMap<u32, StatStream>,
}

impl LatencyMetadata {
    fn new() -> LatencyMetadata {
        LatencyMetadata {
            seen: HashMap::new(),
            outstanding: HashMap::new(),
            echo: StatStream::new(ECHO_RTT_WINDOW),
            pktin: StatStream::new(PKT_IN_RTT_WINDOW),
            link: HashMap::new(),
        }
    }

    fn link_stream(&mut self, port: u32) -> &mut StatStream {
        self.link.entry(port).or_insert_with(|| StatStream::new_ema(LINK_LAT_WINDOW))
    }
}

/// Shared, thread-safe table of per-endpoint latency state.
pub struct EndpointLatencyStore {
    endpoints: Mutex<HashMap<EndpointId, Arc<Mutex<LatencyMetadata>>>>,
    log: Option<Mutex<StatsLog>>,
}

impl EndpointLatencyStore {
    pub fn new() -> EndpointLatencyStore {
        EndpointLatencyStore { endpoints: Mutex::new(HashMap::new()), log: None }
    }

    pub fn with_log(log: StatsLog) -> EndpointLatencyStore {
        EndpointLatencyStore { endpoints: Mutex::new(HashMap::new()), log: Some(Mutex::new(log)) }
    }

    fn entry(&self, ep: EndpointId) -> Arc<Mutex<LatencyMetadata>> {
        let mut endpoints = self.endpoints.lock().unwrap();
        endpoints
            .entry(ep)
            .or_insert_with(|| {
                debug!(%ep, "observed a new endpoint");
                Arc::new(Mutex::new(LatencyMetadata::new()))
            })
            .clone()
    }

    pub fn endpoints(&self) -> Vec<EndpointId> {
        self.endpoints.lock().unwrap().keys().copied().collect()
    }

    /// Records `pid` as first-seen at `ts` and appends it to `port`'s
    /// outstanding-probe queue, evicting the oldest outstanding ID (from
    /// both the queue and the seen map) if that would push the queue past
    /// [`MAX_OUTSTANDING_PKTS`].
    pub fn add_outstanding(&self, ep: EndpointId, port: u32, pid: PacketId, ts: Duration) {
        let meta = self.entry(ep);
        let mut meta = meta.lock().unwrap();
        meta.seen.insert(pid, ts);
        let queue = meta.outstanding.entry(port).or_default();
        queue.push_back(pid);
        if queue.len() > MAX_OUTSTANDING_PKTS {
            if let Some(evicted) = queue.pop_front() {
                meta.seen.remove(&evicted);
                debug!(%ep, port, "outstanding queue overflowed; evicted oldest probe");
            }
        }
    }

    /// Removes and returns the seen-map timestamp for `pid` at `ep`, if
    /// any, also removing it from whichever port queue currently holds it.
    pub fn take_seen(&self, ep: EndpointId, pid: &PacketId) -> Option<Duration> {
        let meta = self.entry(ep);
        let mut meta = meta.lock().unwrap();
        let ts = meta.seen.remove(pid)?;
        for queue in meta.outstanding.values_mut() {
            if let Some(pos) = queue.iter().position(|x| x == pid) {
                queue.remove(pos);
                break;
            }
        }
        Some(ts)
    }

    pub fn update_echo_rtt(&self, ep: EndpointId, sample: f64) {
        let meta = self.entry(ep);
        let mut meta = meta.lock().unwrap();
        meta.echo.push(sample);
        self.log_sample(ep, "EchoRTT", sample, meta.echo.avg(), meta.echo.var());
    }

    pub fn update_pktin_rtt(&self, ep: EndpointId, sample: f64) {
        let meta = self.entry(ep);
        let mut meta = meta.lock().unwrap();
        meta.pktin.push(sample);
        self.log_sample(ep, "PktInRTT", sample, meta.pktin.avg(), meta.pktin.var());
    }

    /// Applies the link-latency EMA pre-filter and pushes the smoothed
    /// value into `port`'s window.
    pub fn update_link_lat(&self, ep: EndpointId, port: u32, raw_sample: f64) {
        let meta = self.entry(ep);
        let mut meta = meta.lock().unwrap();
        let stream = meta.link_stream(port);
        stream.push(raw_sample);
        let (avg, var) = (stream.avg(), stream.var());
        self.log_sample(ep, &format!("LinkLatRTT-Port{port}"), raw_sample, avg, var);
    }

    pub fn echo_avg(&self, ep: EndpointId) -> f64 {
        self.entry(ep).lock().unwrap().echo.avg()
    }
    pub fn echo_var(&self, ep: EndpointId) -> f64 {
        self.entry(ep).lock().unwrap().echo.var()
    }
    pub fn echo_med(&self, ep: EndpointId) -> f64 {
        self.entry(ep).lock().unwrap().echo.med()
    }

    pub fn pktin_avg(&self, ep: EndpointId) -> f64 {
        self.entry(ep).lock().unwrap().pktin.avg()
    }
    pub fn pktin_var(&self, ep: EndpointId) -> f64 {
        self.entry(ep).lock().unwrap().pktin.var()
    }
    pub fn pktin_med(&self, ep: EndpointId) -> f64 {
        self.entry(ep).lock().unwrap().pktin.med()
    }

    pub fn link_avg(&self, ep: EndpointId, port: u32) -> f64 {
        self.entry(ep).lock().unwrap().link_stream(port).avg()
    }
    pub fn link_var(&self, ep: EndpointId, port: u32) -> f64 {
        self.entry(ep).lock().unwrap().link_stream(port).var()
    }
    pub fn link_med(&self, ep: EndpointId, port: u32) -> f64 {
        self.entry(ep).lock().unwrap().link_stream(port).med()
    }

    pub fn dp_to_ctrl_rtt(&self, ep: EndpointId) -> f64 {
        self.echo_med(ep) + self.pktin_med(ep)
    }

    fn log_sample(&self, ep: EndpointId, metric: &str, raw: f64, avg: f64, var: f64) {
        if let Some(log) = &self.log {
            if let Err(e) = log.lock().unwrap().append(ep, metric, raw, avg, var) {
                debug!(%ep, error = %e, "failed to append to statistics log");
            }
        }
    }
}

impl Default for EndpointLatencyStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Visible only so tests and the CLI can construct an `EndpointId` the same
/// way the capture loop does.
pub fn endpoint(ip: Ipv4Addr, port: u16) -> EndpointId {
    EndpointId::new(ip, port)
}
