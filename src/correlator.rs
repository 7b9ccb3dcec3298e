/*! LLDP probe correlator: the four-scenario ping/pong matcher.

Consumes one LLDP-carrying Ethernet frame at a time, together with the
endpoint and direction the capture loop determined it belongs to, and
turns it into zero or one statistics update against an
[`EndpointLatencyStore`]. Grounded in the original sniffer's
`OFSniff::ParseLLDP`/`ProcessPacketIn`/`ProcessPacketOut`, which walked the
same TLV chain and branched on the same four cases; this version replaces
the original's `if`/`else` cascade with an explicit [`Scenario`] match so
each of the four rows in the classification table is one arm.
*/

use std::time::Duration;

use tracing::debug;

use crate::endpoint::EndpointId;
use crate::error::{Error, Result};
use crate::lldp::{self, TlvIter, CHASSIS_ID, PORT_ID, SYSTEM_NAME};
use crate::store::{EndpointLatencyStore, PacketId};

/// LLDP Multicast destination MAC, `01:80:C2:00:00:0E`.
pub const LLDP_DEST_MAC: [u8; 6] = [0x01, 0x80, 0xC2, 0x00, 0x00, 0x0E];
pub const LLDP_ETHERTYPE: u16 = 0x88CC;

/// Sentinel `port_no` marking an Echo-measurement probe rather than a
/// real egress port.
pub const OFPP_MAX: u32 = 0xFF00;

const SAVI_SDN_PREFIX: &str = "SAVI-SDN";

struct Probe {
    pid: PacketId,
    dp2ctrl_rtt: f64,
    port_no: u32,
}

/// Walks the Ethernet frame's EtherType/destination MAC, then its LLDP TLV
/// chain, extracting the PORT_ID and SAVI-SDN SystemName fields. Returns
/// `Ok(None)` for any frame that fails the LLDP acceptance predicate
/// (wrong EtherType or destination) rather than an error: those frames are
/// not probes at all, not malformed probes.
fn parse_probe(frame: &[u8]) -> Result<Option<Probe>> {
    // dst_mac(6) + src_mac(6) + ethertype(2)
    if frame.len() < 14 {
        return Ok(None);
    }
    let dst_mac = &frame[0..6];
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    if ethertype != LLDP_ETHERTYPE || dst_mac != LLDP_DEST_MAC {
        return Ok(None);
    }

    let mut port_no = None;
    let mut packet_id = None;
    let mut dp2ctrl_rtt = None;

    for tlv in TlvIter::new(&frame[14..]) {
        let (ty, value) = tlv?;
        match ty {
            PORT_ID => port_no = Some(lldp::parse_port_id(value)?),
            SYSTEM_NAME => {
                let (pid, rtt) = parse_system_name(&lldp::system_name_str(value))?;
                packet_id = Some(pid);
                dp2ctrl_rtt = Some(rtt);
            }
            CHASSIS_ID => {}
            _ => {}
        }
    }

    let (port_no, pid, dp2ctrl_rtt) = match (port_no, packet_id, dp2ctrl_rtt) {
        (Some(p), Some(i), Some(r)) => (p, i, r),
        _ => return Err(Error::MalformedProbe("missing PORT_ID or SYSTEM_NAME TLV")),
    };

    Ok(Some(Probe { pid, dp2ctrl_rtt, port_no }))
}

/// Parses `SAVI-SDN<anything>;<32-byte-packet-id>;<decimal-rtt>`.
///
/// The PacketId is a fixed-width 32-byte read starting right after the
/// first `;`, independent of where the last `;` falls — mirroring the
/// original's `sysName.substr(firstSemiCol + 1, PACKET_ID_LEN)`. The last
/// `;` only delimits the RTT field; bytes between the PacketId and the
/// last `;` (if any) are not part of either field and are ignored.
fn parse_system_name(name: &str) -> Result<(PacketId, f64)> {
    if !name.starts_with(SAVI_SDN_PREFIX) {
        return Err(Error::MalformedProbe("SystemName missing SAVI-SDN prefix"));
    }
    let first_semi = name.find(';').ok_or(Error::MalformedProbe("SystemName missing ';'"))?;
    let last_semi = name.rfind(';').ok_or(Error::MalformedProbe("SystemName missing ';'"))?;
    if first_semi == last_semi {
        return Err(Error::MalformedProbe("SystemName has only one ';'"));
    }

    let pid_start = first_semi + 1;
    let pid_end = pid_start + 32;
    if pid_end > name.len() {
        return Err(Error::MalformedProbe("packet id field is not 32 bytes"));
    }
    let mut pid: PacketId = [0u8; 32];
    pid.copy_from_slice(name[pid_start..pid_end].as_bytes());

    let rtt_str = &name[last_semi + 1..];
    let rtt: f64 = rtt_str.parse().map_err(|_| Error::MalformedProbe("dp2ctrlRTT is not a valid float"))?;

    Ok((pid, rtt))
}

/// Processes one LLDP-carrying Ethernet frame observed at `ep` at time
/// `ts`, flowing in the direction indicated by `is_packet_in`.
///
/// Silently does nothing (beyond a `debug!` log) for anything that fails
/// the acceptance predicate, fails to parse, or doesn't match an
/// outstanding probe — per the correlator's failure semantics, no error
/// ever propagates to the caller.
pub fn process_frame(store: &EndpointLatencyStore, ep: EndpointId, ts: Duration, is_packet_in: bool, frame: &[u8]) {
    let probe = match parse_probe(frame) {
        Ok(Some(p)) => p,
        Ok(None) => return,
        Err(e) => {
            debug!(%ep, error = %e, "dropping malformed LLDP probe");
            return;
        }
    };

    let is_ping = probe.dp2ctrl_rtt == 0.0;

    match (is_packet_in, is_ping, probe.port_no == OFPP_MAX) {
        // 1a: Echo match.
        (true, true, true) => match store.take_seen(ep, &probe.pid) {
            Some(seen_at) => store.update_echo_rtt(ep, duration_to_millis(ts.saturating_sub(seen_at))),
            None => debug!(%ep, "echo pong with no matching outstanding probe"),
        },
        // 1b: link-probe record (PacketIn-side ping).
        (true, true, false) => {
            store.add_outstanding(ep, probe.port_no, probe.pid, ts);
        }
        // 2: link pong received.
        (true, false, _) => match store.take_seen(ep, &probe.pid) {
            Some(seen_at) => {
                let rtt = duration_to_millis(ts.saturating_sub(seen_at));
                let est = (rtt - store.echo_med(ep) - probe.dp2ctrl_rtt).max(0.0);
                store.update_link_lat(ep, probe.port_no, est);
            }
            None => debug!(%ep, "link pong with no matching outstanding probe"),
        },
        // 3: link ping emitted (PacketOut-side ping).
        (false, true, _) => {
            store.add_outstanding(ep, probe.port_no, probe.pid, ts);
        }
        // 4: pkt-in-rtt match.
        (false, false, _) => match store.take_seen(ep, &probe.pid) {
            Some(seen_at) => store.update_pktin_rtt(ep, duration_to_millis(ts.saturating_sub(seen_at))),
            None => debug!(%ep, "pkt-in-rtt pong with no matching outstanding probe"),
        },
    }
}

/// All latency samples in this crate are milliseconds, matching the wire
/// format's `<decimal-dp2ctrl-rtt>` field and the original's
/// `CalcTimestampDiff` ("returns in ms granularity").
fn duration_to_millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ep() -> EndpointId {
        EndpointId::new(Ipv4Addr::new(10, 0, 0, 1), 6672)
    }

    fn tlv(ty: u8, value: &[u8]) -> Vec<u8> {
        let header = ((ty as u16) << 9) | (value.len() as u16 & 0x01FF);
        let mut out = header.to_be_bytes().to_vec();
        out.extend_from_slice(value);
        out
    }

    fn frame(port_no: u32, pid: &str, rtt: f64) -> Vec<u8> {
        let mut f = Vec::new();
        f.extend_from_slice(&LLDP_DEST_MAC);
        f.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]); // src mac
        f.extend_from_slice(&LLDP_ETHERTYPE.to_be_bytes());
        f.extend(tlv(CHASSIS_ID, b"dpid:1"));
        let mut port_val = vec![0u8];
        port_val.extend_from_slice(&port_no.to_be_bytes());
        f.extend(tlv(PORT_ID, &port_val));
        let system_name = format!("SAVI-SDN;{pid};{rtt}");
        f.extend(tlv(SYSTEM_NAME, system_name.as_bytes()));
        f.extend_from_slice(&[0, 0]); // end TLV
        f
    }

    fn pid32(byte: u8) -> String {
        String::from_utf8(vec![byte; 32]).unwrap()
    }

    #[test]
    fn non_lldp_ethertype_is_silently_ignored() {
        let store = EndpointLatencyStore::new();
        let mut f = vec![0u8; 14];
        f[12] = 0x08;
        f[13] = 0x00; // IPv4, not LLDP
        process_frame(&store, ep(), Duration::from_secs(1), true, &f);
        assert_eq!(store.echo_avg(ep()), 0.0);
    }

    #[test]
    fn scenario_1a_echo_match_computes_rtt() {
        let store = EndpointLatencyStore::new();
        let pid = pid32(b'a');
        let f = frame(OFPP_MAX, &pid, 0.0);
        process_frame(&store, ep(), Duration::from_millis(100), false, &f); // scenario 3: ping emitted
        process_frame(&store, ep(), Duration::from_millis(130), true, &f); // scenario 1a: echo match
        assert!((store.echo_med(ep()) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn scenario_1b_then_2_computes_link_latency_floor_at_zero() {
        let store = EndpointLatencyStore::new();
        // seed echo_med (ms) so link-lat math has something to subtract.
        store.update_echo_rtt(ep(), 10.0);

        let pid = pid32(b'b');
        let ping = frame(7, &pid, 0.0);
        process_frame(&store, ep(), Duration::from_millis(0), true, &ping); // 1b
        let pong = frame(7, &pid, 5.0);
        process_frame(&store, ep(), Duration::from_millis(12), true, &pong); // 2
        // rtt=12ms, minus echo_med(10ms), minus dp2ctrlRTT(5ms) => negative, clamps to 0.
        assert_eq!(store.link_avg(ep(), 7), 0.0);
    }

    #[test]
    fn scenario_4_pktin_rtt_match() {
        let store = EndpointLatencyStore::new();
        let pid = pid32(b'c');
        let ping = frame(3, &pid, 20.0); // not a ping (dp2ctrlRTT != 0)
        process_frame(&store, ep(), Duration::from_millis(0), true, &ping); // classified as scenario 2 (no match yet, drop)
        // Build a true PacketOut ping/pong pair instead.
        let ping2 = frame(3, &pid, 0.0);
        process_frame(&store, ep(), Duration::from_millis(50), false, &ping2); // scenario 3
        let pong2 = frame(3, &pid, 20.0);
        process_frame(&store, ep(), Duration::from_millis(80), false, &pong2); // scenario 4
        assert!((store.pktin_med(ep()) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn unmatched_pong_is_dropped_without_panicking() {
        let store = EndpointLatencyStore::new();
        let pid = pid32(b'd');
        let pong = frame(5, &pid, 10.0);
        process_frame(&store, ep(), Duration::from_millis(0), true, &pong);
        assert_eq!(store.link_avg(ep(), 5), 0.0);
    }

    #[test]
    fn malformed_system_name_is_dropped() {
        assert_eq!(parse_system_name("not-savi;x").unwrap_err(), Error::MalformedProbe("SystemName missing SAVI-SDN prefix"));
        assert!(parse_system_name("SAVI-SDN;onlyonesemicolon").is_err());
        assert!(parse_system_name(&format!("SAVI-SDN;{};notanumber", pid32(b'e'))).is_err());
    }

    #[test]
    fn packet_id_is_a_fixed_width_read_not_bounded_by_the_last_semicolon() {
        // Stray bytes between the 32-byte packet id and the RTT-delimiting
        // ';' must not reject the SystemName: the packet id is always the
        // 32 bytes right after the first ';', full stop.
        let pid = pid32(b'g');
        let name = format!("SAVI-SDN;{pid}stray-junk;12.5");
        let (parsed_pid, rtt) = parse_system_name(&name).unwrap();
        assert_eq!(parsed_pid, [b'g'; 32]);
        assert_eq!(rtt, 12.5);
    }

    #[test]
    fn endpoint_scoping_prevents_cross_switch_collisions() {
        let store = EndpointLatencyStore::new();
        let ep_a = EndpointId::new(Ipv4Addr::new(10, 0, 0, 10), 6672);
        let ep_b = EndpointId::new(Ipv4Addr::new(10, 0, 0, 11), 6672);
        let pid = pid32(b'f');
        let ping = frame(OFPP_MAX, &pid, 0.0);
        process_frame(&store, ep_a, Duration::from_millis(0), false, &ping);
        // Same PacketId observed at a different endpoint must not match.
        process_frame(&store, ep_b, Duration::from_millis(10), true, &ping);
        assert_eq!(store.echo_avg(ep_b), 0.0);
    }
}
