//! `Announce` responses for the HTTP tracker.
//!
//! The reply dictionary carries binary values (the packed peer lists and the
//! observed external IP), so the bodies are built as raw
//! [`serde_bencode::value::Value`] dictionaries rather than serde structs.
use std::collections::HashMap;
use std::net::IpAddr;

use helix_tracker_primitives::info_hash::InfoHash;
use serde_bencode::value::Value;

fn dict(entries: Vec<(&str, Value)>) -> Vec<u8> {
    let mut map: HashMap<Vec<u8>, Value> = HashMap::new();
    for (key, value) in entries {
        map.insert(key.as_bytes().to_vec(), value);
    }
    serde_bencode::to_bytes(&Value::Dict(map)).expect("a reply dictionary is always bencodable")
}

fn external_ip_bytes(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// The regular `announce` response: the packed peer lists plus the timing
/// hints clients schedule their next announce by.
#[derive(Debug, PartialEq)]
pub struct Announce {
    pub info_hash: InfoHash,
    /// Packed IPv4 endpoints, 6 bytes each.
    pub peers: Vec<u8>,
    /// Packed IPv6 endpoints, 18 bytes each. Omitted from the reply when
    /// empty.
    pub peers6: Vec<u8>,
    /// Seconds until the next regular announce, already jittered.
    pub interval: i64,
    pub min_interval: i64,
    /// The peer's IP as this tracker observed it: 4 or 16 bytes.
    pub external_ip: IpAddr,
    /// Clients align their statistics windows on this.
    pub snap_delta: i64,
    pub warning: Option<String>,
}

impl Announce {
    #[must_use]
    pub fn body(&self) -> Vec<u8> {
        let mut entries = vec![
            ("info_hash", Value::Bytes(self.info_hash.bytes().to_vec())),
            ("peers", Value::Bytes(self.peers.clone())),
            ("interval", Value::Int(self.interval)),
            ("min interval", Value::Int(self.min_interval)),
            ("external ip", Value::Bytes(external_ip_bytes(self.external_ip))),
            ("snapdelta", Value::Int(self.snap_delta)),
        ];
        if !self.peers6.is_empty() {
            entries.push(("peers6", Value::Bytes(self.peers6.clone())));
        }
        if let Some(warning) = &self.warning {
            entries.push(("warning", Value::Bytes(warning.as_bytes().to_vec())));
        }
        dict(entries)
    }
}

/// The short-circuit reply for `report_w_bad` announces: the swarm's web
/// seed failure counters, nothing else.
#[derive(Debug, PartialEq, Eq)]
pub struct WBadReport {
    pub info_hash: InfoHash,
    pub w_bad: u64,
    pub c_w_bad: u64,
}

impl WBadReport {
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn body(&self) -> Vec<u8> {
        dict(vec![
            ("info_hash", Value::Bytes(self.info_hash.bytes().to_vec())),
            ("w_bad", Value::Int(self.w_bad as i64)),
            ("c_w_bad", Value::Int(self.c_w_bad as i64)),
        ])
    }
}

/// The reply for a swarm flagged to terminate: asks the client to drop the
/// torrent.
#[derive(Debug, PartialEq, Eq)]
pub struct Terminate {
    pub info_hash: InfoHash,
}

impl Terminate {
    #[must_use]
    pub fn body(&self) -> Vec<u8> {
        dict(vec![
            ("info_hash", Value::Bytes(self.info_hash.bytes().to_vec())),
            ("terminate swarm", Value::Int(1)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use helix_tracker_primitives::info_hash::InfoHash;

    use super::{Announce, Terminate, WBadReport};

    fn sample() -> Announce {
        Announce {
            info_hash: InfoHash([0x69; 20]),
            peers: b"iiiipp".to_vec(),
            peers6: Vec::new(),
            interval: 111,
            min_interval: 222,
            external_ip: IpAddr::V4(Ipv4Addr::new(0x69, 0x69, 0x69, 0x69)),
            snap_delta: 300,
            warning: None,
        }
    }

    #[test]
    fn the_announce_response_is_a_sorted_bencoded_dictionary() {
        let bytes = sample().body();

        let expected = b"d11:external ip4:iiii9:info_hash20:iiiiiiiiiiiiiiiiiiii8:intervali111e12:min intervali222e5:peers6:iiiipp9:snapdeltai300ee"; // cspell:disable-line

        assert_eq!(
            String::from_utf8_lossy(&bytes),
            String::from_utf8_lossy(expected.as_slice())
        );
    }

    #[test]
    fn peers6_is_omitted_when_empty_and_present_otherwise() {
        let mut response = sample();
        assert!(!String::from_utf8_lossy(&response.body()).contains("peers6"));

        response.peers6 = vec![0x69; 18];
        assert!(String::from_utf8_lossy(&response.body()).contains("6:peers618:"));
    }

    #[test]
    fn a_v6_external_ip_is_sixteen_bytes() {
        let mut response = sample();
        response.external_ip = IpAddr::V6(Ipv6Addr::LOCALHOST);

        assert!(String::from_utf8_lossy(&response.body()).contains("11:external ip16:"));
    }

    #[test]
    fn a_warning_is_included_when_present() {
        let mut response = sample();
        response.warning = Some("IPv6 endpoints are not supported in &ipv6= argument".to_string());

        assert!(String::from_utf8_lossy(&response.body()).contains("7:warning51:IPv6"));
    }

    #[test]
    fn the_w_bad_report_contains_only_the_counters_and_the_info_hash() {
        let bytes = WBadReport {
            info_hash: InfoHash([0x69; 20]),
            w_bad: 3,
            c_w_bad: 7,
        }
        .body();

        let expected = b"d7:c_w_badi7e9:info_hash20:iiiiiiiiiiiiiiiiiiii5:w_badi3ee"; // cspell:disable-line
        assert_eq!(String::from_utf8_lossy(&bytes), String::from_utf8_lossy(expected.as_slice()));
    }

    #[test]
    fn the_terminate_reply_sets_the_flag_key() {
        let bytes = Terminate {
            info_hash: InfoHash([0x69; 20]),
        }
        .body();

        assert!(String::from_utf8_lossy(&bytes).contains("15:terminate swarmi1e"));
    }
}
