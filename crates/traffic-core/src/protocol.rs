//! Wire-format response types shared between the query server and its
//! clients. One `serde_json::Value` document per `send`, as spec'd: a
//! `result` field of `"success"` or `"error"`, with command-specific
//! payload fields alongside.

use crate::accumulator::{TrafficCell, TrafficMap};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CellPayload {
    pub bytes_rx: u64,
    pub bytes_tx: u64,
    pub pkt_rx: u64,
    pub pkt_tx: u64,
}

impl From<TrafficCell> for CellPayload {
    fn from(c: TrafficCell) -> Self {
        Self { bytes_rx: c.bytes_rx, bytes_tx: c.bytes_tx, pkt_rx: c.pkt_rx, pkt_tx: c.pkt_tx }
    }
}

fn payload_map(map: &TrafficMap) -> HashMap<String, CellPayload> {
    map.iter().map(|(name, cell)| (name.clone(), (*cell).into())).collect()
}

/// `snapshot` / one `live` tick response.
#[derive(Debug, Serialize)]
pub struct TrafficResponse {
    pub result: &'static str,
    pub data: HashMap<String, CellPayload>,
    pub length: usize,
    pub interval: u64,
}

impl TrafficResponse {
    pub fn new(map: &TrafficMap, interval: u64) -> Self {
        let data = payload_map(map);
        Self { result: "success", length: data.len(), data, interval }
    }
}

/// Typed error response: second concurrent `live` observer, malformed
/// arguments, or an unrecognized command.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub result: &'static str,
    pub errmsg: String,
}

impl ErrorResponse {
    pub fn new(errmsg: impl Into<String>) -> Self {
        Self { result: "error", errmsg: errmsg.into() }
    }
}

/// Human-readable rendering for `live-text`, mirroring the structured
/// payload's fields in a fixed-width table.
pub fn format_live_text(map: &TrafficMap, interval: u64) -> String {
    let mut out = format!("-- interval {interval}s, {} apps --\n", map.len());
    let mut names: Vec<&String> = map.keys().collect();
    names.sort();
    for name in names {
        let c = map[name];
        out.push_str(&format!(
            "{name:<24} rx={:<10} tx={:<10} pkt_rx={:<6} pkt_tx={:<6}\n",
            c.bytes_rx, c.bytes_tx, c.pkt_rx, c.pkt_tx
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traffic_response_reports_length_and_interval() {
        let mut map = TrafficMap::new();
        map.insert("app".into(), TrafficCell { bytes_rx: 1, bytes_tx: 2, pkt_rx: 1, pkt_tx: 1 });
        let resp = TrafficResponse::new(&map, 10);
        assert_eq!(resp.result, "success");
        assert_eq!(resp.length, 1);
        assert_eq!(resp.interval, 10);
    }

    #[test]
    fn error_response_serializes_errmsg() {
        let resp = ErrorResponse::new("live observer already registered");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["result"], "error");
        assert_eq!(json["errmsg"], "live observer already registered");
    }

    #[test]
    fn live_text_lists_every_app_sorted() {
        let mut map = TrafficMap::new();
        map.insert("zzz".into(), TrafficCell { bytes_rx: 1, bytes_tx: 0, pkt_rx: 1, pkt_tx: 0 });
        map.insert("aaa".into(), TrafficCell { bytes_rx: 2, bytes_tx: 0, pkt_rx: 1, pkt_tx: 0 });
        let text = format_live_text(&map, 10);
        let aaa_pos = text.find("aaa").unwrap();
        let zzz_pos = text.find("zzz").unwrap();
        assert!(aaa_pos < zzz_pos);
    }
}
