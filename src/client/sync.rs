// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Synchronization machine: channel scanning and beacon/probe response
//! intake into the BSS table.

use {
    super::*,
    crate::{bss::BssEntry, fsm::StateMachine},
    log::debug,
};

pub(crate) const SYNC_IDLE: usize = 0;
pub(crate) const SCAN_LISTEN: usize = 1;
const SYNC_STATE_COUNT: usize = 2;

pub(crate) fn machine() -> StateMachine<Mlme> {
    let mut sm =
        StateMachine::new("sync", SYNC_STATE_COUNT, SYNC_MSG_COUNT, SYNC_MSG_BASE, SYNC_IDLE);
    sm.set_action(SYNC_IDLE, MT_MLME_SCAN_REQ, idle_on_scan_req);
    sm.set_action(SYNC_IDLE, MT_PEER_BEACON, on_bcn_or_probe_rsp);
    sm.set_action(SYNC_IDLE, MT_PEER_PROBE_RSP, on_bcn_or_probe_rsp);
    sm.set_action(SCAN_LISTEN, MT_PEER_BEACON, on_bcn_or_probe_rsp);
    sm.set_action(SCAN_LISTEN, MT_PEER_PROBE_RSP, on_bcn_or_probe_rsp);
    sm.set_action(SCAN_LISTEN, MT_SCAN_DWELL, listen_on_dwell);
    sm
}

fn send_probe(mlme: &mut Mlme, ssid: &[u8]) {
    let probe = mac::make_probe_req_frame(&mlme.own_addr, ssid, OWN_RATES);
    mlme.send_frame(&probe);
}

fn idle_on_scan_req(mlme: &mut Mlme, event: &Event) {
    let req = match &event.body {
        EventBody::Scan(req) => req.clone(),
        _ => return,
    };
    let channels = if req.channels.is_empty() {
        DEFAULT_SCAN_CHANNELS.to_vec()
    } else {
        req.channels.clone()
    };
    let first = match channels.first() {
        Some(channel) => *channel,
        None => return,
    };
    debug!("scan start: {} channel(s), ssid {:?}", channels.len(), req.ssid);
    mlme.scan_tab.lock().clear();
    mlme.tune(first);
    if req.scan_type == ScanType::Active {
        send_probe(mlme, &req.ssid);
    }
    let now = mlme.now();
    let dwell_timer = mlme.timers.schedule(now, mlme.cfg.scan_dwell(), TimerEvent::ScanDwell);
    mlme.aux.scan = Some(ScanState { req, channels, cursor: 0, dwell_timer });
    if mlme.link.is_none() {
        mlme.set_link_state(LinkStateTag::Scanning);
    }
    mlme.machines.sync.set_state(SCAN_LISTEN);
}

/// Fold a beacon or probe response into the BSS table, and refresh the live
/// link if it came from the serving AP.
fn on_bcn_or_probe_rsp(mlme: &mut Mlme, event: &Event) {
    let frame = match &event.body {
        EventBody::Frame(frame) => frame,
        _ => return,
    };
    let (hdr, body) = match mac::parse_mgmt_frame(frame) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("unparseable beacon: {}", e);
            return;
        }
    };
    let (fields, ies) = match mac::parse_beacon(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("unparseable beacon body: {}", e);
            return;
        }
    };
    let bssid = hdr.addr3;
    let entry = BssEntry::from_frame(
        bssid,
        &fields,
        ies,
        mlme.current_channel,
        event.origin.rssi_dbm,
        event.origin.timestamp,
    );
    if let Err(e) = mlme.scan_tab.lock().upsert(entry, Some(&mlme.aux.desired)) {
        debug!("bss table: {}", e);
    }
    if let Some(link) = &mut mlme.link {
        if link.bssid == bssid {
            link.last_beacon = event.origin.timestamp;
            link.rssi_dbm = event.origin.rssi_dbm;
        }
    }
    mlme.antenna.note_rssi(event.origin.antenna, event.origin.rssi_dbm);
}

/// Dwell expired: step to the next channel or wrap the scan up.
fn listen_on_dwell(mlme: &mut Mlme, _event: &Event) {
    let next = match &mut mlme.aux.scan {
        Some(scan) => {
            scan.cursor += 1;
            scan.channels
                .get(scan.cursor)
                .map(|ch| (*ch, scan.req.scan_type, scan.req.ssid.clone()))
        }
        None => return,
    };
    match next {
        Some((channel, scan_type, ssid)) => {
            mlme.tune(channel);
            if scan_type == ScanType::Active {
                send_probe(mlme, &ssid);
            }
            let now = mlme.now();
            let dwell_timer =
                mlme.timers.schedule(now, mlme.cfg.scan_dwell(), TimerEvent::ScanDwell);
            if let Some(scan) = &mut mlme.aux.scan {
                scan.dwell_timer = dwell_timer;
            }
        }
        None => {
            mlme.aux.scan = None;
            mlme.aux.last_scan = Some(mlme.now());
            if let Some(channel) = mlme.link.as_ref().map(|link| link.channel) {
                // Back to the serving channel.
                mlme.tune(channel);
            } else if mlme.machines.cntl.state() == cntl::CNTL_IDLE {
                mlme.set_link_state(LinkStateTag::Idle);
            }
            mlme.machines.sync.set_state(SYNC_IDLE);
            debug!("scan complete: {} BSS(s)", mlme.scan_tab.lock().len());
            mlme.enqueue_local(MachineId::Cntl, MT_CNTL_SCAN_DONE, EventBody::None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ie, test_utils::*};

    #[test]
    fn scan_steps_channels_and_probes() {
        let mut h = TestHelper::new();
        h.scan_request(ScanRequest {
            ssid: b"net".to_vec(),
            scan_type: ScanType::Active,
            channels: vec![1, 6, 11],
        });
        assert_eq!(h.mlme.machines.sync.state(), SCAN_LISTEN);
        assert_eq!(h.device.channel(), 1);
        // One probe per channel visited so far.
        assert_eq!(h.device.take_sent().len(), 1);

        h.advance(h.mlme.cfg.scan_dwell());
        assert_eq!(h.device.channel(), 6);
        assert_eq!(h.device.take_sent().len(), 1);

        h.advance(h.mlme.cfg.scan_dwell());
        assert_eq!(h.device.channel(), 11);

        h.advance(h.mlme.cfg.scan_dwell());
        assert_eq!(h.mlme.machines.sync.state(), SYNC_IDLE);
        assert!(h.mlme.aux.scan.is_none());
        assert!(h.mlme.aux.last_scan.is_some());
    }

    #[test]
    fn passive_scan_sends_no_probes() {
        let mut h = TestHelper::new();
        h.scan_request(ScanRequest {
            ssid: Vec::new(),
            scan_type: ScanType::Passive,
            channels: vec![1, 6],
        });
        h.advance(h.mlme.cfg.scan_dwell());
        h.advance(h.mlme.cfg.scan_dwell());
        assert!(h.device.take_sent().is_empty());
    }

    #[test]
    fn beacons_land_in_the_table() {
        let mut h = TestHelper::new();
        h.scan_request(ScanRequest::wildcard());
        h.recv_frame(&beacon_frame([5; 6], b"net", 1, mac::CAP_ESS), -55);
        h.recv_frame(&beacon_frame([6; 6], b"other", 1, mac::CAP_ESS), -70);

        let table = h.scan_tab.lock();
        assert_eq!(table.len(), 2);
        let (_, entry) = table.iter().find(|(_, e)| e.bssid == [5; 6]).expect("entry");
        assert_eq!(entry.ssid, b"net");
        assert_eq!(entry.rssi_dbm, -55);
    }

    #[test]
    fn scan_request_clears_previous_results() {
        let mut h = TestHelper::new();
        h.scan_request(ScanRequest::wildcard());
        h.recv_frame(&beacon_frame([5; 6], b"net", 1, mac::CAP_ESS), -55);
        h.finish_scan();

        h.scan_request(ScanRequest::wildcard());
        assert!(h.scan_tab.lock().is_empty());
    }

    #[test]
    fn serving_ap_beacon_refreshes_link_outside_scans() {
        let mut h = TestHelper::new();
        h.associate([5; 6], b"net", 6);
        let before = h.mlme.link.as_ref().expect("link").last_beacon;

        h.clock.advance(std::time::Duration::from_secs(1));
        h.recv_frame(&beacon_frame([5; 6], b"net", 6, mac::CAP_ESS), -48);

        let link = h.mlme.link.as_ref().expect("link");
        assert!(link.last_beacon > before);
        assert_eq!(link.rssi_dbm, -48);
    }

    #[test]
    fn hidden_ssid_beacon_learned_via_probe_rsp() {
        let mut h = TestHelper::new();
        h.scan_request(ScanRequest::wildcard());
        h.recv_frame(&beacon_frame([5; 6], b"", 1, mac::CAP_ESS), -55);
        {
            let table = h.scan_tab.lock();
            let (_, entry) = table.iter().next().expect("entry");
            assert!(entry.hidden);
        }
        h.recv_frame(&probe_rsp_frame([5; 6], b"secret", 1, mac::CAP_ESS), -55);
        let table = h.scan_tab.lock();
        assert_eq!(table.len(), 1);
        let (_, entry) = table.iter().next().expect("entry");
        assert_eq!(entry.ssid, b"secret");
        assert!(!entry.hidden);
    }

    #[test]
    fn scan_returns_to_serving_channel() {
        let mut h = TestHelper::new();
        h.associate([5; 6], b"net", 6);
        h.scan_request(ScanRequest {
            ssid: Vec::new(),
            scan_type: ScanType::Passive,
            channels: vec![1],
        });
        assert_eq!(h.device.channel(), 1);
        h.advance(h.mlme.cfg.scan_dwell());
        assert_eq!(h.device.channel(), 6);
    }

    #[test]
    fn probe_rsp_ds_param_beats_rx_channel() {
        let mut h = TestHelper::new();
        h.scan_request(ScanRequest::wildcard());
        // Heard on channel 1 (adjacent-channel leakage), declares channel 3.
        let mut frame = beacon_frame([5; 6], b"net", 1, mac::CAP_ESS);
        // Patch the DS params IE that beacon_frame wrote.
        let ies_start = mac::MGMT_HDR_LEN + 12;
        let ies = frame.split_off(ies_start);
        let mut patched = Vec::new();
        for (id, body) in ie::Reader::new(&ies) {
            patched.push(id);
            patched.push(body.len() as u8);
            if id == ie::IE_DS_PARAMS {
                patched.push(3);
            } else {
                patched.extend_from_slice(body);
            }
        }
        frame.extend_from_slice(&patched);
        h.recv_frame(&frame, -50);

        let table = h.scan_tab.lock();
        let (_, entry) = table.iter().next().expect("entry");
        assert_eq!(entry.channel, 3);
    }
}
