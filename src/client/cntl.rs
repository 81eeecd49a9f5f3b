// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Control machine: owns the connect/roam/disconnect sequences and strings
//! the scan, auth, and assoc machines together.

use {
    super::*,
    crate::{bss::Desired, fsm::StateMachine},
    log::{debug, info, warn},
};

pub(crate) const CNTL_IDLE: usize = 0;
pub(crate) const CNTL_WAIT_SCAN: usize = 1;
pub(crate) const CNTL_WAIT_AUTH: usize = 2;
pub(crate) const CNTL_WAIT_ASSOC: usize = 3;
const CNTL_STATE_COUNT: usize = 4;

pub(crate) fn machine() -> StateMachine<Mlme> {
    let mut sm =
        StateMachine::new("cntl", CNTL_STATE_COUNT, CNTL_MSG_COUNT, CNTL_MSG_BASE, CNTL_IDLE);
    sm.set_action(CNTL_IDLE, MT_CNTL_CONNECT_REQ, idle_on_connect);
    sm.set_action(CNTL_IDLE, MT_CNTL_ROAM_REQ, idle_on_roam);
    sm.set_action(CNTL_IDLE, MT_CNTL_LINK_DOWN, idle_on_link_down);
    sm.set_action(CNTL_WAIT_SCAN, MT_CNTL_SCAN_DONE, wait_scan_on_done);
    sm.set_action(CNTL_WAIT_AUTH, MT_CNTL_AUTH_DONE, wait_auth_on_done);
    sm.set_action(CNTL_WAIT_ASSOC, MT_CNTL_ASSOC_DONE, wait_assoc_on_done);
    for state in [CNTL_IDLE, CNTL_WAIT_SCAN, CNTL_WAIT_AUTH, CNTL_WAIT_ASSOC] {
        sm.set_action(state, MT_CNTL_DISCONNECT_REQ, on_disconnect);
    }
    sm
}

fn finish_connect(mlme: &mut Mlme, result: ConnectResult) {
    mlme.aux.target = None;
    mlme.machines.cntl.set_state(CNTL_IDLE);
    mlme.report_connect_result(result);
}

/// Drop an existing association quietly in favor of a new connect request.
fn drop_current_link(mlme: &mut Mlme) {
    if let Some(bssid) = mlme.link.as_ref().map(|link| link.bssid) {
        let own = mlme.own_addr;
        let frame = mac::make_deauth_frame(&bssid, &own, &bssid, mac::REASON_DEAUTH_LEAVING);
        mlme.send_frame(&frame);
        mlme.link = None;
        mlme.machines.assoc.set_state(assoc::ASSOC_IDLE);
        mlme.machines.auth.set_state(auth::AUTH_IDLE);
    }
}

fn idle_on_connect(mlme: &mut Mlme, event: &Event) {
    let req = match &event.body {
        EventBody::Connect(req) => req.clone(),
        _ => return,
    };
    info!("connect request: ssid {:?}, pinned bssid {:02x?}", req.ssid, req.bssid);
    drop_current_link(mlme);
    mlme.aux.desired = Desired { ssid: req.ssid.clone(), bssid: req.bssid };
    mlme.aux.profile = Some(req.profile);
    mlme.aux.reconnect = Some(req.clone());
    mlme.aux.auto_reconnect = true;
    {
        let mut status = mlme.status.lock();
        status.ssid = req.ssid.clone();
        status.last_connect = None;
    }
    mlme.enqueue_local(
        MachineId::Sync,
        MT_MLME_SCAN_REQ,
        EventBody::Scan(ScanRequest {
            ssid: req.ssid,
            scan_type: ScanType::Active,
            channels: Vec::new(),
        }),
    );
    mlme.set_link_state(LinkStateTag::Scanning);
    mlme.machines.cntl.set_state(CNTL_WAIT_SCAN);
}

/// Pick the join target from the scan results and start authentication.
fn wait_scan_on_done(mlme: &mut Mlme, _event: &Event) {
    let profile = match mlme.aux.profile {
        Some(profile) => profile,
        None => {
            finish_connect(mlme, ConnectResult::Rejected);
            return;
        }
    };
    let picked = {
        let table = mlme.scan_tab.lock();
        match mlme.aux.desired.bssid {
            Some(bssid) => table
                .find_best(&[], Some(&bssid))
                .and_then(|index| table.get(index))
                .map(|e| (e.clone(), profile.matches(e))),
            None => table
                .iter()
                .filter(|(_, e)| e.ssid == mlme.aux.desired.ssid && profile.matches(e))
                .max_by_key(|(_, e)| e.rssi_dbm)
                .map(|(_, e)| (e.clone(), true)),
        }
    };
    match picked {
        None => {
            debug!("no candidate found for {:?}", mlme.aux.desired.ssid);
            finish_connect(mlme, ConnectResult::Timeout);
        }
        Some((_, false)) => {
            // The pinned BSS advertises suites the profile cannot use.
            warn!("pinned BSS does not match the security profile");
            finish_connect(mlme, ConnectResult::Rejected);
        }
        Some((entry, true)) => {
            debug!("joining {:02x?} on channel {} ({} dBm)", entry.bssid, entry.channel, entry.rssi_dbm);
            mlme.tune(entry.channel);
            mlme.aux.target = Some(entry);
            mlme.enqueue_local(MachineId::Auth, MT_MLME_AUTH_REQ, EventBody::None);
            mlme.set_link_state(LinkStateTag::Authenticating);
            mlme.machines.cntl.set_state(CNTL_WAIT_AUTH);
        }
    }
}

fn wait_auth_on_done(mlme: &mut Mlme, event: &Event) {
    let status = match event.body {
        EventBody::Status(status) => status,
        _ => return,
    };
    match status {
        mac::STATUS_SUCCESS => {
            mlme.enqueue_local(MachineId::Assoc, MT_MLME_ASSOC_REQ, EventBody::None);
            mlme.set_link_state(LinkStateTag::Associating);
            mlme.machines.cntl.set_state(CNTL_WAIT_ASSOC);
        }
        SEQ_STATUS_TIMEOUT => finish_sequence_failure(mlme, ConnectResult::Timeout),
        _ => finish_sequence_failure(mlme, ConnectResult::Rejected),
    }
}

fn wait_assoc_on_done(mlme: &mut Mlme, event: &Event) {
    let status = match event.body {
        EventBody::Status(status) => status,
        _ => return,
    };
    match status {
        mac::STATUS_SUCCESS => {
            mlme.machines.cntl.set_state(CNTL_IDLE);
            mlme.report_connect_result(ConnectResult::Success);
        }
        SEQ_STATUS_TIMEOUT => finish_sequence_failure(mlme, ConnectResult::Timeout),
        _ => finish_sequence_failure(mlme, ConnectResult::Rejected),
    }
}

/// A sub-sequence failed. During a roam the previous link is still up; keep
/// it and swallow the failure. During an initial connect, report it.
fn finish_sequence_failure(mlme: &mut Mlme, result: ConnectResult) {
    if let Some(channel) = mlme.link.as_ref().map(|link| link.channel) {
        warn!("roam attempt failed ({:?}); staying with the current AP", result);
        mlme.tune(channel);
        mlme.aux.target = None;
        mlme.machines.cntl.set_state(CNTL_IDLE);
        mlme.set_link_state(LinkStateTag::Associated);
    } else {
        finish_connect(mlme, result);
    }
}

/// Roam to a specific candidate without tearing the current link down first.
fn idle_on_roam(mlme: &mut Mlme, event: &Event) {
    let bssid = match event.body {
        EventBody::Roam(bssid) => bssid,
        _ => return,
    };
    let entry = {
        let table = mlme.scan_tab.lock();
        table.find_best(&[], Some(&bssid)).and_then(|index| table.get(index)).map(BssEntry::clone)
    };
    let entry = match entry {
        Some(entry) => entry,
        None => {
            debug!("roam candidate {:02x?} no longer in the table", bssid);
            return;
        }
    };
    if !mlme.aux.profile.map_or(false, |p| p.matches(&entry)) {
        return;
    }
    info!("roaming to {:02x?} on channel {}", entry.bssid, entry.channel);
    mlme.tune(entry.channel);
    mlme.aux.target = Some(entry);
    mlme.enqueue_local(MachineId::Auth, MT_MLME_AUTH_REQ, EventBody::None);
    mlme.machines.cntl.set_state(CNTL_WAIT_AUTH);
}

/// The association died underneath us. Reconnection is driven from here for
/// the immediate attempt and by the periodic executor for later retries.
fn idle_on_link_down(mlme: &mut Mlme, event: &Event) {
    let reason = match event.body {
        EventBody::Status(reason) => reason,
        _ => 0,
    };
    debug!("link down (reason {}), auto-reconnect {}", reason, mlme.aux.auto_reconnect);
    if !mlme.aux.auto_reconnect {
        return;
    }
    if let Some(req) = mlme.aux.reconnect.clone() {
        mlme.aux.last_reconnect = Some(mlme.now());
        mlme.enqueue_local(MachineId::Cntl, MT_CNTL_CONNECT_REQ, EventBody::Connect(req));
    }
}

/// Caller-initiated disconnect: kill any sequence in flight, tell the AP,
/// and stay down.
fn on_disconnect(mlme: &mut Mlme, _event: &Event) {
    let was_connecting =
        mlme.machines.cntl.state() != CNTL_IDLE && mlme.status.lock().last_connect.is_none();
    mlme.aux.auto_reconnect = false;
    mlme.aux.reconnect = None;
    mlme.aux.target = None;
    mlme.cancel_handshake_timers();
    if let Some(scan) = mlme.aux.scan.take() {
        mlme.timers.cancel(scan.dwell_timer);
        mlme.machines.sync.set_state(sync::SYNC_IDLE);
    }
    drop_current_link(mlme);
    // A handshake may be in flight with no link yet; those machines must
    // come back to rest too.
    mlme.machines.auth.set_state(auth::AUTH_IDLE);
    mlme.machines.assoc.set_state(assoc::ASSOC_IDLE);
    mlme.machines.cntl.set_state(CNTL_IDLE);
    {
        let mut status = mlme.status.lock();
        status.state = LinkStateTag::Idle;
        status.bssid = None;
        status.channel_quality = 0;
        if was_connecting {
            status.last_connect = Some(ConnectResult::Canceled);
        }
    }
    info!("disconnected");
}
