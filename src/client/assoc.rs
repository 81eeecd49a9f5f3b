// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Association machine: (re)association requests toward the target BSS and
//! disassociation in both directions.

use {
    super::*,
    crate::{ie, fsm::StateMachine, quality::LinkHealth},
    log::{debug, info, warn},
};

pub(crate) const ASSOC_IDLE: usize = 0;
pub(crate) const ASSOC_WAIT_RSP: usize = 1;
pub(crate) const ASSOC_UP: usize = 2;
const ASSOC_STATE_COUNT: usize = 3;

const LISTEN_INTERVAL: u16 = 10;

pub(crate) fn machine() -> StateMachine<Mlme> {
    let mut sm =
        StateMachine::new("assoc", ASSOC_STATE_COUNT, ASSOC_MSG_COUNT, ASSOC_MSG_BASE, ASSOC_IDLE);
    sm.set_action(ASSOC_IDLE, MT_MLME_ASSOC_REQ, on_assoc_req);
    sm.set_action(ASSOC_WAIT_RSP, MT_PEER_ASSOC_RSP, wait_on_assoc_rsp);
    sm.set_action(ASSOC_WAIT_RSP, MT_ASSOC_TIMEOUT, wait_on_timeout);
    // Reassociation while up: roaming re-enters the handshake from here.
    sm.set_action(ASSOC_UP, MT_MLME_ASSOC_REQ, on_assoc_req);
    sm.set_action(ASSOC_UP, MT_MLME_DISASSOC_REQ, up_on_disassoc_req);
    sm.set_action(ASSOC_UP, MT_PEER_DISASSOC, up_on_peer_disassoc);
    sm
}

/// The security element to echo back in the association request, verbatim
/// from the target's advertisement.
fn security_ie(mlme: &Mlme, target: &crate::bss::BssEntry) -> Option<(u8, Vec<u8>)> {
    let profile = mlme.aux.profile?;
    let id = match profile {
        SecurityProfile::WpaPsk => ie::IE_VENDOR_SPECIFIC,
        SecurityProfile::Wpa2Psk | SecurityProfile::Wpa2Enterprise => ie::IE_RSN,
        SecurityProfile::WapiPsk => ie::IE_WAPI,
        SecurityProfile::Open | SecurityProfile::SharedWep => return None,
    };
    ie::find(&target.ies, id).map(|body| (id, body.to_vec()))
}

fn arm_timer(mlme: &mut Mlme) {
    if let Some(id) = mlme.aux.assoc_timer.take() {
        mlme.timers.cancel(id);
    }
    let now = mlme.now();
    mlme.aux.assoc_timer =
        Some(mlme.timers.schedule(now, mlme.cfg.assoc_timeout(), TimerEvent::AssocTimeout));
}

fn finish(mlme: &mut Mlme, status: u16) {
    if let Some(id) = mlme.aux.assoc_timer.take() {
        mlme.timers.cancel(id);
    }
    let next_state = if status == mac::STATUS_SUCCESS || mlme.link.is_some() {
        // Success, or a failed roam attempt with the old link still up.
        ASSOC_UP
    } else {
        ASSOC_IDLE
    };
    mlme.machines.assoc.set_state(next_state);
    mlme.enqueue_local(MachineId::Cntl, MT_CNTL_ASSOC_DONE, EventBody::Status(status));
}

fn send_assoc_req(mlme: &mut Mlme) -> bool {
    let target = match &mlme.aux.target {
        Some(target) => target.clone(),
        None => return false,
    };
    let mut capability = mac::CAP_ESS;
    if target.is_protected() {
        capability |= mac::CAP_PRIVACY;
    }
    let security = security_ie(mlme, &target);
    let ssid = if target.ssid.is_empty() { mlme.aux.desired.ssid.clone() } else { target.ssid };
    let frame = mac::make_assoc_req_frame(
        &target.bssid,
        &mlme.own_addr,
        capability,
        LISTEN_INTERVAL,
        &ssid,
        OWN_RATES,
        security.as_ref().map(|(id, body)| (*id, body.as_slice())),
    );
    mlme.send_frame(&frame);
    true
}

fn on_assoc_req(mlme: &mut Mlme, _event: &Event) {
    if !send_assoc_req(mlme) {
        warn!("association requested without a target");
        finish(mlme, mac::STATUS_REFUSED);
        return;
    }
    mlme.aux.assoc_retries = 0;
    arm_timer(mlme);
    mlme.machines.assoc.set_state(ASSOC_WAIT_RSP);
}

fn wait_on_assoc_rsp(mlme: &mut Mlme, event: &Event) {
    let frame = match &event.body {
        EventBody::Frame(frame) => frame,
        _ => return,
    };
    let (hdr, body) = match mac::parse_mgmt_frame(frame) {
        Ok(parsed) => parsed,
        Err(_) => return,
    };
    let target = match &mlme.aux.target {
        Some(target) if target.bssid == hdr.addr3 => target.clone(),
        _ => return,
    };
    let (fields, _ies) = match mac::parse_assoc_rsp(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("unparseable association response: {}", e);
            return;
        }
    };
    if fields.status != mac::STATUS_SUCCESS {
        info!("association refused by {:02x?}, status {}", target.bssid, fields.status);
        finish(mlme, fields.status);
        return;
    }

    let now = event.origin.timestamp;
    let ssid = if target.ssid.is_empty() { mlme.aux.desired.ssid.clone() } else { target.ssid.clone() };
    info!("associated with {:02x?} (aid {})", target.bssid, fields.aid);
    mlme.link = Some(Link {
        bssid: target.bssid,
        ssid: ssid.clone(),
        channel: target.channel,
        aid: fields.aid,
        rssi_dbm: event.origin.rssi_dbm,
        last_beacon: now,
        last_activity: now,
        health: LinkHealth::default(),
    });
    mlme.rate.reset(&target.rates);
    let rate = mlme.rate.current_100kbps();
    mlme.device.set_tx_rate(rate);
    {
        let mut status = mlme.status.lock();
        status.state = LinkStateTag::Associated;
        status.bssid = Some(target.bssid);
        status.ssid = ssid;
        status.channel = target.channel;
        status.rssi_dbm = event.origin.rssi_dbm;
    }
    finish(mlme, mac::STATUS_SUCCESS);
}

fn wait_on_timeout(mlme: &mut Mlme, _event: &Event) {
    mlme.aux.assoc_timer = None;
    if mlme.aux.assoc_retries < mlme.cfg.assoc_retry_limit {
        mlme.aux.assoc_retries += 1;
        debug!("assoc retry {}", mlme.aux.assoc_retries);
        send_assoc_req(mlme);
        arm_timer(mlme);
    } else {
        warn!("association timed out");
        finish(mlme, SEQ_STATUS_TIMEOUT);
    }
}

/// Local request to leave the BSS: tell the AP, then drop the link.
fn up_on_disassoc_req(mlme: &mut Mlme, event: &Event) {
    let reason = match event.body {
        EventBody::Status(reason) => reason,
        _ => mac::REASON_DISASSOC_STA_LEAVING,
    };
    if let Some(bssid) = mlme.link.as_ref().map(|link| link.bssid) {
        let own = mlme.own_addr;
        let frame = mac::make_disassoc_frame(&bssid, &own, &bssid, reason);
        mlme.send_frame(&frame);
    }
    mlme.link_down(reason);
}

fn up_on_peer_disassoc(mlme: &mut Mlme, event: &Event) {
    let frame = match &event.body {
        EventBody::Frame(frame) => frame,
        _ => return,
    };
    let (hdr, body) = match mac::parse_mgmt_frame(frame) {
        Ok(parsed) => parsed,
        Err(_) => return,
    };
    match &mlme.link {
        Some(link) if link.bssid == hdr.addr3 => {
            let reason = mac::parse_reason(body).unwrap_or(0);
            info!("disassociated by {:02x?}, reason {}", hdr.addr3, reason);
            mlme.link_down(reason);
        }
        _ => (),
    }
}
