// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Authentication initiator: sends the odd-numbered frames of the handshake
//! and waits for the even-numbered replies.

use {
    super::*,
    crate::{fsm::StateMachine, ie},
    log::{debug, warn},
};

pub(crate) const AUTH_IDLE: usize = 0;
pub(crate) const AUTH_WAIT_SEQ2: usize = 1;
pub(crate) const AUTH_WAIT_SEQ4: usize = 2;
const AUTH_STATE_COUNT: usize = 3;

pub(crate) fn machine() -> StateMachine<Mlme> {
    let mut sm =
        StateMachine::new("auth", AUTH_STATE_COUNT, AUTH_MSG_COUNT, AUTH_MSG_BASE, AUTH_IDLE);
    sm.set_action(AUTH_IDLE, MT_MLME_AUTH_REQ, idle_on_auth_req);
    sm.set_action(AUTH_WAIT_SEQ2, MT_PEER_AUTH_EVEN, wait_seq2_on_even);
    sm.set_action(AUTH_WAIT_SEQ2, MT_AUTH_TIMEOUT, waiting_on_timeout);
    sm.set_action(AUTH_WAIT_SEQ4, MT_PEER_AUTH_EVEN, wait_seq4_on_even);
    sm.set_action(AUTH_WAIT_SEQ4, MT_AUTH_TIMEOUT, waiting_on_timeout);
    sm
}

fn target_bssid(mlme: &Mlme) -> Option<MacAddr> {
    mlme.aux.target.as_ref().map(|t| t.bssid)
}

fn send_odd(mlme: &mut Mlme, sequence: u16) {
    let bssid = match target_bssid(mlme) {
        Some(bssid) => bssid,
        None => return,
    };
    let challenge = if sequence == 3 { mlme.aux.challenge.clone() } else { None };
    let frame = mac::make_auth_frame(
        &bssid,
        &mlme.own_addr,
        &bssid,
        mlme.aux.auth_algorithm,
        sequence,
        mac::STATUS_SUCCESS,
        challenge.as_deref(),
    );
    mlme.send_frame(&frame);
}

fn arm_timer(mlme: &mut Mlme) {
    if let Some(id) = mlme.aux.auth_timer.take() {
        mlme.timers.cancel(id);
    }
    let now = mlme.now();
    mlme.aux.auth_timer =
        Some(mlme.timers.schedule(now, mlme.cfg.auth_timeout(), TimerEvent::AuthTimeout));
}

fn finish(mlme: &mut Mlme, status: u16) {
    if let Some(id) = mlme.aux.auth_timer.take() {
        mlme.timers.cancel(id);
    }
    mlme.aux.challenge = None;
    mlme.machines.auth.set_state(AUTH_IDLE);
    mlme.enqueue_local(MachineId::Cntl, MT_CNTL_AUTH_DONE, EventBody::Status(status));
}

/// A deauthentication from the target BSS while the handshake is pending
/// fails the sequence right away instead of riding out the retries.
pub(crate) fn abort_for_deauth(mlme: &mut Mlme, bssid: &MacAddr) {
    if mlme.machines.auth.state() == AUTH_IDLE {
        return;
    }
    if target_bssid(mlme).as_ref() != Some(bssid) {
        return;
    }
    debug!("deauthenticated by {:02x?} mid-handshake", bssid);
    finish(mlme, mac::STATUS_REFUSED);
}

fn idle_on_auth_req(mlme: &mut Mlme, _event: &Event) {
    if mlme.aux.target.is_none() {
        warn!("auth requested without a target");
        finish(mlme, mac::STATUS_REFUSED);
        return;
    }
    mlme.aux.auth_algorithm =
        mlme.aux.profile.map_or(mac::AUTH_ALG_OPEN, |p| p.auth_algorithm());
    mlme.aux.auth_retries = 0;
    send_odd(mlme, 1);
    arm_timer(mlme);
    mlme.machines.auth.set_state(AUTH_WAIT_SEQ2);
}

/// An even auth frame relevant to the pending handshake, or `None` to drop.
fn accept_even(mlme: &Mlme, event: &Event, sequence: u16) -> Option<(mac::AuthFields, Vec<u8>)> {
    let frame = match &event.body {
        EventBody::Frame(frame) => frame,
        _ => return None,
    };
    let (hdr, body) = mac::parse_mgmt_frame(frame).ok()?;
    if Some(hdr.addr3) != target_bssid(mlme) {
        return None;
    }
    let (fields, ies) = mac::parse_auth(body).ok()?;
    if fields.sequence != sequence || fields.algorithm != mlme.aux.auth_algorithm {
        return None;
    }
    Some((fields, ies.to_vec()))
}

fn wait_seq2_on_even(mlme: &mut Mlme, event: &Event) {
    let (fields, ies) = match accept_even(mlme, event, 2) {
        Some(accepted) => accepted,
        None => return,
    };
    if fields.status != mac::STATUS_SUCCESS {
        debug!("authentication refused, status {}", fields.status);
        finish(mlme, fields.status);
        return;
    }
    if fields.algorithm == mac::AUTH_ALG_OPEN {
        finish(mlme, mac::STATUS_SUCCESS);
        return;
    }
    // Shared key: echo the challenge back in sequence 3. The device encrypts
    // the frame with the WEP key; challenge verification is the AP's move.
    match ie::find(&ies, ie::IE_CHALLENGE) {
        Some(challenge) => {
            mlme.aux.challenge = Some(challenge.to_vec());
            mlme.aux.auth_retries = 0;
            send_odd(mlme, 3);
            arm_timer(mlme);
            mlme.machines.auth.set_state(AUTH_WAIT_SEQ4);
        }
        None => {
            warn!("shared-key sequence 2 without a challenge");
            finish(mlme, mac::STATUS_CHALLENGE_FAILURE);
        }
    }
}

fn wait_seq4_on_even(mlme: &mut Mlme, event: &Event) {
    let (fields, _) = match accept_even(mlme, event, 4) {
        Some(accepted) => accepted,
        None => return,
    };
    finish(mlme, fields.status);
}

/// No reply in time: retransmit the pending odd frame a bounded number of
/// times, then report a timeout.
fn waiting_on_timeout(mlme: &mut Mlme, _event: &Event) {
    mlme.aux.auth_timer = None;
    if mlme.aux.auth_retries < mlme.cfg.auth_retry_limit {
        mlme.aux.auth_retries += 1;
        let sequence = if mlme.machines.auth.state() == AUTH_WAIT_SEQ4 { 3 } else { 1 };
        debug!("auth retry {} (seq {})", mlme.aux.auth_retries, sequence);
        send_odd(mlme, sequence);
        arm_timer(mlme);
    } else {
        warn!("authentication timed out");
        finish(mlme, SEQ_STATUS_TIMEOUT);
    }
}
