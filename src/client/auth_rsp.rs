// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Authentication responder: answers odd-numbered auth frames from peers
//! (IBSS neighbors) and handles deauthentication from the serving AP.

use {
    super::*,
    crate::{fsm::StateMachine, ie},
    log::{debug, info},
    rand::RngCore,
};

pub(crate) const AUTH_RSP_IDLE: usize = 0;
pub(crate) const AUTH_RSP_WAIT_CHALLENGE: usize = 1;
const AUTH_RSP_STATE_COUNT: usize = 2;

const CHALLENGE_LEN: usize = 128;

pub(crate) fn machine() -> StateMachine<Mlme> {
    let mut sm = StateMachine::new(
        "auth-rsp",
        AUTH_RSP_STATE_COUNT,
        AUTH_RSP_MSG_COUNT,
        AUTH_RSP_MSG_BASE,
        AUTH_RSP_IDLE,
    );
    sm.set_action(AUTH_RSP_IDLE, MT_PEER_AUTH_ODD, idle_on_auth_odd);
    sm.set_action(AUTH_RSP_IDLE, MT_PEER_DEAUTH, on_deauth);
    sm.set_action(AUTH_RSP_WAIT_CHALLENGE, MT_PEER_AUTH_ODD, challenge_on_auth_odd);
    sm.set_action(AUTH_RSP_WAIT_CHALLENGE, MT_PEER_DEAUTH, on_deauth);
    sm
}

struct OddAuth {
    peer: MacAddr,
    fields: mac::AuthFields,
    ies: Vec<u8>,
}

fn parse_odd(event: &Event) -> Option<OddAuth> {
    let frame = match &event.body {
        EventBody::Frame(frame) => frame,
        _ => return None,
    };
    let (hdr, body) = mac::parse_mgmt_frame(frame).ok()?;
    let (fields, ies) = mac::parse_auth(body).ok()?;
    Some(OddAuth { peer: hdr.addr2, fields, ies: ies.to_vec() })
}

fn reply(mlme: &mut Mlme, peer: &MacAddr, algorithm: u16, sequence: u16, status: u16, challenge: Option<&[u8]>) {
    let own = mlme.own_addr;
    let frame = mac::make_auth_frame(peer, &own, &own, algorithm, sequence, status, challenge);
    mlme.send_frame(&frame);
}

fn idle_on_auth_odd(mlme: &mut Mlme, event: &Event) {
    let odd = match parse_odd(event) {
        Some(odd) => odd,
        None => return,
    };
    if odd.fields.sequence != 1 {
        return;
    }
    match odd.fields.algorithm {
        mac::AUTH_ALG_OPEN => {
            debug!("open auth from peer {:02x?}", odd.peer);
            reply(mlme, &odd.peer, mac::AUTH_ALG_OPEN, 2, mac::STATUS_SUCCESS, None);
        }
        mac::AUTH_ALG_SHARED => {
            let mut challenge = vec![0u8; CHALLENGE_LEN];
            rand::thread_rng().fill_bytes(&mut challenge);
            reply(mlme, &odd.peer, mac::AUTH_ALG_SHARED, 2, mac::STATUS_SUCCESS, Some(&challenge));
            mlme.aux.challenge = Some(challenge);
            mlme.machines.auth_rsp.set_state(AUTH_RSP_WAIT_CHALLENGE);
        }
        other => {
            debug!("auth with unsupported algorithm {} from {:02x?}", other, odd.peer);
            reply(mlme, &odd.peer, other, 2, mac::STATUS_REFUSED, None);
        }
    }
}

fn challenge_on_auth_odd(mlme: &mut Mlme, event: &Event) {
    let odd = match parse_odd(event) {
        Some(odd) => odd,
        None => return,
    };
    match odd.fields.sequence {
        // A fresh sequence 1 restarts the exchange.
        1 => {
            mlme.aux.challenge = None;
            mlme.machines.auth_rsp.set_state(AUTH_RSP_IDLE);
            idle_on_auth_odd(mlme, event);
        }
        3 => {
            let expected = mlme.aux.challenge.take();
            let echoed = ie::find(&odd.ies, ie::IE_CHALLENGE);
            let status = match (expected, echoed) {
                (Some(expected), Some(echoed)) if expected == echoed => mac::STATUS_SUCCESS,
                _ => mac::STATUS_CHALLENGE_FAILURE,
            };
            reply(mlme, &odd.peer, mac::AUTH_ALG_SHARED, 4, status, None);
            mlme.machines.auth_rsp.set_state(AUTH_RSP_IDLE);
        }
        _ => (),
    }
}

/// Deauthentication. From the serving AP this kills the link; from anyone
/// else it is noted and dropped.
fn on_deauth(mlme: &mut Mlme, event: &Event) {
    let frame = match &event.body {
        EventBody::Frame(frame) => frame,
        _ => return,
    };
    let (hdr, body) = match mac::parse_mgmt_frame(frame) {
        Ok(parsed) => parsed,
        Err(_) => return,
    };
    let reason = mac::parse_reason(body).unwrap_or(0);
    match &mlme.link {
        Some(link) if link.bssid == hdr.addr3 => {
            info!("deauthenticated by {:02x?}, reason {}", hdr.addr3, reason);
            mlme.link_down(reason);
        }
        _ => {
            // Mid-handshake the target is not the serving AP yet; a deauth
            // from it still ends the attempt.
            auth::abort_for_deauth(mlme, &hdr.addr3);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    const PEER: MacAddr = [9; 6];
    const AP: MacAddr = [5; 6];

    fn peer_auth(seq: u16, alg: u16, challenge: Option<&[u8]>) -> Vec<u8> {
        mac::make_auth_frame(&STA_ADDR, &PEER, &PEER, alg, seq, mac::STATUS_SUCCESS, challenge)
    }

    fn sent_auth(h: &mut TestHelper) -> (mac::AuthFields, Vec<u8>) {
        let sent = h.device.take_sent();
        assert_eq!(sent.len(), 1);
        let (hdr, body) = mac::parse_mgmt_frame(&sent[0]).expect("mgmt frame");
        assert_eq!(hdr.addr1, PEER);
        let (fields, ies) = mac::parse_auth(body).expect("auth body");
        (fields, ies.to_vec())
    }

    #[test]
    fn open_seq1_answered_with_success() {
        let mut h = TestHelper::new();
        h.recv_frame(&peer_auth(1, mac::AUTH_ALG_OPEN, None), -50);
        let (fields, _) = sent_auth(&mut h);
        assert_eq!(fields.sequence, 2);
        assert_eq!(fields.status, mac::STATUS_SUCCESS);
        assert_eq!(h.mlme.machines.auth_rsp.state(), AUTH_RSP_IDLE);
    }

    #[test]
    fn shared_key_round_trip() {
        let mut h = TestHelper::new();
        h.recv_frame(&peer_auth(1, mac::AUTH_ALG_SHARED, None), -50);
        let (fields, ies) = sent_auth(&mut h);
        assert_eq!(fields.sequence, 2);
        let challenge = crate::ie::find(&ies, crate::ie::IE_CHALLENGE).expect("challenge").to_vec();
        assert_eq!(challenge.len(), CHALLENGE_LEN);
        assert_eq!(h.mlme.machines.auth_rsp.state(), AUTH_RSP_WAIT_CHALLENGE);

        h.recv_frame(&peer_auth(3, mac::AUTH_ALG_SHARED, Some(&challenge)), -50);
        let (fields, _) = sent_auth(&mut h);
        assert_eq!(fields.sequence, 4);
        assert_eq!(fields.status, mac::STATUS_SUCCESS);
        assert_eq!(h.mlme.machines.auth_rsp.state(), AUTH_RSP_IDLE);
    }

    #[test]
    fn wrong_challenge_refused() {
        let mut h = TestHelper::new();
        h.recv_frame(&peer_auth(1, mac::AUTH_ALG_SHARED, None), -50);
        h.device.take_sent();
        h.recv_frame(&peer_auth(3, mac::AUTH_ALG_SHARED, Some(b"not the challenge")), -50);
        let (fields, _) = sent_auth(&mut h);
        assert_eq!(fields.sequence, 4);
        assert_eq!(fields.status, mac::STATUS_CHALLENGE_FAILURE);
    }

    #[test]
    fn unsupported_algorithm_refused() {
        let mut h = TestHelper::new();
        h.recv_frame(&peer_auth(1, 77, None), -50);
        let (fields, _) = sent_auth(&mut h);
        assert_eq!(fields.sequence, 2);
        assert_eq!(fields.status, mac::STATUS_REFUSED);
    }

    #[test]
    fn deauth_from_serving_ap_downs_the_link() {
        let mut h = TestHelper::new();
        h.associate(AP, b"net", 6);
        h.take_cntl_msgs();

        h.recv_frame(&mac::make_deauth_frame(&STA_ADDR, &AP, &AP, 3), -50);
        assert!(h.mlme.link.is_none());
        assert_eq!(h.status.lock().state, LinkStateTag::Idle);
        assert_eq!(h.last_cntl_status(MT_CNTL_LINK_DOWN), Some(3));
    }

    #[test]
    fn deauth_from_stranger_ignored() {
        let mut h = TestHelper::new();
        h.associate(AP, b"net", 6);
        h.recv_frame(&mac::make_deauth_frame(&STA_ADDR, &[9; 6], &[9; 6], 3), -50);
        assert!(h.mlme.link.is_some());
    }
}
