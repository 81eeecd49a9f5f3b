// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Action frame intake. The station recognizes the standard categories but
//! currently acts on none of them; each handler notes the frame and moves on.
//! Out-of-range categories are classified to an explicit invalid message so
//! their arrival is still observable.

use {super::*, crate::fsm::StateMachine, log::debug};

pub(crate) const ACTION_IDLE: usize = 0;
const ACTION_STATE_COUNT: usize = 1;

pub const CATEGORY_SPECTRUM: u8 = 0;
pub const CATEGORY_QOS: u8 = 1;
pub const CATEGORY_DLS: u8 = 2;
pub const CATEGORY_BLOCK_ACK: u8 = 3;
pub const CATEGORY_PUBLIC: u8 = 4;
pub const CATEGORY_RADIO_MEASUREMENT: u8 = 5;
pub const CATEGORY_FAST_BSS: u8 = 6;
pub const CATEGORY_HT: u8 = 7;

pub(crate) fn machine() -> StateMachine<Mlme> {
    let mut sm = StateMachine::new(
        "action",
        ACTION_STATE_COUNT,
        ACTION_MSG_COUNT,
        ACTION_MSG_BASE,
        ACTION_IDLE,
    );
    for category in 0..=MAX_ACTION_CATEGORY {
        sm.set_action(ACTION_IDLE, ACTION_MSG_BASE + u16::from(category), on_action);
    }
    sm.set_action(ACTION_IDLE, MT_ACT_INVALID, on_invalid);
    sm
}

fn category_name(category: u8) -> &'static str {
    match category {
        CATEGORY_SPECTRUM => "spectrum management",
        CATEGORY_QOS => "qos",
        CATEGORY_DLS => "dls",
        CATEGORY_BLOCK_ACK => "block ack",
        CATEGORY_PUBLIC => "public",
        CATEGORY_RADIO_MEASUREMENT => "radio measurement",
        CATEGORY_FAST_BSS => "fast bss transition",
        CATEGORY_HT => "ht",
        _ => "unknown",
    }
}

fn on_action(_mlme: &mut Mlme, event: &Event) {
    let category = (event.msg - ACTION_MSG_BASE) as u8;
    debug!("{} action frame ignored", category_name(category));
}

fn on_invalid(_mlme: &mut Mlme, event: &Event) {
    if let EventBody::Frame(frame) = &event.body {
        if let Ok((hdr, body)) = mac::parse_mgmt_frame(frame) {
            debug!(
                "action frame with invalid category {:#x} from {:02x?}",
                body.first().copied().unwrap_or(0xff),
                hdr.addr2
            );
        }
    }
}
