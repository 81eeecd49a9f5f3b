// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Station-mode MLME: the context shared by all state machines, message
//! numbering, frame-to-machine classification, and the event loop.

pub mod action;
pub mod assoc;
pub mod auth;
pub mod auth_rsp;
pub mod cntl;
mod periodic;
pub mod sync;

use {
    crate::{
        antenna::AntennaDiversity,
        bss::{BssEntry, BssTable, Desired},
        config::Config,
        device::Device,
        fsm::StateMachine,
        ie::security::AuthMode,
        mac::{self, FrameParseError, MacAddr},
        quality::LinkHealth,
        queue::{AdmissionClass, Event, EventBody, EventQueue, MachineId, Origin},
        rate::RateControl,
        timer::{Clock, EventId, TimerQueue},
    },
    log::{debug, warn},
    parking_lot::Mutex,
    std::{
        sync::Arc,
        time::{Duration, Instant},
    },
};

// Message numbering. Each machine owns a contiguous range; the bases leave
// room to grow without renumbering.
pub const SYNC_MSG_BASE: u16 = 0;
pub const MT_MLME_SCAN_REQ: u16 = SYNC_MSG_BASE;
pub const MT_PEER_BEACON: u16 = SYNC_MSG_BASE + 1;
pub const MT_PEER_PROBE_RSP: u16 = SYNC_MSG_BASE + 2;
pub const MT_SCAN_DWELL: u16 = SYNC_MSG_BASE + 3;
pub(crate) const SYNC_MSG_COUNT: usize = 4;

pub const AUTH_MSG_BASE: u16 = 16;
pub const MT_MLME_AUTH_REQ: u16 = AUTH_MSG_BASE;
pub const MT_PEER_AUTH_EVEN: u16 = AUTH_MSG_BASE + 1;
pub const MT_AUTH_TIMEOUT: u16 = AUTH_MSG_BASE + 2;
pub(crate) const AUTH_MSG_COUNT: usize = 3;

pub const AUTH_RSP_MSG_BASE: u16 = 32;
pub const MT_PEER_AUTH_ODD: u16 = AUTH_RSP_MSG_BASE;
pub const MT_PEER_DEAUTH: u16 = AUTH_RSP_MSG_BASE + 1;
pub(crate) const AUTH_RSP_MSG_COUNT: usize = 2;

pub const ASSOC_MSG_BASE: u16 = 48;
pub const MT_MLME_ASSOC_REQ: u16 = ASSOC_MSG_BASE;
pub const MT_MLME_DISASSOC_REQ: u16 = ASSOC_MSG_BASE + 1;
pub const MT_PEER_ASSOC_RSP: u16 = ASSOC_MSG_BASE + 2;
pub const MT_PEER_DISASSOC: u16 = ASSOC_MSG_BASE + 3;
pub const MT_ASSOC_TIMEOUT: u16 = ASSOC_MSG_BASE + 4;
pub(crate) const ASSOC_MSG_COUNT: usize = 5;

pub const CNTL_MSG_BASE: u16 = 64;
pub const MT_CNTL_CONNECT_REQ: u16 = CNTL_MSG_BASE;
pub const MT_CNTL_DISCONNECT_REQ: u16 = CNTL_MSG_BASE + 1;
pub const MT_CNTL_SCAN_DONE: u16 = CNTL_MSG_BASE + 2;
pub const MT_CNTL_AUTH_DONE: u16 = CNTL_MSG_BASE + 3;
pub const MT_CNTL_ASSOC_DONE: u16 = CNTL_MSG_BASE + 4;
pub const MT_CNTL_LINK_DOWN: u16 = CNTL_MSG_BASE + 5;
pub const MT_CNTL_ROAM_REQ: u16 = CNTL_MSG_BASE + 6;
pub(crate) const CNTL_MSG_COUNT: usize = 7;

pub const ACTION_MSG_BASE: u16 = 80;
/// Highest action category the station understands.
pub const MAX_ACTION_CATEGORY: u8 = 7;
pub const MT_ACT_INVALID: u16 = ACTION_MSG_BASE + MAX_ACTION_CATEGORY as u16 + 1;
pub(crate) const ACTION_MSG_COUNT: usize = MAX_ACTION_CATEGORY as usize + 2;

/// Status a sub-sequence reports to the control machine when it gave up
/// waiting rather than being refused.
pub(crate) const SEQ_STATUS_TIMEOUT: u16 = 0xffff;

/// Rates this station supports, as supported-rates IE bytes (1, 2, 5.5, 11,
/// 6, 9, 12, 18, 24, 36, 48, 54 Mb/s; 802.11b rates marked basic).
pub(crate) const OWN_RATES: &[u8] =
    &[0x82, 0x84, 0x8b, 0x96, 0x0c, 0x12, 0x18, 0x24, 0x30, 0x48, 0x60, 0x6c];

pub(crate) const DEFAULT_SCAN_CHANNELS: &[u8] =
    &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 36, 40, 44, 48];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Active,
    Passive,
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Empty SSID scans for everything (wildcard probe).
    pub ssid: Vec<u8>,
    pub scan_type: ScanType,
    /// Empty channel list means the default channel set.
    pub channels: Vec<u8>,
}

impl ScanRequest {
    pub fn wildcard() -> Self {
        ScanRequest { ssid: Vec::new(), scan_type: ScanType::Active, channels: Vec::new() }
    }
}

/// Credential shape the caller intends to use. Candidate BSSs whose
/// advertised suites don't match are never joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityProfile {
    Open,
    SharedWep,
    WpaPsk,
    Wpa2Psk,
    Wpa2Enterprise,
    WapiPsk,
}

impl SecurityProfile {
    pub(crate) fn matches(&self, bss: &BssEntry) -> bool {
        let desc = &bss.security;
        match self {
            SecurityProfile::Open => !bss.is_protected() && desc.is_open(),
            // WEP networks set the privacy bit but carry no security element.
            SecurityProfile::SharedWep => bss.is_protected() && desc.is_open(),
            SecurityProfile::WpaPsk => {
                desc.auth_mode == AuthMode::WpaPsk || desc.auth_mode_aux == Some(AuthMode::WpaPsk)
            }
            SecurityProfile::Wpa2Psk => {
                desc.auth_mode == AuthMode::Wpa2Psk
                    || desc.auth_mode_aux == Some(AuthMode::Wpa2Psk)
            }
            SecurityProfile::Wpa2Enterprise => {
                desc.auth_mode == AuthMode::Wpa2 || desc.auth_mode_aux == Some(AuthMode::Wpa2)
            }
            SecurityProfile::WapiPsk => desc.auth_mode == AuthMode::WapiPsk,
        }
    }

    pub(crate) fn auth_algorithm(&self) -> u16 {
        match self {
            SecurityProfile::SharedWep => mac::AUTH_ALG_SHARED,
            _ => mac::AUTH_ALG_OPEN,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub ssid: Vec<u8>,
    /// Pin the connection to one BSSID instead of picking by signal.
    pub bssid: Option<MacAddr>,
    pub profile: SecurityProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectResult {
    Success,
    /// No response (or no matching network found) within the deadline.
    Timeout,
    /// The network said no.
    Rejected,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStateTag {
    Idle,
    Scanning,
    Authenticating,
    Associating,
    Associated,
}

impl Default for LinkStateTag {
    fn default() -> Self {
        LinkStateTag::Idle
    }
}

/// Snapshot of the station's state, readable from any thread.
#[derive(Debug, Clone, Default)]
pub struct LinkStatus {
    pub state: LinkStateTag,
    pub bssid: Option<MacAddr>,
    pub ssid: Vec<u8>,
    pub channel: u8,
    pub rssi_dbm: i8,
    pub channel_quality: u8,
    pub last_connect: Option<ConnectResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    FastTick,
    ScanDwell,
    AuthTimeout,
    AssocTimeout,
    AntennaEval,
}

/// In-progress scan bookkeeping.
pub(crate) struct ScanState {
    pub req: ScanRequest,
    pub channels: Vec<u8>,
    pub cursor: usize,
    pub dwell_timer: EventId,
}

/// Scratch state shared between machines during a connect sequence.
#[derive(Default)]
pub(crate) struct Aux {
    pub desired: Desired,
    pub profile: Option<SecurityProfile>,
    /// Network to return to after a link loss.
    pub reconnect: Option<ConnectRequest>,
    pub auto_reconnect: bool,
    pub last_reconnect: Option<Instant>,
    pub target: Option<BssEntry>,
    pub auth_algorithm: u16,
    pub auth_retries: u8,
    pub assoc_retries: u8,
    pub auth_timer: Option<EventId>,
    pub assoc_timer: Option<EventId>,
    pub challenge: Option<Vec<u8>>,
    pub scan: Option<ScanState>,
    pub last_scan: Option<Instant>,
}

/// The live association.
pub(crate) struct Link {
    pub bssid: MacAddr,
    pub ssid: Vec<u8>,
    pub channel: u8,
    pub aid: u16,
    pub rssi_dbm: i8,
    pub last_beacon: Instant,
    pub last_activity: Instant,
    /// One-second stats window for channel quality.
    pub health: LinkHealth,
}

pub(crate) struct Machines {
    pub sync: StateMachine<Mlme>,
    pub auth: StateMachine<Mlme>,
    pub auth_rsp: StateMachine<Mlme>,
    pub assoc: StateMachine<Mlme>,
    pub cntl: StateMachine<Mlme>,
    pub action: StateMachine<Mlme>,
}

impl Machines {
    fn new() -> Self {
        Machines {
            sync: sync::machine(),
            auth: auth::machine(),
            auth_rsp: auth_rsp::machine(),
            assoc: assoc::machine(),
            cntl: cntl::machine(),
            action: action::machine(),
        }
    }

    fn get(&self, id: MachineId) -> &StateMachine<Mlme> {
        match id {
            MachineId::Sync => &self.sync,
            MachineId::Auth => &self.auth,
            MachineId::AuthRsp => &self.auth_rsp,
            MachineId::Assoc => &self.assoc,
            MachineId::Cntl => &self.cntl,
            MachineId::Action => &self.action,
        }
    }

    pub(crate) fn reset_all(&mut self) {
        self.sync.set_state(sync::SYNC_IDLE);
        self.auth.set_state(auth::AUTH_IDLE);
        self.auth_rsp.set_state(auth_rsp::AUTH_RSP_IDLE);
        self.assoc.set_state(assoc::ASSOC_IDLE);
        self.cntl.set_state(cntl::CNTL_IDLE);
        self.action.set_state(action::ACTION_IDLE);
    }
}

/// Per-tick bookkeeping of the periodic executor.
#[derive(Default)]
pub(crate) struct Periodic {
    pub fast_round: u64,
    pub one_sec_round: u64,
    /// Stats window for rate adaptation, reset on its own cadence.
    pub rate_window: LinkHealth,
}

pub struct Mlme {
    pub(crate) cfg: Config,
    pub(crate) own_addr: MacAddr,
    pub(crate) device: Box<dyn Device>,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) queue: Arc<EventQueue>,
    pub(crate) scan_tab: Arc<Mutex<BssTable>>,
    pub(crate) status: Arc<Mutex<LinkStatus>>,
    pub(crate) timers: TimerQueue<TimerEvent>,
    pub(crate) machines: Machines,
    pub(crate) aux: Aux,
    pub(crate) link: Option<Link>,
    pub(crate) periodic: Periodic,
    pub(crate) rate: RateControl,
    pub(crate) antenna: AntennaDiversity,
    /// Channel the radio is currently tuned to.
    pub(crate) current_channel: u8,
}

impl Mlme {
    pub fn new(
        cfg: Config,
        own_addr: MacAddr,
        device: Box<dyn Device>,
        clock: Box<dyn Clock>,
        queue: Arc<EventQueue>,
        scan_tab: Arc<Mutex<BssTable>>,
        status: Arc<Mutex<LinkStatus>>,
    ) -> Self {
        Mlme {
            cfg,
            own_addr,
            device,
            clock,
            queue,
            scan_tab,
            status,
            timers: TimerQueue::new(),
            machines: Machines::new(),
            aux: Aux::default(),
            link: None,
            periodic: Periodic::default(),
            rate: RateControl::new(),
            antenna: AntennaDiversity::new(0, 1),
            current_channel: 1,
        }
    }

    pub(crate) fn tune(&mut self, channel: u8) {
        self.device.set_channel(channel);
        self.current_channel = channel;
    }

    /// Route a received management frame to its machine and message. Frames
    /// we have no business handling are rejected here, before admission.
    pub fn classify_frame(frame: &[u8]) -> Result<(MachineId, u16), FrameParseError> {
        let (hdr, body) = mac::parse_mgmt_frame(frame)?;
        match hdr.frame_subtype() {
            mac::MGMT_SUBTYPE_BEACON => Ok((MachineId::Sync, MT_PEER_BEACON)),
            mac::MGMT_SUBTYPE_PROBE_RSP => Ok((MachineId::Sync, MT_PEER_PROBE_RSP)),
            mac::MGMT_SUBTYPE_ASSOC_RSP | mac::MGMT_SUBTYPE_REASSOC_RSP => {
                Ok((MachineId::Assoc, MT_PEER_ASSOC_RSP))
            }
            mac::MGMT_SUBTYPE_DISASSOC => Ok((MachineId::Assoc, MT_PEER_DISASSOC)),
            mac::MGMT_SUBTYPE_DEAUTH => Ok((MachineId::AuthRsp, MT_PEER_DEAUTH)),
            mac::MGMT_SUBTYPE_AUTH => {
                let (fields, _) = mac::parse_auth(body)?;
                match fields.sequence {
                    // Odd sequence numbers belong to the responder role, even
                    // ones to the initiator.
                    1 | 3 => Ok((MachineId::AuthRsp, MT_PEER_AUTH_ODD)),
                    2 | 4 => Ok((MachineId::Auth, MT_PEER_AUTH_EVEN)),
                    other => Err(FrameParseError::BadAuthSequence(other)),
                }
            }
            mac::MGMT_SUBTYPE_ACTION => {
                // The MSB of the category flags "no ack"; mask it off.
                let category = body.first().copied().unwrap_or(0xff) & 0x7f;
                if category > MAX_ACTION_CATEGORY {
                    Ok((MachineId::Action, MT_ACT_INVALID))
                } else {
                    Ok((MachineId::Action, ACTION_MSG_BASE + u16::from(category)))
                }
            }
            _ => Err(FrameParseError::UnsupportedType),
        }
    }

    /// Look up and run the handler for one event. Total: unknown (state, msg)
    /// pairs fall through to the no-op default.
    pub fn dispatch(&mut self, event: &Event) {
        let handler = self.machines.get(event.machine).lookup(event.msg);
        handler(self, event);
    }

    /// The consumer loop: fire due timers, then drain the queue, until the
    /// queue is closed.
    pub fn run(&mut self) {
        let now = self.clock.now();
        self.timers.schedule(now, self.cfg.fast_tick(), TimerEvent::FastTick);
        while !self.queue.is_closed() {
            let now = self.clock.now();
            while let Some((_, timer_event)) = self.timers.pop_due(now) {
                self.handle_timeout(timer_event);
            }
            let now = self.clock.now();
            let wait = self
                .timers
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(now))
                .unwrap_or_else(|| Duration::from_millis(100))
                .max(Duration::from_millis(1));
            if let Some(event) = self.queue.dequeue_timeout(wait) {
                self.dispatch(&event);
                while let Some(event) = self.queue.try_dequeue() {
                    self.dispatch(&event);
                }
            }
        }
        self.teardown();
    }

    /// Timer firings re-enter the machines through the queue, never from a
    /// callback context. The periodic ticks are handled inline since they
    /// address no machine.
    pub fn handle_timeout(&mut self, timer_event: TimerEvent) {
        match timer_event {
            TimerEvent::FastTick => {
                self.on_fast_tick();
                let now = self.clock.now();
                self.timers.schedule(now, self.cfg.fast_tick(), TimerEvent::FastTick);
            }
            TimerEvent::AntennaEval => {
                self.antenna.finish_eval(self.device.as_mut());
            }
            TimerEvent::ScanDwell => self.enqueue_timer_msg(MachineId::Sync, MT_SCAN_DWELL),
            TimerEvent::AuthTimeout => self.enqueue_timer_msg(MachineId::Auth, MT_AUTH_TIMEOUT),
            TimerEvent::AssocTimeout => self.enqueue_timer_msg(MachineId::Assoc, MT_ASSOC_TIMEOUT),
        }
    }

    fn enqueue_timer_msg(&self, machine: MachineId, msg: u16) {
        let event = Event {
            machine,
            msg,
            class: AdmissionClass::Receive,
            origin: Origin::local(self.clock.now()),
            body: EventBody::None,
        };
        if let Err(e) = self.queue.enqueue(event) {
            warn!("dropping timer message {:#x}: {}", msg, e);
        }
    }

    /// Enqueue a locally originated message for another machine. Send-class:
    /// shed first under congestion.
    pub(crate) fn enqueue_local(&self, machine: MachineId, msg: u16, body: EventBody) {
        let event = Event {
            machine,
            msg,
            class: AdmissionClass::Send,
            origin: Origin::local(self.clock.now()),
            body,
        };
        if let Err(e) = self.queue.enqueue(event) {
            warn!("dropping local message {:#x} for {:?}: {}", msg, machine, e);
        }
    }

    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }

    pub(crate) fn send_frame(&mut self, frame: &[u8]) {
        if let Err(e) = self.device.send_mgmt_frame(frame) {
            warn!("frame transmission failed: {}", e);
        }
    }

    pub(crate) fn set_link_state(&self, state: LinkStateTag) {
        self.status.lock().state = state;
    }

    pub(crate) fn report_connect_result(&self, result: ConnectResult) {
        debug!("connect result: {:?}", result);
        let mut status = self.status.lock();
        status.last_connect = Some(result);
        if result != ConnectResult::Success {
            status.state = LinkStateTag::Idle;
            status.bssid = None;
        }
    }

    /// Tear the association down locally (no frame to the peer) and notify
    /// the control machine.
    pub(crate) fn link_down(&mut self, reason: u16) {
        if let Some(link) = self.link.take() {
            warn!("link to {:02x?} down (reason {})", link.bssid, reason);
        }
        self.cancel_handshake_timers();
        self.machines.assoc.set_state(assoc::ASSOC_IDLE);
        self.machines.auth.set_state(auth::AUTH_IDLE);
        // A lost link is no reason to keep insisting on the same AP: any
        // later reconnect goes by SSID.
        self.aux.desired.bssid = None;
        if let Some(req) = self.aux.reconnect.as_mut() {
            req.bssid = None;
        }
        self.aux.target = None;
        {
            let mut status = self.status.lock();
            status.state = LinkStateTag::Idle;
            status.bssid = None;
            status.channel_quality = 0;
        }
        self.enqueue_local(MachineId::Cntl, MT_CNTL_LINK_DOWN, EventBody::Status(reason));
    }

    pub(crate) fn cancel_handshake_timers(&mut self) {
        if let Some(id) = self.aux.auth_timer.take() {
            self.timers.cancel(id);
        }
        if let Some(id) = self.aux.assoc_timer.take() {
            self.timers.cancel(id);
        }
    }

    /// Final, ordered shutdown: everything queued is discarded, timers die,
    /// machines return to their initial states.
    fn teardown(&mut self) {
        let discarded = self.queue.drain();
        if discarded > 0 {
            debug!("teardown discarded {} queued events", discarded);
        }
        self.timers.cancel_all();
        self.machines.reset_all();
        self.link = None;
        self.aux = Aux::default();
        *self.status.lock() = LinkStatus::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_variant;

    fn auth_frame(sequence: u16) -> Vec<u8> {
        mac::make_auth_frame(
            &[1; 6],
            &[2; 6],
            &[1; 6],
            mac::AUTH_ALG_OPEN,
            sequence,
            mac::STATUS_SUCCESS,
            None,
        )
    }

    #[test]
    fn classify_routes_by_subtype() {
        let beacon = crate::test_utils::beacon_frame([5; 6], b"net", 6, 0);
        assert_eq!(
            Mlme::classify_frame(&beacon).expect("beacon"),
            (MachineId::Sync, MT_PEER_BEACON)
        );
        let deauth = mac::make_deauth_frame(&[1; 6], &[2; 6], &[1; 6], 3);
        assert_eq!(
            Mlme::classify_frame(&deauth).expect("deauth"),
            (MachineId::AuthRsp, MT_PEER_DEAUTH)
        );
    }

    #[test]
    fn auth_parity_splits_roles() {
        assert_eq!(
            Mlme::classify_frame(&auth_frame(1)).expect("seq 1"),
            (MachineId::AuthRsp, MT_PEER_AUTH_ODD)
        );
        assert_eq!(
            Mlme::classify_frame(&auth_frame(3)).expect("seq 3"),
            (MachineId::AuthRsp, MT_PEER_AUTH_ODD)
        );
        assert_eq!(
            Mlme::classify_frame(&auth_frame(2)).expect("seq 2"),
            (MachineId::Auth, MT_PEER_AUTH_EVEN)
        );
        assert_eq!(
            Mlme::classify_frame(&auth_frame(4)).expect("seq 4"),
            (MachineId::Auth, MT_PEER_AUTH_EVEN)
        );
    }

    #[test]
    fn out_of_range_auth_sequence_rejected() {
        assert_variant!(
            Mlme::classify_frame(&auth_frame(5)),
            Err(FrameParseError::BadAuthSequence(5))
        );
        assert_variant!(
            Mlme::classify_frame(&auth_frame(0)),
            Err(FrameParseError::BadAuthSequence(0))
        );
    }

    #[test]
    fn action_category_masked_and_bounded() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&crate::test_utils::mgmt_header(
            mac::MGMT_SUBTYPE_ACTION,
            [1; 6],
            [2; 6],
        ));
        frame.push(0x83); // category 3 with the no-ack bit set
        frame.push(0);
        assert_eq!(
            Mlme::classify_frame(&frame).expect("action"),
            (MachineId::Action, ACTION_MSG_BASE + 3)
        );

        let len = frame.len();
        frame[len - 2] = 0x20; // category 32: beyond what we speak
        assert_eq!(
            Mlme::classify_frame(&frame).expect("action"),
            (MachineId::Action, MT_ACT_INVALID)
        );
    }

    #[test]
    fn probe_req_from_peers_not_ours_to_handle() {
        let probe = mac::make_probe_req_frame(&[2; 6], b"", OWN_RATES);
        assert_variant!(Mlme::classify_frame(&probe), Err(FrameParseError::UnsupportedType));
    }
}
