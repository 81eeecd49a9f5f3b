// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Shared test fakes: a scripted device, a manually advanced clock, frame
//! builders, and a harness that runs the MLME synchronously on the caller's
//! thread.

use {
    crate::{
        bss::{BssTable, Desired},
        client::*,
        config::Config,
        device::{Device, LinkStatsDelta, TxError},
        ie,
        mac::{self, MacAddr},
        queue::{AdmissionClass, Event, EventBody, EventQueue, MachineId, Origin},
        timer::Clock,
    },
    bytes::Bytes,
    parking_lot::Mutex,
    std::{
        collections::VecDeque,
        sync::Arc,
        time::{Duration, Instant},
    },
};

pub const STA_ADDR: MacAddr = [7; 6];

macro_rules! assert_variant {
    ($expression:expr, $pattern:pat) => {
        match $expression {
            $pattern => (),
            other => panic!("unexpected variant: {:?}", other),
        }
    };
    ($expression:expr, $pattern:pat => $result:expr) => {
        match $expression {
            $pattern => $result,
            other => panic!("unexpected variant: {:?}", other),
        }
    };
}
pub(crate) use assert_variant;

#[derive(Default)]
pub struct FakeDeviceState {
    pub sent: Vec<Vec<u8>>,
    pub channel: u8,
    pub antenna: u8,
    pub tx_rate: u16,
    pub stats: VecDeque<LinkStatsDelta>,
}

/// A device whose state both the MLME and the test can see.
#[derive(Clone)]
pub struct FakeDevice(Arc<Mutex<FakeDeviceState>>);

impl FakeDevice {
    pub fn new() -> Self {
        FakeDevice(Arc::new(Mutex::new(FakeDeviceState::default())))
    }

    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.0.lock().sent)
    }

    pub fn channel(&self) -> u8 {
        self.0.lock().channel
    }

    pub fn antenna(&self) -> u8 {
        self.0.lock().antenna
    }

    pub fn tx_rate(&self) -> u16 {
        self.0.lock().tx_rate
    }

    /// Script the next stats poll.
    pub fn push_stats(&self, delta: LinkStatsDelta) {
        self.0.lock().stats.push_back(delta);
    }
}

impl Device for FakeDevice {
    fn send_mgmt_frame(&mut self, frame: &[u8]) -> Result<(), TxError> {
        self.0.lock().sent.push(frame.to_vec());
        Ok(())
    }

    fn read_link_stats(&mut self) -> LinkStatsDelta {
        self.0.lock().stats.pop_front().unwrap_or_default()
    }

    fn set_channel(&mut self, channel: u8) {
        self.0.lock().channel = channel;
    }

    fn set_antenna(&mut self, antenna: u8) {
        self.0.lock().antenna = antenna;
    }

    fn set_tx_rate(&mut self, rate_100kbps: u16) {
        self.0.lock().tx_rate = rate_100kbps;
    }
}

#[derive(Clone)]
pub struct FakeClock(Arc<Mutex<Instant>>);

impl FakeClock {
    pub fn new() -> Self {
        FakeClock(Arc::new(Mutex::new(Instant::now())))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock() += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.0.lock()
    }
}

// Frame builders. Everything is addressed to STA_ADDR.

pub fn mgmt_header(subtype: u8, src: MacAddr, bssid: MacAddr) -> Vec<u8> {
    let mut buf = Vec::with_capacity(mac::MGMT_HDR_LEN);
    buf.extend_from_slice(&[subtype << 4, 0]); // frame control
    buf.extend_from_slice(&[0, 0]); // duration
    buf.extend_from_slice(&STA_ADDR);
    buf.extend_from_slice(&src);
    buf.extend_from_slice(&bssid);
    buf.extend_from_slice(&[0, 0]); // seq ctrl
    buf
}

fn push_ie(buf: &mut Vec<u8>, id: u8, body: &[u8]) {
    buf.push(id);
    buf.push(body.len() as u8);
    buf.extend_from_slice(body);
}

const AP_RATES: &[u8] = &[0x82, 0x84, 0x8b, 0x96, 0x24, 0x30, 0x48, 0x6c];

fn beacon_like(subtype: u8, bssid: MacAddr, ssid: &[u8], channel: u8, capability: u16) -> Vec<u8> {
    let mut frame = mgmt_header(subtype, bssid, bssid);
    frame.extend_from_slice(&[0; 8]); // timestamp
    frame.extend_from_slice(&100u16.to_le_bytes()); // beacon interval
    frame.extend_from_slice(&capability.to_le_bytes());
    push_ie(&mut frame, ie::IE_SSID, ssid);
    push_ie(&mut frame, ie::IE_SUPPORTED_RATES, AP_RATES);
    push_ie(&mut frame, ie::IE_DS_PARAMS, &[channel]);
    frame
}

pub fn beacon_frame(bssid: MacAddr, ssid: &[u8], channel: u8, capability: u16) -> Vec<u8> {
    beacon_like(mac::MGMT_SUBTYPE_BEACON, bssid, ssid, channel, capability)
}

pub fn probe_rsp_frame(bssid: MacAddr, ssid: &[u8], channel: u8, capability: u16) -> Vec<u8> {
    beacon_like(mac::MGMT_SUBTYPE_PROBE_RSP, bssid, ssid, channel, capability)
}

pub fn auth_frame_from_ap(
    ap: MacAddr,
    algorithm: u16,
    sequence: u16,
    status: u16,
    challenge: Option<&[u8]>,
) -> Vec<u8> {
    mac::make_auth_frame(&STA_ADDR, &ap, &ap, algorithm, sequence, status, challenge)
}

pub fn assoc_rsp_frame(ap: MacAddr, status: u16, aid: u16) -> Vec<u8> {
    let mut frame = mgmt_header(mac::MGMT_SUBTYPE_ASSOC_RSP, ap, ap);
    frame.extend_from_slice(&mac::CAP_ESS.to_le_bytes());
    frame.extend_from_slice(&status.to_le_bytes());
    frame.extend_from_slice(&(aid | 0xc000).to_le_bytes());
    push_ie(&mut frame, ie::IE_SUPPORTED_RATES, AP_RATES);
    frame
}

/// Runs the MLME inline: events are dispatched on the test thread, timers
/// fire when the fake clock is advanced past them.
pub struct TestHelper {
    pub mlme: Mlme,
    pub device: FakeDevice,
    pub clock: FakeClock,
    pub queue: Arc<EventQueue>,
    pub scan_tab: Arc<Mutex<BssTable>>,
    pub status: Arc<Mutex<LinkStatus>>,
    /// Messages addressed to the control machine, with their status bodies.
    cntl_log: Vec<(u16, Option<u16>)>,
}

impl TestHelper {
    pub fn new() -> Self {
        let cfg = Config::default();
        let device = FakeDevice::new();
        let clock = FakeClock::new();
        let queue = Arc::new(EventQueue::new(cfg.queue_capacity));
        let scan_tab = Arc::new(Mutex::new(BssTable::new(cfg.bss_capacity)));
        let status = Arc::new(Mutex::new(LinkStatus::default()));
        let mut mlme = Mlme::new(
            cfg,
            STA_ADDR,
            Box::new(device.clone()),
            Box::new(clock.clone()),
            Arc::clone(&queue),
            Arc::clone(&scan_tab),
            Arc::clone(&status),
        );
        // The first periodic tick, normally armed by the event loop.
        let now = clock.now();
        mlme.timers.schedule(now, mlme.cfg.fast_tick(), TimerEvent::FastTick);
        TestHelper { mlme, device, clock, queue, scan_tab, status, cntl_log: Vec::new() }
    }

    pub fn reconfigure(&mut self, cfg: Config) {
        self.mlme.cfg = cfg;
    }

    /// Dispatch everything queued, recording control-machine traffic.
    pub fn pump(&mut self) -> usize {
        let mut dispatched = 0;
        while let Some(event) = self.queue.try_dequeue() {
            if event.machine == MachineId::Cntl {
                let status = match event.body {
                    EventBody::Status(status) => Some(status),
                    _ => None,
                };
                self.cntl_log.push((event.msg, status));
            }
            self.mlme.dispatch(&event);
            dispatched += 1;
        }
        dispatched
    }

    /// Move the clock and run every timer and event that becomes due.
    pub fn advance(&mut self, by: Duration) {
        self.clock.advance(by);
        loop {
            let now = self.clock.now();
            let fired = match self.mlme.timers.pop_due(now) {
                Some((_, timer_event)) => {
                    self.mlme.handle_timeout(timer_event);
                    true
                }
                None => false,
            };
            let dispatched = self.pump() > 0;
            if !fired && !dispatched {
                break;
            }
        }
    }

    pub fn recv_frame(&mut self, frame: &[u8], rssi_dbm: i8) {
        let (machine, msg) = Mlme::classify_frame(frame).expect("classifiable frame");
        let event = Event {
            machine,
            msg,
            class: AdmissionClass::Receive,
            origin: Origin {
                timestamp: self.clock.now(),
                rssi_dbm,
                antenna: self.device.antenna(),
                link_id: 0,
            },
            body: EventBody::Frame(Bytes::copy_from_slice(frame)),
        };
        self.queue.enqueue(event).expect("enqueue frame");
        self.pump();
    }

    pub fn dispatch_local(&mut self, machine: MachineId, msg: u16, body: EventBody) {
        let event = Event {
            machine,
            msg,
            class: AdmissionClass::Send,
            origin: Origin::local(self.clock.now()),
            body,
        };
        self.queue.enqueue(event).expect("enqueue local");
        self.pump();
    }

    pub fn scan_request(&mut self, req: ScanRequest) {
        self.dispatch_local(MachineId::Sync, MT_MLME_SCAN_REQ, EventBody::Scan(req));
    }

    pub fn connect_request(&mut self, req: ConnectRequest) {
        self.dispatch_local(MachineId::Cntl, MT_CNTL_CONNECT_REQ, EventBody::Connect(req));
    }

    /// Step through every remaining dwell of the scan in progress.
    pub fn finish_scan(&mut self) {
        let mut dwells = 0;
        while self.mlme.aux.scan.is_some() {
            self.advance(self.mlme.cfg.scan_dwell());
            dwells += 1;
            assert!(dwells < 100, "scan never finished");
        }
    }

    fn seed_target(
        &mut self,
        ap: MacAddr,
        ssid: &[u8],
        channel: u8,
        security: Option<(u8, &[u8])>,
    ) {
        let capability = match security {
            Some(_) => mac::CAP_ESS | mac::CAP_PRIVACY,
            None => mac::CAP_ESS,
        };
        let mut frame = beacon_frame(ap, ssid, channel, capability);
        if let Some((id, body)) = security {
            push_ie(&mut frame, id, body);
        }
        let (hdr, body) = mac::parse_mgmt_frame(&frame).expect("fake beacon");
        let (fields, ies) = mac::parse_beacon(body).expect("fake beacon body");
        let entry = crate::bss::BssEntry::from_frame(
            hdr.addr3,
            &fields,
            ies,
            channel,
            -50,
            self.clock.now(),
        );
        self.mlme.aux.desired = Desired { ssid: ssid.to_vec(), bssid: Some(ap) };
        self.mlme.aux.target = Some(entry);
        self.mlme.tune(channel);
    }

    /// Put the MLME one AUTH_REQ into an authentication handshake.
    pub fn start_auth(&mut self, ap: MacAddr, profile: SecurityProfile) {
        self.seed_target(ap, b"net", 6, None);
        self.mlme.aux.profile = Some(profile);
        self.dispatch_local(MachineId::Auth, MT_MLME_AUTH_REQ, EventBody::None);
    }

    /// Put the MLME one ASSOC_REQ into an association handshake.
    pub fn start_assoc(&mut self, ap: MacAddr, ssid: &[u8], channel: u8) {
        self.seed_target(ap, ssid, channel, None);
        self.mlme.aux.profile = Some(SecurityProfile::Open);
        self.dispatch_local(MachineId::Assoc, MT_MLME_ASSOC_REQ, EventBody::None);
    }

    pub fn start_assoc_secure(
        &mut self,
        ap: MacAddr,
        ssid: &[u8],
        channel: u8,
        profile: SecurityProfile,
        security_ie_body: &[u8],
    ) {
        let id = match profile {
            SecurityProfile::WpaPsk => ie::IE_VENDOR_SPECIFIC,
            SecurityProfile::WapiPsk => ie::IE_WAPI,
            _ => ie::IE_RSN,
        };
        self.seed_target(ap, ssid, channel, Some((id, security_ie_body)));
        self.mlme.aux.profile = Some(profile);
        self.dispatch_local(MachineId::Assoc, MT_MLME_ASSOC_REQ, EventBody::None);
    }

    /// Run a full open-system connect against a scripted AP, ending with a
    /// live association.
    pub fn associate(&mut self, ap: MacAddr, ssid: &[u8], channel: u8) {
        self.connect_request(ConnectRequest {
            ssid: ssid.to_vec(),
            bssid: None,
            profile: SecurityProfile::Open,
        });
        self.recv_frame(&beacon_frame(ap, ssid, channel, mac::CAP_ESS), -50);
        self.finish_scan();
        self.recv_frame(
            &auth_frame_from_ap(ap, mac::AUTH_ALG_OPEN, 2, mac::STATUS_SUCCESS, None),
            -50,
        );
        self.recv_frame(&assoc_rsp_frame(ap, mac::STATUS_SUCCESS, 1), -50);
        assert!(self.mlme.link.is_some(), "association did not come up");
        self.device.take_sent();
    }

    /// Status body of the most recent control message of the given kind.
    pub fn last_cntl_status(&self, msg: u16) -> Option<u16> {
        self.cntl_log.iter().rev().find(|(m, _)| *m == msg).and_then(|(_, status)| *status)
    }

    pub fn take_cntl_msgs(&mut self) -> Vec<(u16, Option<u16>)> {
        std::mem::take(&mut self.cntl_log)
    }
}
