// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The driver-facing handle: owns the MLME thread and converts driver calls
//! into queued events.

use {
    crate::{
        bss::{BssEntry, BssTable},
        client::{ConnectRequest, LinkStatus, Mlme, ScanRequest, MT_CNTL_CONNECT_REQ, MT_CNTL_DISCONNECT_REQ, MT_MLME_SCAN_REQ},
        config::Config,
        device::Device,
        error::Error,
        mac::MacAddr,
        queue::{AdmissionClass, Event, EventBody, EventQueue, MachineId, Origin},
        timer::{Clock, MonotonicClock},
    },
    bytes::Bytes,
    log::info,
    parking_lot::Mutex,
    std::{sync::Arc, thread},
};

/// A running MLME. Every method is safe from any thread; requests are queued
/// for the event loop and never block on it.
pub struct MlmeHandle {
    queue: Arc<EventQueue>,
    scan_tab: Arc<Mutex<BssTable>>,
    status: Arc<Mutex<LinkStatus>>,
    clock: Arc<dyn Clock>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MlmeHandle {
    pub fn start(
        cfg: Config,
        own_addr: MacAddr,
        device: Box<dyn Device>,
    ) -> Result<Self, std::io::Error> {
        Self::start_with_clock(cfg, own_addr, device, Arc::new(MonotonicClock))
    }

    pub fn start_with_clock(
        cfg: Config,
        own_addr: MacAddr,
        device: Box<dyn Device>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, std::io::Error> {
        let queue = Arc::new(EventQueue::new(cfg.queue_capacity));
        let scan_tab = Arc::new(Mutex::new(BssTable::new(cfg.bss_capacity)));
        let status = Arc::new(Mutex::new(LinkStatus::default()));

        let mlme_queue = Arc::clone(&queue);
        let mlme_scan_tab = Arc::clone(&scan_tab);
        let mlme_status = Arc::clone(&status);
        let mlme_clock = Arc::clone(&clock);
        let thread = thread::Builder::new().name("wlan-mlme".to_string()).spawn(move || {
            let mut mlme = Mlme::new(
                cfg,
                own_addr,
                device,
                Box::new(ArcClock(mlme_clock)),
                mlme_queue,
                mlme_scan_tab,
                mlme_status,
            );
            mlme.run();
            info!("MLME event loop exited gracefully");
        })?;

        Ok(MlmeHandle { queue, scan_tab, status, clock, thread: Some(thread) })
    }

    fn enqueue(&self, machine: MachineId, msg: u16, body: EventBody) -> Result<(), Error> {
        self.queue.enqueue(Event {
            machine,
            msg,
            class: AdmissionClass::Send,
            origin: Origin::local(self.clock.now()),
            body,
        })
    }

    pub fn scan(&self, req: ScanRequest) -> Result<(), Error> {
        self.enqueue(MachineId::Sync, MT_MLME_SCAN_REQ, EventBody::Scan(req))
    }

    pub fn connect(&self, req: ConnectRequest) -> Result<(), Error> {
        self.enqueue(MachineId::Cntl, MT_CNTL_CONNECT_REQ, EventBody::Connect(req))
    }

    pub fn disconnect(&self) -> Result<(), Error> {
        self.enqueue(MachineId::Cntl, MT_CNTL_DISCONNECT_REQ, EventBody::None)
    }

    /// Hand a received management frame to the MLME. Called from the
    /// driver's RX path; classification happens here so undeliverable
    /// frames never occupy a queue slot.
    pub fn on_mgmt_frame(&self, frame: &[u8], rssi_dbm: i8, antenna: u8) -> Result<(), Error> {
        let (machine, msg) = Mlme::classify_frame(frame)?;
        self.queue.enqueue(Event {
            machine,
            msg,
            class: AdmissionClass::Receive,
            origin: Origin { timestamp: self.clock.now(), rssi_dbm, antenna, link_id: 0 },
            body: EventBody::Frame(Bytes::copy_from_slice(frame)),
        })
    }

    pub fn scan_results(&self) -> Vec<BssEntry> {
        self.scan_tab.lock().snapshot()
    }

    pub fn status(&self) -> LinkStatus {
        self.status.lock().clone()
    }

    /// Stop the event loop and wait for it to finish. Idempotent.
    pub fn shutdown(&mut self) {
        self.queue.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MlmeHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Adapter so the shared clock can also serve as the event loop's boxed one.
struct ArcClock(Arc<dyn Clock>);

impl Clock for ArcClock {
    fn now(&self) -> std::time::Instant {
        self.0.now()
    }
}
