// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        client::{ConnectRequest, ScanRequest},
        error::Error,
        mac::MacAddr,
    },
    bytes::Bytes,
    parking_lot::{Condvar, Mutex},
    std::time::{Duration, Instant},
};

/// Largest frame payload an event may carry. Anything larger is rejected at
/// admission, before it can occupy a queue slot.
pub const MAX_EVENT_PAYLOAD: usize = 1600;

/// Admission class of an event. Send-class (local requests, self-generated
/// work) is shed first under load so that Receive-class (frames from the
/// medium, timer firings) can still drain a congested queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionClass {
    Send,
    Receive,
}

/// The state machine an event is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineId {
    Sync,
    Auth,
    AuthRsp,
    Assoc,
    Cntl,
    Action,
}

/// Where an event came from: capture time plus the RX metadata of the frame,
/// if it was one.
#[derive(Debug, Clone, Copy)]
pub struct Origin {
    pub timestamp: Instant,
    pub rssi_dbm: i8,
    pub antenna: u8,
    /// Peer slot the frame arrived on. A station has one peer, so this is 0
    /// everywhere today; the queue carries it through untouched.
    pub link_id: u16,
}

impl Origin {
    /// Origin of a locally generated event.
    pub fn local(now: Instant) -> Self {
        Origin { timestamp: now, rssi_dbm: 0, antenna: 0, link_id: 0 }
    }
}

#[derive(Debug, Clone)]
pub enum EventBody {
    None,
    /// A received management frame, verbatim from the medium.
    Frame(Bytes),
    Scan(ScanRequest),
    Connect(ConnectRequest),
    /// Completion status of a sub-sequence, reported to the control machine.
    Status(u16),
    /// Roam target.
    Roam(MacAddr),
}

#[derive(Debug, Clone)]
pub struct Event {
    pub machine: MachineId,
    pub msg: u16,
    pub class: AdmissionClass,
    pub origin: Origin,
    pub body: EventBody,
}

struct Ring {
    slots: Vec<Option<Event>>,
    head: usize,
    tail: usize,
    count: usize,
    closed: bool,
}

/// Bounded MPSC ring buffer serializing every event the MLME handles.
/// Multiple producers, one consumer; FIFO within and across classes.
pub struct EventQueue {
    inner: Mutex<Ring>,
    readable: Condvar,
    capacity: usize,
    send_threshold: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "queue capacity must be at least 2");
        EventQueue {
            inner: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                tail: 0,
                count: 0,
                closed: false,
            }),
            readable: Condvar::new(),
            capacity,
            send_threshold: capacity / 2,
        }
    }

    /// Admit an event, or refuse with `QueueFull`/`QueueClosed`. Never blocks.
    pub fn enqueue(&self, event: Event) -> Result<(), Error> {
        if let EventBody::Frame(frame) = &event.body {
            if frame.len() > MAX_EVENT_PAYLOAD {
                return Err(Error::PayloadTooLarge(frame.len()));
            }
        }
        let mut ring = self.inner.lock();
        if ring.closed {
            return Err(Error::QueueClosed);
        }
        let limit = match event.class {
            AdmissionClass::Send => self.send_threshold,
            AdmissionClass::Receive => self.capacity,
        };
        if ring.count >= limit {
            return Err(Error::QueueFull(event.class));
        }
        let tail = ring.tail;
        debug_assert!(ring.slots[tail].is_none());
        ring.slots[tail] = Some(event);
        ring.tail = (tail + 1) % self.capacity;
        ring.count += 1;
        drop(ring);
        self.readable.notify_one();
        Ok(())
    }

    /// Dequeue the oldest event, waiting up to `timeout` for one to arrive.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<Event> {
        let mut ring = self.inner.lock();
        if ring.count == 0 && !ring.closed {
            self.readable.wait_for(&mut ring, timeout);
        }
        Self::pop(&mut ring)
    }

    pub fn try_dequeue(&self) -> Option<Event> {
        Self::pop(&mut self.inner.lock())
    }

    fn pop(ring: &mut Ring) -> Option<Event> {
        if ring.count == 0 {
            return None;
        }
        let head = ring.head;
        let event = ring.slots[head].take();
        debug_assert!(event.is_some());
        ring.head = (head + 1) % ring.slots.len();
        ring.count -= 1;
        event
    }

    /// Refuse all further admissions and wake the consumer.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.readable.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Discard everything still queued. Returns the number discarded.
    pub fn drain(&self) -> usize {
        let mut ring = self.inner.lock();
        let discarded = ring.count;
        for slot in &mut ring.slots {
            *slot = None;
        }
        ring.head = 0;
        ring.tail = 0;
        ring.count = 0;
        discarded
    }

    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
