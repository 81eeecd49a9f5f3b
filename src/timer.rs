// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    time::{Duration, Instant},
};

pub type EventId = u64;

/// Source of time for the event loop. Production uses the monotonic clock;
/// tests substitute a manually advanced one.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Pending timed events, owned by the event loop. Expired timers never call
/// back into state; the loop pops them and feeds them through the same
/// dispatch path as any other event.
pub struct TimerQueue<E> {
    // Cancellation is lazy: `cancel` removes from `events` and the stale heap
    // entry is skipped when it surfaces.
    deadlines: BinaryHeap<Reverse<(Instant, EventId)>>,
    events: HashMap<EventId, E>,
    next_id: EventId,
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        TimerQueue { deadlines: BinaryHeap::new(), events: HashMap::new(), next_id: 0 }
    }

    pub fn schedule(&mut self, now: Instant, after: Duration, event: E) -> EventId {
        self.next_id += 1;
        let id = self.next_id;
        self.deadlines.push(Reverse((now + after, id)));
        self.events.insert(id, event);
        id
    }

    pub fn cancel(&mut self, id: EventId) -> Option<E> {
        self.events.remove(&id)
    }

    pub fn cancel_all(&mut self) {
        self.deadlines.clear();
        self.events.clear();
    }

    /// Deadline of the earliest live timer.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            if self.events.contains_key(&id) {
                return Some(deadline);
            }
            self.deadlines.pop();
        }
        None
    }

    /// Pop one timer due at or before `now`, if any.
    pub fn pop_due(&mut self, now: Instant) -> Option<(EventId, E)> {
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            if deadline > now {
                return None;
            }
            self.deadlines.pop();
            if let Some(event) = self.events.remove(&id) {
                return Some((id, event));
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
