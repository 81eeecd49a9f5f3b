// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {crate::queue::Event, log::error};

/// An entry in a state machine's transition table. Handlers take the shared
/// context by `&mut` and the event by `&`; they never return errors. A
/// transition that cannot proceed leaves the machine where it is.
pub type Handler<C> = fn(&mut C, &Event);

/// Table-driven state machine: a dense (state, msg) -> handler table over a
/// contiguous message range starting at `base`. Every cell starts as the
/// no-op default, so dispatch is total: any (state, msg) pair resolves to
/// some handler.
pub struct StateMachine<C> {
    name: &'static str,
    base: u16,
    n_states: usize,
    n_msgs: usize,
    curr_state: usize,
    table: Vec<Handler<C>>,
}

impl<C> StateMachine<C> {
    pub fn new(
        name: &'static str,
        n_states: usize,
        n_msgs: usize,
        base: u16,
        init_state: usize,
    ) -> Self {
        assert!(init_state < n_states);
        StateMachine {
            name,
            base,
            n_states,
            n_msgs,
            curr_state: init_state,
            table: vec![Self::drop_event; n_states * n_msgs],
        }
    }

    /// Default transition: the event is silently ignored. Unexpected protocol
    /// input must never disturb the machine.
    fn drop_event(_ctx: &mut C, _event: &Event) {}

    pub fn set_action(&mut self, state: usize, msg: u16, handler: Handler<C>) {
        match msg.checked_sub(self.base) {
            Some(offset) if state < self.n_states && (offset as usize) < self.n_msgs => {
                self.table[state * self.n_msgs + offset as usize] = handler;
            }
            _ => panic!(
                "{}: set_action out of range (state {}, msg {:#x})",
                self.name, state, msg
            ),
        }
    }

    /// Resolve the handler for `msg` in the current state. Messages outside
    /// the machine's range resolve to the no-op default.
    pub fn lookup(&self, msg: u16) -> Handler<C> {
        match msg.checked_sub(self.base) {
            Some(offset) if (offset as usize) < self.n_msgs => {
                self.table[self.curr_state * self.n_msgs + offset as usize]
            }
            _ => Self::drop_event,
        }
    }

    pub fn state(&self) -> usize {
        self.curr_state
    }

    pub fn set_state(&mut self, state: usize) {
        if state < self.n_states {
            self.curr_state = state;
        } else {
            error!("{}: refusing transition to out-of-range state {}", self.name, state);
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
