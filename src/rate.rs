// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Windowed TX rate adaptation: step down on retries and failures, step up
//! when the air is clean.

use {crate::quality::LinkHealth, log::debug};

/// Legacy rate ladder in units of 100 kbit/s, ascending.
pub const RATE_LADDER_100KBPS: &[u16] =
    &[10, 20, 55, 60, 90, 110, 120, 180, 240, 360, 480, 540];

/// Don't adapt on fewer TX samples than this per window.
const MIN_WINDOW_SAMPLES: u32 = 15;

/// Window ratios, in percent.
const STEP_DOWN_FAIL_PCT: u32 = 25;
const STEP_DOWN_RETRY_PCT: u32 = 45;
const STEP_UP_RETRY_PCT: u32 = 10;

pub struct RateControl {
    index: usize,
    max_index: usize,
}

impl RateControl {
    pub fn new() -> Self {
        RateControl { index: 0, max_index: RATE_LADDER_100KBPS.len() - 1 }
    }

    /// Reset for a new association, capping the ladder at the peer's fastest
    /// supported legacy rate and starting from the top.
    pub fn reset(&mut self, peer_rates: &[u8]) {
        // Supported-rates bytes are in 500 kbit/s units with the basic-rate
        // bit in the MSB.
        let peer_max_100kbps =
            peer_rates.iter().map(|r| u16::from(r & 0x7f) * 5).max().unwrap_or(110);
        self.max_index = RATE_LADDER_100KBPS
            .iter()
            .rposition(|r| *r <= peer_max_100kbps)
            .unwrap_or(0);
        self.index = self.max_index;
    }

    pub fn current_100kbps(&self) -> u16 {
        RATE_LADDER_100KBPS[self.index]
    }

    /// Evaluate one adaptation window. Returns the new rate if it changed.
    pub fn on_window(&mut self, health: &LinkHealth) -> Option<u16> {
        let total = health.tx_total();
        if total < MIN_WINDOW_SAMPLES {
            return None;
        }
        let fail_pct = health.tx_fail * 100 / total;
        let retry_pct = (health.tx_retry_ok + health.tx_fail) * 100 / total;

        let new_index = if fail_pct > STEP_DOWN_FAIL_PCT || retry_pct > STEP_DOWN_RETRY_PCT {
            self.index.saturating_sub(1)
        } else if retry_pct < STEP_UP_RETRY_PCT {
            (self.index + 1).min(self.max_index)
        } else {
            self.index
        };
        if new_index == self.index {
            return None;
        }
        self.index = new_index;
        debug!(
            "tx rate -> {}.{} Mb/s (retry {}%, fail {}%)",
            self.current_100kbps() / 10,
            self.current_100kbps() % 10,
            retry_pct,
            fail_pct
        );
        Some(self.current_100kbps())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(no_retry: u32, retry: u32, fail: u32) -> LinkHealth {
        LinkHealth { tx_no_retry_ok: no_retry, tx_retry_ok: retry, tx_fail: fail, ..LinkHealth::default() }
    }

    #[test]
    fn reset_caps_at_peer_max() {
        let mut rc = RateControl::new();
        // 802.11b peer: 1, 2, 5.5, 11 Mb/s.
        rc.reset(&[0x82, 0x84, 0x8b, 0x96]);
        assert_eq!(rc.current_100kbps(), 110);
        // Clean air cannot push past the cap.
        assert_eq!(rc.on_window(&window(100, 0, 0)), None);
    }

    #[test]
    fn steps_down_on_failures() {
        let mut rc = RateControl::new();
        rc.reset(&[0x8c, 0x98, 0xb0, 0x6c]); // up to 54 Mb/s
        assert_eq!(rc.current_100kbps(), 540);
        assert_eq!(rc.on_window(&window(10, 0, 10)), Some(480));
        assert_eq!(rc.on_window(&window(5, 15, 0)), Some(360));
    }

    #[test]
    fn steps_up_when_clean() {
        let mut rc = RateControl::new();
        rc.reset(&[0x8c, 0x98, 0xb0, 0x6c]);
        rc.on_window(&window(0, 0, 20)); // down to 480
        assert_eq!(rc.on_window(&window(100, 2, 0)), Some(540));
    }

    #[test]
    fn sparse_window_changes_nothing() {
        let mut rc = RateControl::new();
        rc.reset(&[0x8c]);
        assert_eq!(rc.on_window(&window(0, 0, 14)), None);
    }

    #[test]
    fn holds_in_the_middle_band() {
        let mut rc = RateControl::new();
        rc.reset(&[0x8c, 0x98, 0xb0, 0x6c]);
        // 20% retries: neither step-down nor step-up territory.
        assert_eq!(rc.on_window(&window(80, 20, 0)), None);
    }
}
