// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Channel quality estimation and roam candidate selection.

use {
    crate::{
        bss::BssTable,
        config::Config,
        device::LinkStatsDelta,
        mac::MacAddr,
    },
    std::time::Instant,
};

/// RSSI below this contributes nothing to quality; at or below it the link
/// counts as dead outright.
pub const RSSI_FLOOR_DBM: i8 = -90;
/// RSSI at or above this contributes the full weight.
pub const RSSI_CEIL_DBM: i8 = -40;

/// One window's worth of TX/RX counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkHealth {
    pub tx_no_retry_ok: u32,
    pub tx_retry_ok: u32,
    pub tx_fail: u32,
    pub rx_ok: u32,
    pub rx_fcs_err: u32,
}

impl LinkHealth {
    pub fn absorb(&mut self, delta: &LinkStatsDelta) {
        self.tx_no_retry_ok += delta.tx_no_retry_ok;
        self.tx_retry_ok += delta.tx_retry_ok;
        self.tx_fail += delta.tx_fail;
        self.rx_ok += delta.rx_ok;
        self.rx_fcs_err += delta.rx_fcs_err;
    }

    pub fn reset_window(&mut self) {
        *self = LinkHealth::default();
    }

    pub fn tx_total(&self) -> u32 {
        self.tx_no_retry_ok + self.tx_retry_ok + self.tx_fail
    }

    pub fn rx_total(&self) -> u32 {
        self.rx_ok + self.rx_fcs_err
    }
}

/// Normalize RSSI into 0..=100, clamped to the floor/ceiling window.
fn normalized_rssi(rssi_dbm: i8) -> u32 {
    if rssi_dbm >= RSSI_CEIL_DBM {
        100
    } else if rssi_dbm <= RSSI_FLOOR_DBM {
        0
    } else {
        // Two points per dB across the 50 dB window.
        ((rssi_dbm as i32 - RSSI_FLOOR_DBM as i32) * 2) as u32
    }
}

/// Composite channel quality, 0..=100. An RSSI at the floor or prolonged
/// beacon silence on an otherwise idle link forces 0: the link is dead.
pub fn channel_quality(
    cfg: &Config,
    health: &LinkHealth,
    rssi_dbm: i8,
    last_beacon: Instant,
    now: Instant,
) -> u8 {
    let beacon_silent = now.saturating_duration_since(last_beacon) > cfg.beacon_lost_timeout();
    // Successful traffic proves the link is alive even if we stopped hearing
    // beacons (e.g. heavy contention).
    if beacon_silent && health.tx_no_retry_ok < 2 {
        return 0;
    }
    if rssi_dbm <= RSSI_FLOOR_DBM {
        return 0;
    }

    let tx_total = health.tx_total();
    let tx_bad_ratio = if tx_total < cfg.min_sample_count {
        0
    } else {
        (tx_total - health.tx_no_retry_ok) * 100 / tx_total
    };
    let rx_total = health.rx_total();
    let rx_bad_ratio = if rx_total < cfg.min_sample_count {
        0
    } else {
        health.rx_fcs_err * 100 / rx_total
    };

    let quality = (cfg.rssi_weight * normalized_rssi(rssi_dbm)
        + cfg.tx_weight * (100 - tx_bad_ratio)
        + cfg.rx_weight * (100 - rx_bad_ratio))
        / 100;
    quality.min(100) as u8
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoamCandidate {
    pub index: usize,
    pub bssid: MacAddr,
    pub rssi_dbm: i8,
}

/// BSSs worth roaming to, strongest first. A candidate must be a fresh
/// sighting of the same network, above the RSSI floor, not the current AP,
/// and stronger than the current link by at least the hysteresis margin.
pub fn roam_candidates(
    cfg: &Config,
    table: &BssTable,
    ssid: &[u8],
    current_bssid: &MacAddr,
    current_rssi_dbm: i8,
    now: Instant,
) -> Vec<RoamCandidate> {
    let min_rssi = current_rssi_dbm.saturating_add(cfg.roam_hysteresis_db);
    let mut candidates: Vec<RoamCandidate> = table
        .iter()
        .filter(|(_, e)| {
            now.saturating_duration_since(e.last_seen) <= cfg.beacon_lost_timeout()
                && e.rssi_dbm > cfg.roam_rssi_floor_dbm
                && e.bssid != *current_bssid
                && e.ssid == ssid
                && e.rssi_dbm >= min_rssi
        })
        .map(|(index, e)| RoamCandidate { index, bssid: e.bssid, rssi_dbm: e.rssi_dbm })
        .collect();
    candidates.sort_by(|a, b| b.rssi_dbm.cmp(&a.rssi_dbm));
    candidates
}
