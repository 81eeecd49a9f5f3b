// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {serde::Deserialize, std::time::Duration};

/// Tuned constants for the MLME. `Default` carries the values the reference
/// hardware ships with; deployments may override individual fields from JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Event queue capacity. Send-class events are admitted only below half
    /// of this.
    pub queue_capacity: usize,
    /// BSS table capacity.
    pub bss_capacity: usize,

    /// Channel quality weights; must sum to 100.
    pub rssi_weight: u32,
    pub tx_weight: u32,
    pub rx_weight: u32,
    /// TX/RX ratios are ignored below this many samples in a window.
    pub min_sample_count: u32,

    /// A roam candidate must beat the current RSSI by at least this much.
    pub roam_hysteresis_db: i8,
    /// Candidates weaker than this are never considered.
    pub roam_rssi_floor_dbm: i8,
    /// A BSS entry older than this no longer counts as fresh, and beacon
    /// silence past this marks the link at risk.
    pub beacon_lost_timeout_ms: u64,

    /// Fast periodic tick; drives stats polling and rate control.
    pub fast_tick_ms: u64,
    /// Slow tick fires every this many fast ticks.
    pub slow_tick_multiple: u64,
    /// Rate adaptation window, in fast ticks.
    pub rate_interval_ticks: u64,

    /// Keep-alive fires on slow rounds where `round % interval == phase`.
    pub keepalive_round_interval: u64,
    pub keepalive_round_phase: u64,
    /// Null-data keep-alive only when the link has been TX-idle this long.
    pub keepalive_idle_secs: u64,

    /// Quality below this is "bad" (roam); equal to zero is "dead".
    pub quality_bad_threshold: u8,
    /// Antenna evaluation is skipped while quality is at least this.
    pub quality_good_threshold: u8,

    /// Minimum gap between full rescans triggered by a bad link.
    pub rescan_backoff_secs: u64,

    pub scan_dwell_ms: u64,
    pub auth_timeout_ms: u64,
    pub assoc_timeout_ms: u64,
    pub auth_retry_limit: u8,
    pub assoc_retry_limit: u8,

    /// Secondary-antenna probe window.
    pub antenna_eval_ms: u64,
    /// Evaluation cadence while the antenna choice is still settling.
    pub antenna_eval_period_secs: u64,
    /// Evaluation cadence once the choice has been stable.
    pub antenna_stable_period_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            queue_capacity: 40,
            bss_capacity: 64,
            rssi_weight: 50,
            tx_weight: 30,
            rx_weight: 20,
            min_sample_count: 5,
            roam_hysteresis_db: 5,
            roam_rssi_floor_dbm: -70,
            beacon_lost_timeout_ms: 4000,
            fast_tick_ms: 100,
            slow_tick_multiple: 10,
            rate_interval_ticks: 5,
            keepalive_round_interval: 10,
            keepalive_round_phase: 8,
            keepalive_idle_secs: 10,
            quality_bad_threshold: 20,
            quality_good_threshold: 50,
            rescan_backoff_secs: 10,
            scan_dwell_ms: 120,
            auth_timeout_ms: 300,
            assoc_timeout_ms: 300,
            auth_retry_limit: 2,
            assoc_retry_limit: 2,
            antenna_eval_ms: 100,
            antenna_eval_period_secs: 3,
            antenna_stable_period_secs: 10,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn beacon_lost_timeout(&self) -> Duration {
        Duration::from_millis(self.beacon_lost_timeout_ms)
    }

    pub fn fast_tick(&self) -> Duration {
        Duration::from_millis(self.fast_tick_ms)
    }

    pub fn keepalive_idle(&self) -> Duration {
        Duration::from_secs(self.keepalive_idle_secs)
    }

    pub fn rescan_backoff(&self) -> Duration {
        Duration::from_secs(self.rescan_backoff_secs)
    }

    pub fn scan_dwell(&self) -> Duration {
        Duration::from_millis(self.scan_dwell_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn assoc_timeout(&self) -> Duration {
        Duration::from_millis(self.assoc_timeout_ms)
    }

    pub fn antenna_eval(&self) -> Duration {
        Duration::from_millis(self.antenna_eval_ms)
    }
}
