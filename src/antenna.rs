// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! RX antenna diversity: per-antenna EWMA of observed RSSI and a timed probe
//! of the secondary antenna.

use {crate::device::Device, log::debug};

/// Exponentially weighted moving average of signal strength. New samples
/// carry a quarter of the weight.
#[derive(Debug, Default, Clone, Copy)]
pub struct EwmaRssi {
    avg: f32,
    seeded: bool,
}

impl EwmaRssi {
    pub fn update(&mut self, sample_dbm: i8) {
        if self.seeded {
            self.avg = self.avg * 0.75 + f32::from(sample_dbm) * 0.25;
        } else {
            self.avg = f32::from(sample_dbm);
            self.seeded = true;
        }
    }

    pub fn get(&self) -> Option<i8> {
        if self.seeded {
            Some(self.avg.round() as i8)
        } else {
            None
        }
    }
}

/// Consecutive evaluations the primary must win before the cadence relaxes.
const STABLE_EVALS: u32 = 3;

pub struct AntennaDiversity {
    primary: u8,
    secondary: u8,
    rssi: [EwmaRssi; 2],
    evaluating: bool,
    stable_count: u32,
}

impl AntennaDiversity {
    pub fn new(primary: u8, secondary: u8) -> Self {
        debug_assert!(primary < 2 && secondary < 2 && primary != secondary);
        AntennaDiversity {
            primary,
            secondary,
            rssi: [EwmaRssi::default(); 2],
            evaluating: false,
            stable_count: 0,
        }
    }

    pub fn primary(&self) -> u8 {
        self.primary
    }

    pub fn is_evaluating(&self) -> bool {
        self.evaluating
    }

    /// The choice has survived several evaluations; probe less often.
    pub fn is_stable(&self) -> bool {
        self.stable_count >= STABLE_EVALS
    }

    /// Feed the RSSI of a reception heard on `antenna`.
    pub fn note_rssi(&mut self, antenna: u8, rssi_dbm: i8) {
        if let Some(ewma) = self.rssi.get_mut(antenna as usize) {
            ewma.update(rssi_dbm);
        }
    }

    /// Switch RX to the secondary antenna to gather fresh samples. The caller
    /// arms the timer that ends the probe.
    pub fn begin_eval(&mut self, device: &mut dyn Device) {
        if self.evaluating {
            return;
        }
        self.evaluating = true;
        self.rssi[self.secondary as usize] = EwmaRssi::default();
        device.set_antenna(self.secondary);
    }

    /// End the probe window: adopt the secondary if it heard a clearly valid,
    /// stronger signal; otherwise keep the primary.
    pub fn finish_eval(&mut self, device: &mut dyn Device) {
        if !self.evaluating {
            return;
        }
        self.evaluating = false;
        let secondary_rssi = self.rssi[self.secondary as usize].get();
        let primary_rssi = self.rssi[self.primary as usize].get();
        let switch = match (secondary_rssi, primary_rssi) {
            (Some(s), Some(p)) => s > p,
            // Nothing heard on the primary before; any signal wins.
            (Some(_), None) => true,
            _ => false,
        };
        if switch {
            debug!(
                "antenna {} -> {} (rssi {:?} beats {:?})",
                self.primary, self.secondary, secondary_rssi, primary_rssi
            );
            std::mem::swap(&mut self.primary, &mut self.secondary);
            self.stable_count = 0;
        } else {
            self.stable_count = self.stable_count.saturating_add(1);
        }
        device.set_antenna(self.primary);
    }
}
