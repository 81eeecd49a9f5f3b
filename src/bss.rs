// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Fixed-capacity table of BSSs heard on the air, keyed by (BSSID, band).

use {
    crate::{
        error::Error,
        ie::{self, security::SecurityDescriptor},
        mac::{self, BeaconFields, MacAddr},
    },
    bytes::Bytes,
    log::debug,
    std::time::Instant,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    TwoGhz,
    FiveGhz,
}

impl Band {
    pub fn from_channel(channel: u8) -> Band {
        if channel <= 14 {
            Band::TwoGhz
        } else {
            Band::FiveGhz
        }
    }
}

#[derive(Debug, Clone)]
pub struct BssEntry {
    pub bssid: MacAddr,
    pub ssid: Vec<u8>,
    /// The network hides its SSID; `ssid` may have been learned from a probe
    /// response rather than the beacon.
    pub hidden: bool,
    pub channel: u8,
    pub band: Band,
    pub capability: u16,
    pub beacon_interval: u16,
    pub security: SecurityDescriptor,
    pub rates: Vec<u8>,
    pub ht_cap: Option<Vec<u8>>,
    pub vht_cap: Option<Vec<u8>>,
    pub rssi_dbm: i8,
    pub last_seen: Instant,
    /// Raw IE chain, kept verbatim for association.
    pub ies: Bytes,
}

/// An SSID of all-NUL bytes is the other common way of hiding it, besides a
/// zero-length one.
fn is_hidden_ssid(ssid: &[u8]) -> bool {
    ssid.is_empty() || ssid.iter().all(|b| *b == 0)
}

impl BssEntry {
    /// Build an entry from a beacon or probe response heard on `rx_channel`.
    pub fn from_frame(
        bssid: MacAddr,
        fields: &BeaconFields,
        ies: &[u8],
        rx_channel: u8,
        rssi_dbm: i8,
        now: Instant,
    ) -> Self {
        let parsed = ie::parse_beacon_ies(ies);
        let hidden = parsed.ssid.map_or(true, is_hidden_ssid);
        let channel = parsed.ds_channel.unwrap_or(rx_channel);
        BssEntry {
            bssid,
            ssid: if hidden { Vec::new() } else { parsed.ssid.unwrap_or_default().to_vec() },
            hidden,
            channel,
            band: Band::from_channel(channel),
            capability: fields.capability,
            beacon_interval: fields.beacon_interval,
            security: ie::security::parse_security(ies),
            rates: parsed.rates,
            ht_cap: parsed.ht_cap.map(<[u8]>::to_vec),
            vht_cap: parsed.vht_cap.map(<[u8]>::to_vec),
            rssi_dbm,
            last_seen: now,
            ies: Bytes::copy_from_slice(ies),
        }
    }

    pub fn is_protected(&self) -> bool {
        self.capability & mac::CAP_PRIVACY != 0
    }

    /// Fold a fresh sighting of the same BSS into this entry. A hidden-SSID
    /// beacon never erases an SSID already learned from a probe response.
    fn refresh(&mut self, new: BssEntry) {
        let keep_ssid = new.hidden && !self.hidden;
        let (ssid, hidden) = if keep_ssid {
            (std::mem::take(&mut self.ssid), false)
        } else {
            (new.ssid, new.hidden)
        };
        *self = BssEntry { ssid, hidden, ..new };
    }
}

/// What the control machine is currently after. Entries matching this are
/// allowed to displace others when the table is full.
#[derive(Debug, Default, Clone)]
pub struct Desired {
    pub ssid: Vec<u8>,
    pub bssid: Option<MacAddr>,
}

impl Desired {
    fn matches(&self, entry: &BssEntry) -> bool {
        match self.bssid {
            Some(bssid) => bssid == entry.bssid,
            None => !self.ssid.is_empty() && self.ssid == entry.ssid,
        }
    }
}

/// Slab of BSS entries with a free list. Indices are stable across unrelated
/// insertions and removals.
pub struct BssTable {
    slots: Vec<Option<BssEntry>>,
    free: Vec<usize>,
    /// Rotates over the table so repeated desired-network overflow insertions
    /// do not keep displacing the same victim.
    overflow_cursor: usize,
}

impl BssTable {
    pub fn new(capacity: usize) -> Self {
        BssTable {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).rev().collect(),
            overflow_cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.free = (0..self.slots.len()).rev().collect();
        self.overflow_cursor = 0;
    }

    pub fn get(&self, index: usize) -> Option<&BssEntry> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Look a BSS up by BSSID and the band of `channel`. The same BSSID may
    /// legitimately exist on both bands.
    pub fn find(&self, bssid: &MacAddr, channel: u8) -> Option<usize> {
        let band = Band::from_channel(channel);
        self.iter().find(|(_, e)| e.bssid == *bssid && e.band == band).map(|(i, _)| i)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &BssEntry)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| slot.as_ref().map(|e| (i, e)))
    }

    /// Insert or refresh a sighting. When the table is full, only an entry
    /// matching `desired` is admitted, displacing the slot under the rotating
    /// overflow cursor.
    pub fn upsert(&mut self, entry: BssEntry, desired: Option<&Desired>) -> Result<usize, Error> {
        if let Some(index) = self.find(&entry.bssid, entry.channel) {
            if let Some(existing) = self.slots[index].as_mut() {
                existing.refresh(entry);
            }
            return Ok(index);
        }
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(entry);
            return Ok(index);
        }
        if desired.map_or(false, |d| d.matches(&entry)) {
            let index = self.overflow_cursor;
            self.overflow_cursor = (self.overflow_cursor + 1) % self.slots.len();
            debug!(
                "bss table full; displacing slot {} for desired network {:02x?}",
                index, entry.bssid
            );
            self.slots[index] = Some(entry);
            return Ok(index);
        }
        Err(Error::BssTableFull)
    }

    pub fn remove(&mut self, index: usize) -> Option<BssEntry> {
        let entry = self.slots.get_mut(index)?.take();
        if entry.is_some() {
            self.free.push(index);
        }
        entry
    }

    /// Strongest entry whose SSID matches, or any index for the exact BSSID.
    pub fn find_best(&self, ssid: &[u8], bssid: Option<&MacAddr>) -> Option<usize> {
        match bssid {
            Some(bssid) => self.iter().find(|(_, e)| e.bssid == *bssid).map(|(i, _)| i),
            None => self
                .iter()
                .filter(|(_, e)| e.ssid == ssid)
                .max_by_key(|(_, e)| e.rssi_dbm)
                .map(|(i, _)| i),
        }
    }

    pub fn snapshot(&self) -> Vec<BssEntry> {
        self.iter().map(|(_, e)| e.clone()).collect()
    }
}
