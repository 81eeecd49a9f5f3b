// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Information element plumbing: the `Reader` iterator over a raw IE chain
//! and the element IDs the station cares about.

pub mod security;

pub const IE_SSID: u8 = 0;
pub const IE_SUPPORTED_RATES: u8 = 1;
pub const IE_DS_PARAMS: u8 = 3;
pub const IE_TIM: u8 = 5;
pub const IE_CHALLENGE: u8 = 16;
pub const IE_HT_CAPABILITIES: u8 = 45;
pub const IE_RSN: u8 = 48;
pub const IE_EXT_SUPPORTED_RATES: u8 = 50;
pub const IE_HT_OPERATION: u8 = 61;
pub const IE_WAPI: u8 = 68;
pub const IE_VHT_CAPABILITIES: u8 = 191;
pub const IE_VHT_OPERATION: u8 = 192;
pub const IE_VENDOR_SPECIFIC: u8 = 221;

/// Iterates over `(id, body)` pairs of an IE chain. Stops at the first
/// truncated element; everything yielded is length-checked.
pub struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader(bytes)
    }
}

impl<'a> Iterator for Reader<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.0.len() < 2 {
            return None;
        }
        let id = self.0[0];
        let len = self.0[1] as usize;
        if self.0.len() < 2 + len {
            return None;
        }
        let (body, rest) = self.0[2..].split_at(len);
        self.0 = rest;
        Some((id, body))
    }
}

/// First element with the given ID, if any.
pub fn find(ies: &[u8], id: u8) -> Option<&[u8]> {
    Reader::new(ies).find(|(eid, _)| *eid == id).map(|(_, body)| body)
}

/// The fields of a beacon's IE chain the BSS table keeps.
#[derive(Debug, Default, Clone)]
pub struct BeaconIes<'a> {
    pub ssid: Option<&'a [u8]>,
    pub ds_channel: Option<u8>,
    pub rates: Vec<u8>,
    pub ht_cap: Option<&'a [u8]>,
    pub vht_cap: Option<&'a [u8]>,
}

pub fn parse_beacon_ies(ies: &[u8]) -> BeaconIes<'_> {
    let mut out = BeaconIes::default();
    for (id, body) in Reader::new(ies) {
        match id {
            IE_SSID => out.ssid = Some(body),
            IE_DS_PARAMS => out.ds_channel = body.first().copied(),
            IE_SUPPORTED_RATES | IE_EXT_SUPPORTED_RATES => out.rates.extend_from_slice(body),
            IE_HT_CAPABILITIES => out.ht_cap = Some(body),
            IE_VHT_CAPABILITIES => out.vht_cap = Some(body),
            _ => (),
        }
    }
    out
}
