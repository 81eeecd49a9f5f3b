// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Station-mode 802.11 MLME: a single-threaded event loop of cooperating
//! state machines driving scanning, authentication, association, roaming,
//! and link supervision over a thin softmac device seam.
//!
//! Drivers talk to a running MLME through [`MlmeHandle`]; everything else
//! happens on the MLME's own thread.

pub mod antenna;
pub mod bss;
pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod fsm;
pub mod handle;
pub mod ie;
pub mod mac;
pub mod quality;
pub mod queue;
pub mod rate;
pub mod timer;

#[cfg(test)]
pub(crate) mod test_utils;

pub use {
    bss::BssEntry,
    client::{
        ConnectRequest, ConnectResult, LinkStateTag, LinkStatus, ScanRequest, ScanType,
        SecurityProfile,
    },
    config::Config,
    device::{Device, LinkStatsDelta, TxError},
    error::Error,
    handle::MlmeHandle,
    mac::MacAddr,
};
