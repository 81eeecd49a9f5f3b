// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxError {
    #[error("transmit queue full")]
    QueueFull,
    #[error("device no longer present")]
    DeviceGone,
}

/// Counter deltas accumulated by the device since the previous poll, plus the
/// most recent signal observation. Counters are deltas, not totals; the caller
/// owns windowing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkStatsDelta {
    pub tx_no_retry_ok: u32,
    pub tx_retry_ok: u32,
    pub tx_fail: u32,
    pub rx_ok: u32,
    pub rx_fcs_err: u32,
    /// RSSI of the most recent reception in this window, if any.
    pub rssi_dbm: Option<i8>,
    /// Antenna the most recent reception was heard on.
    pub antenna: u8,
}

/// Seam between the MLME and the underlying softmac hardware. All calls are
/// made from the MLME event loop thread.
pub trait Device: Send {
    /// Queue a fully formed management frame for transmission.
    fn send_mgmt_frame(&mut self, frame: &[u8]) -> Result<(), TxError>;

    /// Read and clear the hardware's TX/RX counters.
    fn read_link_stats(&mut self) -> LinkStatsDelta;

    fn set_channel(&mut self, channel: u8);

    fn set_antenna(&mut self, antenna: u8);

    /// Select the data TX rate, in units of 100 kbit/s.
    fn set_tx_rate(&mut self, rate_100kbps: u16);
}
