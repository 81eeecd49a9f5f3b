// Copyright 2022 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{device::TxError, mac::FrameParseError, queue::AdmissionClass},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("event queue full; {0:?}-class admission rejected")]
    QueueFull(AdmissionClass),
    #[error("event queue closed")]
    QueueClosed,
    #[error("event payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("error parsing frame: {0}")]
    ParsingFrame(#[from] FrameParseError),
    #[error("BSS table full and entry does not match the desired network")]
    BssTableFull,
    #[error("device rejected transmission: {0}")]
    Tx(#[from] TxError),
}
