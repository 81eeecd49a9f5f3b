// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! IEEE Std 802.11-2016 management frame layouts: header/body parsing plus
//! writers for the frames a station originates.

use {
    byteorder::{ByteOrder, LittleEndian},
    thiserror::Error,
};

pub type MacAddr = [u8; 6];

pub const BCAST_ADDR: MacAddr = [0xff; 6];

pub const MGMT_HDR_LEN: usize = 24;
pub const DATA_HDR_LEN: usize = 24;

// Frame types (frame control bits 2-3).
pub const FRAME_TYPE_MGMT: u8 = 0b00;
pub const FRAME_TYPE_DATA: u8 = 0b10;

// Management subtypes (frame control bits 4-7).
pub const MGMT_SUBTYPE_ASSOC_REQ: u8 = 0b0000;
pub const MGMT_SUBTYPE_ASSOC_RSP: u8 = 0b0001;
pub const MGMT_SUBTYPE_REASSOC_REQ: u8 = 0b0010;
pub const MGMT_SUBTYPE_REASSOC_RSP: u8 = 0b0011;
pub const MGMT_SUBTYPE_PROBE_REQ: u8 = 0b0100;
pub const MGMT_SUBTYPE_PROBE_RSP: u8 = 0b0101;
pub const MGMT_SUBTYPE_BEACON: u8 = 0b1000;
pub const MGMT_SUBTYPE_DISASSOC: u8 = 0b1010;
pub const MGMT_SUBTYPE_AUTH: u8 = 0b1011;
pub const MGMT_SUBTYPE_DEAUTH: u8 = 0b1100;
pub const MGMT_SUBTYPE_ACTION: u8 = 0b1101;

pub const DATA_SUBTYPE_NULL: u8 = 0b0100;

// Frame control flags.
pub const FC_TO_DS: u16 = 1 << 8;

// Capability Information bits.
pub const CAP_ESS: u16 = 1 << 0;
pub const CAP_IBSS: u16 = 1 << 1;
pub const CAP_PRIVACY: u16 = 1 << 4;

pub const AUTH_ALG_OPEN: u16 = 0;
pub const AUTH_ALG_SHARED: u16 = 1;

pub const STATUS_SUCCESS: u16 = 0;
pub const STATUS_REFUSED: u16 = 1;
pub const STATUS_CHALLENGE_FAILURE: u16 = 15;

pub const REASON_DEAUTH_LEAVING: u16 = 3;
pub const REASON_DISASSOC_STA_LEAVING: u16 = 8;
pub const REASON_BEACON_LOST: u16 = 4; // disassociated due to inactivity

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameParseError {
    #[error("frame too short: need {need} bytes, have {have}")]
    TooShort { need: usize, have: usize },
    #[error("not a supported management frame")]
    UnsupportedType,
    #[error("invalid authentication sequence number {0}")]
    BadAuthSequence(u16),
}

fn need(buf: &[u8], n: usize) -> Result<(), FrameParseError> {
    if buf.len() < n {
        Err(FrameParseError::TooShort { need: n, have: buf.len() })
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MgmtHdr {
    pub frame_ctrl: u16,
    pub duration: u16,
    pub addr1: MacAddr,
    pub addr2: MacAddr,
    pub addr3: MacAddr,
    pub seq_ctrl: u16,
}

impl MgmtHdr {
    pub fn frame_type(&self) -> u8 {
        ((self.frame_ctrl >> 2) & 0b11) as u8
    }

    pub fn frame_subtype(&self) -> u8 {
        ((self.frame_ctrl >> 4) & 0b1111) as u8
    }
}

fn read_addr(buf: &[u8]) -> MacAddr {
    let mut addr = [0u8; 6];
    addr.copy_from_slice(&buf[..6]);
    addr
}

/// Split a management frame into its fixed header and body.
pub fn parse_mgmt_frame(frame: &[u8]) -> Result<(MgmtHdr, &[u8]), FrameParseError> {
    need(frame, MGMT_HDR_LEN)?;
    let hdr = MgmtHdr {
        frame_ctrl: LittleEndian::read_u16(&frame[0..2]),
        duration: LittleEndian::read_u16(&frame[2..4]),
        addr1: read_addr(&frame[4..10]),
        addr2: read_addr(&frame[10..16]),
        addr3: read_addr(&frame[16..22]),
        seq_ctrl: LittleEndian::read_u16(&frame[22..24]),
    };
    if hdr.frame_type() != FRAME_TYPE_MGMT {
        return Err(FrameParseError::UnsupportedType);
    }
    Ok((hdr, &frame[MGMT_HDR_LEN..]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthFields {
    pub algorithm: u16,
    pub sequence: u16,
    pub status: u16,
}

/// Parse an authentication frame body into its fixed fields and trailing IEs
/// (the challenge text, when present, rides in the IEs).
pub fn parse_auth(body: &[u8]) -> Result<(AuthFields, &[u8]), FrameParseError> {
    need(body, 6)?;
    let fields = AuthFields {
        algorithm: LittleEndian::read_u16(&body[0..2]),
        sequence: LittleEndian::read_u16(&body[2..4]),
        status: LittleEndian::read_u16(&body[4..6]),
    };
    Ok((fields, &body[6..]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconFields {
    pub timestamp: u64,
    pub beacon_interval: u16,
    pub capability: u16,
}

/// Parse a beacon or probe response body.
pub fn parse_beacon(body: &[u8]) -> Result<(BeaconFields, &[u8]), FrameParseError> {
    need(body, 12)?;
    let fields = BeaconFields {
        timestamp: LittleEndian::read_u64(&body[0..8]),
        beacon_interval: LittleEndian::read_u16(&body[8..10]),
        capability: LittleEndian::read_u16(&body[10..12]),
    };
    Ok((fields, &body[12..]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssocRspFields {
    pub capability: u16,
    pub status: u16,
    pub aid: u16,
}

pub fn parse_assoc_rsp(body: &[u8]) -> Result<(AssocRspFields, &[u8]), FrameParseError> {
    need(body, 6)?;
    let fields = AssocRspFields {
        capability: LittleEndian::read_u16(&body[0..2]),
        status: LittleEndian::read_u16(&body[2..4]),
        // Association ID carries two reserved MSBs.
        aid: LittleEndian::read_u16(&body[4..6]) & 0x3fff,
    };
    Ok((fields, &body[6..]))
}

/// Reason code of a deauth or disassoc body.
pub fn parse_reason(body: &[u8]) -> Result<u16, FrameParseError> {
    need(body, 2)?;
    Ok(LittleEndian::read_u16(&body[0..2]))
}

fn frame_ctrl(frame_type: u8, subtype: u8, flags: u16) -> u16 {
    ((frame_type as u16) << 2) | ((subtype as u16) << 4) | flags
}

// The sequence number field is filled in by the device at transmit time.
fn write_mgmt_hdr(buf: &mut Vec<u8>, subtype: u8, addr1: &MacAddr, addr2: &MacAddr, addr3: &MacAddr) {
    buf.extend_from_slice(&frame_ctrl(FRAME_TYPE_MGMT, subtype, 0).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // duration
    buf.extend_from_slice(addr1);
    buf.extend_from_slice(addr2);
    buf.extend_from_slice(addr3);
    buf.extend_from_slice(&0u16.to_le_bytes()); // seq ctrl
}

fn write_ie(buf: &mut Vec<u8>, id: u8, body: &[u8]) {
    debug_assert!(body.len() <= 255);
    buf.push(id);
    buf.push(body.len() as u8);
    buf.extend_from_slice(body);
}

pub fn make_auth_frame(
    peer: &MacAddr,
    own: &MacAddr,
    bssid: &MacAddr,
    algorithm: u16,
    sequence: u16,
    status: u16,
    challenge: Option<&[u8]>,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MGMT_HDR_LEN + 6 + 2 + challenge.map_or(0, <[u8]>::len));
    write_mgmt_hdr(&mut buf, MGMT_SUBTYPE_AUTH, peer, own, bssid);
    buf.extend_from_slice(&algorithm.to_le_bytes());
    buf.extend_from_slice(&sequence.to_le_bytes());
    buf.extend_from_slice(&status.to_le_bytes());
    if let Some(text) = challenge {
        write_ie(&mut buf, crate::ie::IE_CHALLENGE, text);
    }
    buf
}

pub fn make_assoc_req_frame(
    peer: &MacAddr,
    own: &MacAddr,
    capability: u16,
    listen_interval: u16,
    ssid: &[u8],
    rates: &[u8],
    security_ie: Option<(u8, &[u8])>,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);
    write_mgmt_hdr(&mut buf, MGMT_SUBTYPE_ASSOC_REQ, peer, own, peer);
    buf.extend_from_slice(&capability.to_le_bytes());
    buf.extend_from_slice(&listen_interval.to_le_bytes());
    write_ie(&mut buf, crate::ie::IE_SSID, ssid);
    let (basic, ext) = rates.split_at(rates.len().min(8));
    write_ie(&mut buf, crate::ie::IE_SUPPORTED_RATES, basic);
    if !ext.is_empty() {
        write_ie(&mut buf, crate::ie::IE_EXT_SUPPORTED_RATES, ext);
    }
    if let Some((id, body)) = security_ie {
        write_ie(&mut buf, id, body);
    }
    buf
}

/// Probe request; an empty `ssid` is the wildcard probe.
pub fn make_probe_req_frame(own: &MacAddr, ssid: &[u8], rates: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    write_mgmt_hdr(&mut buf, MGMT_SUBTYPE_PROBE_REQ, &BCAST_ADDR, own, &BCAST_ADDR);
    write_ie(&mut buf, crate::ie::IE_SSID, ssid);
    let (basic, ext) = rates.split_at(rates.len().min(8));
    write_ie(&mut buf, crate::ie::IE_SUPPORTED_RATES, basic);
    if !ext.is_empty() {
        write_ie(&mut buf, crate::ie::IE_EXT_SUPPORTED_RATES, ext);
    }
    buf
}

pub fn make_deauth_frame(peer: &MacAddr, own: &MacAddr, bssid: &MacAddr, reason: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MGMT_HDR_LEN + 2);
    write_mgmt_hdr(&mut buf, MGMT_SUBTYPE_DEAUTH, peer, own, bssid);
    buf.extend_from_slice(&reason.to_le_bytes());
    buf
}

pub fn make_disassoc_frame(peer: &MacAddr, own: &MacAddr, bssid: &MacAddr, reason: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MGMT_HDR_LEN + 2);
    write_mgmt_hdr(&mut buf, MGMT_SUBTYPE_DISASSOC, peer, own, bssid);
    buf.extend_from_slice(&reason.to_le_bytes());
    buf
}

/// Null-data keep-alive toward the AP.
pub fn make_null_data_frame(bssid: &MacAddr, own: &MacAddr) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DATA_HDR_LEN);
    buf.extend_from_slice(&frame_ctrl(FRAME_TYPE_DATA, DATA_SUBTYPE_NULL, FC_TO_DS).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(bssid); // addr1: AP
    buf.extend_from_slice(own); // addr2: source
    buf.extend_from_slice(bssid); // addr3: BSSID
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_variant;

    const PEER: MacAddr = [2, 2, 2, 2, 2, 2];
    const OWN: MacAddr = [7, 7, 7, 7, 7, 7];

    #[test]
    fn auth_frame_round_trips() {
        let frame = make_auth_frame(&PEER, &OWN, &PEER, AUTH_ALG_SHARED, 3, STATUS_SUCCESS, Some(b"challenge"));
        let (hdr, body) = parse_mgmt_frame(&frame).expect("valid frame");
        assert_eq!(hdr.frame_subtype(), MGMT_SUBTYPE_AUTH);
        assert_eq!(hdr.addr1, PEER);
        assert_eq!(hdr.addr2, OWN);

        let (fields, ies) = parse_auth(body).expect("valid auth body");
        assert_eq!(fields, AuthFields { algorithm: 1, sequence: 3, status: 0 });
        assert_eq!(crate::ie::find(ies, crate::ie::IE_CHALLENGE), Some(&b"challenge"[..]));
    }

    #[test]
    fn assoc_req_carries_ssid_and_split_rates() {
        let rates = [0x82, 0x84, 0x8b, 0x96, 0x0c, 0x12, 0x18, 0x24, 0x30, 0x48];
        let frame = make_assoc_req_frame(&PEER, &OWN, CAP_ESS, 10, b"ssid", &rates, None);
        let (hdr, body) = parse_mgmt_frame(&frame).expect("valid frame");
        assert_eq!(hdr.frame_subtype(), MGMT_SUBTYPE_ASSOC_REQ);
        let ies = &body[4..];
        assert_eq!(crate::ie::find(ies, crate::ie::IE_SSID), Some(&b"ssid"[..]));
        assert_eq!(crate::ie::find(ies, crate::ie::IE_SUPPORTED_RATES).map(<[u8]>::len), Some(8));
        assert_eq!(
            crate::ie::find(ies, crate::ie::IE_EXT_SUPPORTED_RATES),
            Some(&rates[8..])
        );
    }

    #[test]
    fn truncated_header_rejected() {
        assert_variant!(
            parse_mgmt_frame(&[0u8; MGMT_HDR_LEN - 1]),
            Err(FrameParseError::TooShort { .. })
        );
    }

    #[test]
    fn data_frame_rejected_as_mgmt() {
        let frame = make_null_data_frame(&PEER, &OWN);
        assert_variant!(parse_mgmt_frame(&frame), Err(FrameParseError::UnsupportedType));
    }

    #[test]
    fn assoc_rsp_masks_reserved_aid_bits() {
        let body = [0x01, 0x00, 0x00, 0x00, 0x2a, 0xc0];
        let (fields, _) = parse_assoc_rsp(&body).expect("valid body");
        assert_eq!(fields.aid, 0x2a);
        assert_eq!(fields.status, STATUS_SUCCESS);
    }

    #[test]
    fn null_data_sets_to_ds() {
        let frame = make_null_data_frame(&PEER, &OWN);
        let fc = LittleEndian::read_u16(&frame[0..2]);
        assert_eq!((fc >> 2) & 0b11, FRAME_TYPE_DATA as u16);
        assert_eq!((fc >> 4) & 0b1111, DATA_SUBTYPE_NULL as u16);
        assert_ne!(fc & FC_TO_DS, 0);
    }
}
