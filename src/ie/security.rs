// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Parsing of the security-describing elements (WPA vendor IE, RSN, WAPI)
//! into a [`SecurityDescriptor`]. Parsing fails closed: a malformed element
//! marks the BSS unsupported, never open.

use {
    super::{Reader, IE_RSN, IE_VENDOR_SPECIFIC, IE_WAPI},
    bytes::Buf,
    log::debug,
    std::io::Cursor,
    thiserror::Error,
};

const OUI_MSFT: [u8; 3] = [0x00, 0x50, 0xf2];
const OUI_RSN: [u8; 3] = [0x00, 0x0f, 0xac];
const OUI_WAPI: [u8; 3] = [0x00, 0x14, 0x72];
const VENDOR_TYPE_WPA: u8 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecurityIeError {
    #[error("security element truncated")]
    Truncated,
    #[error("unsupported security element version {0}")]
    UnsupportedVersion(u16),
}

/// Ciphers in ascending strength order within their family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Cipher {
    None,
    Wep40,
    Wep104,
    Tkip,
    Ccmp,
    Sms4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Open,
    Shared,
    Wpa,
    WpaPsk,
    Wpa2,
    Wpa2Psk,
    WapiCert,
    WapiPsk,
    /// Advertised suites we cannot interoperate with. Matches no profile.
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityDescriptor {
    pub auth_mode: AuthMode,
    /// Second AKM the network advertises, e.g. WPA2 alongside WPA2-PSK.
    pub auth_mode_aux: Option<AuthMode>,
    pub group_cipher: Cipher,
    pub pairwise_cipher: Cipher,
    /// Weaker pairwise cipher also advertised, in mixed TKIP/CCMP networks.
    pub pairwise_cipher_aux: Option<Cipher>,
    pub rsn_capabilities: u16,
    pub mixed_mode: bool,
}

impl Default for SecurityDescriptor {
    fn default() -> Self {
        SecurityDescriptor {
            auth_mode: AuthMode::Open,
            auth_mode_aux: None,
            group_cipher: Cipher::None,
            pairwise_cipher: Cipher::None,
            pairwise_cipher_aux: None,
            rsn_capabilities: 0,
            mixed_mode: false,
        }
    }
}

impl SecurityDescriptor {
    pub fn open() -> Self {
        Self::default()
    }

    /// Fail-closed descriptor: matches no connect profile.
    pub fn unsupported() -> Self {
        SecurityDescriptor { auth_mode: AuthMode::Unknown, ..Self::default() }
    }

    pub fn is_open(&self) -> bool {
        self.auth_mode == AuthMode::Open
    }

    fn finish(mut self) -> Self {
        self.mixed_mode = self.group_cipher != self.pairwise_cipher;
        self
    }
}

fn read_suite(reader: &mut Cursor<&[u8]>) -> Result<[u8; 4], SecurityIeError> {
    if reader.remaining() < 4 {
        return Err(SecurityIeError::Truncated);
    }
    let mut suite = [0u8; 4];
    reader.copy_to_slice(&mut suite);
    Ok(suite)
}

fn read_u16(reader: &mut Cursor<&[u8]>) -> Result<u16, SecurityIeError> {
    if reader.remaining() < 2 {
        return Err(SecurityIeError::Truncated);
    }
    Ok(reader.get_u16_le())
}

fn cipher_from_suite(suite: [u8; 4], family_oui: [u8; 3]) -> Cipher {
    if suite[..3] != family_oui {
        return Cipher::None;
    }
    match suite[3] {
        1 => Cipher::Wep40,
        2 => Cipher::Tkip,
        4 => Cipher::Ccmp,
        5 => Cipher::Wep104,
        _ => Cipher::None,
    }
}

fn akm_from_suite(suite: [u8; 4], wpa2: bool) -> Option<AuthMode> {
    let family = if wpa2 { OUI_RSN } else { OUI_MSFT };
    if suite[..3] != family {
        return None;
    }
    match (suite[3], wpa2) {
        (1, false) => Some(AuthMode::Wpa),
        (2, false) => Some(AuthMode::WpaPsk),
        (1, true) => Some(AuthMode::Wpa2),
        (2, true) => Some(AuthMode::Wpa2Psk),
        _ => None,
    }
}

/// Read a cipher suite list, returning the strongest as primary and the
/// strongest of the rest as auxiliary.
fn read_cipher_list(
    reader: &mut Cursor<&[u8]>,
    family_oui: [u8; 3],
) -> Result<(Cipher, Option<Cipher>), SecurityIeError> {
    let count = read_u16(reader)? as usize;
    let mut primary = Cipher::None;
    let mut aux = None;
    for _ in 0..count {
        let cipher = cipher_from_suite(read_suite(reader)?, family_oui);
        if cipher > primary {
            if primary != Cipher::None {
                aux = Some(primary);
            }
            primary = cipher;
        } else if cipher != Cipher::None && cipher != primary && aux.map_or(true, |a| cipher > a) {
            aux = Some(cipher);
        }
    }
    Ok((primary, aux))
}

fn read_akm_list(
    reader: &mut Cursor<&[u8]>,
    wpa2: bool,
) -> Result<(AuthMode, Option<AuthMode>), SecurityIeError> {
    let count = read_u16(reader)? as usize;
    let mut primary = None;
    let mut aux = None;
    for _ in 0..count {
        match akm_from_suite(read_suite(reader)?, wpa2) {
            Some(mode) if primary.is_none() => primary = Some(mode),
            Some(mode) if aux.is_none() && Some(mode) != primary => aux = Some(mode),
            _ => (),
        }
    }
    match primary {
        Some(mode) => Ok((mode, aux)),
        // Suites were listed but none is one we speak.
        None if count > 0 => Ok((AuthMode::Unknown, None)),
        None => Ok((if wpa2 { AuthMode::Wpa2Psk } else { AuthMode::WpaPsk }, None)),
    }
}

/// Parse an RSN element body (after the ID/length header). All fields past
/// the version are optional; defaults are CCMP with PSK, per the standard.
pub fn parse_rsn(body: &[u8]) -> Result<SecurityDescriptor, SecurityIeError> {
    let mut reader = Cursor::new(body);
    let version = read_u16(&mut reader)?;
    if version != 1 {
        return Err(SecurityIeError::UnsupportedVersion(version));
    }
    let mut desc = SecurityDescriptor {
        auth_mode: AuthMode::Wpa2Psk,
        group_cipher: Cipher::Ccmp,
        pairwise_cipher: Cipher::Ccmp,
        ..SecurityDescriptor::default()
    };
    if reader.remaining() < 4 {
        return Ok(desc.finish());
    }
    desc.group_cipher = cipher_from_suite(read_suite(&mut reader)?, OUI_RSN);
    if !reader.has_remaining() {
        return Ok(desc.finish());
    }
    let (pairwise, pairwise_aux) = read_cipher_list(&mut reader, OUI_RSN)?;
    desc.pairwise_cipher = pairwise;
    desc.pairwise_cipher_aux = pairwise_aux;
    if !reader.has_remaining() {
        return Ok(desc.finish());
    }
    let (akm, akm_aux) = read_akm_list(&mut reader, true)?;
    desc.auth_mode = akm;
    desc.auth_mode_aux = akm_aux;
    if reader.remaining() >= 2 {
        desc.rsn_capabilities = reader.get_u16_le();
    }
    Ok(desc.finish())
}

/// Parse a WPA1 vendor element body, past the OUI and vendor type.
pub fn parse_wpa(body: &[u8]) -> Result<SecurityDescriptor, SecurityIeError> {
    let mut reader = Cursor::new(body);
    let version = read_u16(&mut reader)?;
    if version != 1 {
        return Err(SecurityIeError::UnsupportedVersion(version));
    }
    let mut desc = SecurityDescriptor {
        auth_mode: AuthMode::WpaPsk,
        group_cipher: Cipher::Tkip,
        pairwise_cipher: Cipher::Tkip,
        ..SecurityDescriptor::default()
    };
    if reader.remaining() < 4 {
        return Ok(desc.finish());
    }
    desc.group_cipher = cipher_from_suite(read_suite(&mut reader)?, OUI_MSFT);
    if !reader.has_remaining() {
        return Ok(desc.finish());
    }
    let (pairwise, pairwise_aux) = read_cipher_list(&mut reader, OUI_MSFT)?;
    desc.pairwise_cipher = pairwise;
    desc.pairwise_cipher_aux = pairwise_aux;
    if !reader.has_remaining() {
        return Ok(desc.finish());
    }
    let (akm, akm_aux) = read_akm_list(&mut reader, false)?;
    desc.auth_mode = akm;
    desc.auth_mode_aux = akm_aux;
    Ok(desc.finish())
}

/// Parse a WAPI element body. The AKM list precedes the cipher list in WAPI.
pub fn parse_wapi(body: &[u8]) -> Result<SecurityDescriptor, SecurityIeError> {
    let mut reader = Cursor::new(body);
    let version = read_u16(&mut reader)?;
    if version != 1 {
        return Err(SecurityIeError::UnsupportedVersion(version));
    }
    let mut desc = SecurityDescriptor {
        auth_mode: AuthMode::WapiPsk,
        group_cipher: Cipher::Sms4,
        pairwise_cipher: Cipher::Sms4,
        ..SecurityDescriptor::default()
    };
    if !reader.has_remaining() {
        return Ok(desc.finish());
    }
    let akm_count = read_u16(&mut reader)? as usize;
    let mut akm = None;
    for _ in 0..akm_count {
        let suite = read_suite(&mut reader)?;
        if suite[..3] == OUI_WAPI {
            let mode = match suite[3] {
                1 => Some(AuthMode::WapiCert),
                2 => Some(AuthMode::WapiPsk),
                _ => None,
            };
            if akm.is_none() {
                akm = mode;
            }
        }
    }
    if akm_count > 0 {
        desc.auth_mode = akm.unwrap_or(AuthMode::Unknown);
    }
    if !reader.has_remaining() {
        return Ok(desc.finish());
    }
    let cipher_count = read_u16(&mut reader)? as usize;
    for _ in 0..cipher_count {
        let suite = read_suite(&mut reader)?;
        if suite[..3] == OUI_WAPI && suite[3] == 1 {
            desc.pairwise_cipher = Cipher::Sms4;
        }
    }
    if reader.remaining() >= 4 {
        let suite = read_suite(&mut reader)?;
        if suite[..3] == OUI_WAPI && suite[3] == 1 {
            desc.group_cipher = Cipher::Sms4;
        }
    }
    Ok(desc.finish())
}

/// Derive the security descriptor of a BSS from its full IE chain. RSN takes
/// precedence over the WPA vendor element, which takes precedence over WAPI.
pub fn parse_security(ies: &[u8]) -> SecurityDescriptor {
    let mut wpa = None;
    let mut rsn = None;
    let mut wapi = None;
    for (id, body) in Reader::new(ies) {
        let result = match id {
            IE_RSN => Some((&mut rsn, parse_rsn(body))),
            IE_WAPI => Some((&mut wapi, parse_wapi(body))),
            IE_VENDOR_SPECIFIC
                if body.len() >= 4 && body[..3] == OUI_MSFT && body[3] == VENDOR_TYPE_WPA =>
            {
                Some((&mut wpa, parse_wpa(&body[4..])))
            }
            _ => None,
        };
        match result {
            Some((slot, Ok(desc))) => *slot = Some(desc),
            Some((_, Err(e))) => {
                debug!("malformed security element {}: {}", id, e);
                return SecurityDescriptor::unsupported();
            }
            None => (),
        }
    }
    match (rsn, wpa, wapi) {
        (Some(mut rsn), Some(wpa), _) => {
            // WPA2/WPA transition network: remember the legacy mode too.
            if rsn.auth_mode_aux.is_none() {
                rsn.auth_mode_aux = Some(wpa.auth_mode);
            }
            rsn
        }
        (Some(rsn), None, _) => rsn,
        (None, Some(wpa), _) => wpa,
        (None, None, Some(wapi)) => wapi,
        (None, None, None) => SecurityDescriptor::open(),
    }
}
