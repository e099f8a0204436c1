// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! v3 message envelope codec.
//!
//! ```text
//! SEQUENCE {
//!   msgVersion            INTEGER (3)
//!   msgGlobalData SEQUENCE {
//!       msgID             INTEGER  (0 .. 2^31-1)
//!       msgMaxSize        INTEGER  (484 .. 2^31-1)
//!       msgFlags          OCTET STRING (1 octet)
//!       msgSecurityModel  INTEGER  (1 .. 2^31-1)
//!   }
//!   msgSecurityParameters OCTET STRING   -- opaque here
//!   msgData CHOICE { plaintext ScopedPDU, encrypted OCTET STRING }
//! }
//! ```
//!
//! The codec builds the version+globalData prefix and the ScopedPDU and
//! parses the envelope; everything between (security parameters, outer
//! wrapping, authentication) belongs to the registered security model.

use bitflags::bitflags;

use crate::{
    asn1::{
        TAG_INTEGER, TAG_OCTET_STR, TAG_SEQUENCE, build::ForwardBuilder,
        parse::Reader, parse_err, rbuild::ReverseBuilder,
    },
    error::{ErrorKind, SnmpError, SnmpResult},
    models::pdu::{Pdu, PduType, SNMP_VERSION_3},
    security::SecurityLevel,
};

/// Smallest msgMaxSize a conforming engine may advertise.
pub const MSG_MAX_SIZE_MIN: i64 = 484;
/// Largest representable message size (2^31 - 1).
pub const MSG_MAX_SIZE_MAX: i64 = 0x7fff_ffff;

bitflags! {
    /// The single msgFlags octet.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MsgFlags: u8 {
        const AUTH       = 0x01;
        const PRIV       = 0x02;
        const REPORTABLE = 0x04;
    }
}

impl MsgFlags {
    /// Derive the wire flags: priv implies auth, confirmed commands are
    /// reportable.
    pub fn for_message(level: SecurityLevel, command: PduType) -> Self {
        let mut flags = MsgFlags::empty();
        if level.requires_auth() {
            flags |= MsgFlags::AUTH;
        }
        if level.requires_priv() {
            flags |= MsgFlags::AUTH | MsgFlags::PRIV;
        }
        if command.expects_response() {
            flags |= MsgFlags::REPORTABLE;
        }
        flags
    }

    /// Security level encoded in the flags; priv without auth is an
    /// invalid message.
    pub fn security_level(self) -> SnmpResult<SecurityLevel> {
        match (self.contains(MsgFlags::AUTH), self.contains(MsgFlags::PRIV)) {
            (false, true) => Err(SnmpError::with_detail(
                ErrorKind::InvalidMsg,
                "msgFlags has priv set without auth",
            )),
            (false, false) => Ok(SecurityLevel::NoAuthNoPriv),
            (true, false) => Ok(SecurityLevel::AuthNoPriv),
            (true, true) => Ok(SecurityLevel::AuthPriv),
        }
    }
}

/// Encode the `msgVersion INTEGER + msgGlobalData SEQUENCE` prefix the
/// security model places at the head of the outer sequence.
pub fn build_global_data(
    msg_id: i32,
    msg_max_size: i64,
    flags: MsgFlags,
    security_model: u32,
) -> SnmpResult<Vec<u8>> {
    let mut b = ForwardBuilder::new();
    b.push_int(TAG_INTEGER, SNMP_VERSION_3)?;
    let mark = b.begin_seq(TAG_SEQUENCE);
    b.push_int(TAG_INTEGER, msg_id as i64)?;
    b.push_int(TAG_INTEGER, msg_max_size)?;
    b.push_octets(TAG_OCTET_STR, &[flags.bits()])?;
    b.push_int(TAG_INTEGER, security_model as i64)?;
    b.end_seq(mark)?;
    Ok(b.into_bytes())
}

/// Forward-build the plaintext ScopedPDU.
pub fn build_scoped_pdu(pdu: &Pdu) -> SnmpResult<Vec<u8>> {
    let mut b = ForwardBuilder::new();
    let mark = b.begin_seq(TAG_SEQUENCE);
    b.push_octets(TAG_OCTET_STR, &pdu.context_engine_id)?;
    b.push_octets(TAG_OCTET_STR, &pdu.context_name)?;
    pdu.build_body(&mut b)?;
    b.end_seq(mark)?;
    Ok(b.into_bytes())
}

/// Reverse-build the plaintext ScopedPDU; bytes match
/// [`build_scoped_pdu`].
pub fn rbuild_scoped_pdu(pdu: &Pdu) -> SnmpResult<Vec<u8>> {
    let mut b = ReverseBuilder::new();
    let mark = b.mark();
    pdu.rbuild_body(&mut b)?;
    b.prepend_octets(TAG_OCTET_STR, &pdu.context_name)?;
    b.prepend_octets(TAG_OCTET_STR, &pdu.context_engine_id)?;
    b.wrap_seq(TAG_SEQUENCE, mark)?;
    Ok(b.into_bytes())
}

/// Parse a plaintext ScopedPDU into (contextEngineID, contextName, PDU).
pub fn parse_scoped_pdu(bytes: &[u8]) -> SnmpResult<(Vec<u8>, Vec<u8>, Pdu)> {
    let mut r = Reader::new(bytes);
    let mut seq = r.read_constructed(TAG_SEQUENCE)?;
    let context_engine_id = seq.read_octets(TAG_OCTET_STR)?.to_vec();
    let context_name = seq.read_octets(TAG_OCTET_STR)?.to_vec();
    let mut pdu = Pdu::parse_body(&mut seq)?;
    pdu.context_engine_id = context_engine_id.clone();
    pdu.context_name = context_name.clone();
    Ok((context_engine_id, context_name, pdu))
}

/// Parsed v3 envelope. Slices borrow from the receive buffer.
#[derive(Debug)]
pub struct Envelope<'a> {
    pub msg_id: i32,
    pub msg_max_size: i64,
    pub flags: MsgFlags,
    pub security_level: SecurityLevel,
    pub security_model: u32,
    /// Content of the msgSecurityParameters OCTET STRING.
    pub sec_params: &'a [u8],
    /// Offset of that content within the whole message.
    pub sec_params_offset: usize,
    /// The msgData TLV (plaintext ScopedPDU or encrypted OCTET STRING).
    pub msg_data: &'a [u8],
}

/// Parse the outer envelope down to (but not through) the security
/// parameters and msgData.
pub fn parse_envelope(whole: &[u8]) -> SnmpResult<Envelope<'_>> {
    let mut r = Reader::new(whole);
    let mut outer = r.read_constructed(TAG_SEQUENCE)?;

    let version = outer.read_i64(TAG_INTEGER)?;
    if version != SNMP_VERSION_3 {
        return Err(SnmpError::with_detail(
            ErrorKind::BadVersion,
            format!("unsupported protocol version {version}"),
        ));
    }

    let mut global = outer.read_constructed(TAG_SEQUENCE)?;
    let msg_id = global.read_i32(TAG_INTEGER)?;
    let msg_max_size = global.read_i64(TAG_INTEGER)?;
    if !(MSG_MAX_SIZE_MIN..=MSG_MAX_SIZE_MAX).contains(&msg_max_size) {
        return Err(parse_err(format!(
            "msgMaxSize {msg_max_size} outside [{MSG_MAX_SIZE_MIN}, {MSG_MAX_SIZE_MAX}]"
        )));
    }
    let flag_octets = global.read_octets(TAG_OCTET_STR)?;
    if flag_octets.len() != 1 {
        return Err(parse_err(format!(
            "msgFlags of {} octets, expected 1",
            flag_octets.len()
        )));
    }
    let flags = MsgFlags::from_bits_retain(flag_octets[0]);
    let security_level = flags.security_level()?;
    let security_model = global.read_u32(TAG_INTEGER)?;
    if security_model == 0 {
        return Err(parse_err("msgSecurityModel of zero"));
    }

    let sec_params = outer.read_octets(TAG_OCTET_STR)?;
    let sec_params_offset = sec_params.as_ptr() as usize - whole.as_ptr() as usize;
    let msg_data = outer.rest();
    if msg_data.is_empty() {
        return Err(parse_err("missing msgData"));
    }

    Ok(Envelope {
        msg_id,
        msg_max_size,
        flags,
        security_level,
        security_model,
        sec_params,
        sec_params_offset,
        msg_data,
    })
}

/// Stream framing helper: length of the next complete message in `buf`,
/// or `None` when more bytes are needed. Messages whose declared length
/// exceeds 2^31-1 are a hard error and close the stream.
pub fn check_packet(buf: &[u8]) -> SnmpResult<Option<usize>> {
    if buf.len() < 2 {
        return Ok(None);
    }
    if buf[0] != TAG_SEQUENCE {
        return Err(parse_err(format!(
            "message does not start with SEQUENCE (0x{:02x})",
            buf[0]
        )));
    }
    let first = buf[1];
    if first & 0x80 == 0 {
        return Ok(Some(2 + first as usize));
    }
    let n = (first & 0x7f) as usize;
    if n == 0 || n > 4 {
        return Err(SnmpError::with_detail(
            ErrorKind::TooLong,
            format!("unsupported packet length of {n} octets"),
        ));
    }
    if buf.len() < 2 + n {
        return Ok(None);
    }
    let mut len = 0usize;
    for byte in &buf[2..2 + n] {
        len = (len << 8) | *byte as usize;
    }
    if len > crate::asn1::MAX_BER_LEN {
        return Err(SnmpError::with_detail(
            ErrorKind::TooLong,
            format!("packet length {len} exceeds 2^31-1"),
        ));
    }
    Ok(Some(2 + n + len))
}
