// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! BER encode/parse primitives for the v3 message and PDU layers.
//!
//! Two emission modes exist side by side:
//!
//! * [`build::ForwardBuilder`] writes head-to-tail and back-fills sequence
//!   lengths once the content is known.
//! * [`rbuild::ReverseBuilder`] writes tail-to-head, growing the buffer on
//!   demand, which lets the message codec wrap already-encoded payloads
//!   without copying them.
//!
//! Both modes share the payload encoders below, so for identical inputs
//! they produce identical bytes.

pub mod build;
pub mod parse;
pub mod rbuild;

use crate::error::{ErrorKind, SnmpError, SnmpResult};

// Universal classes.
pub const TAG_BOOLEAN: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_BIT_STR: u8 = 0x03;
pub const TAG_OCTET_STR: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OBJECT_ID: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;

// SNMP application classes.
pub const TAG_IPADDRESS: u8 = 0x40;
pub const TAG_COUNTER32: u8 = 0x41;
pub const TAG_GAUGE32: u8 = 0x42;
pub const TAG_TIMETICKS: u8 = 0x43;
pub const TAG_OPAQUE: u8 = 0x44;
pub const TAG_COUNTER64: u8 = 0x46;
pub const TAG_UINTEGER: u8 = 0x47;
pub const TAG_FLOAT: u8 = 0x48;
pub const TAG_DOUBLE: u8 = 0x49;

// Exception markers inside varbinds (context class, primitive).
pub const TAG_NO_SUCH_OBJECT: u8 = 0x80;
pub const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
pub const TAG_END_OF_MIB_VIEW: u8 = 0x82;

// Opaque-wrapped extended types: the Opaque payload starts with the
// two-byte tag 9F 7x.
pub const TAG_OPAQUE_EXT1: u8 = 0x9f;
pub const OPAQUE_EXT_BASE: u8 = 0x70;
pub const TAG_OPAQUE_FLOAT: u8 = OPAQUE_EXT_BASE + 0x08;
pub const TAG_OPAQUE_DOUBLE: u8 = OPAQUE_EXT_BASE + 0x09;
pub const TAG_OPAQUE_I64: u8 = OPAQUE_EXT_BASE + 0x0a;
pub const TAG_OPAQUE_U64: u8 = OPAQUE_EXT_BASE + 0x0b;
pub const TAG_OPAQUE_COUNTER64: u8 = OPAQUE_EXT_BASE + 0x06;

/// Largest length the codec will emit or accept (2^31 - 1).
pub const MAX_BER_LEN: usize = 0x7fff_ffff;

pub(crate) fn build_err(detail: impl Into<String>) -> SnmpError {
    SnmpError::with_detail(ErrorKind::BadAsn1Build, detail)
}

pub(crate) fn parse_err(detail: impl Into<String>) -> SnmpError {
    SnmpError::with_detail(ErrorKind::Asn1Parse, detail)
}

/// Definite-form length octets: short form below 128, minimal long form
/// otherwise.
pub fn encode_length(len: usize) -> SnmpResult<Vec<u8>> {
    if len > MAX_BER_LEN {
        return Err(SnmpError::with_detail(
            ErrorKind::TooLong,
            format!("BER length {len} exceeds 2^31-1"),
        ));
    }
    if len < 0x80 {
        return Ok(vec![len as u8]);
    }
    let bytes = (len as u32).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let mut out = Vec::with_capacity(1 + 4 - skip);
    out.push(0x80 | (4 - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
    Ok(out)
}

/// Minimal two's-complement payload of a signed integer (1..=8 octets).
pub fn int_payload(v: i64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        // A leading octet is redundant when it only repeats the sign bit.
        let sign_only = bytes[start] == 0 && bytes[start + 1] & 0x80 == 0
            || bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0;
        if !sign_only {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Minimal payload of an unsigned integer: the value is kept positive by
/// prefixing a zero octet whenever the top bit would be set.
pub fn uint_payload(v: u64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    let mut out = Vec::with_capacity(9 - skip);
    if bytes[skip] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[skip..]);
    out
}

/// Base-128 subidentifier encoding with the leading-pair compaction.
pub fn oid_payload(subids: &[u32]) -> SnmpResult<Vec<u8>> {
    let mut out = Vec::with_capacity(subids.len() + 4);
    if subids.is_empty() {
        return Ok(out);
    }
    let first = subids[0];
    let second = subids.get(1).copied().unwrap_or(0);
    if first > 2 {
        return Err(build_err(format!("first OID subid {first} exceeds 2")));
    }
    if first < 2 && second >= 40 {
        return Err(build_err(format!(
            "second OID subid {second} too large under arc {first}"
        )));
    }
    if first == 2 && second > u32::MAX - 80 {
        return Err(build_err(format!(
            "second OID subid {second} overflows the leading pair"
        )));
    }
    push_subid(&mut out, first * 40 + second);
    for subid in &subids[2..] {
        push_subid(&mut out, *subid);
    }
    Ok(out)
}

fn push_subid(out: &mut Vec<u8>, subid: u32) {
    let mut chunks = [0u8; 5];
    let mut n = 0;
    let mut v = subid;
    loop {
        chunks[n] = (v & 0x7f) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let mut byte = chunks[i];
        if i != 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
}
