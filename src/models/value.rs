// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed variable-binding values and their wire round-trip.
//!
//! The Opaque-wrapped extended types (Float/Double/I64/U64) travel inside
//! an ordinary Opaque octet string whose payload starts with the two-byte
//! tag `9F 7x`; the parser sniffs that prefix and surfaces the typed
//! variant, falling back to a raw Opaque for anything else.

use crate::{
    asn1::{
        self, TAG_BIT_STR, TAG_COUNTER32, TAG_COUNTER64, TAG_END_OF_MIB_VIEW,
        TAG_GAUGE32, TAG_INTEGER, TAG_IPADDRESS, TAG_NO_SUCH_INSTANCE,
        TAG_NO_SUCH_OBJECT, TAG_NULL, TAG_OBJECT_ID, TAG_OCTET_STR, TAG_OPAQUE,
        TAG_OPAQUE_DOUBLE, TAG_OPAQUE_EXT1, TAG_OPAQUE_FLOAT, TAG_OPAQUE_I64,
        TAG_OPAQUE_U64, TAG_TIMETICKS, TAG_UINTEGER, build::ForwardBuilder,
        parse::Reader, parse_err, rbuild::ReverseBuilder,
    },
    error::SnmpResult,
    models::oid::Oid,
};

/// One typed SNMP value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i32),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    UInteger(u32),
    Counter64(u64),
    OctetString(Vec<u8>),
    IpAddress([u8; 4]),
    Opaque(Vec<u8>),
    BitString(Vec<u8>),
    ObjectIdentifier(Oid),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
    OpaqueFloat(f32),
    OpaqueDouble(f64),
    OpaqueI64(i64),
    OpaqueU64(u64),
}

impl Value {
    /// Wire tag of the outer TLV this value encodes to.
    pub fn tag(&self) -> u8 {
        match self {
            Value::Integer(_) => TAG_INTEGER,
            Value::Counter32(_) => TAG_COUNTER32,
            Value::Gauge32(_) => TAG_GAUGE32,
            Value::TimeTicks(_) => TAG_TIMETICKS,
            Value::UInteger(_) => TAG_UINTEGER,
            Value::Counter64(_) => TAG_COUNTER64,
            Value::OctetString(_) => TAG_OCTET_STR,
            Value::IpAddress(_) => TAG_IPADDRESS,
            Value::Opaque(_)
            | Value::OpaqueFloat(_)
            | Value::OpaqueDouble(_)
            | Value::OpaqueI64(_)
            | Value::OpaqueU64(_) => TAG_OPAQUE,
            Value::BitString(_) => TAG_BIT_STR,
            Value::ObjectIdentifier(_) => TAG_OBJECT_ID,
            Value::Null => TAG_NULL,
            Value::NoSuchObject => TAG_NO_SUCH_OBJECT,
            Value::NoSuchInstance => TAG_NO_SUCH_INSTANCE,
            Value::EndOfMibView => TAG_END_OF_MIB_VIEW,
        }
    }

    fn opaque_ext_payload(tag2: u8, inner: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(3 + inner.len());
        payload.push(TAG_OPAQUE_EXT1);
        payload.push(tag2);
        payload.push(inner.len() as u8);
        payload.extend_from_slice(inner);
        payload
    }

    /// Append this value to a forward build.
    pub fn build(&self, b: &mut ForwardBuilder) -> SnmpResult<()> {
        match self {
            Value::Integer(v) => b.push_int(TAG_INTEGER, *v as i64),
            Value::Counter32(v) => b.push_uint(TAG_COUNTER32, *v as u64),
            Value::Gauge32(v) => b.push_uint(TAG_GAUGE32, *v as u64),
            Value::TimeTicks(v) => b.push_uint(TAG_TIMETICKS, *v as u64),
            Value::UInteger(v) => b.push_uint(TAG_UINTEGER, *v as u64),
            Value::Counter64(v) => b.push_uint(TAG_COUNTER64, *v),
            Value::OctetString(s) => b.push_octets(TAG_OCTET_STR, s),
            Value::IpAddress(a) => b.push_octets(TAG_IPADDRESS, a),
            Value::Opaque(s) => b.push_octets(TAG_OPAQUE, s),
            Value::BitString(s) => b.push_octets(TAG_BIT_STR, s),
            Value::ObjectIdentifier(oid) => {
                b.push_oid(TAG_OBJECT_ID, oid.as_slice())
            },
            Value::Null => b.push_null(TAG_NULL),
            Value::NoSuchObject => b.push_null(TAG_NO_SUCH_OBJECT),
            Value::NoSuchInstance => b.push_null(TAG_NO_SUCH_INSTANCE),
            Value::EndOfMibView => b.push_null(TAG_END_OF_MIB_VIEW),
            Value::OpaqueFloat(v) => b.push_octets(
                TAG_OPAQUE,
                &Self::opaque_ext_payload(TAG_OPAQUE_FLOAT, &v.to_be_bytes()),
            ),
            Value::OpaqueDouble(v) => b.push_octets(
                TAG_OPAQUE,
                &Self::opaque_ext_payload(TAG_OPAQUE_DOUBLE, &v.to_be_bytes()),
            ),
            Value::OpaqueI64(v) => b.push_octets(
                TAG_OPAQUE,
                &Self::opaque_ext_payload(TAG_OPAQUE_I64, &asn1::int_payload(*v)),
            ),
            Value::OpaqueU64(v) => b.push_octets(
                TAG_OPAQUE,
                &Self::opaque_ext_payload(TAG_OPAQUE_U64, &asn1::uint_payload(*v)),
            ),
        }
    }

    /// Prepend this value to a reverse build; bytes match [`Value::build`].
    pub fn rbuild(&self, b: &mut ReverseBuilder) -> SnmpResult<()> {
        match self {
            Value::Integer(v) => b.prepend_int(TAG_INTEGER, *v as i64),
            Value::Counter32(v) => b.prepend_uint(TAG_COUNTER32, *v as u64),
            Value::Gauge32(v) => b.prepend_uint(TAG_GAUGE32, *v as u64),
            Value::TimeTicks(v) => b.prepend_uint(TAG_TIMETICKS, *v as u64),
            Value::UInteger(v) => b.prepend_uint(TAG_UINTEGER, *v as u64),
            Value::Counter64(v) => b.prepend_uint(TAG_COUNTER64, *v),
            Value::OctetString(s) => b.prepend_octets(TAG_OCTET_STR, s),
            Value::IpAddress(a) => b.prepend_octets(TAG_IPADDRESS, a),
            Value::Opaque(s) => b.prepend_octets(TAG_OPAQUE, s),
            Value::BitString(s) => b.prepend_octets(TAG_BIT_STR, s),
            Value::ObjectIdentifier(oid) => {
                b.prepend_oid(TAG_OBJECT_ID, oid.as_slice())
            },
            Value::Null => b.prepend_null(TAG_NULL),
            Value::NoSuchObject => b.prepend_null(TAG_NO_SUCH_OBJECT),
            Value::NoSuchInstance => b.prepend_null(TAG_NO_SUCH_INSTANCE),
            Value::EndOfMibView => b.prepend_null(TAG_END_OF_MIB_VIEW),
            Value::OpaqueFloat(v) => b.prepend_octets(
                TAG_OPAQUE,
                &Self::opaque_ext_payload(TAG_OPAQUE_FLOAT, &v.to_be_bytes()),
            ),
            Value::OpaqueDouble(v) => b.prepend_octets(
                TAG_OPAQUE,
                &Self::opaque_ext_payload(TAG_OPAQUE_DOUBLE, &v.to_be_bytes()),
            ),
            Value::OpaqueI64(v) => b.prepend_octets(
                TAG_OPAQUE,
                &Self::opaque_ext_payload(TAG_OPAQUE_I64, &asn1::int_payload(*v)),
            ),
            Value::OpaqueU64(v) => b.prepend_octets(
                TAG_OPAQUE,
                &Self::opaque_ext_payload(TAG_OPAQUE_U64, &asn1::uint_payload(*v)),
            ),
        }
    }

    /// Parse the next TLV as a value.
    pub fn parse(r: &mut Reader<'_>) -> SnmpResult<Value> {
        let tag = r.peek_tag()?;
        Ok(match tag {
            TAG_INTEGER => Value::Integer(r.read_i32(TAG_INTEGER)?),
            TAG_COUNTER32 => Value::Counter32(r.read_u32(TAG_COUNTER32)?),
            TAG_GAUGE32 => Value::Gauge32(r.read_u32(TAG_GAUGE32)?),
            TAG_TIMETICKS => Value::TimeTicks(r.read_u32(TAG_TIMETICKS)?),
            TAG_UINTEGER => Value::UInteger(r.read_u32(TAG_UINTEGER)?),
            TAG_COUNTER64 => Value::Counter64(r.read_u64(TAG_COUNTER64)?),
            TAG_OCTET_STR => {
                Value::OctetString(r.read_octets(TAG_OCTET_STR)?.to_vec())
            },
            TAG_IPADDRESS => {
                let octets = r.read_octets(TAG_IPADDRESS)?;
                let addr: [u8; 4] = octets.try_into().map_err(|_| {
                    parse_err(format!(
                        "IpAddress of {} octets, expected 4",
                        octets.len()
                    ))
                })?;
                Value::IpAddress(addr)
            },
            TAG_OPAQUE => Self::parse_opaque(r.read_octets(TAG_OPAQUE)?)?,
            TAG_BIT_STR => Value::BitString(r.read_octets(TAG_BIT_STR)?.to_vec()),
            TAG_OBJECT_ID => {
                Value::ObjectIdentifier(Oid::from_vec(r.read_oid(TAG_OBJECT_ID)?)?)
            },
            TAG_NULL => {
                r.read_null(TAG_NULL)?;
                Value::Null
            },
            TAG_NO_SUCH_OBJECT => {
                r.read_empty(TAG_NO_SUCH_OBJECT)?;
                Value::NoSuchObject
            },
            TAG_NO_SUCH_INSTANCE => {
                r.read_empty(TAG_NO_SUCH_INSTANCE)?;
                Value::NoSuchInstance
            },
            TAG_END_OF_MIB_VIEW => {
                r.read_empty(TAG_END_OF_MIB_VIEW)?;
                Value::EndOfMibView
            },
            other => {
                return Err(parse_err(format!(
                    "unsupported value tag 0x{other:02x}"
                )));
            },
        })
    }

    fn parse_opaque(content: &[u8]) -> SnmpResult<Value> {
        if content.len() < 3 || content[0] != TAG_OPAQUE_EXT1 {
            return Ok(Value::Opaque(content.to_vec()));
        }
        let tag2 = content[1];
        let len = content[2] as usize;
        let inner = &content[3..];
        if inner.len() != len {
            return Err(parse_err("opaque extension length mismatch"));
        }
        Ok(match tag2 {
            TAG_OPAQUE_FLOAT => {
                let arr: [u8; 4] = inner
                    .try_into()
                    .map_err(|_| parse_err("opaque float is not 4 octets"))?;
                Value::OpaqueFloat(f32::from_be_bytes(arr))
            },
            TAG_OPAQUE_DOUBLE => {
                let arr: [u8; 8] = inner
                    .try_into()
                    .map_err(|_| parse_err("opaque double is not 8 octets"))?;
                Value::OpaqueDouble(f64::from_be_bytes(arr))
            },
            TAG_OPAQUE_I64 => {
                if inner.is_empty() || inner.len() > 8 {
                    return Err(parse_err("opaque int64 width out of range"));
                }
                let mut v: i64 = if inner[0] & 0x80 != 0 { -1 } else { 0 };
                for byte in inner {
                    v = (v << 8) | *byte as i64;
                }
                Value::OpaqueI64(v)
            },
            TAG_OPAQUE_U64 => {
                let inner = if inner.first() == Some(&0) && inner.len() > 1 {
                    &inner[1..]
                } else {
                    inner
                };
                if inner.is_empty() || inner.len() > 8 {
                    return Err(parse_err("opaque uint64 width out of range"));
                }
                let mut v: u64 = 0;
                for byte in inner {
                    v = (v << 8) | *byte as u64;
                }
                Value::OpaqueU64(v)
            },
            _ => Value::Opaque(content.to_vec()),
        })
    }
}
