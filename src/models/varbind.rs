// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::warn;

use crate::{
    asn1::{
        TAG_OBJECT_ID, TAG_SEQUENCE, build::ForwardBuilder, parse::Reader,
        rbuild::ReverseBuilder,
    },
    error::{ErrorKind, SnmpError, SnmpResult},
    models::{oid::Oid, value::Value},
};

/// One (name, value) pair inside a PDU. VarBinds keep insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    pub name: Oid,
    pub value: Value,
}

impl VarBind {
    pub fn new(name: Oid, value: Value) -> Self {
        Self { name, value }
    }

    /// Null-valued binding, the shape of every Get/GetNext/GetBulk entry.
    pub fn null(name: Oid) -> Self {
        Self {
            name,
            value: Value::Null,
        }
    }

    /// Coerce a platform-width integer into the wire-canonical 32-bit
    /// value for the integer family; truncation is tolerated with a
    /// warning, matching classic manager behaviour.
    pub fn from_i64(name: Oid, v: i64) -> Self {
        let truncated = v as i32;
        if truncated as i64 != v {
            warn!(value = v, "integer varbind truncated to 32 bits");
        }
        Self {
            name,
            value: Value::Integer(truncated),
        }
    }

    /// Same coercion for the unsigned family (Gauge32/Unsigned32).
    pub fn from_u64_gauge(name: Oid, v: u64) -> Self {
        let truncated = v as u32;
        if truncated as u64 != v {
            warn!(value = v, "unsigned varbind truncated to 32 bits");
        }
        Self {
            name,
            value: Value::Gauge32(truncated),
        }
    }

    /// IpAddress setter; anything but exactly 4 octets is refused.
    pub fn ip_address(name: Oid, octets: &[u8]) -> SnmpResult<Self> {
        let addr: [u8; 4] = octets.try_into().map_err(|_| {
            SnmpError::with_detail(
                ErrorKind::GenErr,
                format!("IpAddress of {} octets, expected 4", octets.len()),
            )
        })?;
        Ok(Self {
            name,
            value: Value::IpAddress(addr),
        })
    }

    pub fn build(&self, b: &mut ForwardBuilder) -> SnmpResult<()> {
        let mark = b.begin_seq(TAG_SEQUENCE);
        b.push_oid(TAG_OBJECT_ID, self.name.as_slice())?;
        self.value.build(b)?;
        b.end_seq(mark)
    }

    pub fn rbuild(&self, b: &mut ReverseBuilder) -> SnmpResult<()> {
        let mark = b.mark();
        self.value.rbuild(b)?;
        b.prepend_oid(TAG_OBJECT_ID, self.name.as_slice())?;
        b.wrap_seq(TAG_SEQUENCE, mark)
    }

    pub fn parse(r: &mut Reader<'_>) -> SnmpResult<Self> {
        let mut seq = r.read_constructed(TAG_SEQUENCE)?;
        let name = Oid::from_vec(seq.read_oid(TAG_OBJECT_ID)?)?;
        let value = Value::parse(&mut seq)?;
        Ok(Self { name, value })
    }
}

/// Build the varbind-list SEQUENCE forward.
pub fn build_list(b: &mut ForwardBuilder, varbinds: &[VarBind]) -> SnmpResult<()> {
    let mark = b.begin_seq(TAG_SEQUENCE);
    for vb in varbinds {
        vb.build(b)?;
    }
    b.end_seq(mark)
}

/// Build the varbind-list SEQUENCE in reverse (last binding first).
pub fn rbuild_list(b: &mut ReverseBuilder, varbinds: &[VarBind]) -> SnmpResult<()> {
    let mark = b.mark();
    for vb in varbinds.iter().rev() {
        vb.rbuild(b)?;
    }
    b.wrap_seq(TAG_SEQUENCE, mark)
}

pub fn parse_list(r: &mut Reader<'_>) -> SnmpResult<Vec<VarBind>> {
    let mut seq = r.read_constructed(TAG_SEQUENCE)?;
    let mut varbinds = Vec::new();
    while !seq.is_empty() {
        varbinds.push(VarBind::parse(&mut seq)?);
    }
    Ok(varbinds)
}
