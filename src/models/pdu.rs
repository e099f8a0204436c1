// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! In-memory PDU representation plus the BER round-trip of the PDU body
//! (the `data ANY` slot of a ScopedPDU).

use std::{any::Any, sync::Arc, time::Duration};

use bitflags::bitflags;

use crate::{
    asn1::{
        TAG_INTEGER, build::ForwardBuilder, parse::Reader, parse_err,
        rbuild::ReverseBuilder,
    },
    error::{ErrorKind, SnmpError, SnmpResult},
    models::{
        oid::Oid,
        varbind::{self, VarBind},
    },
    security::SecurityLevel,
};

/// v3 protocol version number on the wire.
pub const SNMP_VERSION_3: i64 = 3;

/// Opaque per-PDU security state, owned by the security model that minted
/// it. Dropping the last reference is the free hook; cloning shares the
/// immutable state, which is the model's clone hook.
#[derive(Clone)]
pub struct SecurityStateRef(Arc<dyn Any + Send + Sync>);

impl SecurityStateRef {
    pub fn new<T: Any + Send + Sync>(state: T) -> Self {
        Self(Arc::new(state))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl std::fmt::Debug for SecurityStateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecurityStateRef(..)")
    }
}

/// PDU command tags (context-constructed class).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PduType {
    Get = 0xa0,
    GetNext = 0xa1,
    Response = 0xa2,
    Set = 0xa3,
    GetBulk = 0xa5,
    Inform = 0xa6,
    Trap2 = 0xa7,
    Report = 0xa8,
}

impl PduType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0xa0 => Self::Get,
            0xa1 => Self::GetNext,
            0xa2 => Self::Response,
            0xa3 => Self::Set,
            0xa5 => Self::GetBulk,
            0xa6 => Self::Inform,
            0xa7 => Self::Trap2,
            0xa8 => Self::Report,
            _ => return None,
        })
    }

    /// Confirmed-class commands expect a Response and set the reportable
    /// flag; Response/Trap2/Report never do.
    pub fn expects_response(self) -> bool {
        matches!(
            self,
            Self::Get | Self::GetNext | Self::GetBulk | Self::Set | Self::Inform
        )
    }
}

bitflags! {
    /// Housekeeping flags carried alongside the PDU (not wire bits).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PduFlags: u8 {
        const REPORTABLE      = 0b0001;
        const TUNNELED        = 0b0010;
        const RESPONSE_PDU    = 0b0100;
        const EXPECT_RESPONSE = 0b1000;
    }
}

/// One protocol data unit, owning its varbinds and all identity buffers.
#[derive(Debug, Clone)]
pub struct Pdu {
    pub command: PduType,
    pub version: i64,
    pub request_id: i32,
    pub msg_id: i32,
    pub error_status: i32,
    pub error_index: i32,
    /// GetBulk reuses the error slots on the wire; kept separate here.
    pub non_repeaters: i32,
    pub max_repetitions: i32,
    pub context_engine_id: Vec<u8>,
    pub context_name: Vec<u8>,
    pub security_engine_id: Vec<u8>,
    pub security_name: String,
    pub security_model: u32,
    pub security_level: SecurityLevel,
    pub flags: PduFlags,
    /// Peer address bytes, opaque to the core.
    pub transport_address: Vec<u8>,
    /// Filled by the security model on decode; handed back verbatim when a
    /// response to this PDU is generated.
    pub security_state: Option<SecurityStateRef>,
    /// Per-request timeout override; the session default applies when
    /// unset.
    pub timeout: Option<Duration>,
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    pub fn new(command: PduType) -> Self {
        let mut flags = PduFlags::default();
        if command.expects_response() {
            flags |= PduFlags::EXPECT_RESPONSE | PduFlags::REPORTABLE;
        }
        if command == PduType::Response || command == PduType::Report {
            flags |= PduFlags::RESPONSE_PDU;
        }
        Self {
            command,
            version: SNMP_VERSION_3,
            request_id: 0,
            msg_id: 0,
            error_status: 0,
            error_index: 0,
            non_repeaters: 0,
            max_repetitions: 0,
            context_engine_id: Vec::new(),
            context_name: Vec::new(),
            security_engine_id: Vec::new(),
            security_name: String::new(),
            security_model: 0,
            security_level: SecurityLevel::NoAuthNoPriv,
            flags,
            transport_address: Vec::new(),
            security_state: None,
            timeout: None,
            varbinds: Vec::new(),
        }
    }

    pub fn add_varbind(&mut self, vb: VarBind) {
        self.varbinds.push(vb);
    }

    /// Null-valued binding by name, the usual Get form.
    pub fn add_null_varbind(&mut self, name: Oid) {
        self.varbinds.push(VarBind::null(name));
    }

    pub fn varbind_count(&self) -> usize {
        self.varbinds.len()
    }

    /// First binding whose name starts with `prefix`.
    pub fn find_varbind(&self, prefix: &Oid) -> Option<&VarBind> {
        self.varbinds.iter().find(|vb| prefix.is_prefix_of(&vb.name))
    }

    /// Clone skipping the first `skip` varbinds and copying at most
    /// `copy` of the rest.
    pub fn split(&self, skip: usize, copy: usize) -> Pdu {
        let mut out = self.clone();
        out.varbinds = self
            .varbinds
            .iter()
            .skip(skip)
            .take(copy)
            .cloned()
            .collect();
        out
    }

    /// Clone minus the varbind at the (1-based) `error_index`, the repair
    /// step after a Response with a per-varbind error.
    pub fn fix(&self, error_index: i32) -> SnmpResult<Pdu> {
        let idx = error_index as usize;
        if idx == 0 || idx > self.varbinds.len() {
            return Err(SnmpError::with_detail(
                ErrorKind::GenErr,
                format!("error index {error_index} out of range"),
            ));
        }
        let mut out = self.clone();
        out.varbinds.remove(idx - 1);
        out.error_status = 0;
        out.error_index = 0;
        Ok(out)
    }

    /// GetBulk carries (non-repeaters, max-repetitions) in the error
    /// slots on the wire.
    fn wire_error_pair(&self) -> (i32, i32) {
        if self.command == PduType::GetBulk {
            (self.non_repeaters, self.max_repetitions)
        } else {
            (self.error_status, self.error_index)
        }
    }

    /// Forward-build the PDU body (command tag + ids + varbind list).
    pub fn build_body(&self, b: &mut ForwardBuilder) -> SnmpResult<()> {
        let (err_a, err_b) = self.wire_error_pair();
        let mark = b.begin_seq(self.command as u8);
        b.push_int(TAG_INTEGER, self.request_id as i64)?;
        b.push_int(TAG_INTEGER, err_a as i64)?;
        b.push_int(TAG_INTEGER, err_b as i64)?;
        varbind::build_list(b, &self.varbinds)?;
        b.end_seq(mark)
    }

    /// Reverse-build the PDU body; bytes match [`Pdu::build_body`].
    pub fn rbuild_body(&self, b: &mut ReverseBuilder) -> SnmpResult<()> {
        let (err_a, err_b) = self.wire_error_pair();
        let mark = b.mark();
        varbind::rbuild_list(b, &self.varbinds)?;
        b.prepend_int(TAG_INTEGER, err_b as i64)?;
        b.prepend_int(TAG_INTEGER, err_a as i64)?;
        b.prepend_int(TAG_INTEGER, self.request_id as i64)?;
        b.wrap_seq(self.command as u8, mark)
    }

    /// Parse a PDU body into a fresh PDU. Envelope fields (engine ids,
    /// security identity) are filled in by the caller.
    pub fn parse_body(r: &mut Reader<'_>) -> SnmpResult<Pdu> {
        let tag = r.peek_tag()?;
        let command = PduType::from_tag(tag)
            .ok_or_else(|| parse_err(format!("unknown PDU tag 0x{tag:02x}")))?;
        let mut body = r.read_constructed(tag)?;
        let mut pdu = Pdu::new(command);
        pdu.request_id = body.read_i32(TAG_INTEGER)?;
        let err_a = body.read_i32(TAG_INTEGER)?;
        let err_b = body.read_i32(TAG_INTEGER)?;
        if command == PduType::GetBulk {
            pdu.non_repeaters = err_a;
            pdu.max_repetitions = err_b;
        } else {
            pdu.error_status = err_a;
            pdu.error_index = err_b;
        }
        pdu.varbinds = varbind::parse_list(&mut body)?;
        if !body.is_empty() {
            return Err(parse_err("trailing bytes after varbind list"));
        }
        Ok(pdu)
    }
}
