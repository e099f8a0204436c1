// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    asn1::{build_err, encode_length, int_payload, oid_payload, uint_payload},
    error::SnmpResult,
};

/// Head-to-tail BER emitter.
///
/// Sequence headers are written with a one-octet length placeholder;
/// [`ForwardBuilder::end_seq`] back-fills the real length and shifts the
/// content right when the long form is needed.
#[derive(Debug, Default)]
pub struct ForwardBuilder {
    buf: Vec<u8>,
}

/// Marker returned by [`ForwardBuilder::begin_seq`].
#[derive(Debug, Clone, Copy)]
pub struct SeqMark {
    len_pos: usize,
}

impl ForwardBuilder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn push_tlv(&mut self, tag: u8, payload: &[u8]) -> SnmpResult<()> {
        self.buf.push(tag);
        self.buf.extend_from_slice(&encode_length(payload.len())?);
        self.buf.extend_from_slice(payload);
        Ok(())
    }

    pub fn push_int(&mut self, tag: u8, v: i64) -> SnmpResult<()> {
        self.push_tlv(tag, &int_payload(v))
    }

    pub fn push_uint(&mut self, tag: u8, v: u64) -> SnmpResult<()> {
        self.push_tlv(tag, &uint_payload(v))
    }

    pub fn push_octets(&mut self, tag: u8, bytes: &[u8]) -> SnmpResult<()> {
        self.push_tlv(tag, bytes)
    }

    pub fn push_null(&mut self, tag: u8) -> SnmpResult<()> {
        self.push_tlv(tag, &[])
    }

    pub fn push_oid(&mut self, tag: u8, subids: &[u32]) -> SnmpResult<()> {
        let payload = oid_payload(subids)?;
        self.push_tlv(tag, &payload)
    }

    pub fn push_f32(&mut self, tag: u8, v: f32) -> SnmpResult<()> {
        self.push_tlv(tag, &v.to_be_bytes())
    }

    pub fn push_f64(&mut self, tag: u8, v: f64) -> SnmpResult<()> {
        self.push_tlv(tag, &v.to_be_bytes())
    }

    /// Raw append for payloads already encoded elsewhere.
    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn begin_seq(&mut self, tag: u8) -> SeqMark {
        self.buf.push(tag);
        self.buf.push(0);
        SeqMark {
            len_pos: self.buf.len() - 1,
        }
    }

    pub fn end_seq(&mut self, mark: SeqMark) -> SnmpResult<()> {
        let content_start = mark.len_pos + 1;
        if content_start > self.buf.len() {
            return Err(build_err("sequence mark past end of buffer"));
        }
        let content_len = self.buf.len() - content_start;
        let len_bytes = encode_length(content_len)?;
        let extra = len_bytes.len() - 1;
        if extra > 0 {
            self.buf.resize(self.buf.len() + extra, 0);
            self.buf.copy_within(
                content_start..content_start + content_len,
                content_start + extra,
            );
        }
        self.buf[mark.len_pos..mark.len_pos + len_bytes.len()]
            .copy_from_slice(&len_bytes);
        Ok(())
    }
}
