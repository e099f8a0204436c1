// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    asn1::{encode_length, int_payload, oid_payload, uint_payload},
    error::SnmpResult,
};

/// Tail-to-head BER emitter.
///
/// The buffer fills from the end and doubles when the head is reached, so
/// wrapping an already-encoded payload in a sequence header is a pure
/// prepend. `mark()`/`wrap_seq()` pair the way `begin_seq`/`end_seq` do on
/// the forward path.
#[derive(Debug)]
pub struct ReverseBuilder {
    buf: Vec<u8>,
    used: usize,
}

impl Default for ReverseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReverseBuilder {
    pub fn new() -> Self {
        Self {
            buf: vec![0; 256],
            used: 0,
        }
    }

    /// Number of bytes emitted so far.
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Marker capturing the current tail; everything prepended after the
    /// marker is the content a later `wrap_*` call will enclose.
    pub fn mark(&self) -> usize {
        self.used
    }

    pub fn into_bytes(self) -> Vec<u8> {
        let start = self.buf.len() - self.used;
        self.buf[start..].to_vec()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.buf.len() - self.used..]
    }

    fn prepend(&mut self, bytes: &[u8]) {
        if self.used + bytes.len() > self.buf.len() {
            let mut new_len = self.buf.len().max(64) * 2;
            while new_len < self.used + bytes.len() {
                new_len *= 2;
            }
            let mut grown = vec![0; new_len];
            grown[new_len - self.used..]
                .copy_from_slice(&self.buf[self.buf.len() - self.used..]);
            self.buf = grown;
        }
        let end = self.buf.len() - self.used;
        self.buf[end - bytes.len()..end].copy_from_slice(bytes);
        self.used += bytes.len();
    }

    fn prepend_tlv(&mut self, tag: u8, payload: &[u8]) -> SnmpResult<()> {
        self.prepend(payload);
        let len_bytes = encode_length(payload.len())?;
        self.prepend(&len_bytes);
        self.prepend(&[tag]);
        Ok(())
    }

    pub fn prepend_int(&mut self, tag: u8, v: i64) -> SnmpResult<()> {
        self.prepend_tlv(tag, &int_payload(v))
    }

    pub fn prepend_uint(&mut self, tag: u8, v: u64) -> SnmpResult<()> {
        self.prepend_tlv(tag, &uint_payload(v))
    }

    pub fn prepend_octets(&mut self, tag: u8, bytes: &[u8]) -> SnmpResult<()> {
        self.prepend_tlv(tag, bytes)
    }

    pub fn prepend_null(&mut self, tag: u8) -> SnmpResult<()> {
        self.prepend_tlv(tag, &[])
    }

    pub fn prepend_oid(&mut self, tag: u8, subids: &[u32]) -> SnmpResult<()> {
        let payload = oid_payload(subids)?;
        self.prepend_tlv(tag, &payload)
    }

    pub fn prepend_f32(&mut self, tag: u8, v: f32) -> SnmpResult<()> {
        self.prepend_tlv(tag, &v.to_be_bytes())
    }

    pub fn prepend_f64(&mut self, tag: u8, v: f64) -> SnmpResult<()> {
        self.prepend_tlv(tag, &v.to_be_bytes())
    }

    /// Raw prepend for payloads already encoded elsewhere.
    pub fn prepend_raw(&mut self, bytes: &[u8]) {
        self.prepend(bytes);
    }

    /// Prepend a sequence header covering everything emitted since `mark`.
    pub fn wrap_seq(&mut self, tag: u8, mark: usize) -> SnmpResult<()> {
        let content_len = self.used - mark;
        let len_bytes = encode_length(content_len)?;
        self.prepend(&len_bytes);
        self.prepend(&[tag]);
        Ok(())
    }

    /// Prepend an octet-string header covering everything since `mark`
    /// (used for the encrypted scoped PDU and msgSecurityParameters).
    pub fn wrap_octets(&mut self, mark: usize) -> SnmpResult<()> {
        self.wrap_seq(crate::asn1::TAG_OCTET_STR, mark)
    }
}
