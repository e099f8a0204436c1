// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Pluggable security-model dispatch.
//!
//! The engine never talks to a concrete security model: the message codec
//! hands encode/decode work to whatever [`SecurityModel`] is registered
//! under the message's `msgSecurityModel` number. The USM
//! ([`usm::Usm`], model 3) is the default registration.

pub mod crypto;
pub mod keytools;
pub mod usm;

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ErrorKind, SnmpError, SnmpResult},
    models::pdu::{Pdu, SecurityStateRef},
    security::crypto::{AuthProtocol, PrivProtocol},
};

/// Numeric id of the User-based Security Model.
pub const USM_SEC_MODEL: u32 = 3;

/// Message security level, ordered.
#[derive(
    Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord,
)]
pub enum SecurityLevel {
    #[default]
    #[serde(rename = "noAuthNoPriv", alias = "noauth", alias = "1")]
    NoAuthNoPriv,
    #[serde(rename = "authNoPriv", alias = "auth", alias = "2")]
    AuthNoPriv,
    #[serde(rename = "authPriv", alias = "priv", alias = "3")]
    AuthPriv,
}

impl SecurityLevel {
    #[inline]
    pub fn requires_auth(self) -> bool {
        self >= SecurityLevel::AuthNoPriv
    }

    #[inline]
    pub fn requires_priv(self) -> bool {
        self == SecurityLevel::AuthPriv
    }
}

/// Security-relevant slice of a session's configuration and state. The
/// session owns one; security models read and update it through the
/// lifecycle hooks.
#[derive(Debug, Clone, Default)]
pub struct SessionSecurity {
    pub security_model: u32,
    pub security_name: String,
    pub security_level: SecurityLevel,
    pub security_engine_id: Vec<u8>,
    pub context_engine_id: Vec<u8>,
    pub context_name: Vec<u8>,
    pub auth_protocol: Option<AuthProtocol>,
    /// Localized authentication key.
    pub auth_key: Vec<u8>,
    /// Master (unlocalized) authentication key, kept until the engine id
    /// is discovered and the key can be localized.
    pub auth_master_key: Vec<u8>,
    pub priv_protocol: Option<PrivProtocol>,
    /// Localized privacy key.
    pub priv_key: Vec<u8>,
    /// Master (unlocalized) privacy key.
    pub priv_master_key: Vec<u8>,
    pub engine_boots: u32,
    pub engine_time: u32,
}

impl SessionSecurity {
    /// Enforce the level/protocol invariant: no auth protocol forces
    /// noAuthNoPriv, no priv protocol caps at authNoPriv.
    pub fn validate(&self) -> SnmpResult<()> {
        if self.security_level.requires_auth() && self.auth_protocol.is_none() {
            return Err(SnmpError::with_detail(
                ErrorKind::BadSecLevel,
                "authentication requested but no auth protocol configured",
            ));
        }
        if self.security_level.requires_priv() && self.priv_protocol.is_none() {
            return Err(SnmpError::with_detail(
                ErrorKind::BadSecLevel,
                "privacy requested but no priv protocol configured",
            ));
        }
        Ok(())
    }
}

/// Everything a model needs to produce the outgoing wire message.
/// `global_data` is the already-encoded `msgVersion + msgGlobalData`
/// prefix; `scoped_pdu` is the plaintext ScopedPDU.
pub struct OutgoingParams<'a> {
    pub global_data: &'a [u8],
    pub scoped_pdu: &'a [u8],
    pub sec: &'a SessionSecurity,
    pub max_msg_size: usize,
}

/// Parsed envelope handed to the model's decode.
pub struct IncomingParams<'a> {
    pub whole_msg: &'a [u8],
    pub security_level: SecurityLevel,
    pub reportable: bool,
    /// Content of the msgSecurityParameters OCTET STRING.
    pub sec_params: &'a [u8],
    /// Offset of that content inside `whole_msg` (needed to zero the auth
    /// tag slot for verification).
    pub sec_params_offset: usize,
    /// Remaining message bytes: plaintext ScopedPDU TLV or the encrypted
    /// OCTET STRING TLV.
    pub msg_data: &'a [u8],
    /// Session state, when the message arrived on an opened session.
    pub sec: Option<&'a SessionSecurity>,
}

/// Successful decode: plaintext plus the security identity the PDU layer
/// copies into the decoded PDU.
#[derive(Debug)]
pub struct DecodedMessage {
    pub scoped_pdu: Vec<u8>,
    pub security_engine_id: Vec<u8>,
    pub security_name: String,
    pub security_level: SecurityLevel,
    pub engine_boots: u32,
    pub engine_time: u32,
    pub security_state: SecurityStateRef,
}

/// Hook set a security model registers under its model number.
pub trait SecurityModel: Send + Sync {
    fn number(&self) -> u32;
    fn name(&self) -> &'static str;

    /// Copy or derive model-specific state when a session is cloned from
    /// a template (listening-transport accept path).
    fn session_setup(
        &self,
        template: &SessionSecurity,
        target: &mut SessionSecurity,
    ) -> SnmpResult<()>;

    /// One-time per-session initialization (key derivation checks).
    fn session_open(&self, sec: &mut SessionSecurity) -> SnmpResult<()>;

    /// Release model state held for the session.
    fn session_close(&self, sec: &mut SessionSecurity);

    /// Engine-discovery probe PDU, if this model needs discovery for the
    /// given session state.
    fn probe_pdu(&self, sec: &SessionSecurity) -> Option<Pdu>;

    /// Fix up session state after the discovery reply was stored.
    fn post_probe(&self, sec: &mut SessionSecurity) -> SnmpResult<()>;

    fn encode_forward(&self, params: &OutgoingParams<'_>) -> SnmpResult<Vec<u8>>;
    fn encode_reverse(&self, params: &OutgoingParams<'_>) -> SnmpResult<Vec<u8>>;
    fn decode(&self, params: &IncomingParams<'_>) -> SnmpResult<DecodedMessage>;

    /// Whether an inbound report of this kind warrants an automatic
    /// retransmit (the model already refreshed whatever state caused it).
    fn report_recoverable(&self, kind: ErrorKind) -> bool;

    /// Mutate a request into the report PDU answering `kind`.
    fn make_report(&self, request: &Pdu, kind: ErrorKind) -> SnmpResult<Pdu>;

    /// Clone hook for the opaque per-PDU state; sharing the immutable
    /// state is the default.
    fn clone_pdu_state(&self, state: &SecurityStateRef) -> SecurityStateRef {
        state.clone()
    }
}

/// Registry keyed by model number with a name lookup for configuration.
#[derive(Default)]
pub struct SecModRegistry {
    by_number: DashMap<u32, Arc<dyn SecurityModel>>,
    by_name: DashMap<String, u32>,
}

impl SecModRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model; a second registration under the same number is
    /// rejected.
    pub fn register(&self, model: Arc<dyn SecurityModel>) -> SnmpResult<()> {
        let number = model.number();
        let name = model.name().to_string();
        if self.by_number.contains_key(&number) {
            return Err(SnmpError::with_detail(
                ErrorKind::GenErr,
                format!("security model {number} already registered"),
            ));
        }
        self.by_number.insert(number, model);
        self.by_name.insert(name, number);
        Ok(())
    }

    pub fn lookup(&self, number: u32) -> Option<Arc<dyn SecurityModel>> {
        self.by_number.get(&number).map(|m| Arc::clone(m.value()))
    }

    pub fn lookup_name(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).map(|n| *n.value())
    }

    pub fn unregister(&self, number: u32) -> Option<Arc<dyn SecurityModel>> {
        let removed = self.by_number.remove(&number).map(|(_, m)| m);
        if let Some(model) = &removed {
            self.by_name.remove(model.name());
        }
        removed
    }
}
