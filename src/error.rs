// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Error taxonomy shared by the codec, the security pipeline and the
//! session layer.
//!
//! Every fallible public operation returns [`SnmpError`], which carries one
//! [`ErrorKind`] plus an optional human-readable detail string. A single
//! process-wide detail slot is also kept for callers that only see the
//! kind (mirrors the classic `snmp_set_detail` behaviour).

use std::sync::Mutex;

/// One error kind per failure class the engine can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    GenErr,
    BadAddress,
    BadSession,
    TooLong,
    BadVersion,
    BadContext,
    BadCommunity,
    BadSecName,
    BadSecLevel,
    BadAsn1Build,
    BadSendto,
    BadParse,
    BadRecvfrom,
    Asn1Parse,
    UnknownSecModel,
    InvalidMsg,
    UnknownEngineId,
    UnknownUserName,
    UnsupportedSecLevel,
    AuthenticationFailure,
    NotInTimeWindow,
    DecryptionError,
    ScGeneralFailure,
    ScNotConfigured,
    UnknownReport,
    UsmGenericError,
    UsmUnknownEngineId,
    UsmUnknownUser,
    UsmUnsupportedLevel,
    UsmAuthFailure,
    UsmDecryptFailure,
    UsmNotInTimeWindow,
    UsmParseError,
    Malloc,
    Timeout,
    Abort,
    Protocol,
    OidNonincreasing,
    JustAContextProbe,
    TransportConfigError,
}

impl ErrorKind {
    /// Stable short name used in logs and the persisted detail slot.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::GenErr => "generic error",
            ErrorKind::BadAddress => "bad address",
            ErrorKind::BadSession => "bad session",
            ErrorKind::TooLong => "message too long",
            ErrorKind::BadVersion => "bad version",
            ErrorKind::BadContext => "bad context",
            ErrorKind::BadCommunity => "bad community",
            ErrorKind::BadSecName => "bad security name",
            ErrorKind::BadSecLevel => "bad security level",
            ErrorKind::BadAsn1Build => "ASN.1 build failure",
            ErrorKind::BadSendto => "send failure",
            ErrorKind::BadParse => "parse failure",
            ErrorKind::BadRecvfrom => "receive failure",
            ErrorKind::Asn1Parse => "ASN.1 parse failure",
            ErrorKind::UnknownSecModel => "unknown security model",
            ErrorKind::InvalidMsg => "invalid message",
            ErrorKind::UnknownEngineId => "unknown engine id",
            ErrorKind::UnknownUserName => "unknown user name",
            ErrorKind::UnsupportedSecLevel => "unsupported security level",
            ErrorKind::AuthenticationFailure => "authentication failure",
            ErrorKind::NotInTimeWindow => "not in time window",
            ErrorKind::DecryptionError => "decryption error",
            ErrorKind::ScGeneralFailure => "crypto general failure",
            ErrorKind::ScNotConfigured => "crypto support not configured",
            ErrorKind::UnknownReport => "unknown report",
            ErrorKind::UsmGenericError => "USM generic error",
            ErrorKind::UsmUnknownEngineId => "USM unknown engine id",
            ErrorKind::UsmUnknownUser => "USM unknown user",
            ErrorKind::UsmUnsupportedLevel => "USM unsupported level",
            ErrorKind::UsmAuthFailure => "USM authentication failure",
            ErrorKind::UsmDecryptFailure => "USM decryption failure",
            ErrorKind::UsmNotInTimeWindow => "USM not in time window",
            ErrorKind::UsmParseError => "USM parse error",
            ErrorKind::Malloc => "allocation failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Abort => "aborted",
            ErrorKind::Protocol => "protocol error",
            ErrorKind::OidNonincreasing => "OID not increasing",
            ErrorKind::JustAContextProbe => "context probe only",
            ErrorKind::TransportConfigError => "transport configuration error",
        }
    }
}

/// Error value carried through the whole engine.
#[derive(Debug)]
pub struct SnmpError {
    pub kind: ErrorKind,
    pub detail: Option<String>,
}

impl std::fmt::Display for SnmpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(d) => write!(f, "{}: {d}", self.kind.as_str()),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

impl std::error::Error for SnmpError {}

impl SnmpError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, detail: None }
    }

    pub fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        set_last_detail(&detail);
        Self {
            kind,
            detail: Some(detail),
        }
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<ErrorKind> for SnmpError {
    fn from(kind: ErrorKind) -> Self {
        SnmpError::new(kind)
    }
}

impl From<std::io::Error> for SnmpError {
    fn from(e: std::io::Error) -> Self {
        SnmpError::with_detail(ErrorKind::BadSendto, e.to_string())
    }
}

pub type SnmpResult<T> = Result<T, SnmpError>;

// One process-wide slot, kept for compatibility with callers that inspect
// the last failure out of band.
static LAST_DETAIL: Mutex<Option<String>> = Mutex::new(None);

pub fn set_last_detail(detail: &str) {
    if let Ok(mut slot) = LAST_DETAIL.lock() {
        *slot = Some(detail.to_string());
    }
}

pub fn last_detail() -> Option<String> {
    LAST_DETAIL.lock().ok().and_then(|s| s.clone())
}
