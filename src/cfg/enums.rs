// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::security::crypto::{AuthProtocol, PrivProtocol};

/// Authentication protocol name as it appears in configuration
/// (`defAuthProtocol`, `createUser` lines).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthKind {
    #[default]
    #[serde(rename = "None", alias = "none", alias = "NONE")]
    None,
    #[serde(rename = "MD5", alias = "md5", alias = "HMAC-MD5")]
    Md5,
    #[serde(rename = "SHA", alias = "sha", alias = "SHA1", alias = "HMAC-SHA1")]
    Sha1,
}

impl AuthKind {
    pub fn to_protocol(self) -> Option<AuthProtocol> {
        match self {
            AuthKind::None => None,
            AuthKind::Md5 => Some(AuthProtocol::HmacMd5),
            AuthKind::Sha1 => Some(AuthProtocol::HmacSha1),
        }
    }

    pub fn from_protocol(proto: Option<AuthProtocol>) -> Self {
        match proto {
            None => AuthKind::None,
            Some(AuthProtocol::HmacMd5) => AuthKind::Md5,
            Some(AuthProtocol::HmacSha1) => AuthKind::Sha1,
        }
    }
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthKind::None => "None",
            AuthKind::Md5 => "MD5",
            AuthKind::Sha1 => "SHA",
        })
    }
}

/// Privacy protocol name (`defPrivProtocol`, `createUser` lines).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrivKind {
    #[default]
    #[serde(rename = "None", alias = "none", alias = "NONE")]
    None,
    #[serde(rename = "DES", alias = "des")]
    Des,
    #[serde(rename = "AES", alias = "aes", alias = "AES128")]
    Aes,
}

impl PrivKind {
    pub fn to_protocol(self) -> Option<PrivProtocol> {
        match self {
            PrivKind::None => None,
            PrivKind::Des => Some(PrivProtocol::DesCbc),
            PrivKind::Aes => Some(PrivProtocol::AesCfb128),
        }
    }

    pub fn from_protocol(proto: Option<PrivProtocol>) -> Self {
        match proto {
            None => PrivKind::None,
            Some(PrivProtocol::DesCbc) => PrivKind::Des,
            Some(PrivProtocol::AesCfb128) => PrivKind::Aes,
        }
    }
}

impl fmt::Display for PrivKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrivKind::None => "None",
            PrivKind::Des => "DES",
            PrivKind::Aes => "AES",
        })
    }
}
