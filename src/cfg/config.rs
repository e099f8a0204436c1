// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fs,
    net::{IpAddr, SocketAddr},
    path::Path,
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::{AuthKind, PrivKind},
    client::{
        engine::{Engine, EngineOptions},
        session::{SessionConfig, TransportKind},
    },
    error::{ErrorKind, SnmpError, SnmpResult},
    security::{SecurityLevel, SessionSecurity, USM_SEC_MODEL, keytools,
        usm::{StorageType, TEMPLATE_ENGINE_ID, UserStatus, UsmUser}},
};

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Config {
    /// Engine-wide knobs (id generation, packet dumps, persistence).
    #[serde(default)]
    pub engine: EngineConfig,
    /// Session defaults applied to every opened session.
    #[serde(default)]
    pub session: SessionDefaults,
    /// Socket buffer size hints.
    #[serde(default)]
    pub sockets: SocketConfig,
    /// `createUser`-style USM user definitions.
    #[serde(default)]
    pub users: Vec<UserLine>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct EngineConfig {
    #[serde(default, rename = "engineID")]
    /// Local engine id, hex. Generated and persisted when absent.
    pub engine_id: Option<String>,

    #[serde(default, rename = "16bitIDs")]
    /// Mask request/message ids to 15 bits for broken peers.
    pub short_ids: bool,

    #[serde(default, rename = "dumpPacket")]
    /// Hex-dump every message sent or received.
    pub dump_packet: bool,

    #[serde(default, rename = "reverseEncodeBER")]
    /// Prefer the tail-to-head message builder.
    pub reverse_encode_ber: bool,

    #[serde(default, rename = "persistentDir")]
    /// Directory for the boot counter and user store.
    pub persistent_dir: Option<String>,

    #[serde(default, rename = "noPersistentLoad")]
    pub no_persistent_load: bool,

    #[serde(default, rename = "noPersistentSave")]
    pub no_persistent_save: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SessionDefaults {
    #[serde(default = "default_port", rename = "defaultPort")]
    /// Remote port used when the peer string has none.
    pub default_port: u16,

    #[serde(default, rename = "clientaddr")]
    /// Default local bind address.
    pub clientaddr: Option<String>,

    #[serde(default = "default_timeout", rename = "timeout")]
    /// Per-request timeout, seconds.
    pub timeout_secs: u64,

    #[serde(default = "default_retries", rename = "retries")]
    pub retries: u32,

    #[serde(default, rename = "noContextEngineIDDiscovery")]
    /// Suppress the RFC 5343 probe on open.
    pub no_discovery: bool,

    #[serde(default, rename = "defSecurityModel")]
    /// Security model name; only "usm" is registered by default.
    pub security_model: Option<String>,

    #[serde(default, rename = "defSecurityName")]
    pub security_name: Option<String>,

    #[serde(default, rename = "defContext")]
    pub context: Option<String>,

    #[serde(default, rename = "defSecLevel")]
    pub security_level: Option<SecurityLevel>,

    #[serde(default, rename = "defAuthProtocol")]
    pub auth_protocol: AuthKind,

    #[serde(default, rename = "defPrivProtocol")]
    pub priv_protocol: PrivKind,

    #[serde(default, rename = "defPassphrase")]
    /// Fallback for both passphrases below.
    pub passphrase: Option<String>,

    #[serde(default, rename = "defAuthPassphrase")]
    pub auth_passphrase: Option<String>,

    #[serde(default, rename = "defPrivPassphrase")]
    pub priv_passphrase: Option<String>,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            default_port: default_port(),
            clientaddr: None,
            timeout_secs: default_timeout(),
            retries: default_retries(),
            no_discovery: false,
            security_model: None,
            security_name: None,
            context: None,
            security_level: None,
            auth_protocol: AuthKind::None,
            priv_protocol: PrivKind::None,
            passphrase: None,
            auth_passphrase: None,
            priv_passphrase: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SocketConfig {
    #[serde(default, rename = "serverSendBuf")]
    pub server_send_buf: Option<usize>,
    #[serde(default, rename = "serverRecvBuf")]
    pub server_recv_buf: Option<usize>,
    #[serde(default, rename = "clientSendBuf")]
    pub client_send_buf: Option<usize>,
    #[serde(default, rename = "clientRecvBuf")]
    pub client_recv_buf: Option<usize>,
}

/// One `createUser name authProto authPass privProto privPass [engineID]`
/// directive.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct UserLine {
    pub name: String,
    #[serde(default, rename = "authProtocol")]
    pub auth_protocol: AuthKind,
    #[serde(default, rename = "authPassphrase")]
    pub auth_passphrase: Option<String>,
    #[serde(default, rename = "privProtocol")]
    pub priv_protocol: PrivKind,
    #[serde(default, rename = "privPassphrase")]
    pub priv_passphrase: Option<String>,
    #[serde(default, rename = "engineID")]
    /// Hex engine id; omitted means a discovery-time template.
    pub engine_id: Option<String>,
}

fn default_port() -> u16 {
    161
}

fn default_timeout() -> u64 {
    1
}

fn default_retries() -> u32 {
    5
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        if let Some(hex_id) = &self.engine.engine_id {
            let decoded = hex::decode(hex_id)
                .context("engineID must be an even-length hex string")?;
            ensure!(
                (5..=32).contains(&decoded.len()),
                "engineID must be 5..=32 octets"
            );
        }
        ensure!(self.session.default_port != 0, "defaultPort must be nonzero");
        ensure!(self.session.timeout_secs >= 1, "timeout must be >= 1 second");

        for user in &self.users {
            ensure!(!user.name.is_empty(), "createUser requires a name");
            if user.auth_protocol != AuthKind::None {
                ensure!(
                    user.auth_passphrase.is_some(),
                    "user {} has an auth protocol but no passphrase",
                    user.name
                );
            }
            if user.priv_protocol != PrivKind::None {
                ensure!(
                    user.auth_protocol != AuthKind::None,
                    "user {} wants privacy without authentication",
                    user.name
                );
                ensure!(
                    user.priv_passphrase.is_some() || user.auth_passphrase.is_some(),
                    "user {} has a priv protocol but no passphrase",
                    user.name
                );
            }
        }
        Ok(())
    }

    /// Engine knobs derived from this configuration.
    pub fn engine_options(&self) -> SnmpResult<EngineOptions> {
        let engine_id = match &self.engine.engine_id {
            Some(hex_id) => Some(hex::decode(hex_id).map_err(|_| {
                SnmpError::with_detail(ErrorKind::GenErr, "bad engineID hex")
            })?),
            None => None,
        };
        Ok(EngineOptions {
            engine_id,
            engine_boots: 0,
            short_ids: self.engine.short_ids,
            dump_packets: self.engine.dump_packet,
            reverse_encode: self.engine.reverse_encode_ber,
        })
    }

    /// Resolve `peer` ("ip", "ip:port" or "tcp:ip:port") against the
    /// configured defaults into a session template.
    pub fn session_config(&self, peer: &str) -> SnmpResult<SessionConfig> {
        let (transport, rest) = match peer.split_once(':') {
            Some(("udp", rest)) => (TransportKind::Udp, rest),
            Some(("tcp", rest)) => (TransportKind::Tcp, rest),
            _ => (TransportKind::Udp, peer),
        };
        let peer_addr = parse_peer(rest, self.session.default_port)?;
        let local = match &self.session.clientaddr {
            Some(addr) => Some(addr.parse().map_err(|_| {
                SnmpError::with_detail(
                    ErrorKind::BadAddress,
                    format!("bad clientaddr {addr:?}"),
                )
            })?),
            None => None,
        };

        Ok(SessionConfig {
            peer: peer_addr,
            local,
            transport,
            timeout: Duration::from_secs(self.session.timeout_secs),
            retries: self.session.retries,
            dont_probe: self.session.no_discovery,
            send_buf: self.sockets.client_send_buf,
            recv_buf: self.sockets.client_recv_buf,
            security: self.session_security()?,
            ..SessionConfig::default()
        })
    }

    /// The session security template, with master keys derived from the
    /// configured passphrases (localization happens at discovery).
    pub fn session_security(&self) -> SnmpResult<SessionSecurity> {
        let auth_protocol = self.session.auth_protocol.to_protocol();
        let priv_protocol = self.session.priv_protocol.to_protocol();

        let auth_pass = self
            .session
            .auth_passphrase
            .as_ref()
            .or(self.session.passphrase.as_ref());
        let priv_pass = self
            .session
            .priv_passphrase
            .as_ref()
            .or(self.session.passphrase.as_ref());

        let mut sec = SessionSecurity {
            security_model: USM_SEC_MODEL,
            security_name: self.session.security_name.clone().unwrap_or_default(),
            security_level: self.session.security_level.unwrap_or_else(|| {
                match (auth_protocol.is_some(), priv_protocol.is_some()) {
                    (true, true) => SecurityLevel::AuthPriv,
                    (true, false) => SecurityLevel::AuthNoPriv,
                    _ => SecurityLevel::NoAuthNoPriv,
                }
            }),
            context_name: self
                .session
                .context
                .clone()
                .unwrap_or_default()
                .into_bytes(),
            auth_protocol,
            priv_protocol,
            ..SessionSecurity::default()
        };

        if let (Some(auth), Some(pass)) = (auth_protocol, auth_pass) {
            sec.auth_master_key = keytools::generate_ku(auth, pass.as_bytes())?;
        }
        if let (Some(auth), Some(_), Some(pass)) =
            (auth_protocol, priv_protocol, priv_pass)
        {
            sec.priv_master_key = keytools::generate_ku(auth, pass.as_bytes())?;
        }
        sec.validate()?;
        Ok(sec)
    }

    /// Feed every `createUser` line into the engine's USM table. Users
    /// without an engine id become discovery-time templates.
    pub fn apply_users(&self, engine: &Engine) -> SnmpResult<()> {
        for line in &self.users {
            let auth_protocol = line.auth_protocol.to_protocol();
            let priv_protocol = line.priv_protocol.to_protocol();
            let auth_pass = line.auth_passphrase.as_deref();
            let priv_pass = line.priv_passphrase.as_deref().or(auth_pass);

            let (engine_id, localize) = match &line.engine_id {
                Some(hex_id) => (
                    hex::decode(hex_id).map_err(|_| {
                        SnmpError::with_detail(
                            ErrorKind::GenErr,
                            format!("user {}: bad engineID hex", line.name),
                        )
                    })?,
                    true,
                ),
                None => (TEMPLATE_ENGINE_ID.to_vec(), false),
            };

            let mut auth_key = Vec::new();
            let mut priv_key = Vec::new();
            if let (Some(auth), Some(pass)) = (auth_protocol, auth_pass) {
                let ku = keytools::generate_ku(auth, pass.as_bytes())?;
                auth_key = if localize {
                    keytools::generate_kul(auth, &engine_id, &ku)?
                } else {
                    ku
                };
            }
            if let (Some(auth), Some(_), Some(pass)) =
                (auth_protocol, priv_protocol, priv_pass)
            {
                let ku = keytools::generate_ku(auth, pass.as_bytes())?;
                priv_key = if localize {
                    let mut kul = keytools::generate_kul(auth, &engine_id, &ku)?;
                    kul.truncate(crate::security::crypto::PRIV_KEY_LEN);
                    kul
                } else {
                    ku
                };
            }

            engine.usm.add_user(UsmUser {
                engine_id,
                user_name: line.name.clone(),
                security_name: line.name.clone(),
                auth_protocol,
                auth_key,
                priv_protocol,
                priv_key,
                storage_type: StorageType::NonVolatile,
                status: UserStatus::Active,
            })?;
        }
        Ok(())
    }
}

fn parse_peer(peer: &str, default_port: u16) -> SnmpResult<SocketAddr> {
    if let Ok(addr) = peer.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = peer.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }
    Err(SnmpError::with_detail(
        ErrorKind::BadAddress,
        format!("cannot parse peer address {peer:?}"),
    ))
}
