// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! User-based Security Model (model 3).
//!
//! Owns the user table, the per-engine time cache (LCD) and the whole
//! outgoing/incoming message security pipeline: key localization, salt and
//! IV derivation, encryption, the 12-byte truncated HMAC over the wire
//! message, time-window validation and report generation on faults.

use std::{
    collections::BTreeMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Instant,
};

use dashmap::DashMap;
use rand::RngExt;
use tracing::{debug, warn};

use crate::{
    asn1::{
        TAG_INTEGER, TAG_OCTET_STR, TAG_SEQUENCE, build::ForwardBuilder,
        encode_length, parse::Reader,
    },
    error::{ErrorKind, SnmpError, SnmpResult},
    models::{
        pdu::{Pdu, PduFlags, PduType, SecurityStateRef},
        value::Value,
        varbind::VarBind,
    },
    security::{
        DecodedMessage, IncomingParams, OutgoingParams, SecurityLevel,
        SecurityModel, SessionSecurity, USM_SEC_MODEL,
        crypto::{
            AES_IV_LEN, AUTH_TAG_LEN, AuthProtocol, DES_BLOCK_LEN, PRIV_KEY_LEN,
            PrivProtocol,
        },
        keytools,
    },
    stats::{StatId, Stats},
};

/// Acceptable clock skew between engines, in seconds (RFC 3414 §2.2.3).
pub const TIME_WINDOW_SECS: u32 = 150;

/// Engine id template users are registered under; matched at discovery.
pub const TEMPLATE_ENGINE_ID: &[u8] = b"*";

/// Row storage class, kept for persistence round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageType {
    Volatile,
    #[default]
    NonVolatile,
    ReadOnly,
}

/// Row status; only active users take part in message processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserStatus {
    #[default]
    Active,
    NotInService,
}

/// One USM user. For template rows (engine id `*`) the key fields hold the
/// master keys (Ku); localization happens when the row is instantiated for
/// a discovered engine.
#[derive(Debug, Clone, Default)]
pub struct UsmUser {
    pub engine_id: Vec<u8>,
    pub user_name: String,
    pub security_name: String,
    pub auth_protocol: Option<AuthProtocol>,
    pub auth_key: Vec<u8>,
    pub priv_protocol: Option<PrivProtocol>,
    pub priv_key: Vec<u8>,
    pub storage_type: StorageType,
    pub status: UserStatus,
}

impl UsmUser {
    pub fn is_template(&self) -> bool {
        self.engine_id == TEMPLATE_ENGINE_ID
    }

    /// Highest level this user's key material supports.
    pub fn max_level(&self) -> SecurityLevel {
        match (self.auth_protocol.is_some(), self.priv_protocol.is_some()) {
            (true, true) => SecurityLevel::AuthPriv,
            (true, false) => SecurityLevel::AuthNoPriv,
            _ => SecurityLevel::NoAuthNoPriv,
        }
    }
}

/// Per-engine time knowledge (the LCD).
#[derive(Debug, Clone)]
struct LcdEntry {
    boots: u32,
    time: u32,
    last_received: Instant,
    authenticated: bool,
}

/// Opaque state attached to every decoded PDU so a response can be
/// secured without re-running the user lookup.
#[derive(Debug, Clone)]
pub struct UsmSecState {
    pub engine_id: Vec<u8>,
    pub user_name: String,
    pub security_name: String,
    pub security_level: SecurityLevel,
    pub auth_protocol: Option<AuthProtocol>,
    pub auth_key: Vec<u8>,
    pub priv_protocol: Option<PrivProtocol>,
    pub priv_key: Vec<u8>,
}

/// Parsed UsmSecurityParameters SEQUENCE.
#[derive(Debug)]
struct WireSecParams<'a> {
    engine_id: &'a [u8],
    engine_boots: u32,
    engine_time: u32,
    user_name: &'a [u8],
    auth_params: &'a [u8],
    priv_params: &'a [u8],
}

/// The User-based Security Model.
pub struct Usm {
    users: RwLock<BTreeMap<(Vec<u8>, String), UsmUser>>,
    lcd: DashMap<Vec<u8>, LcdEntry>,
    stats: Arc<Stats>,
    local_engine_id: Vec<u8>,
    local_engine_boots: AtomicU32,
    boot_instant: Instant,
    des_salt: AtomicU32,
    aes_salt: AtomicU64,
}

impl Usm {
    pub fn new(local_engine_id: Vec<u8>, stats: Arc<Stats>) -> Self {
        let mut rng = rand::rng();
        Self {
            users: RwLock::new(BTreeMap::new()),
            lcd: DashMap::new(),
            stats,
            local_engine_id,
            local_engine_boots: AtomicU32::new(1),
            boot_instant: Instant::now(),
            des_salt: AtomicU32::new(rng.random()),
            aes_salt: AtomicU64::new(rng.random()),
        }
    }

    pub fn local_engine_id(&self) -> &[u8] {
        &self.local_engine_id
    }

    pub fn set_local_engine_boots(&self, boots: u32) {
        self.local_engine_boots.store(boots, Ordering::Relaxed);
    }

    pub fn local_engine_boots(&self) -> u32 {
        self.local_engine_boots.load(Ordering::Relaxed)
    }

    /// Seconds since this engine started; the local notion of snmpEngineTime.
    pub fn local_engine_time(&self) -> u32 {
        self.boot_instant.elapsed().as_secs() as u32
    }

    // ---- user table ----

    pub fn add_user(&self, user: UsmUser) -> SnmpResult<()> {
        if user.user_name.is_empty() {
            return Err(SnmpError::with_detail(
                ErrorKind::BadSecName,
                "USM user name must not be empty",
            ));
        }
        let key = (user.engine_id.clone(), user.user_name.clone());
        if let Ok(mut table) = self.users.write() {
            table.insert(key, user);
            Ok(())
        } else {
            Err(SnmpError::new(ErrorKind::GenErr))
        }
    }

    pub fn remove_user(&self, engine_id: &[u8], user_name: &str) -> bool {
        self.users
            .write()
            .map(|mut t| {
                t.remove(&(engine_id.to_vec(), user_name.to_string()))
                    .is_some()
            })
            .unwrap_or(false)
    }

    /// Snapshot of the table in (engineID, userName) order.
    pub fn users(&self) -> Vec<UsmUser> {
        self.users
            .read()
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Exact lookup, falling back to a `*` template which is localized to
    /// the engine on the fly and cached back into the table.
    pub fn find_user(&self, engine_id: &[u8], user_name: &str) -> Option<UsmUser> {
        if let Ok(table) = self.users.read() {
            if let Some(user) =
                table.get(&(engine_id.to_vec(), user_name.to_string()))
            {
                return Some(user.clone());
            }
            let template = table
                .get(&(TEMPLATE_ENGINE_ID.to_vec(), user_name.to_string()))
                .cloned();
            drop(table);
            if let Some(template) = template
                && let Ok(localized) = self.localize_template(&template, engine_id)
            {
                let _ = self.add_user(localized.clone());
                return Some(localized);
            }
        }
        None
    }

    fn localize_template(
        &self,
        template: &UsmUser,
        engine_id: &[u8],
    ) -> SnmpResult<UsmUser> {
        let mut user = template.clone();
        user.engine_id = engine_id.to_vec();
        if let Some(auth) = template.auth_protocol {
            user.auth_key =
                keytools::generate_kul(auth, engine_id, &template.auth_key)?;
            if template.priv_protocol.is_some() {
                let kul =
                    keytools::generate_kul(auth, engine_id, &template.priv_key)?;
                user.priv_key = kul;
                user.priv_key.truncate(PRIV_KEY_LEN);
            }
        }
        debug!(
            engine_id = %hex::encode(engine_id),
            user = %user.user_name,
            "localized template user"
        );
        Ok(user)
    }

    /// Localize the session's master keys once the engine id is known.
    /// Already-localized keys are left alone.
    fn localize_session_keys(&self, sec: &mut SessionSecurity) -> SnmpResult<()> {
        let Some(auth) = sec.auth_protocol else {
            return Ok(());
        };
        if sec.auth_key.is_empty() && !sec.auth_master_key.is_empty() {
            sec.auth_key = keytools::generate_kul(
                auth,
                &sec.security_engine_id,
                &sec.auth_master_key,
            )?;
        }
        if sec.priv_protocol.is_some()
            && sec.priv_key.is_empty()
            && !sec.priv_master_key.is_empty()
        {
            let mut kul = keytools::generate_kul(
                auth,
                &sec.security_engine_id,
                &sec.priv_master_key,
            )?;
            kul.truncate(PRIV_KEY_LEN);
            sec.priv_key = kul;
        }
        Ok(())
    }

    /// Mirror the session's identity into the user table so inbound
    /// messages from the peer resolve without a second configuration
    /// source.
    fn register_session_user(&self, sec: &SessionSecurity) -> SnmpResult<()> {
        if sec.security_name.is_empty() {
            return Ok(());
        }
        if self
            .users
            .read()
            .map(|t| {
                t.contains_key(&(
                    sec.security_engine_id.clone(),
                    sec.security_name.clone(),
                ))
            })
            .unwrap_or(false)
        {
            return Ok(());
        }
        self.add_user(UsmUser {
            engine_id: sec.security_engine_id.clone(),
            user_name: sec.security_name.clone(),
            security_name: sec.security_name.clone(),
            auth_protocol: sec.auth_protocol,
            auth_key: sec.auth_key.clone(),
            priv_protocol: sec.priv_protocol,
            priv_key: sec.priv_key.clone(),
            storage_type: StorageType::Volatile,
            status: UserStatus::Active,
        })
    }

    // ---- LCD ----

    /// Current (boots, time) belief for an engine; (0, 0) when unknown.
    pub fn engine_time(&self, engine_id: &[u8]) -> (u32, u32) {
        if engine_id == self.local_engine_id {
            return (self.local_engine_boots(), self.local_engine_time());
        }
        match self.lcd.get(engine_id) {
            Some(entry) => {
                let drift = entry.last_received.elapsed().as_secs() as u32;
                (entry.boots, entry.time.saturating_add(drift))
            },
            None => (0, 0),
        }
    }

    /// Record (boots, time) learned from a peer. Boots never moves
    /// backwards once an authenticated value is cached.
    pub fn set_engine_time(
        &self,
        engine_id: &[u8],
        boots: u32,
        time: u32,
        authenticated: bool,
    ) {
        let mut entry = self.lcd.entry(engine_id.to_vec()).or_insert(LcdEntry {
            boots,
            time,
            last_received: Instant::now(),
            authenticated,
        });
        let current = entry.value_mut();
        if current.authenticated
            && (boots < current.boots
                || (boots == current.boots && time < current.time))
        {
            return;
        }
        current.boots = boots;
        current.time = time;
        current.last_received = Instant::now();
        current.authenticated |= authenticated;
    }

    /// True once an engine has an LCD entry (or is the local engine).
    pub fn engine_known(&self, engine_id: &[u8]) -> bool {
        engine_id == self.local_engine_id || self.lcd.contains_key(engine_id)
    }

    fn check_time_window(
        &self,
        engine_id: &[u8],
        msg_boots: u32,
        msg_time: u32,
    ) -> SnmpResult<()> {
        if engine_id == self.local_engine_id {
            // Authoritative side: strict window against the local clock.
            let local_boots = self.local_engine_boots();
            let local_time = self.local_engine_time();
            if msg_boots != local_boots
                || local_time.abs_diff(msg_time) > TIME_WINDOW_SECS
            {
                self.stats.inc(StatId::UsmStatsNotInTimeWindows);
                return Err(SnmpError::with_detail(
                    ErrorKind::UsmNotInTimeWindow,
                    format!(
                        "message ({msg_boots},{msg_time}) outside local \
                         ({local_boots},{local_time})"
                    ),
                ));
            }
            return Ok(());
        }

        // Non-authoritative side: advance our belief, refuse regressions.
        let (known_boots, known_time) = self.engine_time(engine_id);
        if msg_boots > known_boots
            || (msg_boots == known_boots && msg_time >= known_time)
        {
            self.set_engine_time(engine_id, msg_boots, msg_time, true);
            return Ok(());
        }
        if msg_boots < known_boots
            || known_time.saturating_sub(msg_time) > TIME_WINDOW_SECS
        {
            self.stats.inc(StatId::UsmStatsNotInTimeWindows);
            return Err(SnmpError::with_detail(
                ErrorKind::UsmNotInTimeWindow,
                format!(
                    "message ({msg_boots},{msg_time}) behind cached \
                     ({known_boots},{known_time})"
                ),
            ));
        }
        Ok(())
    }

    // ---- security parameters codec ----

    /// Build the UsmSecurityParameters SEQUENCE. The authentication slot
    /// is zero-filled; its position is recoverable from the tail layout.
    fn build_sec_params(
        &self,
        engine_id: &[u8],
        boots: u32,
        time: u32,
        user_name: &str,
        with_auth: bool,
        priv_params: &[u8],
    ) -> SnmpResult<Vec<u8>> {
        let mut b = ForwardBuilder::new();
        let mark = b.begin_seq(TAG_SEQUENCE);
        b.push_octets(TAG_OCTET_STR, engine_id)?;
        b.push_int(TAG_INTEGER, boots as i64)?;
        b.push_int(TAG_INTEGER, time as i64)?;
        b.push_octets(TAG_OCTET_STR, user_name.as_bytes())?;
        if with_auth {
            b.push_octets(TAG_OCTET_STR, &[0u8; AUTH_TAG_LEN])?;
        } else {
            b.push_octets(TAG_OCTET_STR, &[])?;
        }
        b.push_octets(TAG_OCTET_STR, priv_params)?;
        b.end_seq(mark)?;
        Ok(b.into_bytes())
    }

    fn parse_sec_params<'a>(&self, bytes: &'a [u8]) -> SnmpResult<WireSecParams<'a>> {
        let mut r = Reader::new(bytes);
        let mut seq = r.read_constructed(TAG_SEQUENCE).map_err(|e| {
            self.stats.inc(StatId::SnmpInAsnParseErrs);
            SnmpError::with_detail(ErrorKind::UsmParseError, e.to_string())
        })?;
        let engine_id = seq.read_octets(TAG_OCTET_STR)?;
        let engine_boots = seq.read_u32(TAG_INTEGER)?;
        let engine_time = seq.read_u32(TAG_INTEGER)?;
        let user_name = seq.read_octets(TAG_OCTET_STR)?;
        let auth_params = seq.read_octets(TAG_OCTET_STR)?;
        let priv_params = seq.read_octets(TAG_OCTET_STR)?;
        if !auth_params.is_empty() && auth_params.len() != AUTH_TAG_LEN {
            return Err(SnmpError::with_detail(
                ErrorKind::UsmParseError,
                format!(
                    "authentication parameters of {} octets",
                    auth_params.len()
                ),
            ));
        }
        Ok(WireSecParams {
            engine_id,
            engine_boots,
            engine_time,
            user_name,
            auth_params,
            priv_params,
        })
    }

    // ---- outgoing ----

    fn next_des_salt(&self, boots: u32) -> [u8; 8] {
        let counter = self.des_salt.fetch_add(1, Ordering::Relaxed);
        let mut salt = [0u8; 8];
        salt[..4].copy_from_slice(&boots.to_be_bytes());
        salt[4..].copy_from_slice(&counter.to_be_bytes());
        salt
    }

    fn next_aes_salt(&self) -> [u8; 8] {
        self.aes_salt
            .fetch_add(1, Ordering::Relaxed)
            .to_be_bytes()
    }

    fn encrypt_scoped_pdu(
        &self,
        sec: &SessionSecurity,
        boots: u32,
        time: u32,
        scoped_pdu: &[u8],
    ) -> SnmpResult<(Vec<u8>, Vec<u8>)> {
        let proto = sec
            .priv_protocol
            .ok_or_else(|| SnmpError::new(ErrorKind::ScNotConfigured))?;
        if sec.priv_key.len() < PRIV_KEY_LEN {
            return Err(SnmpError::with_detail(
                ErrorKind::ScGeneralFailure,
                "privacy key too short",
            ));
        }
        match proto {
            PrivProtocol::DesCbc => {
                let salt = self.next_des_salt(boots);
                let mut iv = [0u8; DES_BLOCK_LEN];
                for (i, b) in iv.iter_mut().enumerate() {
                    *b = salt[i] ^ sec.priv_key[DES_BLOCK_LEN + i];
                }
                let ct = proto.encrypt(&sec.priv_key, &iv, scoped_pdu)?;
                Ok((ct, salt.to_vec()))
            },
            PrivProtocol::AesCfb128 => {
                let salt = self.next_aes_salt();
                let mut iv = [0u8; AES_IV_LEN];
                iv[..4].copy_from_slice(&boots.to_be_bytes());
                iv[4..8].copy_from_slice(&time.to_be_bytes());
                iv[8..].copy_from_slice(&salt);
                let ct = proto.encrypt(&sec.priv_key, &iv, scoped_pdu)?;
                Ok((ct, salt.to_vec()))
            },
        }
    }

    /// Assemble `SEQUENCE { global_data, OCTET STRING(sec_params),
    /// msg_data }` and authenticate it in place.
    fn assemble_and_auth(
        &self,
        params: &OutgoingParams<'_>,
        sec_params: &[u8],
        msg_data: &[u8],
        priv_params_len: usize,
    ) -> SnmpResult<Vec<u8>> {
        let sec = params.sec;
        let sp_len_bytes = encode_length(sec_params.len())?;
        let inner_len = params.global_data.len()
            + 1
            + sp_len_bytes.len()
            + sec_params.len()
            + msg_data.len();
        let outer_len_bytes = encode_length(inner_len)?;

        let mut whole = Vec::with_capacity(1 + outer_len_bytes.len() + inner_len);
        whole.push(TAG_SEQUENCE);
        whole.extend_from_slice(&outer_len_bytes);
        whole.extend_from_slice(params.global_data);
        whole.push(TAG_OCTET_STR);
        whole.extend_from_slice(&sp_len_bytes);
        whole.extend_from_slice(sec_params);
        whole.extend_from_slice(msg_data);

        if whole.len() > params.max_msg_size {
            return Err(SnmpError::with_detail(
                ErrorKind::TooLong,
                format!(
                    "message of {} bytes exceeds limit {}",
                    whole.len(),
                    params.max_msg_size
                ),
            ));
        }

        if sec.security_level.requires_auth() {
            let auth = sec
                .auth_protocol
                .ok_or_else(|| SnmpError::new(ErrorKind::ScNotConfigured))?;
            // The auth slot sits at a fixed distance from the tail:
            // [.. auth(12)][priv TLV hdr(2) + priv params][msg_data].
            let auth_offset = whole.len()
                - msg_data.len()
                - (2 + priv_params_len)
                - AUTH_TAG_LEN;
            let tag = auth.auth_tag(&sec.auth_key, &whole)?;
            whole[auth_offset..auth_offset + AUTH_TAG_LEN].copy_from_slice(&tag);
        }

        Ok(whole)
    }

    fn encode(&self, params: &OutgoingParams<'_>) -> SnmpResult<Vec<u8>> {
        let sec = params.sec;
        sec.validate()?;

        let engine_id = &sec.security_engine_id;
        let (boots, time) = self.engine_time(engine_id);

        let (msg_data, priv_params): (Vec<u8>, Vec<u8>) =
            if sec.security_level.requires_priv() {
                let (ciphertext, salt) =
                    self.encrypt_scoped_pdu(sec, boots, time, params.scoped_pdu)?;
                let mut data =
                    Vec::with_capacity(ciphertext.len() + 6);
                data.push(TAG_OCTET_STR);
                data.extend_from_slice(&encode_length(ciphertext.len())?);
                data.extend_from_slice(&ciphertext);
                (data, salt)
            } else {
                (params.scoped_pdu.to_vec(), Vec::new())
            };

        let sec_params = self.build_sec_params(
            engine_id,
            boots,
            time,
            &sec.security_name,
            sec.security_level.requires_auth(),
            &priv_params,
        )?;

        self.assemble_and_auth(params, &sec_params, &msg_data, priv_params.len())
    }

    // ---- incoming ----

    fn decrypt_msg_data(
        &self,
        user: &UsmUser,
        wire: &WireSecParams<'_>,
        msg_data: &[u8],
    ) -> SnmpResult<Vec<u8>> {
        let proto = user.priv_protocol.ok_or_else(|| {
            self.stats.inc(StatId::UsmStatsDecryptionErrors);
            SnmpError::new(ErrorKind::UsmDecryptFailure)
        })?;
        let mut r = Reader::new(msg_data);
        let ciphertext = r.read_octets(TAG_OCTET_STR).map_err(|_| {
            self.stats.inc(StatId::UsmStatsDecryptionErrors);
            SnmpError::new(ErrorKind::UsmDecryptFailure)
        })?;
        if wire.priv_params.len() != 8 {
            self.stats.inc(StatId::UsmStatsDecryptionErrors);
            return Err(SnmpError::with_detail(
                ErrorKind::UsmDecryptFailure,
                format!("privacy parameters of {} octets", wire.priv_params.len()),
            ));
        }

        let plaintext = match proto {
            PrivProtocol::DesCbc => {
                let mut iv = [0u8; DES_BLOCK_LEN];
                for (i, b) in iv.iter_mut().enumerate() {
                    *b = wire.priv_params[i] ^ user.priv_key[DES_BLOCK_LEN + i];
                }
                proto.decrypt(&user.priv_key, &iv, ciphertext)
            },
            PrivProtocol::AesCfb128 => {
                let mut iv = [0u8; AES_IV_LEN];
                iv[..4].copy_from_slice(&wire.engine_boots.to_be_bytes());
                iv[4..8].copy_from_slice(&wire.engine_time.to_be_bytes());
                iv[8..].copy_from_slice(wire.priv_params);
                proto.decrypt(&user.priv_key, &iv, ciphertext)
            },
        }
        .map_err(|e| {
            self.stats.inc(StatId::UsmStatsDecryptionErrors);
            e
        })?;

        if plaintext.first() != Some(&TAG_SEQUENCE) {
            self.stats.inc(StatId::UsmStatsDecryptionErrors);
            return Err(SnmpError::with_detail(
                ErrorKind::UsmDecryptFailure,
                "decrypted payload is not a ScopedPDU",
            ));
        }
        Ok(plaintext)
    }
}

impl SecurityModel for Usm {
    fn number(&self) -> u32 {
        USM_SEC_MODEL
    }

    fn name(&self) -> &'static str {
        "usm"
    }

    fn session_setup(
        &self,
        template: &SessionSecurity,
        target: &mut SessionSecurity,
    ) -> SnmpResult<()> {
        target.security_model = USM_SEC_MODEL;
        target.security_name = template.security_name.clone();
        target.security_level = template.security_level;
        target.auth_protocol = template.auth_protocol;
        target.auth_key = template.auth_key.clone();
        target.auth_master_key = template.auth_master_key.clone();
        target.priv_protocol = template.priv_protocol;
        target.priv_key = template.priv_key.clone();
        target.priv_master_key = template.priv_master_key.clone();
        Ok(())
    }

    fn session_open(&self, sec: &mut SessionSecurity) -> SnmpResult<()> {
        sec.validate()?;
        if !sec.security_engine_id.is_empty() {
            self.localize_session_keys(sec)?;
            self.register_session_user(sec)?;
            let (boots, time) = self.engine_time(&sec.security_engine_id);
            sec.engine_boots = boots;
            sec.engine_time = time;
        }
        Ok(())
    }

    fn session_close(&self, _sec: &mut SessionSecurity) {}

    /// RFC 5343: a GET on snmpEngineID.0 under the well-known local
    /// contextEngineID 80:00:00:00:06 discovers the peer's engine id.
    /// Discovery always travels noAuthNoPriv with an anonymous user; the
    /// session's keys cannot be localized before the engine id is known.
    fn probe_pdu(&self, sec: &SessionSecurity) -> Option<Pdu> {
        if !sec.security_engine_id.is_empty() {
            return None;
        }
        let mut pdu = Pdu::new(PduType::Get);
        pdu.context_engine_id = vec![0x80, 0x00, 0x00, 0x00, 0x06];
        pdu.security_model = USM_SEC_MODEL;
        pdu.security_level = SecurityLevel::NoAuthNoPriv;
        pdu.add_null_varbind(
            crate::models::oid::Oid::from_slice(&[1, 3, 6, 1, 6, 3, 10, 2, 1, 1, 0])
                .ok()?,
        );
        Some(pdu)
    }

    fn post_probe(&self, sec: &mut SessionSecurity) -> SnmpResult<()> {
        if sec.context_engine_id.is_empty() {
            sec.context_engine_id = sec.security_engine_id.clone();
        }
        self.localize_session_keys(sec)?;
        self.register_session_user(sec)?;
        let (boots, time) = self.engine_time(&sec.security_engine_id);
        sec.engine_boots = boots;
        sec.engine_time = time;
        Ok(())
    }

    fn encode_forward(&self, params: &OutgoingParams<'_>) -> SnmpResult<Vec<u8>> {
        self.encode(params)
    }

    // The assembly is a pure prepend around pre-encoded payloads, so the
    // reverse entry point shares the forward implementation; byte output
    // is identical by construction.
    fn encode_reverse(&self, params: &OutgoingParams<'_>) -> SnmpResult<Vec<u8>> {
        self.encode(params)
    }

    fn decode(&self, params: &IncomingParams<'_>) -> SnmpResult<DecodedMessage> {
        let wire = self.parse_sec_params(params.sec_params)?;

        // Discovery: a reportable request addressed to nobody in
        // particular wants a report carrying our engine id.
        if wire.engine_id.is_empty() {
            self.stats.inc(StatId::UsmStatsUnknownEngineIds);
            return Err(SnmpError::with_detail(
                ErrorKind::UsmUnknownEngineId,
                "empty authoritative engine id",
            ));
        }

        // An engine we have never heard from becomes known now; the entry
        // stays unauthenticated until a verified message confirms it.
        if !self.engine_known(wire.engine_id) {
            self.set_engine_time(
                wire.engine_id,
                wire.engine_boots,
                wire.engine_time,
                false,
            );
        }

        let user_name = String::from_utf8_lossy(wire.user_name).into_owned();

        // Anonymous noAuth messages (classic discovery exchanges) skip the
        // user machinery entirely.
        if user_name.is_empty()
            && params.security_level == SecurityLevel::NoAuthNoPriv
        {
            return Ok(DecodedMessage {
                scoped_pdu: params.msg_data.to_vec(),
                security_engine_id: wire.engine_id.to_vec(),
                security_name: user_name.clone(),
                security_level: SecurityLevel::NoAuthNoPriv,
                engine_boots: wire.engine_boots,
                engine_time: wire.engine_time,
                security_state: SecurityStateRef::new(UsmSecState {
                    engine_id: wire.engine_id.to_vec(),
                    user_name: String::new(),
                    security_name: String::new(),
                    security_level: SecurityLevel::NoAuthNoPriv,
                    auth_protocol: None,
                    auth_key: Vec::new(),
                    priv_protocol: None,
                    priv_key: Vec::new(),
                }),
            });
        }

        let user = self
            .find_user(wire.engine_id, &user_name)
            .ok_or_else(|| {
                self.stats.inc(StatId::UsmStatsUnknownUserNames);
                SnmpError::with_detail(
                    ErrorKind::UsmUnknownUser,
                    format!("no such user {user_name:?}"),
                )
            })?;

        if params.security_level > user.max_level() {
            self.stats.inc(StatId::UsmStatsUnsupportedSecLevels);
            return Err(SnmpError::with_detail(
                ErrorKind::UsmUnsupportedLevel,
                format!(
                    "user {user_name:?} cannot satisfy {:?}",
                    params.security_level
                ),
            ));
        }

        if params.security_level.requires_auth() {
            let auth = user.auth_protocol.ok_or_else(|| {
                self.stats.inc(StatId::UsmStatsUnsupportedSecLevels);
                SnmpError::new(ErrorKind::UsmUnsupportedLevel)
            })?;
            if wire.auth_params.len() != AUTH_TAG_LEN {
                self.stats.inc(StatId::UsmStatsWrongDigests);
                return Err(SnmpError::with_detail(
                    ErrorKind::UsmAuthFailure,
                    "missing authentication parameters",
                ));
            }
            let auth_offset = wire.auth_params.as_ptr() as usize
                - params.whole_msg.as_ptr() as usize;
            let mut zeroed = params.whole_msg.to_vec();
            zeroed[auth_offset..auth_offset + AUTH_TAG_LEN].fill(0);
            let ok =
                auth.check_auth_tag(&user.auth_key, &zeroed, wire.auth_params)?;
            if !ok {
                self.stats.inc(StatId::UsmStatsWrongDigests);
                return Err(SnmpError::with_detail(
                    ErrorKind::UsmAuthFailure,
                    format!("digest mismatch for user {user_name:?}"),
                ));
            }

            self.check_time_window(
                wire.engine_id,
                wire.engine_boots,
                wire.engine_time,
            )?;
        }

        let scoped_pdu = if params.security_level.requires_priv() {
            self.decrypt_msg_data(&user, &wire, params.msg_data)?
        } else {
            params.msg_data.to_vec()
        };

        Ok(DecodedMessage {
            scoped_pdu,
            security_engine_id: wire.engine_id.to_vec(),
            security_name: user.security_name.clone(),
            security_level: params.security_level,
            engine_boots: wire.engine_boots,
            engine_time: wire.engine_time,
            security_state: SecurityStateRef::new(UsmSecState {
                engine_id: wire.engine_id.to_vec(),
                user_name: user.user_name.clone(),
                security_name: user.security_name.clone(),
                security_level: params.security_level,
                auth_protocol: user.auth_protocol,
                auth_key: user.auth_key.clone(),
                priv_protocol: user.priv_protocol,
                priv_key: user.priv_key.clone(),
            }),
        })
    }

    fn report_recoverable(&self, kind: ErrorKind) -> bool {
        // The LCD was refreshed while decoding the report itself, so a
        // single retransmit with fresh time parameters can succeed.
        matches!(
            kind,
            ErrorKind::UsmNotInTimeWindow | ErrorKind::NotInTimeWindow
        )
    }

    fn make_report(&self, request: &Pdu, kind: ErrorKind) -> SnmpResult<Pdu> {
        let stat = match kind {
            ErrorKind::UsmUnknownEngineId | ErrorKind::UnknownEngineId => {
                StatId::UsmStatsUnknownEngineIds
            },
            ErrorKind::UsmUnknownUser | ErrorKind::UnknownUserName => {
                StatId::UsmStatsUnknownUserNames
            },
            ErrorKind::UsmUnsupportedLevel | ErrorKind::UnsupportedSecLevel => {
                StatId::UsmStatsUnsupportedSecLevels
            },
            ErrorKind::UsmAuthFailure | ErrorKind::AuthenticationFailure => {
                StatId::UsmStatsWrongDigests
            },
            ErrorKind::UsmDecryptFailure | ErrorKind::DecryptionError => {
                StatId::UsmStatsDecryptionErrors
            },
            ErrorKind::UsmNotInTimeWindow | ErrorKind::NotInTimeWindow => {
                StatId::UsmStatsNotInTimeWindows
            },
            _ => {
                return Err(SnmpError::with_detail(
                    ErrorKind::UnknownReport,
                    format!("no report counter for {kind:?}"),
                ));
            },
        };
        let counter_oid = stat.report_oid().ok_or_else(|| {
            SnmpError::new(ErrorKind::UnknownReport)
        })?;
        let value = self.stats.get(stat);

        let mut report = Pdu::new(PduType::Report);
        report.request_id = request.request_id;
        report.msg_id = request.msg_id;
        report.context_engine_id = self.local_engine_id.clone();
        report.security_engine_id = self.local_engine_id.clone();
        report.security_model = USM_SEC_MODEL;
        // NotInTimeWindow reports prove the sender's identity so the peer
        // can trust the corrected clock; everything else goes out noAuth.
        report.security_level = if stat == StatId::UsmStatsNotInTimeWindows {
            SecurityLevel::AuthNoPriv
        } else {
            SecurityLevel::NoAuthNoPriv
        };
        if report.security_level.requires_auth() {
            report.security_name = request.security_name.clone();
            report.security_state = request
                .security_state
                .as_ref()
                .map(|s| self.clone_pdu_state(s));
        }
        report.flags.remove(PduFlags::REPORTABLE);
        report.add_varbind(VarBind::new(
            counter_oid,
            Value::Counter32(value as u32),
        ));
        if value > u32::MAX as u64 {
            warn!(stat = ?stat, "report counter wrapped past 32 bits");
        }
        Ok(report)
    }
}
