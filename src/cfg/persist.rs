// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Persistent state: the engine boot counter and the USM user table,
//! one text file per application under `persistentDir`. The file is
//! rewritten atomically (temp file + rename) on shutdown and whenever the
//! store-needed flag was raised.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use tracing::{debug, warn};

use crate::{
    cfg::enums::{AuthKind, PrivKind},
    error::{ErrorKind, SnmpError, SnmpResult},
    security::usm::{StorageType, UserStatus, UsmUser},
};

/// Store handle bound to one application name.
#[derive(Debug)]
pub struct PersistentStore {
    path: PathBuf,
    needed: AtomicBool,
}

/// State recovered from disk at startup.
#[derive(Debug, Default)]
pub struct LoadedState {
    /// Boot counter already incremented for the current run.
    pub engine_boots: u32,
    pub engine_id: Option<Vec<u8>>,
    pub users: Vec<UsmUser>,
}

impl PersistentStore {
    pub fn new(dir: impl AsRef<Path>, app_name: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{app_name}.conf")),
            needed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mark that a configuration change wants flushing.
    pub fn mark_needed(&self) {
        self.needed.store(true, Ordering::Relaxed);
    }

    pub fn is_needed(&self) -> bool {
        self.needed.load(Ordering::Relaxed)
    }

    /// Read the store and bump the boot counter for this run. A missing
    /// file is a first boot, not an error.
    pub fn load(&self) -> SnmpResult<LoadedState> {
        let mut state = LoadedState {
            engine_boots: 1,
            ..Default::default()
        };
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no persistent state yet");
                self.mark_needed();
                return Ok(state);
            },
            Err(e) => {
                return Err(SnmpError::with_detail(
                    ErrorKind::GenErr,
                    format!("cannot read {}: {e}", self.path.display()),
                ));
            },
        };

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            match fields.next() {
                Some("engineBoots") => {
                    if let Some(Ok(boots)) = fields.next().map(str::parse::<u32>)
                    {
                        state.engine_boots = boots.saturating_add(1);
                    }
                },
                Some("engineID") => {
                    if let Some(Ok(id)) = fields.next().map(hex::decode) {
                        state.engine_id = Some(id);
                    }
                },
                Some("usmUser") => match parse_user_line(fields) {
                    Ok(user) => state.users.push(user),
                    Err(e) => warn!(
                        line = lineno + 1,
                        "skipping unreadable usmUser line: {e}"
                    ),
                },
                Some(other) => {
                    debug!(line = lineno + 1, "ignoring directive {other:?}");
                },
                None => {},
            }
        }
        // The bumped boot counter must make it back to disk.
        self.mark_needed();
        Ok(state)
    }

    /// Write the store atomically. Volatile users are skipped.
    pub fn save(
        &self,
        engine_id: &[u8],
        engine_boots: u32,
        users: &[UsmUser],
    ) -> SnmpResult<()> {
        let mut out = String::new();
        out.push_str("# written by snmp-client-rs; do not edit while running\n");
        out.push_str(&format!("engineBoots {engine_boots}\n"));
        out.push_str(&format!("engineID {}\n", hex::encode(engine_id)));
        for user in users {
            if user.storage_type == StorageType::Volatile {
                continue;
            }
            out.push_str(&format_user_line(user));
            out.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SnmpError::with_detail(ErrorKind::GenErr, e.to_string())
            })?;
        }
        let tmp = self.path.with_extension("conf.tmp");
        fs::write(&tmp, out)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                SnmpError::with_detail(
                    ErrorKind::GenErr,
                    format!("cannot write {}: {e}", self.path.display()),
                )
            })?;
        self.needed.store(false, Ordering::Relaxed);
        debug!(path = %self.path.display(), "persistent state written");
        Ok(())
    }
}

/// `usmUser <hexEngine> <name> <secName> <auth> <hexKey> <priv> <hexKey>`
/// with keys restored verbatim (already localized).
fn format_user_line(user: &UsmUser) -> String {
    format!(
        "usmUser {} {} {} {} {} {} {}",
        if user.is_template() {
            "*".to_string()
        } else {
            hex::encode(&user.engine_id)
        },
        user.user_name,
        user.security_name,
        AuthKind::from_protocol(user.auth_protocol),
        if user.auth_key.is_empty() {
            "-".to_string()
        } else {
            hex::encode(&user.auth_key)
        },
        PrivKind::from_protocol(user.priv_protocol),
        if user.priv_key.is_empty() {
            "-".to_string()
        } else {
            hex::encode(&user.priv_key)
        },
    )
}

fn parse_user_line<'a>(
    mut fields: impl Iterator<Item = &'a str>,
) -> SnmpResult<UsmUser> {
    let bad = |what: &str| {
        SnmpError::with_detail(ErrorKind::GenErr, format!("missing {what}"))
    };
    let engine_field = fields.next().ok_or_else(|| bad("engine id"))?;
    let engine_id = if engine_field == "*" {
        b"*".to_vec()
    } else {
        hex::decode(engine_field)
            .map_err(|_| bad("hex engine id"))?
    };
    let user_name = fields.next().ok_or_else(|| bad("user name"))?.to_string();
    let security_name =
        fields.next().ok_or_else(|| bad("security name"))?.to_string();

    let auth_kind: AuthKind =
        serde_yaml::from_str(fields.next().ok_or_else(|| bad("auth proto"))?)
            .map_err(|_| bad("auth proto"))?;
    let auth_field = fields.next().ok_or_else(|| bad("auth key"))?;
    let auth_key = if auth_field == "-" {
        Vec::new()
    } else {
        hex::decode(auth_field).map_err(|_| bad("hex auth key"))?
    };

    let priv_kind: PrivKind =
        serde_yaml::from_str(fields.next().ok_or_else(|| bad("priv proto"))?)
            .map_err(|_| bad("priv proto"))?;
    let priv_field = fields.next().ok_or_else(|| bad("priv key"))?;
    let priv_key = if priv_field == "-" {
        Vec::new()
    } else {
        hex::decode(priv_field).map_err(|_| bad("hex priv key"))?
    };

    Ok(UsmUser {
        engine_id,
        user_name,
        security_name,
        auth_protocol: auth_kind.to_protocol(),
        auth_key,
        priv_protocol: priv_kind.to_protocol(),
        priv_key,
        storage_type: StorageType::NonVolatile,
        status: UserStatus::Active,
    })
}
