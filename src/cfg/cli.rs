// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))?;

    Ok(canon)
}

/// Split the demo binary's argument list into (config path, peer, oid).
pub fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let _argv0 = args.next();
    let mut config = "tests/config.yaml".to_string();
    let mut peer = None;
    let mut oid = "1.3.6.1.2.1.1.5.0".to_string();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                config = args.next().context("-c requires a path")?;
            },
            "-O" | "--oid" => {
                oid = args.next().context("-O requires an OID")?;
            },
            other if other.starts_with('-') => {
                bail!("unknown option {other:?}");
            },
            other => peer = Some(other.to_string()),
        }
    }

    Ok(CliArgs {
        config,
        peer: peer.context("peer address argument is required")?,
        oid,
    })
}

#[derive(Debug)]
pub struct CliArgs {
    pub config: String,
    pub peer: String,
    pub oid: String,
}
