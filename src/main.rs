// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use snmp_client_rs::{
    cfg::{
        cli::{parse_args, resolve_config_path},
        config::Config,
        logger::init_logger,
        persist::PersistentStore,
    },
    client::{engine::Engine, session::Session},
    models::{oid::Oid, pdu::{Pdu, PduType}},
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args())?;
    let _logger_guard = init_logger("tests/config_logger.yaml").ok();

    let cfg = resolve_config_path(&args.config)
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    // Recover persisted engine state unless disabled, then build the
    // engine context and feed it the configured users.
    let mut engine_opts = cfg.engine_options()?;
    let store = cfg.engine.persistent_dir.as_ref().map(|dir| {
        PersistentStore::new(dir, env!("CARGO_PKG_NAME"))
    });
    if let Some(store) = &store
        && !cfg.engine.no_persistent_load
    {
        let loaded = store.load()?;
        engine_opts.engine_boots = loaded.engine_boots;
        if engine_opts.engine_id.is_none() {
            engine_opts.engine_id = loaded.engine_id;
        }
    }
    let engine = Engine::new(engine_opts)?;
    cfg.apply_users(&engine)?;
    Engine::install_default(engine.clone());

    // Open the session (this performs engine discovery) and issue one GET.
    let session_cfg = cfg.session_config(&args.peer)?;
    let session = Session::open(engine.clone(), session_cfg)
        .await
        .context("session open failed")?;
    info!(
        peer = %session.peer(),
        engine_id = %hex::encode(session.security().security_engine_id),
        "session established"
    );

    let oid: Oid = args.oid.parse().context("bad OID argument")?;
    let mut pdu = Pdu::new(PduType::Get);
    pdu.add_null_varbind(oid);

    let reply = session.send(pdu).await.context("request failed")?;
    for vb in &reply.varbinds {
        println!("{} = {:?}", vb.name, vb.value);
    }

    session.close().await;
    if let Some(store) = &store
        && !cfg.engine.no_persistent_save
        && store.is_needed()
    {
        store.save(
            engine.usm.local_engine_id(),
            engine.usm.local_engine_boots(),
            &engine.usm.users(),
        )?;
    }

    Ok(())
}
