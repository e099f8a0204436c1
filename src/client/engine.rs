// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Engine context: the former process-wide singletons (statistics, the
//! security-model registry, identifier counters, the USM instance) rolled
//! into one explicitly-passed struct. A lazily-built default context backs
//! callers that do not care to manage their own.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use rand::RngExt;

use crate::{
    error::SnmpResult,
    security::{SecModRegistry, SecurityModel, usm::Usm},
    stats::Stats,
    utils::IdGenerator,
};

/// Knobs the engine itself consumes; everything else stays in the session
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Local engine id; generated when absent.
    pub engine_id: Option<Vec<u8>>,
    /// Persisted boot counter (already incremented for this run).
    pub engine_boots: u32,
    /// Mask minted identifiers to 15 bits (`16bitIDs`).
    pub short_ids: bool,
    /// Hex-dump every message on the wire (`dumpPacket`).
    pub dump_packets: bool,
    /// Prefer the reverse BER builder (`reverseEncodeBER`).
    pub reverse_encode: bool,
}

/// Shared engine state; sessions hold an `Arc<Engine>`.
pub struct Engine {
    pub stats: Arc<Stats>,
    pub registry: SecModRegistry,
    pub usm: Arc<Usm>,
    pub req_ids: IdGenerator,
    pub msg_ids: IdGenerator,
    pub session_ids: IdGenerator,
    pub transaction_ids: IdGenerator,
    pub dump_packets: bool,
    pub reverse_encode: bool,
}

static DEFAULT_ENGINE: OnceCell<Arc<Engine>> = OnceCell::new();

impl Engine {
    pub fn new(opts: EngineOptions) -> SnmpResult<Arc<Self>> {
        let stats = Arc::new(Stats::new());
        let engine_id = opts
            .engine_id
            .unwrap_or_else(Self::generate_engine_id);
        let usm = Arc::new(Usm::new(engine_id, Arc::clone(&stats)));
        if opts.engine_boots > 0 {
            usm.set_local_engine_boots(opts.engine_boots);
        }

        let registry = SecModRegistry::new();
        registry.register(Arc::clone(&usm) as Arc<dyn SecurityModel>)?;

        Ok(Arc::new(Self {
            stats,
            registry,
            usm,
            req_ids: IdGenerator::new(opts.short_ids),
            msg_ids: IdGenerator::new(opts.short_ids),
            session_ids: IdGenerator::new(opts.short_ids),
            transaction_ids: IdGenerator::new(opts.short_ids),
            dump_packets: opts.dump_packets,
            reverse_encode: opts.reverse_encode,
        }))
    }

    /// The process default, created on first use with default options.
    /// `install_default` may be called once, before first use, to replace
    /// it with a configured engine.
    pub fn default_engine() -> Arc<Engine> {
        Arc::clone(DEFAULT_ENGINE.get_or_init(|| {
            Engine::new(EngineOptions::default())
                .expect("default engine construction cannot fail")
        }))
    }

    pub fn install_default(engine: Arc<Engine>) -> bool {
        DEFAULT_ENGINE.set(engine).is_ok()
    }

    /// Local engine id in the enterprise-random format: the enterprise
    /// prefix with the MSB set, one format octet, eight CSPRNG octets.
    pub fn generate_engine_id() -> Vec<u8> {
        let mut id = vec![0x80, 0x00, 0x1f, 0x88, 0x80];
        let mut tail = [0u8; 8];
        rand::rng().fill(&mut tail);
        id.extend_from_slice(&tail);
        id
    }
}
