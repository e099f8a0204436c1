// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Fixed, enum-indexed protocol event counters.
//!
//! The counter block is owned by the [`crate::client::engine::Engine`]
//! context; every increment goes through a typed [`StatId`] so there is no
//! stringly-typed lookup on the hot path. The USM/MPD subset additionally
//! maps to MIB instance OIDs so report PDUs can carry the current value.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::oid::Oid;

/// Typed index into the counter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum StatId {
    // MPD group (RFC 3412)
    SnmpUnknownSecurityModels,
    SnmpInvalidMsgs,
    SnmpUnknownPduHandlers,

    // USM group (RFC 3414)
    UsmStatsUnsupportedSecLevels,
    UsmStatsNotInTimeWindows,
    UsmStatsUnknownUserNames,
    UsmStatsUnknownEngineIds,
    UsmStatsWrongDigests,
    UsmStatsDecryptionErrors,

    // Protocol I/O group
    SnmpInPkts,
    SnmpOutPkts,
    SnmpInBadVersions,
    SnmpInBadCommunityNames,
    SnmpInBadCommunityUses,
    SnmpInAsnParseErrs,
    SnmpInTooBigs,
    SnmpInNoSuchNames,
    SnmpInBadValues,
    SnmpInReadOnlys,
    SnmpInGenErrs,
    SnmpInTotalReqVars,
    SnmpInTotalSetVars,
    SnmpInGetRequests,
    SnmpInGetNexts,
    SnmpInSetRequests,
    SnmpInGetResponses,
    SnmpInTraps,
    SnmpOutTooBigs,
    SnmpOutNoSuchNames,
    SnmpOutBadValues,
    SnmpOutGenErrs,
    SnmpOutGetRequests,
    SnmpOutGetNexts,
    SnmpOutSetRequests,
    SnmpOutGetResponses,
    SnmpOutTraps,
    SnmpSilentDrops,
    SnmpProxyDrops,

    // Target MIB group (RFC 3413)
    SnmpUnavailableContexts,
    SnmpUnknownContexts,
}

const STAT_COUNT: usize = StatId::SnmpUnknownContexts as usize + 1;

/// Counter block. Increments are relaxed; exactness across threads matters
/// less than never blocking the I/O path.
#[derive(Debug)]
pub struct Stats {
    counters: [AtomicU64; STAT_COUNT],
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            counters: [const { AtomicU64::new(0) }; STAT_COUNT],
        }
    }

    #[inline]
    pub fn inc(&self, id: StatId) -> u64 {
        self.counters[id as usize].fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn get(&self, id: StatId) -> u64 {
        self.counters[id as usize].load(Ordering::Relaxed)
    }
}

impl StatId {
    /// MIB instance OID for counters that can appear in report PDUs.
    /// Non-reportable counters have no instance mapping.
    pub fn report_oid(self) -> Option<Oid> {
        let subids: &[u32] = match self {
            StatId::SnmpUnknownSecurityModels => {
                &[1, 3, 6, 1, 6, 3, 11, 2, 1, 1, 0]
            },
            StatId::SnmpInvalidMsgs => &[1, 3, 6, 1, 6, 3, 11, 2, 1, 2, 0],
            StatId::SnmpUnknownPduHandlers => &[1, 3, 6, 1, 6, 3, 11, 2, 1, 3, 0],
            StatId::UsmStatsUnsupportedSecLevels => {
                &[1, 3, 6, 1, 6, 3, 15, 1, 1, 1, 0]
            },
            StatId::UsmStatsNotInTimeWindows => &[1, 3, 6, 1, 6, 3, 15, 1, 1, 2, 0],
            StatId::UsmStatsUnknownUserNames => &[1, 3, 6, 1, 6, 3, 15, 1, 1, 3, 0],
            StatId::UsmStatsUnknownEngineIds => &[1, 3, 6, 1, 6, 3, 15, 1, 1, 4, 0],
            StatId::UsmStatsWrongDigests => &[1, 3, 6, 1, 6, 3, 15, 1, 1, 5, 0],
            StatId::UsmStatsDecryptionErrors => &[1, 3, 6, 1, 6, 3, 15, 1, 1, 6, 0],
            _ => return None,
        };
        Oid::from_slice(subids).ok()
    }

    /// Inverse of [`StatId::report_oid`]: classify an inbound report
    /// varbind by its OID prefix (the instance suffix is ignored).
    pub fn classify_report(oid: &Oid) -> Option<StatId> {
        const CANDIDATES: [StatId; 9] = [
            StatId::SnmpUnknownSecurityModels,
            StatId::SnmpInvalidMsgs,
            StatId::SnmpUnknownPduHandlers,
            StatId::UsmStatsUnsupportedSecLevels,
            StatId::UsmStatsNotInTimeWindows,
            StatId::UsmStatsUnknownUserNames,
            StatId::UsmStatsUnknownEngineIds,
            StatId::UsmStatsWrongDigests,
            StatId::UsmStatsDecryptionErrors,
        ];
        CANDIDATES.into_iter().find(|c| {
            c.report_oid()
                .map(|base| {
                    let prefix = &base.as_slice()[..base.len() - 1];
                    oid.as_slice().starts_with(prefix)
                })
                .unwrap_or(false)
        })
    }
}
