// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! One transport endpoint plus the background read loop that correlates
//! inbound messages to waiting requests.
//!
//! Outbound requests register an mpsc sender under their msgID and get
//! the receiving half back; the read loop peeks just far enough into each
//! inbound message to recover the msgID and hands the raw bytes to the
//! matching waiter. Anything without a waiter (agent-side requests,
//! context probes) goes to the unsolicited channel when one is installed,
//! otherwise it bumps `snmpUnknownPDUHandlers` and is dropped.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    client::transport::Transport,
    error::{ErrorKind, SnmpError, SnmpResult},
    models::message,
    stats::{StatId, Stats},
    utils::hex_dump,
};

/// Connection over one transport endpoint.
#[derive(Debug)]
pub struct SnmpConnection {
    transport: Transport,
    /// msgID -> sender feeding the waiting request. Entries stay until
    /// the owner forgets them, so one request can sift through several
    /// frames (mismatched responses are dropped, not fatal).
    pending: DashMap<i32, mpsc::Sender<Bytes>>,
    /// Messages nobody was waiting for (responder path).
    unsolicited: OnceCell<mpsc::Sender<Bytes>>,
    stats: Arc<Stats>,
    dump_packets: bool,
    /// Hard-stop token: read and write paths abort when cancelled.
    cancel: CancellationToken,
    /// Cancelled by the read loop on exit (EOF, error, cancellation), so
    /// listeners can observe a peer disconnect.
    done: CancellationToken,
}

impl SnmpConnection {
    /// Wrap a transport and start its read loop.
    pub fn start(
        transport: Transport,
        stats: Arc<Stats>,
        dump_packets: bool,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let conn = Arc::new(Self {
            transport,
            pending: DashMap::new(),
            unsolicited: OnceCell::new(),
            stats,
            dump_packets,
            cancel,
            done: CancellationToken::new(),
        });

        let reader = Arc::clone(&conn);
        tokio::spawn(async move {
            let done = reader.done.clone();
            if let Err(e) = reader.read_loop().await {
                if e.kind() != ErrorKind::Abort {
                    warn!("read loop exited: {e}");
                }
            }
            done.cancel();
        });

        conn
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    #[inline]
    pub fn cancel_now(&self) {
        self.cancel.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token observed by listeners: fires when the read loop ends.
    pub fn done_token(&self) -> CancellationToken {
        self.done.clone()
    }

    /// Install the sink for messages with no registered waiter. Returns
    /// false if a sink was already installed.
    pub fn set_unsolicited_sink(&self, tx: mpsc::Sender<Bytes>) -> bool {
        self.unsolicited.set(tx).is_ok()
    }

    /// Transmit `bytes` and register a waiter under `msg_id`; the caller
    /// owns the receiving half and must `forget_request` when done. A
    /// send failure unregisters the waiter again.
    pub async fn send_request(
        &self,
        msg_id: i32,
        bytes: &[u8],
    ) -> SnmpResult<mpsc::Receiver<Bytes>> {
        if self.cancel.is_cancelled() {
            return Err(SnmpError::new(ErrorKind::BadSession));
        }

        let (tx, rx) = mpsc::channel::<Bytes>(4);
        self.pending.insert(msg_id, tx);

        if let Err(e) = self.send_now(bytes).await {
            self.pending.remove(&msg_id);
            return Err(e);
        }
        Ok(rx)
    }

    /// Transmit without expecting a reply (responses, reports, traps).
    pub async fn send_now(&self, bytes: &[u8]) -> SnmpResult<()> {
        if self.dump_packets {
            debug!("sending {} bytes:\n{}", bytes.len(), hex_dump(bytes));
        }
        self.transport.send(bytes).await?;
        self.stats.inc(StatId::SnmpOutPkts);
        Ok(())
    }

    /// Drop the waiter for `msg_id` (completion, timeout, resend).
    pub fn forget_request(&self, msg_id: i32) {
        self.pending.remove(&msg_id);
    }

    async fn read_loop(self: Arc<Self>) -> SnmpResult<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(SnmpError::new(ErrorKind::Abort));
            }

            let frame = self.transport.recv_frame(&self.cancel).await?;
            self.stats.inc(StatId::SnmpInPkts);
            if self.dump_packets {
                debug!("received {} bytes:\n{}", frame.len(), hex_dump(&frame));
            }

            // Peek the envelope for the msgID; a message we cannot even
            // frame is counted and dropped without touching any session.
            let msg_id = match message::parse_envelope(&frame) {
                Ok(envelope) => envelope.msg_id,
                Err(e) => {
                    match e.kind() {
                        ErrorKind::BadVersion => {
                            self.stats.inc(StatId::SnmpInBadVersions);
                        },
                        ErrorKind::InvalidMsg => {
                            self.stats.inc(StatId::SnmpInvalidMsgs);
                        },
                        _ => {
                            self.stats.inc(StatId::SnmpInAsnParseErrs);
                        },
                    }
                    debug!("dropping undecodable message: {e}");
                    continue;
                },
            };

            // Clone the sender out so no map guard is held across await.
            let waiter = self.pending.get(&msg_id).map(|e| e.value().clone());
            if let Some(tx) = waiter {
                if tx.send(frame).await.is_err() {
                    debug!(msg_id, "waiter went away before delivery");
                }
                continue;
            }

            if let Some(tx) = self.unsolicited.get()
                && tx.send(frame).await.is_ok()
            {
                continue;
            }
            self.stats.inc(StatId::SnmpUnknownPduHandlers);
            debug!(msg_id, "no handler for inbound message");
        }
    }
}
