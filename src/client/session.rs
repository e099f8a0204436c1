// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Session lifecycle and the request machine: engine discovery, send with
//! per-request retry/timeout, report-driven retransmit, response
//! validation, close semantics and the responder path for listener
//! children.

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
use tokio::{net::TcpListener, sync::mpsc, time::timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    client::{
        connection::SnmpConnection,
        engine::Engine,
        transport::Transport,
    },
    error::{ErrorKind, SnmpError, SnmpResult},
    models::{
        message,
        oid::Oid,
        pdu::{Pdu, PduType, SNMP_VERSION_3},
        value::Value,
        varbind::VarBind,
    },
    security::{
        IncomingParams, OutgoingParams, SecurityLevel, SecurityModel,
        SessionSecurity, USM_SEC_MODEL, usm::UsmSecState,
    },
    stats::StatId,
};

/// snmpEngineID.0 — the instance a context probe reads.
const SNMP_ENGINE_ID_OID: [u32; 11] = [1, 3, 6, 1, 6, 3, 10, 2, 1, 1, 0];
/// The RFC 5343 well-known local context engine id.
const LOCAL_CONTEXT_ENGINE_ID: [u8; 5] = [0x80, 0x00, 0x00, 0x00, 0x06];

/// Operation reported to detached-send callbacks and listener events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOp {
    Received,
    TimedOut,
    SendFailed,
    Connect,
    Disconnect,
}

/// Lifecycle notifications from a listening transport.
pub enum SessionEvent {
    /// A peer connected; the child session is ready for traffic.
    Connect(Arc<Session>),
    /// The identified child session saw EOF or a receive error.
    Disconnect(i32),
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Connect(session) => {
                write!(f, "Connect(session {})", session.session_id)
            },
            SessionEvent::Disconnect(id) => write!(f, "Disconnect({id})"),
        }
    }
}

/// Which transport a session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    #[default]
    Udp,
    Tcp,
}

/// Session template: peer, timing and security defaults. Deep-copied on
/// open; later changes to the caller's copy do not affect the session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub version: i64,
    pub peer: SocketAddr,
    pub local: Option<SocketAddr>,
    pub transport: TransportKind,
    pub timeout: Duration,
    pub retries: u32,
    /// 0 means "whatever the transport allows".
    pub snd_msg_max_size: usize,
    pub rcv_msg_max_size: usize,
    pub dont_probe: bool,
    /// Socket buffer hints (stream transports).
    pub send_buf: Option<usize>,
    pub recv_buf: Option<usize>,
    pub security: SessionSecurity,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: SNMP_VERSION_3,
            peer: "127.0.0.1:161".parse().expect("default peer"),
            local: None,
            transport: TransportKind::Udp,
            timeout: Duration::from_secs(1),
            retries: 5,
            snd_msg_max_size: 0,
            rcv_msg_max_size: crate::client::transport::UDP_MSG_MAX_SIZE,
            dont_probe: false,
            send_buf: None,
            recv_buf: None,
            security: SessionSecurity::default(),
        }
    }
}

#[derive(Debug, Default)]
struct LastError {
    sys: Option<i32>,
    proto: Option<ErrorKind>,
}

/// One open session with one peer.
pub struct Session {
    engine: Arc<Engine>,
    conn: Arc<SnmpConnection>,
    pub session_id: i32,
    cfg: SessionConfig,
    sec: Mutex<SessionSecurity>,
    cancel: CancellationToken,
    closed: AtomicBool,
    probing: AtomicBool,
    last_error: Mutex<LastError>,
}

impl Session {
    /// Open a session: copy the template, run the security model's
    /// lifecycle hooks, open the transport, and (for v3, unless
    /// suppressed) discover the peer's engine id.
    pub async fn open(
        engine: Arc<Engine>,
        cfg: SessionConfig,
    ) -> SnmpResult<Arc<Self>> {
        if cfg.version != SNMP_VERSION_3 {
            return Err(SnmpError::with_detail(
                ErrorKind::BadVersion,
                format!("only v3 is supported, got {}", cfg.version),
            ));
        }

        let transport = match cfg.transport {
            TransportKind::Udp => Transport::udp(cfg.peer, cfg.local).await?,
            TransportKind::Tcp => {
                Transport::tcp(cfg.peer, cfg.send_buf, cfg.recv_buf).await?
            },
        };
        let session = Self::from_transport(engine, cfg, transport)?;

        if !session.cfg.dont_probe {
            let needs_probe = session
                .sec
                .lock()
                .map(|s| s.security_engine_id.is_empty())
                .unwrap_or(false);
            if needs_probe && let Err(e) = session.probe_engine_id().await {
                session.close().await;
                return Err(e);
            }
        }

        Ok(session)
    }

    /// Shared constructor for opened and accepted sessions.
    pub(crate) fn from_transport(
        engine: Arc<Engine>,
        cfg: SessionConfig,
        transport: Transport,
    ) -> SnmpResult<Arc<Self>> {
        let mut sec = cfg.security.clone();
        if sec.security_model == 0 {
            sec.security_model = USM_SEC_MODEL;
        }
        let model = engine
            .registry
            .lookup(sec.security_model)
            .ok_or_else(|| SnmpError::new(ErrorKind::UnknownSecModel))?;
        model.session_open(&mut sec)?;

        let cancel = CancellationToken::new();
        let conn = SnmpConnection::start(
            transport,
            Arc::clone(&engine.stats),
            engine.dump_packets,
            cancel.clone(),
        );
        let session_id = engine.session_ids.next_id();

        Ok(Arc::new(Self {
            engine,
            conn,
            session_id,
            cfg,
            sec: Mutex::new(sec),
            cancel,
            closed: AtomicBool::new(false),
            probing: AtomicBool::new(false),
            last_error: Mutex::new(LastError::default()),
        }))
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn peer(&self) -> SocketAddr {
        self.conn.transport().peer()
    }

    /// Local bound address, when the transport knows one (UDP).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.conn.transport().local_addr()
    }

    /// Copy of the current security state (engine ids, level, identity).
    pub fn security(&self) -> SessionSecurity {
        self.sec
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Transient errno pair of the last failure.
    pub fn last_error(&self) -> (Option<i32>, Option<ErrorKind>) {
        self.last_error
            .lock()
            .map(|e| (e.sys, e.proto))
            .unwrap_or((None, None))
    }

    fn record_error(&self, kind: ErrorKind) {
        if let Ok(mut last) = self.last_error.lock() {
            last.proto = Some(kind);
        }
    }

    fn model(&self) -> SnmpResult<Arc<dyn SecurityModel>> {
        let number = self
            .sec
            .lock()
            .map(|s| s.security_model)
            .unwrap_or(USM_SEC_MODEL);
        self.engine
            .registry
            .lookup(number)
            .ok_or_else(|| SnmpError::new(ErrorKind::UnknownSecModel))
    }

    // ---- engine discovery ----

    /// RFC 5343 probe: one GET on snmpEngineID.0 under the well-known
    /// local context. Either a proper Response or a discovery report
    /// teaches us the peer's engine id.
    async fn probe_engine_id(&self) -> SnmpResult<()> {
        if self.probing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.probe_engine_id_inner().await;
        self.probing.store(false, Ordering::SeqCst);
        result
    }

    async fn probe_engine_id_inner(&self) -> SnmpResult<()> {
        let model = self.model()?;
        let sec_snapshot = self.security();
        let Some(mut probe) = model.probe_pdu(&sec_snapshot) else {
            return Ok(());
        };
        probe.request_id = self.engine.req_ids.next_id();

        let reply = Box::pin(self.transact(probe, true)).await?;
        let engine_id = if !reply.security_engine_id.is_empty() {
            reply.security_engine_id.clone()
        } else if let Some(vb) = reply.find_varbind(
            &Oid::from_slice(&SNMP_ENGINE_ID_OID)
                .map_err(|_| SnmpError::new(ErrorKind::GenErr))?,
        ) {
            match &vb.value {
                Value::OctetString(bytes) => bytes.clone(),
                _ => Vec::new(),
            }
        } else {
            Vec::new()
        };

        if engine_id.is_empty() {
            self.record_error(ErrorKind::UnknownEngineId);
            return Err(SnmpError::with_detail(
                ErrorKind::UnknownEngineId,
                "discovery reply carried no engine id",
            ));
        }

        info!(
            session = self.session_id,
            engine_id = %hex::encode(&engine_id),
            "discovered authoritative engine"
        );
        {
            let mut sec = self
                .sec
                .lock()
                .map_err(|_| SnmpError::new(ErrorKind::GenErr))?;
            sec.security_engine_id = engine_id;
            model.post_probe(&mut sec)?;
        }
        Ok(())
    }

    // ---- send path ----

    /// Send a PDU. Confirmed commands wait for the matching Response with
    /// the session's retry/timeout machine and return it; unconfirmed
    /// commands return the PDU unchanged after transmission.
    pub async fn send(&self, pdu: Pdu) -> SnmpResult<Pdu> {
        self.transact(pdu, false).await
    }

    /// Detached send: the callback fires exactly once with the outcome.
    pub fn send_detached<F>(self: &Arc<Self>, pdu: Pdu, callback: F)
    where
        F: FnOnce(CallbackOp, SnmpResult<Pdu>) + Send + 'static,
    {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            match session.send(pdu).await {
                Ok(reply) => callback(CallbackOp::Received, Ok(reply)),
                Err(e) if e.kind() == ErrorKind::Timeout => {
                    callback(CallbackOp::TimedOut, Err(e))
                },
                Err(e) => callback(CallbackOp::SendFailed, Err(e)),
            }
        });
    }

    async fn transact(&self, mut pdu: Pdu, probe_mode: bool) -> SnmpResult<Pdu> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SnmpError::new(ErrorKind::BadSession));
        }
        if pdu.version != SNMP_VERSION_3 {
            self.record_error(ErrorKind::BadVersion);
            return Err(SnmpError::new(ErrorKind::BadVersion));
        }

        let expect_response = pdu.command.expects_response();

        // A confirmed v3 send against an undiscovered peer probes first;
        // a probe failure aborts the send.
        if expect_response && !probe_mode && !self.cfg.dont_probe {
            let unknown = self
                .sec
                .lock()
                .map(|s| s.security_engine_id.is_empty())
                .unwrap_or(false);
            if unknown && !self.probing.load(Ordering::SeqCst) {
                self.probe_engine_id().await?;
            }
        }

        self.fill_defaults(&mut pdu, probe_mode)?;
        if pdu.request_id == 0 {
            pdu.request_id = self.engine.req_ids.next_id();
        }

        if !expect_response {
            let msg_id = self.engine.msg_ids.next_id();
            let wire = self.build_wire(&pdu, msg_id)?;
            self.conn.send_now(&wire).await.inspect_err(|e| {
                self.record_error(e.kind());
            })?;
            self.count_out(pdu.command);
            return Ok(pdu);
        }

        let per_timeout = pdu.timeout.unwrap_or(self.cfg.timeout);
        let mut retries_used: u32 = 0;

        'attempts: loop {
            let msg_id = self.engine.msg_ids.next_id();
            pdu.msg_id = msg_id;
            let wire = self.build_wire(&pdu, msg_id)?;
            let mut rx =
                self.conn.send_request(msg_id, &wire).await.inspect_err(|e| {
                    self.record_error(e.kind());
                })?;
            self.count_out(pdu.command);
            debug!(
                session = self.session_id,
                msg_id,
                req_id = pdu.request_id,
                attempt = retries_used,
                "request on the wire"
            );

            let deadline = tokio::time::Instant::now() + per_timeout;
            loop {
                let frame: Option<Bytes> = tokio::select! {
                    _ = self.cancel.cancelled() => {
                        self.conn.forget_request(msg_id);
                        self.record_error(ErrorKind::Timeout);
                        return Err(SnmpError::with_detail(
                            ErrorKind::Timeout,
                            "session closed with request outstanding",
                        ));
                    },
                    res = timeout_at(deadline, rx.recv()) => res.unwrap_or(None),
                };

                let Some(frame) = frame else {
                    // Either the channel died or the deadline hit; both
                    // consume one retry.
                    self.conn.forget_request(msg_id);
                    if retries_used < self.cfg.retries {
                        retries_used += 1;
                        continue 'attempts;
                    }
                    self.record_error(ErrorKind::Timeout);
                    return Err(SnmpError::new(ErrorKind::Timeout));
                };

                match self.process_reply(&pdu, frame, probe_mode) {
                    ReplyOutcome::Deliver(reply) => {
                        self.conn.forget_request(msg_id);
                        return Ok(*reply);
                    },
                    ReplyOutcome::Resend => {
                        self.conn.forget_request(msg_id);
                        if retries_used < self.cfg.retries {
                            retries_used += 1;
                            continue 'attempts;
                        }
                        self.record_error(ErrorKind::Timeout);
                        return Err(SnmpError::new(ErrorKind::Timeout));
                    },
                    ReplyOutcome::Fail(e) => {
                        self.conn.forget_request(msg_id);
                        self.record_error(e.kind());
                        return Err(e);
                    },
                    ReplyOutcome::Ignore => {
                        // Keep waiting on the same attempt.
                    },
                }
            }
        }
    }

    fn count_out(&self, command: PduType) {
        let stat = match command {
            PduType::Get => StatId::SnmpOutGetRequests,
            PduType::GetNext | PduType::GetBulk => StatId::SnmpOutGetNexts,
            PduType::Set => StatId::SnmpOutSetRequests,
            PduType::Response | PduType::Report => StatId::SnmpOutGetResponses,
            PduType::Trap2 | PduType::Inform => StatId::SnmpOutTraps,
        };
        self.engine.stats.inc(stat);
    }

    /// Fill defaulted PDU fields from the session. Probes keep their
    /// anonymous noAuth identity.
    fn fill_defaults(&self, pdu: &mut Pdu, probe_mode: bool) -> SnmpResult<()> {
        let sec = self
            .sec
            .lock()
            .map_err(|_| SnmpError::new(ErrorKind::GenErr))?;
        if pdu.security_model == 0 {
            pdu.security_model = sec.security_model;
        }
        if !probe_mode && pdu.security_name.is_empty() {
            pdu.security_name = sec.security_name.clone();
        }
        if !probe_mode
            && pdu.security_level == SecurityLevel::NoAuthNoPriv
            && sec.security_level != SecurityLevel::NoAuthNoPriv
            && pdu.command != PduType::Report
        {
            pdu.security_level = sec.security_level;
        }
        if pdu.security_engine_id.is_empty() {
            pdu.security_engine_id = sec.security_engine_id.clone();
        }
        if pdu.context_engine_id.is_empty() {
            pdu.context_engine_id = sec.context_engine_id.clone();
        }
        if pdu.context_name.is_empty() {
            pdu.context_name = sec.context_name.clone();
        }
        Ok(())
    }

    /// Build the wire message for one attempt.
    fn build_wire(&self, pdu: &Pdu, msg_id: i32) -> SnmpResult<Vec<u8>> {
        let model = self.model()?;
        let sec = self
            .sec
            .lock()
            .map_err(|_| SnmpError::new(ErrorKind::GenErr))?;

        // Per-PDU overrides win over the session security state.
        let mut msg_sec = sec.clone();
        drop(sec);
        msg_sec.security_level = pdu.security_level;
        if !pdu.security_name.is_empty() {
            msg_sec.security_name = pdu.security_name.clone();
        }
        msg_sec.security_engine_id = pdu.security_engine_id.clone();
        if let Some(state) = pdu
            .security_state
            .as_ref()
            .and_then(|s| s.downcast_ref::<UsmSecState>())
        {
            // Responses reuse the keys cached at decode time.
            msg_sec.auth_protocol = state.auth_protocol;
            msg_sec.auth_key = state.auth_key.clone();
            msg_sec.priv_protocol = state.priv_protocol;
            msg_sec.priv_key = state.priv_key.clone();
        }

        let flags =
            message::MsgFlags::for_message(pdu.security_level, pdu.command);
        let global = message::build_global_data(
            msg_id,
            self.cfg.rcv_msg_max_size as i64,
            flags,
            msg_sec.security_model,
        )?;
        let scoped = if self.engine.reverse_encode {
            message::rbuild_scoped_pdu(pdu)?
        } else {
            message::build_scoped_pdu(pdu)?
        };

        let transport_limit = self.conn.transport().msg_max_size();
        let max_msg_size = if self.cfg.snd_msg_max_size > 0 {
            self.cfg.snd_msg_max_size.min(transport_limit)
        } else {
            transport_limit
        };

        let params = OutgoingParams {
            global_data: &global,
            scoped_pdu: &scoped,
            sec: &msg_sec,
            max_msg_size,
        };
        if self.engine.reverse_encode {
            model.encode_reverse(&params)
        } else {
            model.encode_forward(&params)
        }
    }

    // ---- receive path ----

    /// Full inbound pipeline: envelope, security model, scoped PDU.
    fn decode_incoming(&self, frame: &[u8]) -> SnmpResult<Pdu> {
        let envelope = message::parse_envelope(frame).inspect_err(|e| {
            match e.kind() {
                ErrorKind::InvalidMsg => {
                    self.engine.stats.inc(StatId::SnmpInvalidMsgs);
                },
                ErrorKind::BadVersion => {
                    self.engine.stats.inc(StatId::SnmpInBadVersions);
                },
                _ => {
                    self.engine.stats.inc(StatId::SnmpInAsnParseErrs);
                },
            }
        })?;

        let model = self
            .engine
            .registry
            .lookup(envelope.security_model)
            .ok_or_else(|| {
                self.engine.stats.inc(StatId::SnmpUnknownSecurityModels);
                SnmpError::with_detail(
                    ErrorKind::UnknownSecModel,
                    format!("model {}", envelope.security_model),
                )
            })?;

        let sec_snapshot = self.security();
        let decoded = model.decode(&IncomingParams {
            whole_msg: frame,
            security_level: envelope.security_level,
            reportable: envelope.flags.contains(message::MsgFlags::REPORTABLE),
            sec_params: envelope.sec_params,
            sec_params_offset: envelope.sec_params_offset,
            msg_data: envelope.msg_data,
            sec: Some(&sec_snapshot),
        })?;

        let (_, _, mut pdu) = message::parse_scoped_pdu(&decoded.scoped_pdu)
            .inspect_err(|_| {
                self.engine.stats.inc(StatId::SnmpInAsnParseErrs);
            })?;
        pdu.msg_id = envelope.msg_id;
        pdu.security_model = envelope.security_model;
        pdu.security_level = decoded.security_level;
        pdu.security_engine_id = decoded.security_engine_id;
        pdu.security_name = decoded.security_name;
        pdu.security_state = Some(decoded.security_state);
        Ok(pdu)
    }

    fn process_reply(
        &self,
        request: &Pdu,
        frame: Bytes,
        probe_mode: bool,
    ) -> ReplyOutcome {
        let reply = match self.decode_incoming(&frame) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(session = self.session_id, "dropping reply: {e}");
                return ReplyOutcome::Ignore;
            },
        };

        match reply.command {
            PduType::Report => self.process_report(request, reply, probe_mode),
            PduType::Response => {
                self.engine.stats.inc(StatId::SnmpInGetResponses);
                if reply.request_id != request.request_id {
                    self.engine.stats.inc(StatId::SnmpUnknownPduHandlers);
                    debug!(
                        session = self.session_id,
                        got = reply.request_id,
                        want = request.request_id,
                        "request id mismatch"
                    );
                    return ReplyOutcome::Ignore;
                }
                if let Err(e) = validate_response(request, &reply) {
                    self.engine.stats.inc(StatId::SnmpUnknownPduHandlers);
                    debug!(session = self.session_id, "response mismatch: {e}");
                    return ReplyOutcome::Ignore;
                }
                ReplyOutcome::Deliver(Box::new(reply))
            },
            _ => {
                self.engine.stats.inc(StatId::SnmpUnknownPduHandlers);
                ReplyOutcome::Ignore
            },
        }
    }

    /// Report PDUs: classify by the counter OID, then either finish a
    /// probe, trigger one fresh-msgID retransmit, or fail the request.
    fn process_report(
        &self,
        _request: &Pdu,
        reply: Pdu,
        probe_mode: bool,
    ) -> ReplyOutcome {
        let kind = reply
            .varbinds
            .first()
            .and_then(|vb| StatId::classify_report(&vb.name))
            .map(report_error_kind)
            .unwrap_or(ErrorKind::UnknownReport);
        debug!(session = self.session_id, ?kind, "report received");

        if probe_mode && kind == ErrorKind::UsmUnknownEngineId {
            // Discovery answered by the classic report path: the engine
            // id rides in the report's security parameters.
            return ReplyOutcome::Deliver(Box::new(reply));
        }

        let model = match self.model() {
            Ok(model) => model,
            Err(e) => return ReplyOutcome::Fail(e),
        };
        if model.report_recoverable(kind) {
            return ReplyOutcome::Resend;
        }
        ReplyOutcome::Fail(SnmpError::new(kind))
    }

    // ---- responder path (listener children, agents) ----

    /// Route messages nobody was waiting for into this session's
    /// responder task. Used by listener children; harmless elsewhere.
    pub fn enable_responder(self: &Arc<Self>) {
        let (tx, mut rx) = mpsc::channel::<Bytes>(16);
        if !self.conn.set_unsolicited_sink(tx) {
            return;
        }
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = session.cancel.cancelled() => break,
                    frame = rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                if let Err(e) = session.handle_unsolicited(frame).await {
                    debug!(
                        session = session.session_id,
                        "unsolicited handling failed: {e}"
                    );
                }
            }
        });
    }

    /// Answer context-engineID probes addressed to us; generate reports
    /// for security faults on reportable messages.
    async fn handle_unsolicited(&self, frame: Bytes) -> SnmpResult<()> {
        let envelope_meta = message::parse_envelope(&frame).map(|e| {
            (
                e.msg_id,
                e.flags.contains(message::MsgFlags::REPORTABLE),
            )
        });

        let pdu = match self.decode_incoming(&frame) {
            Ok(pdu) => pdu,
            Err(e) => {
                // A security fault on a reportable message produces a
                // report; the discovery report is the common case.
                let Ok((msg_id, reportable)) = envelope_meta else {
                    return Err(e);
                };
                if !reportable {
                    return Err(e);
                }
                let model = self.model()?;
                let mut dummy = Pdu::new(PduType::Get);
                dummy.msg_id = msg_id;
                let mut report = model.make_report(&dummy, e.kind())?;
                report.msg_id = msg_id;
                let wire = self.build_wire(&report, msg_id)?;
                self.conn.send_now(&wire).await?;
                self.count_out(PduType::Report);
                return Ok(());
            },
        };

        let probe_oid = Oid::from_slice(&SNMP_ENGINE_ID_OID)
            .map_err(|_| SnmpError::new(ErrorKind::GenErr))?;
        let is_context_probe = matches!(
            pdu.command,
            PduType::Get | PduType::GetNext
        ) && pdu.context_engine_id == LOCAL_CONTEXT_ENGINE_ID
            && pdu.find_varbind(&probe_oid).is_some();
        if !is_context_probe {
            self.engine.stats.inc(StatId::SnmpUnknownPduHandlers);
            return Ok(());
        }

        self.engine.stats.inc(StatId::SnmpInGetRequests);
        let mut response = Pdu::new(PduType::Response);
        response.request_id = pdu.request_id;
        response.msg_id = pdu.msg_id;
        response.context_engine_id = self.engine.usm.local_engine_id().to_vec();
        response.context_name = pdu.context_name.clone();
        response.security_engine_id = self.engine.usm.local_engine_id().to_vec();
        response.security_model = pdu.security_model;
        response.security_level = pdu.security_level;
        response.security_name = pdu.security_name.clone();
        response.security_state = pdu.security_state.clone();
        response.add_varbind(VarBind::new(
            probe_oid,
            Value::OctetString(self.engine.usm.local_engine_id().to_vec()),
        ));
        let wire = self.build_wire(&response, pdu.msg_id)?;
        self.conn.send_now(&wire).await?;
        self.count_out(PduType::Response);
        Ok(())
    }

    // ---- lifecycle ----

    /// Close the session: every outstanding request resolves as timed
    /// out, then the transport goes down. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let model = self.model().ok();
        if let (Some(model), Ok(mut sec)) = (model, self.sec.lock()) {
            model.session_close(&mut sec);
        }
        self.cancel.cancel();
        self.conn.cancel_now();
        debug!(session = self.session_id, "session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

enum ReplyOutcome {
    Deliver(Box<Pdu>),
    Resend,
    Fail(SnmpError),
    Ignore,
}

fn report_error_kind(stat: StatId) -> ErrorKind {
    match stat {
        StatId::UsmStatsUnknownEngineIds => ErrorKind::UsmUnknownEngineId,
        StatId::UsmStatsUnknownUserNames => ErrorKind::UsmUnknownUser,
        StatId::UsmStatsUnsupportedSecLevels => ErrorKind::UsmUnsupportedLevel,
        StatId::UsmStatsWrongDigests => ErrorKind::UsmAuthFailure,
        StatId::UsmStatsDecryptionErrors => ErrorKind::UsmDecryptFailure,
        StatId::UsmStatsNotInTimeWindows => ErrorKind::UsmNotInTimeWindow,
        StatId::SnmpUnknownSecurityModels => ErrorKind::UnknownSecModel,
        StatId::SnmpInvalidMsgs => ErrorKind::InvalidMsg,
        _ => ErrorKind::UnknownReport,
    }
}

/// A Response must echo the request's identity; Report PDUs are exempt
/// (checked before this is called).
fn validate_response(request: &Pdu, reply: &Pdu) -> SnmpResult<()> {
    if reply.security_model != request.security_model {
        return Err(SnmpError::with_detail(
            ErrorKind::Protocol,
            "security model mismatch",
        ));
    }
    if reply.security_level != request.security_level {
        return Err(SnmpError::with_detail(
            ErrorKind::BadSecLevel,
            "security level mismatch",
        ));
    }
    if !request.security_name.is_empty()
        && reply.security_name != request.security_name
    {
        return Err(SnmpError::with_detail(
            ErrorKind::BadSecName,
            "security name mismatch",
        ));
    }
    if !request.context_engine_id.is_empty()
        && reply.context_engine_id != request.context_engine_id
        && request.context_engine_id != LOCAL_CONTEXT_ENGINE_ID
    {
        return Err(SnmpError::with_detail(
            ErrorKind::BadContext,
            "context engine id mismatch",
        ));
    }
    if reply.context_name != request.context_name {
        return Err(SnmpError::with_detail(
            ErrorKind::BadContext,
            "context name mismatch",
        ));
    }
    Ok(())
}

/// Listening stream endpoint: accepted peers become child sessions cloned
/// from the template, announced through [`SessionEvent`].
pub struct SnmpListener {
    cancel: CancellationToken,
    local: SocketAddr,
}

impl SnmpListener {
    pub async fn bind(
        engine: Arc<Engine>,
        template: SessionConfig,
        bind_addr: SocketAddr,
    ) -> SnmpResult<(Arc<Self>, mpsc::Receiver<SessionEvent>)> {
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            SnmpError::with_detail(ErrorKind::TransportConfigError, e.to_string())
        })?;
        let local = listener.local_addr().map_err(|e| {
            SnmpError::with_detail(ErrorKind::TransportConfigError, e.to_string())
        })?;
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(16);

        let this = Arc::new(Self {
            cancel: cancel.clone(),
            local,
        });

        tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    _ = cancel.cancelled() => break,
                    res = listener.accept() => res,
                };
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    },
                };

                match Self::adopt(&engine, &template, stream, peer) {
                    Ok(child) => {
                        let done = child.conn.done_token();
                        let child_id = child.session_id;
                        let events = events_tx.clone();
                        if events
                            .send(SessionEvent::Connect(Arc::clone(&child)))
                            .await
                            .is_err()
                        {
                            break;
                        }
                        tokio::spawn(async move {
                            done.cancelled().await;
                            child.close().await;
                            let _ = events
                                .send(SessionEvent::Disconnect(child_id))
                                .await;
                        });
                    },
                    Err(e) => warn!("failed to adopt accepted stream: {e}"),
                }
            }
        });

        Ok((this, events_rx))
    }

    /// Clone the template for an accepted stream and transfer the hook
    /// set via the security model's sessionSetup.
    fn adopt(
        engine: &Arc<Engine>,
        template: &SessionConfig,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
    ) -> SnmpResult<Arc<Session>> {
        let model = engine
            .registry
            .lookup(if template.security.security_model == 0 {
                USM_SEC_MODEL
            } else {
                template.security.security_model
            })
            .ok_or_else(|| SnmpError::new(ErrorKind::UnknownSecModel))?;

        let mut child_cfg = template.clone();
        child_cfg.peer = peer;
        child_cfg.dont_probe = true;
        let mut child_sec = SessionSecurity::default();
        model.session_setup(&template.security, &mut child_sec)?;
        // The accepting side is authoritative; no discovery needed.
        child_sec.security_engine_id = engine.usm.local_engine_id().to_vec();
        child_sec.context_engine_id = engine.usm.local_engine_id().to_vec();
        child_cfg.security = child_sec;

        let transport = Transport::from_tcp_stream(stream, peer);
        let child = Session::from_transport(
            Arc::clone(engine),
            child_cfg,
            transport,
        )?;
        child.enable_responder();
        Ok(child)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SnmpListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
