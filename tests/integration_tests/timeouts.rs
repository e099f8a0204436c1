// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use snmp_client_rs::{
    client::{engine::{Engine, EngineOptions}, session::Session},
    error::ErrorKind,
    models::pdu::{Pdu, PduType},
};
use tokio::time::sleep;

use crate::integration_tests::common::{
    AgentMode, FakeAgent, SYS_NAME_OID, client_config, noauth_security, oid,
};

/// Silent peer: with retries=2 the engine transmits three times (t=0, T,
/// 2T) and fails with Timeout around 3T.
#[tokio::test]
async fn silent_peer_retry_schedule() {
    let (addr, agent) = FakeAgent::spawn(AgentMode::Silent, None).await;
    let engine = Engine::new(EngineOptions::default()).expect("engine");

    let mut cfg = client_config(addr, true, noauth_security());
    cfg.timeout = Duration::from_millis(200);
    cfg.retries = 2;
    let session = Session::open(engine, cfg).await.expect("open");

    let mut pdu = Pdu::new(PduType::Get);
    pdu.add_null_varbind(oid(&SYS_NAME_OID));

    let started = Instant::now();
    let err = session.send(pdu).await.expect_err("silent peer");
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    // Give the last datagram a moment to reach the agent socket.
    sleep(Duration::from_millis(50)).await;
    assert_eq!(agent.seen_count(), 3, "retries+1 transmissions");
    let msg_ids = agent.seen_msg_ids();
    assert!(
        msg_ids.windows(2).all(|w| w[0] != w[1]),
        "every retransmit mints a fresh msgID"
    );
    assert!(
        elapsed >= Duration::from_millis(550) && elapsed < Duration::from_secs(3),
        "fired at ~3 timeouts, got {elapsed:?}"
    );

    session.close().await;
}

/// A per-PDU timeout overrides the session default.
#[tokio::test]
async fn per_request_timeout_override() {
    let (addr, _agent) = FakeAgent::spawn(AgentMode::Silent, None).await;
    let engine = Engine::new(EngineOptions::default()).expect("engine");

    let mut cfg = client_config(addr, true, noauth_security());
    cfg.timeout = Duration::from_secs(30);
    cfg.retries = 0;
    let session = Session::open(engine, cfg).await.expect("open");

    let mut pdu = Pdu::new(PduType::Get);
    pdu.timeout = Some(Duration::from_millis(100));
    pdu.add_null_varbind(oid(&SYS_NAME_OID));

    let started = Instant::now();
    let err = session.send(pdu).await.expect_err("silent peer");
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));

    session.close().await;
}

/// Closing a session with K requests outstanding resolves each exactly
/// once as timed out; later sends are refused outright.
#[tokio::test]
async fn close_resolves_outstanding_requests() {
    const K: usize = 3;
    let (addr, _agent) = FakeAgent::spawn(AgentMode::Silent, None).await;
    let engine = Engine::new(EngineOptions::default()).expect("engine");

    let mut cfg = client_config(addr, true, noauth_security());
    cfg.timeout = Duration::from_secs(30);
    cfg.retries = 0;
    let session = Session::open(engine, cfg).await.expect("open");

    let mut handles = Vec::with_capacity(K);
    for _ in 0..K {
        let session = Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            let mut pdu = Pdu::new(PduType::Get);
            pdu.add_null_varbind(oid(&SYS_NAME_OID));
            session.send(pdu).await
        }));
    }
    // Let every request reach the wire before closing.
    sleep(Duration::from_millis(100)).await;
    session.close().await;

    for handle in handles {
        let err = handle.await.expect("join").expect_err("closed session");
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    let mut pdu = Pdu::new(PduType::Get);
    pdu.add_null_varbind(oid(&SYS_NAME_OID));
    let err = session.send(pdu).await.expect_err("send after close");
    assert_eq!(err.kind(), ErrorKind::BadSession);
    assert!(session.is_closed());
}
