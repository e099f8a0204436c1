// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use snmp_client_rs::{
    client::{engine::{Engine, EngineOptions}, session::{Session, SessionConfig}},
    models::{pdu::{Pdu, PduType}, value::Value},
    stats::StatId,
};

use crate::integration_tests::common::{
    AgentMode, FakeAgent, SYS_NAME_OID, client_config, noauth_security, oid,
};

/// N concurrent requests answered newest-first: every future resolves
/// exactly once with the PDU that matches its own request id.
#[tokio::test]
async fn out_of_order_responses_correlate() {
    const N: usize = 5;
    let (addr, agent) = FakeAgent::spawn(AgentMode::RespondOutOfOrder(N), None).await;
    let engine = Engine::new(EngineOptions::default()).expect("engine");

    let mut cfg = client_config(addr, true, noauth_security());
    // The batch answer arrives only after all N are queued.
    cfg.timeout = Duration::from_secs(5);
    cfg.retries = 0;
    let session = Session::open(engine, cfg).await.expect("open");

    let mut handles = Vec::with_capacity(N);
    for i in 0..N {
        let session = Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            let mut pdu = Pdu::new(PduType::Get);
            let mut name = oid(&SYS_NAME_OID[..SYS_NAME_OID.len() - 1]);
            name.push(i as u32).expect("instance");
            pdu.add_null_varbind(name.clone());
            let reply = session.send(pdu).await.expect("send");
            (name, reply)
        }));
    }

    for handle in handles {
        let (name, reply) = handle.await.expect("join");
        assert_eq!(reply.command, PduType::Response);
        assert_eq!(reply.varbind_count(), 1);
        // The agent echoes the request's varbind name back, so a
        // misrouted response would carry the wrong instance.
        assert_eq!(reply.varbinds[0].name, name);
        assert_eq!(
            reply.varbinds[0].value,
            Value::OctetString(b"fake-agent".to_vec())
        );
    }

    assert_eq!(agent.seen_count(), N);
    session.close().await;
}

/// A mangled frame (priv flag without auth) is counted, dropped, and the
/// request still completes on the real response.
#[tokio::test]
async fn invalid_msg_is_dropped_not_fatal() {
    let (addr, _agent) = FakeAgent::spawn(AgentMode::BadFlagsFirst, None).await;
    let engine = Engine::new(EngineOptions::default()).expect("engine");

    let session = Session::open(
        Arc::clone(&engine),
        SessionConfig {
            timeout: Duration::from_secs(2),
            ..client_config(addr, true, noauth_security())
        },
    )
    .await
    .expect("open");

    let mut pdu = Pdu::new(PduType::Get);
    pdu.add_null_varbind(oid(&SYS_NAME_OID));
    let reply = session.send(pdu).await.expect("send survives bad frame");
    assert_eq!(reply.command, PduType::Response);

    assert_eq!(engine.stats.get(StatId::SnmpInvalidMsgs), 1);
    session.close().await;
}
