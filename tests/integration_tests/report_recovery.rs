// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use snmp_client_rs::{
    client::{engine::{Engine, EngineOptions}, session::Session},
    models::pdu::{Pdu, PduType},
    security::crypto::{AuthProtocol, PrivProtocol},
};

use crate::integration_tests::common::{
    AgentMode, FakeAgent, SYS_NAME_OID, bert_security, bert_user, client_config,
    oid,
};

/// The client starts with an empty time cache, so its first
/// authenticated request is outside the agent's window. The agent's
/// NotInTimeWindow report must trigger exactly one automatic resend with
/// a fresh msgID, and the follow-up Response is delivered normally.
#[tokio::test]
async fn not_in_time_window_report_triggers_one_resend() {
    let user = bert_user(AuthProtocol::HmacMd5, Some(PrivProtocol::DesCbc));
    let (addr, agent) = FakeAgent::spawn(AgentMode::Respond, Some(user)).await;
    let engine = Engine::new(EngineOptions::default()).expect("engine");

    // Preset engine id: keys localize at open, but boots/time stay
    // unknown, forcing the first request out of the window.
    let session = Session::open(
        Arc::clone(&engine),
        client_config(
            addr,
            true,
            bert_security(AuthProtocol::HmacMd5, Some(PrivProtocol::DesCbc)),
        ),
    )
    .await
    .expect("open");

    let mut pdu = Pdu::new(PduType::Get);
    pdu.add_null_varbind(oid(&SYS_NAME_OID));
    let reply = session.send(pdu).await.expect("recovered send");
    assert_eq!(reply.command, PduType::Response);
    assert_eq!(reply.varbind_count(), 1);

    let msg_ids = agent.seen_msg_ids();
    assert_eq!(msg_ids.len(), 2, "original transmit plus exactly one resend");
    assert_ne!(msg_ids[0], msg_ids[1], "the resend must mint a fresh msgID");

    // The report taught the client the agent's boots/time.
    let (boots, _) = engine.usm.engine_time(agent.usm().local_engine_id());
    assert_eq!(boots, agent.usm().local_engine_boots());

    session.close().await;
}

/// authNoPriv variant: same recovery, tag-only protection.
#[tokio::test]
async fn auth_no_priv_recovery() {
    let user = bert_user(AuthProtocol::HmacSha1, None);
    let (addr, agent) = FakeAgent::spawn(AgentMode::Respond, Some(user)).await;
    let engine = Engine::new(EngineOptions::default()).expect("engine");

    let session = Session::open(
        engine,
        client_config(addr, true, bert_security(AuthProtocol::HmacSha1, None)),
    )
    .await
    .expect("open");

    let mut pdu = Pdu::new(PduType::Get);
    pdu.add_null_varbind(oid(&SYS_NAME_OID));
    let reply = session.send(pdu).await.expect("recovered send");
    assert_eq!(reply.command, PduType::Response);
    assert_eq!(agent.seen_count(), 2);

    session.close().await;
}
