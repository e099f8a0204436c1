// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use hex_literal::hex;
use snmp_client_rs::{
    client::{engine::{Engine, EngineOptions}, session::Session},
    models::{
        message::{MsgFlags, parse_envelope, parse_scoped_pdu},
        pdu::{Pdu, PduType},
        value::Value,
    },
    security::{IncomingParams, SecurityModel},
};
use tokio::{net::UdpSocket, time::timeout};

use crate::integration_tests::common::{
    ENGINE_ID_OID, client_config, encode_msg, noauth_security, oid,
};

/// When the local side is the responder, a Get on snmpEngineID.0 under
/// contextEngineID 80:00:00:00:06 is answered with the local engine id
/// and consumed without reaching any other handler.
#[tokio::test]
async fn context_probe_is_answered_locally() {
    let local_engine_id = hex!("80001f88801112131415161700000000").to_vec();
    let engine = Engine::new(EngineOptions {
        engine_id: Some(local_engine_id.clone()),
        ..Default::default()
    })
    .expect("engine");

    // The raw socket plays the probing peer; the session treats it as
    // its (only) peer.
    let prober = UdpSocket::bind("127.0.0.1:0").await.expect("bind prober");
    let prober_addr = prober.local_addr().expect("prober addr");

    let mut cfg = client_config(prober_addr, true, noauth_security());
    cfg.local = Some("127.0.0.1:0".parse().expect("local bind"));
    cfg.security.security_engine_id = local_engine_id.clone();
    cfg.security.context_engine_id = local_engine_id.clone();
    let session = Session::open(engine.clone(), cfg).await.expect("open");
    session.enable_responder();
    let session_addr = session.local_addr().expect("session addr");

    // Craft the RFC 5343 probe addressed at the responder's engine.
    let mut probe = Pdu::new(PduType::Get);
    probe.request_id = 4242;
    probe.context_engine_id = vec![0x80, 0x00, 0x00, 0x00, 0x06];
    probe.add_null_varbind(oid(&ENGINE_ID_OID));
    let probe_sec = snmp_client_rs::security::SessionSecurity {
        security_model: snmp_client_rs::security::USM_SEC_MODEL,
        security_engine_id: local_engine_id.clone(),
        ..Default::default()
    };
    let wire = encode_msg(&engine.usm, &probe_sec, &probe, 99);
    prober
        .send_to(&wire, session_addr)
        .await
        .expect("send probe");

    // The responder must answer with our engine id.
    let mut buf = vec![0u8; 65535];
    let (n, _) = timeout(Duration::from_secs(2), prober.recv_from(&mut buf))
        .await
        .expect("responder timed out")
        .expect("recv");
    let reply = &buf[..n];

    let envelope = parse_envelope(reply).expect("envelope");
    assert_eq!(envelope.msg_id, 99, "reply reuses the probe msgID");
    let decoded = engine
        .usm
        .decode(&IncomingParams {
            whole_msg: reply,
            security_level: envelope.security_level,
            reportable: envelope.flags.contains(MsgFlags::REPORTABLE),
            sec_params: envelope.sec_params,
            sec_params_offset: envelope.sec_params_offset,
            msg_data: envelope.msg_data,
            sec: None,
        })
        .expect("decode");
    let (context_engine_id, _, pdu) =
        parse_scoped_pdu(&decoded.scoped_pdu).expect("scoped");

    assert_eq!(pdu.command, PduType::Response);
    assert_eq!(pdu.request_id, 4242);
    assert_eq!(context_engine_id, local_engine_id);
    assert_eq!(
        pdu.varbinds[0].value,
        Value::OctetString(local_engine_id.clone())
    );

    session.close().await;
}
