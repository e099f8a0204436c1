// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use hex_literal::hex;
use snmp_client_rs::{
    client::{
        engine::{Engine, EngineOptions},
        session::{SessionConfig, SessionEvent, SnmpListener, TransportKind},
    },
    models::{
        message::{check_packet, parse_envelope, parse_scoped_pdu},
        pdu::{Pdu, PduType},
        value::Value,
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

use crate::integration_tests::common::{
    ENGINE_ID_OID, encode_msg, noauth_security, oid,
};

/// A listening stream transport: the CONNECT event fires once before any
/// PDU is read, the child answers a context probe, and EOF produces one
/// DISCONNECT for the same child.
#[tokio::test]
async fn accept_probe_and_disconnect() {
    let local_engine_id = hex!("80001f8880aabbccddeeff0000000000").to_vec();
    let engine = Engine::new(EngineOptions {
        engine_id: Some(local_engine_id.clone()),
        ..Default::default()
    })
    .expect("engine");

    let template = SessionConfig {
        transport: TransportKind::Tcp,
        security: noauth_security(),
        ..SessionConfig::default()
    };
    let (listener, mut events) = SnmpListener::bind(
        engine.clone(),
        template,
        "127.0.0.1:0".parse().expect("bind addr"),
    )
    .await
    .expect("listener");

    let mut stream = TcpStream::connect(listener.local_addr())
        .await
        .expect("connect");

    // CONNECT must arrive before any bytes are exchanged.
    let child = match timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("connect event timed out")
        .expect("listener alive")
    {
        SessionEvent::Connect(child) => child,
        other => panic!("expected Connect, got {other:?}"),
    };
    let child_id = child.session_id;

    // Probe the child through the stream.
    let mut probe = Pdu::new(PduType::Get);
    probe.request_id = 7;
    probe.context_engine_id = vec![0x80, 0x00, 0x00, 0x00, 0x06];
    probe.add_null_varbind(oid(&ENGINE_ID_OID));
    let probe_sec = snmp_client_rs::security::SessionSecurity {
        security_model: snmp_client_rs::security::USM_SEC_MODEL,
        security_engine_id: local_engine_id.clone(),
        ..Default::default()
    };
    let wire = encode_msg(&engine.usm, &probe_sec, &probe, 55);
    stream.write_all(&wire).await.expect("write probe");

    // Read one framed reply back.
    let mut collected = Vec::new();
    let reply = loop {
        let mut chunk = [0u8; 2048];
        let n = timeout(Duration::from_secs(2), stream.read(&mut chunk))
            .await
            .expect("reply timed out")
            .expect("read");
        assert!(n > 0, "stream closed before reply");
        collected.extend_from_slice(&chunk[..n]);
        if let Some(total) = check_packet(&collected).expect("framing") {
            if collected.len() >= total {
                break collected[..total].to_vec();
            }
        }
    };

    let envelope = parse_envelope(&reply).expect("envelope");
    assert_eq!(envelope.msg_id, 55);
    // noAuth reply: the msgData is the plaintext scoped PDU.
    let (_, _, pdu) = parse_scoped_pdu(envelope.msg_data).expect("scoped");
    assert_eq!(pdu.command, PduType::Response);
    assert_eq!(pdu.request_id, 7);
    assert_eq!(
        pdu.varbinds[0].value,
        Value::OctetString(local_engine_id.clone())
    );

    // EOF from the peer produces exactly one DISCONNECT for this child.
    drop(stream);
    let event = timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("disconnect event timed out")
        .expect("listener alive");
    match event {
        SessionEvent::Disconnect(id) => assert_eq!(id, child_id),
        other => panic!("expected Disconnect, got {other:?}"),
    }

    listener.shutdown();
}
